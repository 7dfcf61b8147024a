use actix_web::{web, HttpResponse};
use log::info;
use mongodb::bson::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::db::store::{MutationOutcome, RateCache, TripMutation, TripStore};
use crate::error::{Error, Result};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::trip::{NewStop, Trip, TripView};
use crate::routes::{owned_trip, parse_object_id, AppState};
use crate::services::currency_service::RateProvider;
use crate::services::recalc_service::live_total;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub base_currency: Option<String>,
    pub origin_location_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopInput {
    #[serde(alias = "city_id")]
    pub location_id: String,
    #[serde(alias = "arrivalDate")]
    pub arrival_date: Option<String>,
    #[serde(alias = "departureDate")]
    pub departure_date: Option<String>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceStopsRequest {
    #[serde(default)]
    pub stops: Vec<StopInput>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    pub is_public: bool,
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_stop(index: usize, input: StopInput) -> Result<NewStop> {
    Ok(NewStop {
        location_id: parse_object_id(&input.location_id, "location")?,
        arrival_date: input.arrival_date.filter(|d| !d.is_empty()),
        departure_date: input.departure_date.filter(|d| !d.is_empty()),
        order_index: input.order_index.unwrap_or(index as i32),
    })
}

/*
    POST /api/trips
*/
pub async fn create_trip<S, P>(
    body: web::Json<CreateTripRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let body = body.into_inner();
    let (Some(name), Some(start_date), Some(end_date)) =
        (required(body.name), required(body.start_date), required(body.end_date))
    else {
        return Err(Error::Validation("Name, start date, and end date are required".to_string()));
    };
    let origin_location_id = match required(body.origin_location_id) {
        Some(raw) => Some(parse_object_id(&raw, "location")?),
        None => None,
    };

    let trip_id = data
        .budget
        .store()
        .create_trip(Trip {
            id: None,
            user_id: parse_object_id(&user.user_id, "user")?,
            name,
            description: body.description.filter(|d| !d.is_empty()),
            start_date: Some(start_date),
            end_date: Some(end_date),
            base_currency: required(body.base_currency).map(|c| c.to_uppercase()),
            origin_location_id,
            is_public: false,
            transport_total: None,
            accommodation_total: None,
            meals_total: None,
            activities_total: None,
            total_budget: None,
            created_at: Some(DateTime::now()),
            updated_at: None,
        })
        .await?;
    info!("User {} created trip {}", user.user_id, trip_id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Trip created successfully",
        "id": trip_id.to_hex(),
    })))
}

/*
    GET /api/trips
*/
pub async fn list_trips<S, P>(data: web::Data<AppState<S, P>>, user: AuthenticatedUser) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let user_id = parse_object_id(&user.user_id, "user")?;

    let mut views = Vec::new();
    for trip in store.user_trips(&user_id).await? {
        let Some(trip_id) = trip.id else { continue };
        let stop_count = store.trip_stops(&trip_id).await?.len();
        views.push(TripView::persisted(&trip_id, trip, stop_count));
    }

    Ok(HttpResponse::Ok().json(views))
}

/*
    /api/trips/{id}
*/
pub async fn get_trip<S, P>(
    path: web::Path<String>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let trip = owned_trip(store, &trip_id, &user).await?;
    let stops = store.trip_stops(&trip_id).await?;

    // Best effort: a failed refresh reports the persisted total as stale
    let live = live_total(store, &trip).await;

    Ok(HttpResponse::Ok().json(TripView {
        total_budget: live.total(),
        total_budget_fresh: live.is_fresh(),
        ..TripView::persisted(&trip_id, trip, stops.len())
    }))
}

/*
    /api/trips/{id}/stops
*/
pub async fn get_stops<S, P>(
    path: web::Path<String>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    owned_trip(store, &trip_id, &user).await?;

    Ok(HttpResponse::Ok().json(store.trip_stops(&trip_id).await?))
}

/*
    PUT /api/trips/{id}/stops
*/
pub async fn replace_stops<S, P>(
    path: web::Path<String>,
    body: web::Json<ReplaceStopsRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let stops = body
        .into_inner()
        .stops
        .into_iter()
        .enumerate()
        .map(|(index, input)| normalize_stop(index, input))
        .collect::<Result<Vec<_>>>()?;
    owned_trip(store, &trip_id, &user).await?;

    let (outcomes, result) = store
        .commit_with_recalc(&trip_id, vec![TripMutation::ReplaceStops(stops)])
        .await?;
    let stop_ids: Vec<String> = outcomes
        .iter()
        .flat_map(|o| match o {
            MutationOutcome::StopsReplaced(ids) => ids.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
            _ => Vec::new(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "message": "Stops saved",
        "stop_ids": stop_ids,
        "total_budget": result.total,
    })))
}

/*
    PATCH /api/trips/{id}/share
*/
pub async fn set_sharing<S, P>(
    path: web::Path<String>,
    body: web::Json<ShareRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let is_public = body.into_inner().is_public;
    owned_trip(store, &trip_id, &user).await?;

    if !store.set_trip_public(&trip_id, is_public).await? {
        return Err(Error::not_found("Trip"));
    }

    Ok(HttpResponse::Ok().json(json!({ "success": true, "is_public": is_public })))
}

/*
    GET /api/public/trips/{id}
*/
pub async fn get_public_trip<S, P>(path: web::Path<String>, data: web::Data<AppState<S, P>>) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    // Private and missing trips look the same from outside
    let trip = store
        .trip(&trip_id)
        .await?
        .filter(|t| t.is_public)
        .ok_or_else(|| Error::not_found("Trip"))?;

    let stops = store.trip_stops(&trip_id).await?;
    let mut activities = Vec::new();
    for entry in &stops {
        if let Some(stop_id) = entry.stop.id {
            activities.extend(store.stop_activities(&stop_id).await?);
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "trip": TripView::persisted(&trip_id, trip, stops.len()),
        "stops": stops,
        "activities": activities,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_aliases_and_default_order() {
        let parsed: ReplaceStopsRequest = serde_json::from_value(serde_json::json!({
            "stops": [
                { "city_id": "65a1f0c2e4b0a1b2c3d4e5f6", "arrivalDate": "2025-05-01", "departureDate": "" },
                { "location_id": "65a1f0c2e4b0a1b2c3d4e5f7", "order_index": 7 }
            ]
        }))
        .unwrap();
        let stops: Vec<NewStop> = parsed
            .stops
            .into_iter()
            .enumerate()
            .map(|(i, s)| normalize_stop(i, s).unwrap())
            .collect();

        assert_eq!(stops[0].arrival_date.as_deref(), Some("2025-05-01"));
        assert_eq!(stops[0].departure_date, None);
        assert_eq!(stops[0].order_index, 0);
        assert_eq!(stops[1].order_index, 7);
    }

    #[test]
    fn test_bad_location_id_is_rejected() {
        let input = StopInput {
            location_id: "porto".to_string(),
            arrival_date: None,
            departure_date: None,
            order_index: None,
        };
        assert!(matches!(normalize_stop(0, input), Err(Error::Validation(_))));
    }
}
