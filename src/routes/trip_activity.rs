use actix_web::{web, HttpResponse};
use log::info;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use crate::db::store::{MutationOutcome, RateCache, TripMutation, TripStore};
use crate::error::{Error, Result};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::activity::{NewTripActivity, TripActivityPatch};
use crate::routes::{owned_stop, owned_trip, parse_object_id, AppState};
use crate::services::currency_service::RateProvider;

#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    pub activity_id: String,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    pub actual_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateActivityRequest {
    pub id: String,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    pub actual_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteActivityQuery {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkActivityItem {
    pub trip_stop_id: Option<String>,
    pub activity_id: Option<String>,
    pub custom_name: Option<String>,
    pub custom_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkActivityRequest {
    #[serde(default)]
    pub items: Vec<BulkActivityItem>,
}

impl BulkActivityItem {
    /// `None` for items that name no stop, or neither a catalog entry nor a priced custom activity.
    fn into_mutation(self) -> Result<Option<TripMutation>> {
        let Some(stop) = self.trip_stop_id.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let trip_stop_id = parse_object_id(&stop, "stop")?;

        if let Some(activity_id) = self.activity_id.filter(|s| !s.trim().is_empty()) {
            return Ok(Some(TripMutation::AddActivity {
                trip_stop_id,
                activity: NewTripActivity {
                    activity_id: parse_object_id(&activity_id, "activity")?,
                    scheduled_date: None,
                    scheduled_time: None,
                    notes: None,
                    actual_cost: None,
                },
            }));
        }

        match (self.custom_name.filter(|n| !n.trim().is_empty()), self.custom_cost) {
            (Some(name), Some(cost)) if cost.is_finite() => Ok(Some(TripMutation::AddCustomActivity {
                trip_stop_id,
                name,
                cost,
            })),
            _ => Ok(None),
        }
    }
}

fn outcome_id(outcomes: &[MutationOutcome]) -> Option<String> {
    outcomes.iter().find_map(|o| match o {
        MutationOutcome::Created(id) | MutationOutcome::Updated(id) | MutationOutcome::Deleted(id) => {
            Some(id.to_hex())
        }
        MutationOutcome::SectionsReplaced(_) | MutationOutcome::StopsReplaced(_) => None,
    })
}

/*
    GET /api/trips/stops/{stop_id}/activities
*/
pub async fn list<S, P>(
    path: web::Path<String>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let stop_id = parse_object_id(&path.into_inner(), "stop")?;
    owned_stop(store, &stop_id, &user).await?;

    Ok(HttpResponse::Ok().json(store.stop_activities(&stop_id).await?))
}

/*
    POST /api/trips/stops/{stop_id}/activities
*/
pub async fn create<S, P>(
    path: web::Path<String>,
    body: web::Json<CreateActivityRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let stop_id = parse_object_id(&path.into_inner(), "stop")?;
    let body = body.into_inner();
    let activity_id = parse_object_id(&body.activity_id, "activity")?;
    let stop = owned_stop(store, &stop_id, &user).await?;

    let (outcomes, result) = store
        .commit_with_recalc(
            &stop.trip_id,
            vec![TripMutation::AddActivity {
                trip_stop_id: stop_id,
                activity: NewTripActivity {
                    activity_id,
                    scheduled_date: body.scheduled_date,
                    scheduled_time: body.scheduled_time,
                    notes: body.notes,
                    actual_cost: body.actual_cost,
                },
            }],
        )
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "id": outcome_id(&outcomes),
        "total_budget": result.total,
    })))
}

/*
    PATCH /api/trips/stops/{stop_id}/activities
*/
pub async fn update<S, P>(
    path: web::Path<String>,
    body: web::Json<UpdateActivityRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let stop_id = parse_object_id(&path.into_inner(), "stop")?;
    let body = body.into_inner();
    let id = parse_object_id(&body.id, "activity")?;
    let stop = owned_stop(store, &stop_id, &user).await?;

    let (_, result) = store
        .commit_with_recalc(
            &stop.trip_id,
            vec![TripMutation::UpdateActivity {
                id,
                trip_stop_id: stop_id,
                patch: TripActivityPatch {
                    scheduled_date: body.scheduled_date,
                    scheduled_time: body.scheduled_time,
                    notes: body.notes,
                    actual_cost: body.actual_cost,
                },
            }],
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "id": id.to_hex(),
        "total_budget": result.total,
    })))
}

/*
    DELETE /api/trips/stops/{stop_id}/activities?id=
*/
pub async fn delete<S, P>(
    path: web::Path<String>,
    query: web::Query<DeleteActivityQuery>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let stop_id = parse_object_id(&path.into_inner(), "stop")?;
    let id = parse_object_id(&query.id, "activity")?;
    let stop = owned_stop(store, &stop_id, &user).await?;

    let instance_on_stop = store
        .stop_activities(&stop_id)
        .await?
        .iter()
        .any(|a| a.id == Some(id));
    if !instance_on_stop {
        return Err(Error::not_found("Trip activity"));
    }

    let (_, result) = store
        .commit_with_recalc(&stop.trip_id, vec![TripMutation::DeleteActivity { id }])
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "deleted": id.to_hex(),
        "total_budget": result.total,
    })))
}

/*
    POST /api/trips/{id}/activities
*/
pub async fn bulk_create<S, P>(
    path: web::Path<String>,
    body: web::Json<BulkActivityRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let items = body.into_inner().items;
    if items.is_empty() {
        return Err(Error::Validation("items required".to_string()));
    }
    owned_trip(store, &trip_id, &user).await?;

    let mutations = items
        .into_iter()
        .filter_map(|item| item.into_mutation().transpose())
        .collect::<Result<Vec<_>>>()?;

    let (outcomes, result) = store.commit_with_recalc(&trip_id, mutations).await?;
    let ids: Vec<ObjectId> = outcomes
        .iter()
        .filter_map(|o| match o {
            MutationOutcome::Created(id) => Some(*id),
            _ => None,
        })
        .collect();
    info!("Attached {} activities to trip {}", ids.len(), trip_id);

    Ok(HttpResponse::Created().json(json!({
        "created": ids.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
        "total_budget": result.total,
    })))
}
