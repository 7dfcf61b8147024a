pub mod budget;
pub mod estimate;
pub mod health;
pub mod itinerary;
pub mod trip;
pub mod trip_activity;

use actix_web::web;
use mongodb::bson::oid::ObjectId;

use crate::db::store::{RateCache, TripStore};
use crate::error::{Error, Result};
use crate::middleware::{auth::AuthMiddleware, auth_context::AuthenticatedUser};
use crate::models::trip::{Trip, TripStop};
use crate::services::budget_service::BudgetService;
use crate::services::currency_service::RateProvider;

/// Shared handler state, generic over the store and the rate provider.
pub struct AppState<S, P> {
    pub budget: BudgetService<S, P>,
}

impl<S, P> AppState<S, P> {
    pub fn new(budget: BudgetService<S, P>) -> Self {
        Self { budget }
    }
}

/// Registers `/api/public` (no token) ahead of `/api`, where every route sits behind `AuthMiddleware`.
pub fn configure<S, P>(cfg: &mut web::ServiceConfig)
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    cfg.service(
        web::scope("/api/public").route("/trips/{id}", web::get().to(trip::get_public_trip::<S, P>)),
    )
    .service(
        web::scope("/api").wrap(AuthMiddleware).service(
            web::scope("/trips")
                .route("", web::get().to(trip::list_trips::<S, P>))
                .route("", web::post().to(trip::create_trip::<S, P>))
                .route("/estimate", web::post().to(estimate::estimate_loaded_trip::<S, P>))
                .service(
                    web::scope("/stops/{stop_id}")
                        .route("/activities", web::get().to(trip_activity::list::<S, P>))
                        .route("/activities", web::post().to(trip_activity::create::<S, P>))
                        .route("/activities", web::patch().to(trip_activity::update::<S, P>))
                        .route("/activities", web::delete().to(trip_activity::delete::<S, P>)),
                )
                .route("/{id}", web::get().to(trip::get_trip::<S, P>))
                .route("/{id}/stops", web::get().to(trip::get_stops::<S, P>))
                .route("/{id}/stops", web::put().to(trip::replace_stops::<S, P>))
                .route("/{id}/share", web::patch().to(trip::set_sharing::<S, P>))
                .route("/{id}/budget", web::get().to(budget::get_budget::<S, P>))
                .route("/{id}/budget/recalc", web::post().to(budget::recalc::<S, P>))
                .route("/{id}/activities", web::post().to(trip_activity::bulk_create::<S, P>))
                .route("/{id}/itinerary", web::get().to(itinerary::get_sections::<S, P>))
                .route("/{id}/itinerary", web::put().to(itinerary::replace_sections::<S, P>)),
        ),
    );
}

pub(crate) fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| Error::Validation(format!("Invalid {} id", what)))
}

/// Loads the trip and checks the caller owns it (or is an admin).
pub(crate) async fn owned_trip<S: TripStore>(
    store: &S,
    trip_id: &ObjectId,
    user: &AuthenticatedUser,
) -> Result<Trip> {
    let trip = store
        .trip(trip_id)
        .await?
        .ok_or_else(|| Error::not_found("Trip"))?;
    if !user.can_access(&trip) {
        return Err(Error::Forbidden);
    }
    Ok(trip)
}

/// Loads a stop and checks the caller owns its trip.
pub(crate) async fn owned_stop<S: TripStore>(
    store: &S,
    stop_id: &ObjectId,
    user: &AuthenticatedUser,
) -> Result<TripStop> {
    let stop = store
        .stop(stop_id)
        .await?
        .ok_or_else(|| Error::not_found("Stop"))?;
    owned_trip(store, &stop.trip_id, user).await?;
    Ok(stop)
}
