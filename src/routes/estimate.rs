use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::db::store::{RateCache, TripStore};
use crate::error::Result;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::routes::AppState;
use crate::services::currency_service::RateProvider;
use crate::services::distance_budget_service::{LoadedPlace, LoadedStop};

fn default_include_activities() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub origin: LoadedPlace,
    #[serde(default)]
    pub stops: Vec<LoadedStop>,
    #[serde(default = "default_include_activities")]
    pub include_activities: bool,
}

/*
    POST /api/trips/estimate
    Distance-based estimate of a trip the client already holds; nothing is read or stored.
*/
pub async fn estimate_loaded_trip<S, P>(
    body: web::Json<EstimateRequest>,
    data: web::Data<AppState<S, P>>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let request = body.into_inner();
    let estimate = data
        .budget
        .distance_rates()
        .estimate(&request.origin, &request.stops, request.include_activities);

    Ok(HttpResponse::Ok().json(estimate))
}
