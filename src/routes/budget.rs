use actix_web::{http::header, web, HttpResponse};
use log::info;
use serde::Deserialize;

use crate::db::store::{RateCache, TripStore};
use crate::error::{Error, Result};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::budget::{EstimateOptions, TravelStyle};
use crate::routes::{owned_trip, parse_object_id, AppState};
use crate::services::budget_service::StrategyKind;
use crate::services::currency_service::RateProvider;
use crate::services::recalc_service::recalc_trip_total;

#[derive(Debug, Deserialize)]
pub struct BudgetQuery {
    pub style: Option<String>,
    pub misc: Option<f64>,
    pub currency: Option<String>,
    pub strategy: Option<String>,
}

impl BudgetQuery {
    fn into_options(self) -> Result<(StrategyKind, EstimateOptions)> {
        let travel_style = match self.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<TravelStyle>().map_err(Error::Validation)?,
            None => TravelStyle::default(),
        };
        let strategy = match self.strategy.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<StrategyKind>().map_err(Error::Validation)?,
            None => StrategyKind::default(),
        };
        if let Some(misc) = self.misc {
            if !misc.is_finite() || misc < 0.0 {
                return Err(Error::Validation(format!("Invalid miscellaneous percent: {}", misc)));
            }
        }

        Ok((
            strategy,
            EstimateOptions {
                travel_style,
                misc_percent: self.misc,
                target_currency: self.currency.filter(|c| !c.trim().is_empty()),
            },
        ))
    }
}

/*
    /api/trips/{id}/budget
*/
pub async fn get_budget<S, P>(
    path: web::Path<String>,
    query: web::Query<BudgetQuery>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let (strategy, options) = query.into_inner().into_options()?;
    owned_trip(data.budget.store(), &trip_id, &user).await?;

    let breakdown = data.budget.estimate(&trip_id, strategy, &options).await?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "private, max-age=60"))
        .json(breakdown))
}

/*
    /api/trips/{id}/budget/recalc
*/
pub async fn recalc<S, P>(
    path: web::Path<String>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    owned_trip(data.budget.store(), &trip_id, &user).await?;

    let result = recalc_trip_total(data.budget.store(), &trip_id).await?;
    info!("Recalculated trip {}: {} ({:?})", trip_id, result.total, result.source);

    Ok(HttpResponse::Ok().json(result))
}
