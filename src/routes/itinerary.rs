use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::db::store::{RateCache, TripMutation, TripStore};
use crate::error::{Error, Result};
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::itinerary::NewSection;
use crate::routes::{owned_trip, parse_object_id, AppState};
use crate::services::currency_service::RateProvider;

#[derive(Debug, Deserialize)]
pub struct SectionInput {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    pub budget: Option<f64>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceSectionsRequest {
    #[serde(default)]
    pub sections: Vec<SectionInput>,
}

fn normalize(index: usize, input: SectionInput) -> Result<NewSection> {
    if let Some(budget) = input.budget {
        if !budget.is_finite() || budget < 0.0 {
            return Err(Error::Validation(format!("Invalid section budget: {}", budget)));
        }
    }

    Ok(NewSection {
        title: input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Section {}", index + 1)),
        description: input.description.filter(|d| !d.is_empty()),
        start_date: input.start_date.filter(|d| !d.is_empty()),
        end_date: input.end_date.filter(|d| !d.is_empty()),
        budget: input.budget,
        order_index: input.order_index.unwrap_or(index as i32),
    })
}

/*
    GET /api/trips/{id}/itinerary
*/
pub async fn get_sections<S, P>(
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

    let sections = store.itinerary_sections(&trip_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "sections": sections })))
}

/*
    PUT /api/trips/{id}/itinerary
*/
pub async fn replace_sections<S, P>(
    path: web::Path<String>,
    body: web::Json<ReplaceSectionsRequest>,
    data: web::Data<AppState<S, P>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse>
where
    S: TripStore + RateCache + 'static,
    P: RateProvider + 'static,
{
    let store = data.budget.store();
    let trip_id = parse_object_id(&path.into_inner(), "trip")?;
    let sections = body
        .into_inner()
        .sections
        .into_iter()
        .enumerate()
        .map(|(index, input)| normalize(index, input))
        .collect::<Result<Vec<_>>>()?;
    owned_trip(store, &trip_id, &user).await?;

    let (_, result) = store
        .commit_with_recalc(&trip_id, vec![TripMutation::ReplaceSections(sections)])
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Itinerary saved",
        "total_budget": result.total,
        "source": result.source,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: Option<&str>, budget: Option<f64>) -> SectionInput {
        SectionInput {
            title: title.map(str::to_string),
            description: None,
            start_date: None,
            end_date: None,
            budget,
            order_index: None,
        }
    }

    #[test]
    fn test_untitled_sections_get_positional_titles() {
        let section = normalize(2, input(None, None)).unwrap();
        assert_eq!(section.title, "Section 3");
        assert_eq!(section.order_index, 2);

        let section = normalize(0, input(Some("  "), Some(50.0))).unwrap();
        assert_eq!(section.title, "Section 1");
        assert_eq!(section.budget, Some(50.0));
    }

    #[test]
    fn test_negative_budget_rejected() {
        assert!(matches!(normalize(0, input(Some("Day 1"), Some(-5.0))), Err(Error::Validation(_))));
    }

    #[test]
    fn test_camel_case_dates_accepted() {
        let parsed: ReplaceSectionsRequest = serde_json::from_value(serde_json::json!({
            "sections": [{ "title": "Coast", "startDate": "2024-06-01", "end_date": "2024-06-03" }]
        }))
        .unwrap();
        let section = normalize(0, parsed.sections.into_iter().next().unwrap()).unwrap();
        assert_eq!(section.start_date.as_deref(), Some("2024-06-01"));
        assert_eq!(section.end_date.as_deref(), Some("2024-06-03"));
    }
}
