use bson::oid::ObjectId;
use log::warn;

use crate::db::store::{RecalcSnapshot, TripStore};
use crate::error::Result;
use crate::models::budget::{round2, CategoryTotals, LiveTotal, RecalcResult, TotalSource};
use crate::models::trip::Trip;

/// Totals for a snapshot: the section sum when positive, else the category sum.
pub fn compute_totals(snapshot: &RecalcSnapshot) -> RecalcResult {
    let activities_total: f64 = snapshot.activity_costs.iter().sum();
    let transport_total: f64 = snapshot.stops.iter().filter_map(|s| s.transport_budget).sum();
    let accommodation_total: f64 = snapshot.stops.iter().filter_map(|s| s.accommodation_budget).sum();
    let meals_total: f64 = snapshot.stops.iter().filter_map(|s| s.meals_budget).sum();
    let sections_total: f64 = snapshot.section_budgets.iter().flatten().sum();

    let breakdown = CategoryTotals {
        transport_total: round2(transport_total),
        accommodation_total: round2(accommodation_total),
        meals_total: round2(meals_total),
        activities_total: round2(activities_total),
        sections_total: round2(sections_total),
    };

    let (total, source) = if sections_total > 0.0 {
        (sections_total, TotalSource::Sections)
    } else {
        (
            transport_total + accommodation_total + meals_total + activities_total,
            TotalSource::Categories,
        )
    };

    RecalcResult {
        total: round2(total),
        source,
        breakdown,
    }
}

/// Recomputes and persists the trip totals in one unit of work.
pub async fn recalc_trip_total<S: TripStore>(store: &S, trip_id: &ObjectId) -> Result<RecalcResult> {
    let (_, result) = store.commit_with_recalc(trip_id, Vec::new()).await?;
    Ok(result)
}

/// Read-path refresh: a failed recalculation yields the last persisted total.
pub async fn live_total<S: TripStore>(store: &S, trip: &Trip) -> LiveTotal {
    let Some(trip_id) = trip.id.as_ref() else {
        return LiveTotal::Stale {
            total: trip.total_budget,
            reason: "Trip has no id".to_string(),
        };
    };

    match recalc_trip_total(store, trip_id).await {
        Ok(result) => LiveTotal::Fresh(result),
        Err(e) => {
            warn!("Live total budget calc failed for trip {}: {}", trip_id, e);
            LiveTotal::Stale {
                total: trip.total_budget,
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::TripMutation;
    use crate::error::Error;
    use crate::models::{
        itinerary::NewSection,
        location::Location,
        trip::TripStop,
    };

    fn stop_with(transport: f64, accommodation: f64, meals: f64) -> TripStop {
        TripStop {
            id: None,
            trip_id: ObjectId::new(),
            location_id: ObjectId::new(),
            arrival_date: None,
            departure_date: None,
            order_index: 0,
            transport_budget: Some(transport),
            accommodation_budget: Some(accommodation),
            meals_budget: Some(meals),
        }
    }

    fn seeded_trip(store: &MemoryStore, total_budget: Option<f64>) -> (ObjectId, ObjectId) {
        let location_id = store.insert_location(Location {
            id: None,
            name: "Seville".to_string(),
            country: "Spain".to_string(),
            coordinates: None,
            cost_index: None,
        });
        let trip_id = store.insert_trip(crate::models::trip::Trip {
            id: None,
            user_id: ObjectId::new(),
            name: "Andalusia".to_string(),
            description: None,
            start_date: None,
            end_date: None,
            base_currency: Some("EUR".to_string()),
            origin_location_id: None,
            is_public: false,
            transport_total: None,
            accommodation_total: None,
            meals_total: None,
            activities_total: None,
            total_budget,
            created_at: None,
            updated_at: None,
        });
        let mut stop = stop_with(100.0, 120.0, 80.0);
        stop.trip_id = trip_id;
        stop.location_id = location_id;
        let stop_id = store.insert_stop(stop);
        (trip_id, stop_id)
    }

    #[test]
    fn test_categories_when_no_sections() {
        let snapshot = RecalcSnapshot {
            activity_costs: vec![25.0, 15.5],
            stops: vec![stop_with(50.0, 100.0, 40.0), stop_with(20.0, 0.0, 10.0)],
            section_budgets: vec![None, Some(0.0)],
        };

        let result = compute_totals(&snapshot);
        assert_eq!(result.source, TotalSource::Categories);
        assert_eq!(result.total, 260.5);
        assert_eq!(result.breakdown.activities_total, 40.5);
        assert_eq!(result.breakdown.transport_total, 70.0);
    }

    #[test]
    fn test_sections_take_precedence() {
        let snapshot = RecalcSnapshot {
            activity_costs: vec![100.0],
            stops: vec![stop_with(50.0, 100.0, 50.0)],
            section_budgets: vec![Some(200.0), Some(300.0), None],
        };

        let result = compute_totals(&snapshot);
        assert_eq!(result.source, TotalSource::Sections);
        assert_eq!(result.total, 500.0);
        assert_eq!(result.breakdown.sections_total, 500.0);
    }

    #[tokio::test]
    async fn test_recalc_is_idempotent_and_persisted() {
        let store = MemoryStore::new();
        let (trip_id, stop_id) = seeded_trip(&store, None);
        store
            .commit_with_recalc(
                &trip_id,
                vec![TripMutation::AddCustomActivity {
                    trip_stop_id: stop_id,
                    name: "Flamenco".to_string(),
                    cost: 45.0,
                }],
            )
            .await
            .unwrap();

        let first = recalc_trip_total(&store, &trip_id).await.unwrap();
        let second = recalc_trip_total(&store, &trip_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total, 345.0);

        let trip = store.trip(&trip_id).await.unwrap().unwrap();
        assert_eq!(trip.total_budget, Some(345.0));
        assert_eq!(trip.activities_total, Some(45.0));
        assert!(trip.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_section_override_persists_sections_total() {
        let store = MemoryStore::new();
        let (trip_id, _) = seeded_trip(&store, None);

        let section = |budget: f64, order: i32| NewSection {
            title: format!("Section {}", order + 1),
            description: None,
            start_date: None,
            end_date: None,
            budget: Some(budget),
            order_index: order,
        };
        let (_, result) = store
            .commit_with_recalc(
                &trip_id,
                vec![TripMutation::ReplaceSections(vec![section(200.0, 0), section(300.0, 1)])],
            )
            .await
            .unwrap();

        assert_eq!(result.total, 500.0);
        assert_eq!(result.source, TotalSource::Sections);
        assert_eq!(store.trip(&trip_id).await.unwrap().unwrap().total_budget, Some(500.0));
    }

    #[tokio::test]
    async fn test_live_total_falls_back_to_persisted_value() {
        let store = MemoryStore::new();
        let (trip_id, _) = seeded_trip(&store, Some(999.0));
        let trip = store.trip(&trip_id).await.unwrap().unwrap();

        store.set_unavailable(true);
        let live = live_total(&store, &trip).await;
        assert!(!live.is_fresh());
        assert_eq!(live.total(), Some(999.0));

        store.set_unavailable(false);
        let live = live_total(&store, &trip).await;
        assert!(live.is_fresh());
        assert_eq!(live.total(), Some(300.0));
    }

    #[tokio::test]
    async fn test_recalc_missing_trip() {
        let store = MemoryStore::new();
        let err = recalc_trip_total(&store, &ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
