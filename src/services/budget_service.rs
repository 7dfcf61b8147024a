//! Budget Estimation Service
//!
//! Derives a trip cost breakdown (transport, accommodation, meals, activities,
//! miscellaneous) from the trip's stops and attached activities.
//!
//! ## Strategies
//! - `CostIndexStrategy`: per-location cost indexes with floor/factor fallbacks,
//!   multi-currency activity costs and a miscellaneous markup
//! - `DistanceBasedStrategy` (see `distance_budget_service`): great-circle
//!   transport costing with flat per-night and per-meal rates
//!
//! Both sit behind `EstimationStrategy`; their numeric assumptions differ and
//! they are kept as separate strategies.

use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use std::sync::Arc;

use crate::config::EstimatorTuning;
use crate::db::store::{RateCache, TripStore};
use crate::error::{Error, Result};
use crate::models::budget::{round2, BudgetBreakdown, EstimateOptions, TravelStyle};
use crate::services::cost_index_service::cost_index;
use crate::services::currency_service::{CurrencyConverter, RateProvider};
use crate::services::distance_budget_service::{DistanceBasedStrategy, DistanceRates};

const MILLIS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

pub trait EstimationStrategy {
    fn name(&self) -> &'static str;

    async fn estimate(&self, trip_id: &ObjectId, options: &EstimateOptions) -> Result<BudgetBreakdown>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    CostIndex,
    Distance,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cost_index" => Ok(StrategyKind::CostIndex),
            "distance" => Ok(StrategyKind::Distance),
            other => Err(format!("Unknown estimation strategy: {}", other)),
        }
    }
}

/// Number of nights of a stay: `max(1, ceil(days))`. Missing or unparsable
/// dates count as one night.
pub fn nights_between(arrival: Option<&str>, departure: Option<&str>) -> u32 {
    let (Some(start), Some(end)) = (arrival.and_then(parse_date), departure.and_then(parse_date)) else {
        return 1;
    };

    let days = (end - start).num_milliseconds() as f64 / MILLIS_PER_DAY;
    let nights = days.ceil();
    if nights.is_finite() && nights > 1.0 {
        nights as u32
    } else {
        1
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Entry point used by the routes: owns the store, converter and tuning.
pub struct BudgetService<S, P> {
    store: Arc<S>,
    converter: CurrencyConverter<S, P>,
    tuning: EstimatorTuning,
    distance_rates: DistanceRates,
}

impl<S: TripStore + RateCache, P: RateProvider> BudgetService<S, P> {
    pub fn new(store: Arc<S>, converter: CurrencyConverter<S, P>, tuning: EstimatorTuning) -> Self {
        Self {
            store,
            converter,
            tuning,
            distance_rates: DistanceRates::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn converter(&self) -> &CurrencyConverter<S, P> {
        &self.converter
    }

    pub fn distance_rates(&self) -> &DistanceRates {
        &self.distance_rates
    }

    pub fn cost_index_strategy(&self) -> CostIndexStrategy<'_, S, P> {
        CostIndexStrategy {
            store: &self.store,
            converter: &self.converter,
            tuning: &self.tuning,
        }
    }

    pub fn distance_strategy(&self) -> DistanceBasedStrategy<'_, S, P> {
        DistanceBasedStrategy::new(&self.store, &self.converter, &self.distance_rates, &self.tuning)
    }

    pub async fn estimate(
        &self,
        trip_id: &ObjectId,
        kind: StrategyKind,
        options: &EstimateOptions,
    ) -> Result<BudgetBreakdown> {
        match kind {
            StrategyKind::CostIndex => run(&self.cost_index_strategy(), trip_id, options).await,
            StrategyKind::Distance => run(&self.distance_strategy(), trip_id, options).await,
        }
    }
}

async fn run<E: EstimationStrategy>(
    strategy: &E,
    trip_id: &ObjectId,
    options: &EstimateOptions,
) -> Result<BudgetBreakdown> {
    info!("Estimating trip {} with the {} strategy", trip_id, strategy.name());
    strategy.estimate(trip_id, options).await
}

/// Trimmed, uppercased currency code; blank codes count as absent.
pub(crate) fn currency_code(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|c| !c.is_empty()).map(str::to_uppercase)
}

/// Cost-index based aggregator.
pub struct CostIndexStrategy<'a, S, P> {
    store: &'a S,
    converter: &'a CurrencyConverter<S, P>,
    tuning: &'a EstimatorTuning,
}

impl<'a, S: TripStore + RateCache, P: RateProvider> CostIndexStrategy<'a, S, P> {
    fn meal_rule(&self, style: TravelStyle) -> crate::config::FloorFactor {
        match style {
            TravelStyle::Budget => self.tuning.meals_budget,
            TravelStyle::Midrange => self.tuning.meals_midrange,
            TravelStyle::Luxury => self.tuning.meals_luxury,
        }
    }
}

impl<'a, S: TripStore + RateCache, P: RateProvider> EstimationStrategy for CostIndexStrategy<'a, S, P> {
    fn name(&self) -> &'static str {
        "cost_index"
    }

    async fn estimate(&self, trip_id: &ObjectId, options: &EstimateOptions) -> Result<BudgetBreakdown> {
        let trip = self
            .store
            .trip(trip_id)
            .await?
            .ok_or_else(|| Error::not_found("Trip"))?;

        let base_currency = currency_code(trip.base_currency.as_deref())
            .or_else(|| currency_code(options.target_currency.as_deref()))
            .unwrap_or_else(|| self.tuning.default_currency.to_uppercase());
        let target_currency =
            currency_code(options.target_currency.as_deref()).unwrap_or_else(|| base_currency.clone());

        let stops = self.store.trip_stops(trip_id).await?;

        let mut transport = 0.0;
        let mut accommodation = 0.0;
        let mut meals = 0.0;

        // Origin -> first stop leg
        if let (Some(origin_id), false) = (trip.origin_location_id.as_ref(), stops.is_empty()) {
            let origin = cost_index(self.store, origin_id, self.tuning).await;
            transport += self.tuning.origin_leg.apply(origin.baseline);
        }

        for entry in &stops {
            let index = cost_index(self.store, &entry.stop.location_id, self.tuning).await;

            // Structured averages are used as recorded, whatever the record's currency
            transport += index
                .transport_average()
                .unwrap_or_else(|| self.tuning.stop_transport.apply(index.baseline));

            let nights = nights_between(entry.stop.arrival_date.as_deref(), entry.stop.departure_date.as_deref());

            let hotel_night = index
                .accommodation_average()
                .unwrap_or_else(|| self.tuning.accommodation.apply(index.baseline));
            accommodation += hotel_night * nights as f64;

            let meal_daily = index
                .meal_average(options.travel_style)
                .unwrap_or_else(|| self.meal_rule(options.travel_style).apply(index.baseline));
            meals += meal_daily * nights.max(1) as f64;
        }

        let mut activities = 0.0;

        for row in self.store.catalog_activity_costs(trip_id).await? {
            let amount = row.cost.unwrap_or(0.0);
            let currency = currency_code(row.currency.as_deref()).unwrap_or_else(|| base_currency.clone());
            if currency != target_currency {
                activities += self.converter.convert(amount, &currency, &target_currency).await?;
            } else {
                activities += amount;
            }
        }

        // Custom activities are denominated in the trip's base currency
        for row in self.store.custom_activity_costs(trip_id).await? {
            let amount = row.cost.unwrap_or(0.0);
            if target_currency != base_currency {
                activities += self.converter.convert(amount, &base_currency, &target_currency).await?;
            } else {
                activities += amount;
            }
        }

        if target_currency != base_currency {
            transport = self.converter.convert(transport, &base_currency, &target_currency).await?;
            accommodation = self.converter.convert(accommodation, &base_currency, &target_currency).await?;
            meals = self.converter.convert(meals, &base_currency, &target_currency).await?;
        }

        let misc_percent = options.misc_percent.unwrap_or(self.tuning.default_misc_percent);
        let pre_misc = transport + accommodation + activities + meals;
        let miscellaneous = round2(pre_misc * misc_percent / 100.0);
        let total = round2(pre_misc + miscellaneous);

        debug!(
            "Estimated trip {} ({} stops, {}): total {}",
            trip_id,
            stops.len(),
            target_currency,
            total
        );

        Ok(BudgetBreakdown {
            transport: round2(transport),
            accommodation: round2(accommodation),
            activities: round2(activities),
            meals: round2(meals),
            miscellaneous,
            currency: target_currency,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::{
        activity::{CatalogActivity, TripActivity},
        location::{CostIndexRecord, Location},
        trip::{Trip, TripStop},
    };
    use crate::services::currency_service::testing::FixedRates;

    fn service(store: Arc<MemoryStore>, rates: FixedRates) -> BudgetService<MemoryStore, FixedRates> {
        let converter = CurrencyConverter::new(store.clone(), rates);
        BudgetService::new(store, converter, EstimatorTuning::default())
    }

    fn location(store: &MemoryStore, name: &str, cost_index: Option<f64>) -> ObjectId {
        store.insert_location(Location {
            id: None,
            name: name.to_string(),
            country: "Testland".to_string(),
            coordinates: None,
            cost_index,
        })
    }

    fn trip(store: &MemoryStore, currency: &str, origin: Option<ObjectId>) -> ObjectId {
        store.insert_trip(Trip {
            id: None,
            user_id: ObjectId::new(),
            name: "Test trip".to_string(),
            description: None,
            start_date: Some("2025-06-01".to_string()),
            end_date: Some("2025-06-10".to_string()),
            base_currency: Some(currency.to_string()),
            origin_location_id: origin,
            is_public: false,
            transport_total: None,
            accommodation_total: None,
            meals_total: None,
            activities_total: None,
            total_budget: None,
            created_at: None,
            updated_at: None,
        })
    }

    fn stop(store: &MemoryStore, trip_id: ObjectId, location_id: ObjectId, arrival: &str, departure: &str, order: i32) -> ObjectId {
        store.insert_stop(TripStop {
            id: None,
            trip_id,
            location_id,
            arrival_date: Some(arrival.to_string()),
            departure_date: Some(departure.to_string()),
            order_index: order,
            transport_budget: None,
            accommodation_budget: None,
            meals_budget: None,
        })
    }

    fn catalog_activity(store: &MemoryStore, location_id: ObjectId, cost: f64, currency: &str) -> ObjectId {
        store.insert_catalog_activity(CatalogActivity {
            id: None,
            location_id,
            name: "Museum".to_string(),
            description: None,
            category: Some("culture".to_string()),
            estimated_cost: Some(cost),
            currency: Some(currency.to_string()),
            duration_hours: Some(2.0),
        })
    }

    #[test]
    fn test_nights_between() {
        assert_eq!(nights_between(Some("2025-06-01"), Some("2025-06-03")), 2);
        assert_eq!(nights_between(Some("2025-06-01"), Some("2025-06-01")), 1);
        assert_eq!(nights_between(Some("2025-06-05"), Some("2025-06-01")), 1);
        assert_eq!(nights_between(Some("not a date"), Some("2025-06-01")), 1);
        assert_eq!(nights_between(None, Some("2025-06-01")), 1);
        assert_eq!(
            nights_between(Some("2025-06-01T10:00:00Z"), Some("2025-06-03T12:00:00Z")),
            3
        );
    }

    #[tokio::test]
    async fn test_missing_trip_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store, FixedRates::default());
        let err = service
            .estimate(&ObjectId::new(), StrategyKind::CostIndex, &EstimateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_trip_without_stops_is_zero() {
        let store = Arc::new(MemoryStore::new());
        let origin = location(&store, "Home", Some(100.0));
        let trip_id = trip(&store, "USD", Some(origin));
        let service = service(store, FixedRates::default());

        let breakdown = service
            .estimate(&trip_id, StrategyKind::CostIndex, &EstimateOptions::default())
            .await
            .unwrap();
        assert_eq!(breakdown, BudgetBreakdown::zero("USD"));
    }

    #[tokio::test]
    async fn test_fallback_example_breakdown() {
        let store = Arc::new(MemoryStore::new());
        let origin = location(&store, "Home", Some(100.0));
        let city = location(&store, "Porto", Some(100.0));
        let trip_id = trip(&store, "USD", Some(origin));
        stop(&store, trip_id, city, "2025-06-01", "2025-06-03", 0);
        let service = service(store, FixedRates::default());

        let breakdown = service
            .estimate(&trip_id, StrategyKind::CostIndex, &EstimateOptions::default())
            .await
            .unwrap();

        assert_eq!(breakdown.transport, 60.0);
        assert_eq!(breakdown.accommodation, 100.0);
        assert_eq!(breakdown.meals, 70.0);
        assert_eq!(breakdown.activities, 0.0);
        assert_eq!(breakdown.miscellaneous, 23.0);
        assert_eq!(breakdown.total, 253.0);
        assert_eq!(breakdown.currency, "USD");
        assert_eq!(service.converter().provider().call_count(), 0);
    }

    #[tokio::test]
    async fn test_structured_record_and_travel_style() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Zurich", Some(200.0));
        store.insert_cost_index(
            &city,
            CostIndexRecord {
                avg_transport_cost: Some(35.0),
                avg_accommodation_per_night: Some(180.0),
                avg_meal_cost_luxury: Some(150.0),
                ..Default::default()
            },
        );
        let trip_id = trip(&store, "USD", None);
        stop(&store, trip_id, city, "2025-06-01", "2025-06-04", 0);
        let service = service(store, FixedRates::default());

        let options = EstimateOptions {
            travel_style: TravelStyle::Luxury,
            misc_percent: Some(0.0),
            target_currency: None,
        };
        let breakdown = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();
        assert_eq!(breakdown.transport, 35.0);
        assert_eq!(breakdown.accommodation, 540.0);
        assert_eq!(breakdown.meals, 450.0);
        assert_eq!(breakdown.miscellaneous, 0.0);
        assert_eq!(breakdown.total, 1025.0);

        // Budget meals fall back to the style rule on the scalar baseline
        let options = EstimateOptions {
            travel_style: TravelStyle::Budget,
            misc_percent: Some(0.0),
            target_currency: None,
        };
        let breakdown = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();
        assert_eq!(breakdown.meals, 120.0);
    }

    #[tokio::test]
    async fn test_foreign_record_averages_are_used_as_recorded() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Lyon", Some(100.0));
        store.insert_cost_index(
            &city,
            CostIndexRecord {
                avg_transport_cost: Some(10.0),
                currency: Some("EUR".to_string()),
                ..Default::default()
            },
        );
        let trip_id = trip(&store, "USD", None);
        stop(&store, trip_id, city, "2025-06-01", "2025-06-02", 0);
        let service = service(store, FixedRates::default());

        let options = EstimateOptions {
            target_currency: Some("USD".to_string()),
            ..Default::default()
        };
        let breakdown = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();
        assert_eq!(breakdown.transport, 10.0);
        assert_eq!(breakdown.currency, "USD");
        assert_eq!(service.converter().provider().call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_activity_currency_means_base_currency() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Denver", Some(100.0));
        let trip_id = trip(&store, "USD", None);
        let stop_id = stop(&store, trip_id, city, "2025-06-01", "2025-06-02", 0);
        let activity_id = catalog_activity(&store, city, 50.0, " ");
        store.insert_trip_activity(TripActivity::catalog(
            stop_id,
            crate::models::activity::NewTripActivity {
                activity_id,
                scheduled_date: None,
                scheduled_time: None,
                notes: None,
                actual_cost: None,
            },
        ));
        let rates = FixedRates::default()
            .with("USD", "EUR", 0.5)
            .with("USD", "INR", 2.0)
            .with("INR", "EUR", 0.25);
        let service = service(store, rates);

        let options = EstimateOptions {
            target_currency: Some("EUR".to_string()),
            ..Default::default()
        };
        let breakdown = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();
        assert_eq!(breakdown.activities, 25.0);

        // 50 USD -> 100 INR, 20% markup, then 120 INR -> 30 EUR
        let breakdown = service.estimate(&trip_id, StrategyKind::Distance, &options).await.unwrap();
        assert_eq!(breakdown.activities, 30.0);
    }

    #[tokio::test]
    async fn test_foreign_catalog_activity_is_converted() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Paris", Some(100.0));
        let trip_id = trip(&store, "USD", None);
        let stop_id = stop(&store, trip_id, city, "2025-06-01", "2025-06-02", 0);
        let activity_id = catalog_activity(&store, city, 50.0, "EUR");
        store.insert_trip_activity(TripActivity::catalog(
            stop_id,
            crate::models::activity::NewTripActivity {
                activity_id,
                scheduled_date: None,
                scheduled_time: None,
                notes: None,
                actual_cost: None,
            },
        ));
        let service = service(store, FixedRates::default().with("EUR", "USD", 2.0));

        let breakdown = service
            .estimate(&trip_id, StrategyKind::CostIndex, &EstimateOptions::default())
            .await
            .unwrap();
        assert_eq!(breakdown.activities, 100.0);
    }

    #[tokio::test]
    async fn test_actual_cost_overrides_estimate_and_custom_activities_count() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Rome", Some(100.0));
        let trip_id = trip(&store, "EUR", None);
        let stop_id = stop(&store, trip_id, city, "2025-06-01", "2025-06-02", 0);
        let activity_id = catalog_activity(&store, city, 40.0, "EUR");
        store.insert_trip_activity(TripActivity::catalog(
            stop_id,
            crate::models::activity::NewTripActivity {
                activity_id,
                scheduled_date: None,
                scheduled_time: None,
                notes: None,
                actual_cost: Some(25.0),
            },
        ));
        store.insert_trip_activity(TripActivity::custom(stop_id, "Cooking class".to_string(), 60.0));
        let service = service(store, FixedRates::default());

        let breakdown = service
            .estimate(&trip_id, StrategyKind::CostIndex, &EstimateOptions::default())
            .await
            .unwrap();
        assert_eq!(breakdown.activities, 85.0);
        assert_eq!(service.converter().provider().call_count(), 0);
    }

    #[tokio::test]
    async fn test_target_currency_converts_buckets() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Porto", Some(100.0));
        let trip_id = trip(&store, "USD", None);
        let stop_id = stop(&store, trip_id, city, "2025-06-01", "2025-06-03", 0);
        store.insert_trip_activity(TripActivity::custom(stop_id, "Boat tour".to_string(), 30.0));
        let service = service(store, FixedRates::default().with("USD", "EUR", 0.5));

        let options = EstimateOptions {
            travel_style: TravelStyle::Midrange,
            misc_percent: Some(10.0),
            target_currency: Some("eur".to_string()),
        };
        let breakdown = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();

        assert_eq!(breakdown.currency, "EUR");
        assert_eq!(breakdown.transport, 10.0);
        assert_eq!(breakdown.accommodation, 50.0);
        assert_eq!(breakdown.meals, 35.0);
        assert_eq!(breakdown.activities, 15.0);
        assert_eq!(breakdown.miscellaneous, 11.0);
        assert_eq!(breakdown.total, 121.0);
        // One refresh, later conversions served from the shared cache
        assert_eq!(service.converter().provider().call_count(), 1);
    }

    #[tokio::test]
    async fn test_conversion_failure_fails_estimate() {
        let store = Arc::new(MemoryStore::new());
        let origin = location(&store, "Home", Some(100.0));
        let city = location(&store, "Oslo", Some(150.0));
        let trip_id = trip(&store, "USD", Some(origin));
        stop(&store, trip_id, city, "2025-06-01", "2025-06-03", 0);
        let service = service(store, FixedRates::default());

        let options = EstimateOptions {
            target_currency: Some("NOK".to_string()),
            ..Default::default()
        };
        let err = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRate { .. }));
    }

    #[tokio::test]
    async fn test_misc_percent_matches_rounded_share() {
        let store = Arc::new(MemoryStore::new());
        let city = location(&store, "Austin", Some(137.0));
        let trip_id = trip(&store, "USD", None);
        stop(&store, trip_id, city, "2025-06-01", "2025-06-05", 0);
        let service = service(store, FixedRates::default());

        for misc in [0.0, 7.5, 10.0, 33.0] {
            let options = EstimateOptions {
                misc_percent: Some(misc),
                ..Default::default()
            };
            let b = service.estimate(&trip_id, StrategyKind::CostIndex, &options).await.unwrap();
            let pre = b.transport + b.accommodation + b.meals + b.activities;
            assert!((b.miscellaneous - round2(0.01 * misc * pre)).abs() < 1e-9);
        }
    }
}
