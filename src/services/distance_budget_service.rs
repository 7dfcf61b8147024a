//! Distance-based trip estimate.
//!
//! Costs transport from the great-circle distance between consecutive
//! locations (origin -> stops -> origin) and applies flat per-night,
//! per-meal and activity-markup rates. `estimate_from_loaded_trip` is a pure
//! function of its inputs; `DistanceBasedStrategy` loads a stored trip and
//! feeds it through the same computation.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EstimatorTuning;
use crate::db::store::{RateCache, TripStore};
use crate::error::{Error, Result};
use crate::models::budget::{round2, BudgetBreakdown, EstimateOptions};
use crate::services::budget_service::{currency_code, nights_between, EstimationStrategy};
use crate::services::currency_service::{CurrencyConverter, RateProvider};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Flat rates, denominated in `currency`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DistanceRates {
    pub transport_per_km: f64,
    pub accommodation_per_night: f64,
    pub meal_cost: f64,
    pub meals_per_day: f64,
    pub activity_multiplier: f64, // 1.2 is a 20% markup
    pub currency: String,
}

impl Default for DistanceRates {
    fn default() -> Self {
        Self {
            transport_per_km: 10.0,
            accommodation_per_night: 1000.0,
            meal_cost: 500.0,
            meals_per_day: 3.0,
            activity_multiplier: 1.2,
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadedPlace {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl LoadedPlace {
    fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadedActivity {
    #[serde(default)]
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedStop {
    pub city: LoadedPlace,
    pub arrival_date: Option<String>,
    pub departure_date: Option<String>,
    #[serde(default)]
    pub activities: Vec<LoadedActivity>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegBreakdown {
    pub from: String,
    pub to: String,
    pub distance: f64,
    pub transport_cost: f64,
    pub nights: u32,
    pub accommodation_cost: f64,
    pub meals_cost: f64,
    pub activities_cost: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripEstimate {
    pub transport: f64,
    pub accommodation: f64,
    pub meals: f64,
    pub activities: f64,
    pub total: f64,
    pub breakdown: Vec<LegBreakdown>,
}

/// Great-circle distance in km between two (lat, lng) points.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let lat1_rad = from.0.to_radians();
    let lat2_rad = to.0.to_radians();
    let delta_lat = (to.0 - from.0).to_radians();
    let delta_lon = (to.1 - from.1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

fn leg_distance(from: &LoadedPlace, to: &LoadedPlace) -> f64 {
    match (from.coordinates(), to.coordinates()) {
        (Some(a), Some(b)) => haversine_km(a, b),
        _ => 0.0,
    }
}

/// Estimate with the default rates.
pub fn estimate_from_loaded_trip(origin: &LoadedPlace, stops: &[LoadedStop], include_activities: bool) -> TripEstimate {
    DistanceRates::default().estimate(origin, stops, include_activities)
}

impl DistanceRates {
    pub fn estimate(&self, origin: &LoadedPlace, stops: &[LoadedStop], include_activities: bool) -> TripEstimate {
        let mut transport = 0.0;
        let mut accommodation = 0.0;
        let mut meals = 0.0;
        let mut activities = 0.0;
        let mut breakdown = Vec::with_capacity(stops.len() + 1);

        // Each inbound leg carries the stay at its destination
        let mut previous = origin;
        for stop in stops {
            let distance = leg_distance(previous, &stop.city);
            let transport_cost = distance * self.transport_per_km;
            let nights = nights_between(stop.arrival_date.as_deref(), stop.departure_date.as_deref());
            let accommodation_cost = nights as f64 * self.accommodation_per_night;
            let meals_cost = (nights + 1) as f64 * self.meal_cost * self.meals_per_day;
            let activities_cost = if include_activities {
                stop.activities
                    .iter()
                    .map(|a| a.estimated_cost.unwrap_or(0.0))
                    .sum::<f64>()
                    * self.activity_multiplier
            } else {
                0.0
            };

            transport += transport_cost;
            accommodation += accommodation_cost;
            meals += meals_cost;
            activities += activities_cost;

            breakdown.push(LegBreakdown {
                from: previous.name.clone(),
                to: stop.city.name.clone(),
                distance: (distance * 10.0).round() / 10.0,
                transport_cost: round2(transport_cost),
                nights,
                accommodation_cost: round2(accommodation_cost),
                meals_cost: round2(meals_cost),
                activities_cost: round2(activities_cost),
                subtotal: round2(transport_cost + accommodation_cost + meals_cost + activities_cost),
            });
            previous = &stop.city;
        }

        // Return leg
        if let Some(last) = stops.last() {
            let distance = leg_distance(&last.city, origin);
            let transport_cost = distance * self.transport_per_km;
            transport += transport_cost;

            breakdown.push(LegBreakdown {
                from: last.city.name.clone(),
                to: origin.name.clone(),
                distance: (distance * 10.0).round() / 10.0,
                transport_cost: round2(transport_cost),
                nights: 0,
                accommodation_cost: 0.0,
                meals_cost: 0.0,
                activities_cost: 0.0,
                subtotal: round2(transport_cost),
            });
        }

        TripEstimate {
            transport: round2(transport),
            accommodation: round2(accommodation),
            meals: round2(meals),
            activities: round2(activities),
            total: round2(transport + accommodation + meals + activities),
            breakdown,
        }
    }
}

/// Distance-based estimate of a stored trip, normalised into the target currency.
pub struct DistanceBasedStrategy<'a, S, P> {
    store: &'a S,
    converter: &'a CurrencyConverter<S, P>,
    rates: &'a DistanceRates,
    tuning: &'a EstimatorTuning,
}

impl<'a, S: TripStore + RateCache, P: RateProvider> DistanceBasedStrategy<'a, S, P> {
    pub fn new(
        store: &'a S,
        converter: &'a CurrencyConverter<S, P>,
        rates: &'a DistanceRates,
        tuning: &'a EstimatorTuning,
    ) -> Self {
        Self {
            store,
            converter,
            rates,
            tuning,
        }
    }

    async fn origin_place(&self, origin_id: Option<&ObjectId>) -> Result<LoadedPlace> {
        let location = match origin_id {
            Some(id) => self.store.location(id).await?,
            None => None,
        };

        Ok(match location {
            Some(location) => LoadedPlace {
                id: location.id.map(|id| id.to_hex()),
                name: location.name,
                lat: location.coordinates.map(|c| c.0),
                lng: location.coordinates.map(|c| c.1),
            },
            None => LoadedPlace {
                id: None,
                name: "Origin".to_string(),
                lat: None,
                lng: None,
            },
        })
    }
}

impl<'a, S: TripStore + RateCache, P: RateProvider> EstimationStrategy for DistanceBasedStrategy<'a, S, P> {
    fn name(&self) -> &'static str {
        "distance"
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
        let rate_currency = self.rates.currency.to_uppercase();

        // Activity costs per stop, in the rate currency
        let mut costs_by_stop: HashMap<ObjectId, Vec<LoadedActivity>> = HashMap::new();
        for row in self.store.catalog_activity_costs(trip_id).await? {
            let currency = currency_code(row.currency.as_deref()).unwrap_or_else(|| base_currency.clone());
            let cost = self
                .converter
                .convert(row.cost.unwrap_or(0.0), &currency, &rate_currency)
                .await?;
            costs_by_stop.entry(row.trip_stop_id).or_default().push(LoadedActivity {
                estimated_cost: Some(cost),
            });
        }
        for row in self.store.custom_activity_costs(trip_id).await? {
            let cost = self
                .converter
                .convert(row.cost.unwrap_or(0.0), &base_currency, &rate_currency)
                .await?;
            costs_by_stop.entry(row.trip_stop_id).or_default().push(LoadedActivity {
                estimated_cost: Some(cost),
            });
        }

        let stops: Vec<LoadedStop> = self
            .store
            .trip_stops(trip_id)
            .await?
            .into_iter()
            .map(|entry| LoadedStop {
                city: LoadedPlace {
                    id: entry.location.id.map(|id| id.to_hex()),
                    name: entry.location.name,
                    lat: entry.location.coordinates.map(|c| c.0),
                    lng: entry.location.coordinates.map(|c| c.1),
                },
                arrival_date: entry.stop.arrival_date,
                departure_date: entry.stop.departure_date,
                activities: entry
                    .stop
                    .id
                    .and_then(|id| costs_by_stop.remove(&id))
                    .unwrap_or_default(),
            })
            .collect();

        let origin = self.origin_place(trip.origin_location_id.as_ref()).await?;
        let estimate = self.rates.estimate(&origin, &stops, true);

        let transport = self.converter.convert(estimate.transport, &rate_currency, &target_currency).await?;
        let accommodation = self
            .converter
            .convert(estimate.accommodation, &rate_currency, &target_currency)
            .await?;
        let meals = self.converter.convert(estimate.meals, &rate_currency, &target_currency).await?;
        let activities = self.converter.convert(estimate.activities, &rate_currency, &target_currency).await?;

        Ok(BudgetBreakdown {
            transport,
            accommodation,
            activities,
            meals,
            miscellaneous: 0.0,
            currency: target_currency,
            total: round2(transport + accommodation + meals + activities),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str, lat: f64, lng: f64) -> LoadedPlace {
        LoadedPlace {
            id: None,
            name: name.to_string(),
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    fn stop(city: LoadedPlace, arrival: &str, departure: &str, costs: &[f64]) -> LoadedStop {
        LoadedStop {
            city,
            arrival_date: Some(arrival.to_string()),
            departure_date: Some(departure.to_string()),
            activities: costs
                .iter()
                .map(|c| LoadedActivity {
                    estimated_cost: Some(*c),
                })
                .collect(),
        }
    }

    #[test]
    fn test_one_degree_latitude_at_equator() {
        let distance = haversine_km((0.0, 0.0), (1.0, 0.0));
        assert!((distance - 111.0).abs() < 1.0, "distance was {}", distance);
    }

    #[test]
    fn test_single_stop_round_trip() {
        let origin = place("Home", 0.0, 0.0);
        let stops = vec![stop(place("Away", 1.0, 0.0), "2025-01-01", "2025-01-03", &[100.0, 50.0])];

        let estimate = estimate_from_loaded_trip(&origin, &stops, true);
        let leg_km = haversine_km((0.0, 0.0), (1.0, 0.0));

        assert_eq!(estimate.breakdown.len(), 2);
        let outbound = &estimate.breakdown[0];
        assert!((outbound.transport_cost - leg_km * 10.0).abs() < 0.01);
        assert_eq!(outbound.distance, 111.2);
        assert_eq!(outbound.nights, 2);
        assert_eq!(outbound.accommodation_cost, 2000.0);
        assert_eq!(outbound.meals_cost, 4500.0);
        assert_eq!(outbound.activities_cost, 180.0);

        let inbound = &estimate.breakdown[1];
        assert_eq!(inbound.from, "Away");
        assert_eq!(inbound.to, "Home");
        assert_eq!(inbound.nights, 0);

        assert!((estimate.transport - 2.0 * leg_km * 10.0).abs() < 0.01);
        assert_eq!(estimate.accommodation, 2000.0);
        assert_eq!(estimate.meals, 4500.0);
        assert_eq!(estimate.activities, 180.0);
    }

    #[test]
    fn test_activities_can_be_excluded() {
        let origin = place("Home", 10.0, 10.0);
        let stops = vec![
            stop(place("A", 10.0, 11.0), "2025-01-01", "2025-01-02", &[80.0]),
            stop(place("B", 11.0, 11.0), "2025-01-02", "2025-01-02", &[20.0]),
        ];

        let estimate = estimate_from_loaded_trip(&origin, &stops, false);
        assert_eq!(estimate.activities, 0.0);
        assert_eq!(estimate.breakdown.len(), 3);
        // Same-day stop still counts one night
        assert_eq!(estimate.breakdown[1].nights, 1);
        assert_eq!(estimate.accommodation, 2000.0);
    }

    #[test]
    fn test_no_stops_is_empty() {
        let estimate = estimate_from_loaded_trip(&place("Home", 0.0, 0.0), &[], true);
        assert_eq!(estimate.total, 0.0);
        assert!(estimate.breakdown.is_empty());
    }

    #[test]
    fn test_missing_coordinates_contribute_no_distance() {
        let origin = LoadedPlace {
            id: None,
            name: "Unknown".to_string(),
            lat: None,
            lng: None,
        };
        let stops = vec![stop(place("A", 1.0, 1.0), "2025-01-01", "2025-01-02", &[])];
        let estimate = estimate_from_loaded_trip(&origin, &stops, true);
        assert_eq!(estimate.transport, 0.0);
        assert_eq!(estimate.total, 1000.0 + 3000.0);
    }
}
