use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::models::location::Location;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Trip {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub base_currency: Option<String>,
    pub origin_location_id: Option<ObjectId>,
    #[serde(default)]
    pub is_public: bool,
    // Aggregate budget fields, written only by the recalculation trigger
    #[serde(default)]
    pub transport_total: Option<f64>,
    #[serde(default)]
    pub accommodation_total: Option<f64>,
    #[serde(default)]
    pub meals_total: Option<f64>,
    #[serde(default)]
    pub activities_total: Option<f64>,
    #[serde(default)]
    pub total_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Trip {
    pub fn is_visible_to(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.user_id.to_hex() == user_id
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TripStop {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub trip_id: ObjectId,
    pub location_id: ObjectId,
    pub arrival_date: Option<String>,
    pub departure_date: Option<String>,
    pub order_index: i32,
    /// Precomputed per-stop budget fields, populated outside the estimator.
    #[serde(default)]
    pub transport_budget: Option<f64>,
    #[serde(default)]
    pub accommodation_budget: Option<f64>,
    #[serde(default)]
    pub meals_budget: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewStop {
    pub location_id: ObjectId,
    pub arrival_date: Option<String>,
    pub departure_date: Option<String>,
    pub order_index: i32,
}

impl NewStop {
    pub fn into_stop(self, trip_id: ObjectId) -> TripStop {
        TripStop {
            id: None,
            trip_id,
            location_id: self.location_id,
            arrival_date: self.arrival_date,
            departure_date: self.departure_date,
            order_index: self.order_index,
            transport_budget: None,
            accommodation_budget: None,
            meals_budget: None,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StopWithLocation {
    #[serde(flatten)]
    pub stop: TripStop,
    pub location: Location,
}

/// Public projection of a trip returned by the trip routes.
#[derive(Debug, Serialize)]
pub struct TripView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub base_currency: Option<String>,
    pub is_public: bool,
    pub stop_count: usize,
    pub total_budget: Option<f64>,
    /// False when `total_budget` is the last persisted value rather than a live recalculation.
    pub total_budget_fresh: bool,
}

impl TripView {
    pub fn persisted(trip_id: &ObjectId, trip: Trip, stop_count: usize) -> Self {
        Self {
            id: trip_id.to_hex(),
            name: trip.name,
            description: trip.description,
            start_date: trip.start_date,
            end_date: trip.end_date,
            base_currency: trip.base_currency,
            is_public: trip.is_public,
            stop_count,
            total_budget: trip.total_budget,
            total_budget_fresh: false,
        }
    }
}
