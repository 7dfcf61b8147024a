use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Location {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub country: String,
    /// (latitude, longitude)
    #[serde(default)]
    pub coordinates: Option<(f64, f64)>,
    /// Scalar proxy for the general price level of the location.
    #[serde(default)]
    pub cost_index: Option<f64>,
}

/// Structured per-category daily averages for a location.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CostIndexRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub location_id: Option<ObjectId>,
    pub avg_transport_cost: Option<f64>,
    pub avg_accommodation_per_night: Option<f64>,
    pub avg_meal_cost_budget: Option<f64>,
    pub avg_meal_cost_midrange: Option<f64>,
    pub avg_meal_cost_luxury: Option<f64>,
    pub currency: Option<String>,
}

/// Raw cost data the store holds for one location.
#[derive(Debug, Clone, Default)]
pub struct LocationCost {
    pub baseline: Option<f64>,
    pub record: Option<CostIndexRecord>,
}
