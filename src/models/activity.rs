use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Catalog entry belonging to a location.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogActivity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub location_id: ObjectId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub estimated_cost: Option<f64>,
    pub currency: Option<String>,
    pub duration_hours: Option<f64>,
}

/// An activity attached to a trip stop, either catalog-linked or custom.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TripActivity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub trip_stop_id: ObjectId,
    pub activity_id: Option<ObjectId>,
    pub custom_name: Option<String>,
    pub custom_cost: Option<f64>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    pub actual_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl TripActivity {
    pub fn catalog(trip_stop_id: ObjectId, input: NewTripActivity) -> Self {
        Self {
            id: None,
            trip_stop_id,
            activity_id: Some(input.activity_id),
            custom_name: None,
            custom_cost: None,
            scheduled_date: input.scheduled_date,
            scheduled_time: input.scheduled_time,
            notes: input.notes,
            actual_cost: input.actual_cost,
            created_at: Some(DateTime::now()),
        }
    }

    pub fn custom(trip_stop_id: ObjectId, name: String, cost: f64) -> Self {
        Self {
            id: None,
            trip_stop_id,
            activity_id: None,
            custom_name: Some(name),
            custom_cost: Some(cost),
            scheduled_date: None,
            scheduled_time: None,
            notes: None,
            actual_cost: None,
            created_at: Some(DateTime::now()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTripActivity {
    pub activity_id: ObjectId,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    pub actual_cost: Option<f64>,
}

/// Replaces the scheduling fields, notes and actual cost of an instance.
#[derive(Debug, Clone, Default)]
pub struct TripActivityPatch {
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub notes: Option<String>,
    pub actual_cost: Option<f64>,
}

/// Cost line of a catalog-linked instance: actual cost if set, else the catalog estimate.
#[derive(Debug, Clone)]
pub struct CatalogActivityCost {
    pub trip_stop_id: ObjectId,
    pub cost: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CustomActivityCost {
    pub trip_stop_id: ObjectId,
    pub cost: Option<f64>,
}
