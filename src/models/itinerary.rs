use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ItinerarySection {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub trip_id: ObjectId,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Manual budget override; any non-zero sum supersedes computed totals.
    pub budget: Option<f64>,
    pub order_index: i32,
}

#[derive(Debug, Clone)]
pub struct NewSection {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<f64>,
    pub order_index: i32,
}

impl NewSection {
    pub fn into_section(self, trip_id: ObjectId) -> ItinerarySection {
        ItinerarySection {
            id: None,
            trip_id,
            title: self.title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            budget: self.budget,
            order_index: self.order_index,
        }
    }
}
