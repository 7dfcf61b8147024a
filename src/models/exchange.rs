use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Shared exchange-rate cache entry keyed by (base_currency, target_currency).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub base_currency: String,
    pub target_currency: String,
    pub rate: f64,
    pub updated_at: DateTime,
}

impl CachedRate {
    pub fn new(base_currency: &str, target_currency: &str, rate: f64) -> Self {
        Self {
            id: None,
            base_currency: base_currency.to_string(),
            target_currency: target_currency.to_string(),
            rate,
            updated_at: DateTime::now(),
        }
    }

    pub fn age_millis(&self, now: DateTime) -> i64 {
        now.timestamp_millis() - self.updated_at.timestamp_millis()
    }
}
