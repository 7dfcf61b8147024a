use bson::oid::ObjectId;
use log::warn;

use crate::config::EstimatorTuning;
use crate::db::store::TripStore;
use crate::models::{budget::TravelStyle, location::CostIndexRecord};

/// Baseline daily costs of a location. Never an error: missing data degrades to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CostIndex {
    pub baseline: f64,
    /// Averages are taken as-is; the record's `currency` is informational only.
    pub averages: Option<CostIndexRecord>,
}

impl CostIndex {
    pub fn from_baseline(baseline: f64) -> Self {
        Self { baseline, averages: None }
    }

    pub fn transport_average(&self) -> Option<f64> {
        self.averages.as_ref().and_then(|r| positive(r.avg_transport_cost))
    }

    pub fn accommodation_average(&self) -> Option<f64> {
        self.averages.as_ref().and_then(|r| positive(r.avg_accommodation_per_night))
    }

    pub fn meal_average(&self, style: TravelStyle) -> Option<f64> {
        self.averages.as_ref().and_then(|r| {
            positive(match style {
                TravelStyle::Budget => r.avg_meal_cost_budget,
                TravelStyle::Midrange => r.avg_meal_cost_midrange,
                TravelStyle::Luxury => r.avg_meal_cost_luxury,
            })
        })
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

pub async fn cost_index<S: TripStore>(store: &S, location_id: &ObjectId, tuning: &EstimatorTuning) -> CostIndex {
    let cost = match store.location_cost(location_id).await {
        Ok(cost) => cost,
        Err(e) => {
            warn!("Cost index lookup for {} failed, using defaults: {}", location_id, e);
            return CostIndex::from_baseline(tuning.default_baseline);
        }
    };

    CostIndex {
        baseline: positive(cost.baseline).unwrap_or(tuning.default_baseline),
        averages: cost.record,
    }
}
