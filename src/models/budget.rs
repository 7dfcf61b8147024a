use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelStyle {
    Budget,
    #[default]
    Midrange,
    Luxury,
}

impl FromStr for TravelStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "budget" => Ok(TravelStyle::Budget),
            "midrange" => Ok(TravelStyle::Midrange),
            "luxury" => Ok(TravelStyle::Luxury),
            other => Err(format!("Unknown travel style: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EstimateOptions {
    pub travel_style: TravelStyle,
    /// Falls back to the tuned default (10%) when absent.
    pub misc_percent: Option<f64>,
    pub target_currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BudgetBreakdown {
    pub transport: f64,
    pub accommodation: f64,
    pub activities: f64,
    pub meals: f64,
    pub miscellaneous: f64,
    pub currency: String,
    pub total: f64,
}

impl BudgetBreakdown {
    pub fn zero(currency: &str) -> Self {
        Self {
            transport: 0.0,
            accommodation: 0.0,
            activities: 0.0,
            meals: 0.0,
            miscellaneous: 0.0,
            currency: currency.to_string(),
            total: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TotalSource {
    Sections,
    Categories,
}

/// Category sums persisted onto the trip by the recalculation trigger.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CategoryTotals {
    pub transport_total: f64,
    pub accommodation_total: f64,
    pub meals_total: f64,
    pub activities_total: f64,
    pub sections_total: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RecalcResult {
    pub total: f64,
    pub source: TotalSource,
    pub breakdown: CategoryTotals,
}

/// Outcome of a read-path recalculation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveTotal {
    Fresh(RecalcResult),
    /// Recalculation failed; carries the last persisted total.
    Stale { total: Option<f64>, reason: String },
}

impl LiveTotal {
    pub fn total(&self) -> Option<f64> {
        match self {
            LiveTotal::Fresh(result) => Some(result.total),
            LiveTotal::Stale { total, .. } => *total,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, LiveTotal::Fresh(_))
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
