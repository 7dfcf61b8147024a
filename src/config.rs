use log::{info, warn};
use serde::Deserialize;
use std::{env, fs, time::Duration};

use crate::services::currency_service::{DEFAULT_MAX_AGE, DEFAULT_PROVIDER_TIMEOUT, DEFAULT_RATE_API_URL};

const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;
const DATABASE: &str = "Trips";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    pub database: String,
    pub jwt_secret: String,
    pub rate_api_url: String,
    pub rate_cache_max_age: Duration,
    pub rate_api_timeout: Duration,
    pub tuning: EstimatorTuning,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        if cfg!(debug_assertions) {
            dotenv::dotenv().ok();
        }

        let mongo_uri = env::var("MONGODB_URI").map_err(|_| "MONGODB_URI must be set".to_string())?;

        let tuning = match env::var("BUDGET_TUNING_FILE") {
            Ok(path) => EstimatorTuning::from_file(&path)?,
            Err(_) => EstimatorTuning::default(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| HOST.to_string()),
            port: parse_or("PORT", PORT),
            mongo_uri,
            database: env::var("MONGODB_DATABASE").unwrap_or_else(|_| DATABASE.to_string()),
            jwt_secret: jwt_secret(),
            rate_api_url: env::var("RATE_API_URL").unwrap_or_else(|_| DEFAULT_RATE_API_URL.to_string()),
            rate_cache_max_age: Duration::from_secs(parse_or(
                "RATE_CACHE_MAX_AGE_SECS",
                DEFAULT_MAX_AGE.as_secs(),
            )),
            rate_api_timeout: Duration::from_secs(parse_or(
                "RATE_API_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT.as_secs(),
            )),
            tuning,
        })
    }
}

pub fn jwt_secret() -> String {
    env::var("JWT_SECRET").unwrap_or_else(|_| "default_secret".to_string())
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// A `max(floor, baseline * factor)` fallback rule.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct FloorFactor {
    pub floor: f64,
    pub factor: f64,
}

impl FloorFactor {
    pub const fn new(floor: f64, factor: f64) -> Self {
        Self { floor, factor }
    }

    pub fn apply(&self, baseline: f64) -> f64 {
        self.floor.max(baseline * self.factor)
    }
}

/// Heuristic constants of the cost-index estimator. They have no documented
/// derivation and are kept tunable; the defaults are the historical values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorTuning {
    pub origin_leg: FloorFactor,
    pub stop_transport: FloorFactor,
    pub accommodation: FloorFactor,
    pub meals_budget: FloorFactor,
    pub meals_midrange: FloorFactor,
    pub meals_luxury: FloorFactor,
    pub default_baseline: f64,
    pub default_misc_percent: f64,
    pub default_currency: String,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        Self {
            origin_leg: FloorFactor::new(30.0, 0.4),
            stop_transport: FloorFactor::new(20.0, 0.2),
            accommodation: FloorFactor::new(25.0, 0.5),
            meals_budget: FloorFactor::new(10.0, 0.2),
            meals_midrange: FloorFactor::new(15.0, 0.35),
            meals_luxury: FloorFactor::new(25.0, 0.6),
            default_baseline: 100.0,
            default_misc_percent: 10.0,
            default_currency: "USD".to_string(),
        }
    }
}

impl EstimatorTuning {
    pub fn from_file(path: &str) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        let tuning = serde_json::from_str(&raw).map_err(|e| format!("Invalid tuning file {}: {}", path, e))?;
        info!("Loaded estimator tuning from {}", path);
        Ok(tuning)
    }
}
