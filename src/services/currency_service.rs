//! Currency Conversion Service
//!
//! Resolves pairwise exchange rates between ISO currency codes. Rates are served
//! from a shared cache while fresh and refreshed from an external rate-quote
//! provider otherwise.
//!
//! ## Features
//! - Same-currency short circuit (rate 1, no I/O)
//! - Freshness threshold on cached rates (1 hour by default)
//! - Upsert of refreshed rates, visible to every later conversion
//! - Bounded-timeout HTTP provider; failures propagate, no default rate is substituted

use bson::DateTime;
use log::{debug, error, info};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::db::store::RateCache;
use crate::error::{Error, Result};
use crate::models::{budget::round2, exchange::CachedRate};

pub const DEFAULT_RATE_API_URL: &str = "https://api.exchangerate.host/latest";
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// External source of a single exchange rate quote.
pub trait RateProvider {
    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct RateQuoteResponse {
    rates: Option<HashMap<String, serde_json::Value>>,
}

pub struct HttpRateProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRateProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
        })
    }
}

impl RateProvider for HttpRateProvider {
    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64> {
        let url = url::Url::parse_with_params(&self.base_url, &[("base", base), ("symbols", target)])
            .map_err(|e| Error::UpstreamUnavailable(format!("Invalid rate API url: {}", e)))?;

        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "Rate API returned status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_rate_body(&body, base, target)
    }
}

/// Extracts `rates[target]` from a quote body.
pub fn parse_rate_body(body: &str, base: &str, target: &str) -> Result<f64> {
    let quote: RateQuoteResponse = serde_json::from_str(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("Malformed rate response: {}", e)))?;

    let rate = quote
        .rates
        .as_ref()
        .and_then(|rates| rates.get(target))
        .and_then(|value| value.as_f64());

    match rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        _ => Err(Error::InvalidRate {
            base: base.to_string(),
            target: target.to_string(),
        }),
    }
}

pub struct CurrencyConverter<C, P> {
    cache: Arc<C>,
    provider: P,
    max_age: Duration,
}

impl<C: RateCache, P: RateProvider> CurrencyConverter<C, P> {
    pub fn new(cache: Arc<C>, provider: P) -> Self {
        Self::with_max_age(cache, provider, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(cache: Arc<C>, provider: P, max_age: Duration) -> Self {
        Self {
            cache,
            provider,
            max_age,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Rate to multiply a `base` amount by to obtain `target`.
    pub async fn rate(&self, base: &str, target: &str) -> Result<f64> {
        let base = base.trim().to_uppercase();
        let target = target.trim().to_uppercase();
        if base.is_empty() || target.is_empty() || base == target {
            return Ok(1.0);
        }

        if let Some(cached) = self.cache.cached_rate(&base, &target).await? {
            if cached.age_millis(DateTime::now()) < self.max_age.as_millis() as i64 {
                debug!("Using cached rate {}->{}: {}", base, target, cached.rate);
                return Ok(cached.rate);
            }
        }

        let rate = self.provider.fetch_rate(&base, &target).await?;
        info!("Refreshed exchange rate {}->{}: {}", base, target, rate);

        if let Err(e) = self.cache.store_rate(&CachedRate::new(&base, &target, rate)).await {
            error!("Failed to cache exchange rate {}->{}: {}", base, target, e);
        }

        Ok(rate)
    }

    /// Converts and rounds to 2 decimal places.
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        let rate = self.rate(from, to).await?;
        Ok(round2(amount * rate))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a fixed table and counting calls.
    #[derive(Default)]
    pub struct FixedRates {
        pub rates: HashMap<(String, String), f64>,
        pub calls: AtomicUsize,
    }

    impl FixedRates {
        pub fn with(mut self, base: &str, target: &str, rate: f64) -> Self {
            self.rates.insert((base.to_string(), target.to_string()), rate);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RateProvider for FixedRates {
        async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates
                .get(&(base.to_string(), target.to_string()))
                .copied()
                .ok_or_else(|| Error::InvalidRate {
                    base: base.to_string(),
                    target: target.to_string(),
                })
        }
    }
}
