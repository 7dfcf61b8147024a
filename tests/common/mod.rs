use actix_web::{web, App};
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;

use tripwise_api::config::{self, EstimatorTuning};
use tripwise_api::db::memory::MemoryStore;
use tripwise_api::error::{Error, Result};
use tripwise_api::middleware::auth::Claims;
use tripwise_api::models::{
    activity::CatalogActivity,
    location::Location,
    trip::{Trip, TripStop},
};
use tripwise_api::routes::{self, AppState};
use tripwise_api::services::budget_service::BudgetService;
use tripwise_api::services::currency_service::{CurrencyConverter, RateProvider};

/// Rate provider answering from a fixed table.
#[derive(Default)]
pub struct StubRates {
    rates: HashMap<(String, String), f64>,
}

impl StubRates {
    pub fn with(mut self, base: &str, target: &str, rate: f64) -> Self {
        self.rates.insert((base.to_string(), target.to_string()), rate);
        self
    }
}

impl RateProvider for StubRates {
    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64> {
        self.rates
            .get(&(base.to_string(), target.to_string()))
            .copied()
            .ok_or_else(|| Error::UpstreamUnavailable(format!("no stub rate {}->{}", base, target)))
    }
}

/// In-memory app seeded with one trip: Home -> Porto (2 nights), USD.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: web::Data<AppState<MemoryStore, StubRates>>,
    pub owner_id: ObjectId,
    pub trip_id: ObjectId,
    pub stop_id: ObjectId,
    pub city_id: ObjectId,
    /// Catalog activity in Porto, 40 EUR.
    pub museum_id: ObjectId,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rates(StubRates::default().with("EUR", "USD", 1.1))
    }

    pub fn with_rates(rates: StubRates) -> Self {
        let store = Arc::new(MemoryStore::new());
        let owner_id = ObjectId::new();

        let origin_id = store.insert_location(Location {
            id: None,
            name: "Home".to_string(),
            country: "USA".to_string(),
            coordinates: Some((40.71, -74.0)),
            cost_index: Some(100.0),
        });
        let city_id = store.insert_location(Location {
            id: None,
            name: "Porto".to_string(),
            country: "Portugal".to_string(),
            coordinates: Some((41.15, -8.61)),
            cost_index: Some(100.0),
        });
        let trip_id = store.insert_trip(Trip {
            id: None,
            user_id: owner_id,
            name: "Douro weekend".to_string(),
            description: None,
            start_date: Some("2025-06-01".to_string()),
            end_date: Some("2025-06-03".to_string()),
            base_currency: Some("USD".to_string()),
            origin_location_id: Some(origin_id),
            is_public: false,
            transport_total: None,
            accommodation_total: None,
            meals_total: None,
            activities_total: None,
            total_budget: None,
            created_at: None,
            updated_at: None,
        });
        let stop_id = store.insert_stop(TripStop {
            id: None,
            trip_id,
            location_id: city_id,
            arrival_date: Some("2025-06-01".to_string()),
            departure_date: Some("2025-06-03".to_string()),
            order_index: 0,
            transport_budget: None,
            accommodation_budget: None,
            meals_budget: None,
        });
        let museum_id = store.insert_catalog_activity(CatalogActivity {
            id: None,
            location_id: city_id,
            name: "Serralves Museum".to_string(),
            description: None,
            category: Some("culture".to_string()),
            estimated_cost: Some(40.0),
            currency: Some("EUR".to_string()),
            duration_hours: Some(3.0),
        });

        let converter = CurrencyConverter::new(store.clone(), rates);
        let budget = BudgetService::new(store.clone(), converter, EstimatorTuning::default());

        Self {
            store,
            state: web::Data::new(AppState::new(budget)),
            owner_id,
            trip_id,
            stop_id,
            city_id,
            museum_id,
        }
    }

    pub fn create_app(
        &self,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.state.clone())
            .configure(routes::configure::<MemoryStore, StubRates>)
    }

    pub fn owner_token(&self) -> String {
        bearer(&self.owner_id.to_hex(), false)
    }
}

pub fn bearer(user_id: &str, is_admin: bool) -> String {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "traveller@example.com".to_string(),
        exp: now + 3600,
        iat: now,
        user_id: user_id.to_string(),
        is_admin,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config::jwt_secret().as_bytes()),
    )
    .expect("test token should encode");
    format!("Bearer {}", token)
}
