use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use tripwise_api::config::AppConfig;
use tripwise_api::db::mongo::{create_mongo_client, MongoStore};
use tripwise_api::routes::{self, health::HealthTarget, AppState};
use tripwise_api::services::budget_service::BudgetService;
use tripwise_api::services::currency_service::{CurrencyConverter, HttpRateProvider};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    info!("Application starting...");

    let config = AppConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    let client = create_mongo_client(&config.mongo_uri)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let store = Arc::new(MongoStore::new(client.clone(), &config.database));

    let provider = HttpRateProvider::new(&config.rate_api_url, config.rate_api_timeout)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let converter = CurrencyConverter::with_max_age(store.clone(), provider, config.rate_cache_max_age);

    let state = web::Data::new(AppState::new(BudgetService::new(
        store,
        converter,
        config.tuning.clone(),
    )));
    let health = web::Data::new(HealthTarget {
        client,
        database: config.database.clone(),
        rate_api_url: config.rate_api_url.clone(),
    });

    info!("Starting HTTP server on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .app_data(state.clone())
            .app_data(health.clone())
            .route("/health", web::get().to(routes::health::health_check))
            .configure(routes::configure::<MongoStore, HttpRateProvider>)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
