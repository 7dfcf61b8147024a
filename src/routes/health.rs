use actix_web::{web, HttpResponse, Responder};
use log::error;
use mongodb::{bson::doc, Client};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    services: HashMap<String, ServiceStatus>,
    environment: String,
    version: String,
}

#[derive(Serialize, Clone)]
struct ServiceStatus {
    status: String,
    details: Option<String>,
}

pub struct HealthTarget {
    pub client: Arc<Client>,
    pub database: String,
    pub rate_api_url: String,
}

pub async fn health_check(target: web::Data<HealthTarget>) -> impl Responder {
    let mut health = HealthStatus {
        status: "ok".to_string(),
        services: HashMap::new(),
        environment: env::var("RUST_ENV").unwrap_or("development".to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let mongo_result = check_mongodb(&target).await;
    health
        .services
        .insert("mongodb".to_string(), mongo_result.clone());

    let rates_result = check_rate_api(&target.rate_api_url);
    health
        .services
        .insert("exchange_rates".to_string(), rates_result.clone());

    if mongo_result.status != "ok" || rates_result.status != "ok" {
        health.status = "degraded".to_string();
    }

    HttpResponse::Ok().json(health)
}

async fn check_mongodb(target: &HealthTarget) -> ServiceStatus {
    match target
        .client
        .database(&target.database)
        .run_command(doc! {"ping": 1})
        .await
    {
        Ok(_) => ServiceStatus {
            status: "ok".to_string(),
            details: Some("Connected successfully to MongoDB".to_string()),
        },
        Err(e) => {
            error!("MongoDB health check failed: {}", e);

            ServiceStatus {
                status: "error".to_string(),
                details: Some(format!("Failed to connect: {}", e)),
            }
        }
    }
}

// Configuration only; the provider is not called from the health check
fn check_rate_api(url: &str) -> ServiceStatus {
    match url::Url::parse(url) {
        Ok(parsed) => ServiceStatus {
            status: "ok".to_string(),
            details: Some(format!(
                "Rate provider configured ({})",
                parsed.host_str().unwrap_or("unknown host")
            )),
        },
        Err(e) => ServiceStatus {
            status: "error".to_string(),
            details: Some(format!("Invalid RATE_API_URL: {}", e)),
        },
    }
}
