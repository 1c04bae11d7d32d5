// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::Config;
use crate::handlers::{configure_api, cors_headers, not_found};
use crate::services::{GeminiClient, GenerativeProvider, StylistService, UploadGateway};

#[derive(Clone)]
pub struct AppState {
    stylist: Arc<StylistService>,
    upload_gateway: Arc<UploadGateway>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Fashion GPT service...");

    let config = Config::from_env()?;
    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; analysis and chat requests will fail until it is configured");
    }

    // Initialize services
    let provider: Arc<dyn GenerativeProvider> = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let app_state = AppState {
        stylist: Arc::new(StylistService::new(provider)),
        upload_gateway: Arc::new(UploadGateway::new(config.max_upload_bytes)),
    };

    let (host, port) = config.bind_address();
    info!(
        "Starting HTTP server on {}:{} (model {}, upload limit {} bytes)",
        host, port, config.gemini.model, config.max_upload_bytes
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors_headers())
            .wrap(middleware::Logger::default())
            .configure(configure_api)
            .default_service(web::route().to(not_found))
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
