// src/handlers.rs
use crate::{AppState, errors::StylistError, models::*, services::conversation::initialize_session};
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, guard, middleware, web};
use log::info;

pub async fn analyze_fashion(
    payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StylistError> {
    let image = data.upload_gateway.read_image(payload).await?;
    let analysis = data.stylist.analyze_image(&image).await?;
    let chat_history = initialize_session(&analysis);

    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        success: true,
        original_image: image.data_url(),
        analysis,
        chat_history,
    }))
}

pub async fn chat(
    body: web::Json<ChatRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StylistError> {
    let ChatRequest {
        history,
        message,
        initial_analysis,
    } = body.into_inner();

    if history.is_empty() && message.is_none() {
        return Err(StylistError::Validation(
            "History array is required in request body".to_string(),
        ));
    }

    let (reply, history) = data
        .stylist
        .chat(history, message.as_deref(), initial_analysis.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(ChatResponse {
        success: true,
        reply,
        history,
    }))
}

pub async fn list_models(data: web::Data<AppState>) -> Result<HttpResponse, StylistError> {
    let models = data.stylist.list_models().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "models": models
    })))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "OK",
        "message": "Fashion GPT API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    info!("No route for {} {}", req.method(), req.path());
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": "Not found"
    }))
}

/// Every origin is allowed.
pub fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(10 * 1024 * 1024)
        .error_handler(|err, _req| {
            StylistError::Validation(format!("Invalid request body: {}", err)).into()
        })
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        // Preflight requests never reach a handler.
        .service(
            web::resource("/{tail:.*}")
                .guard(guard::Options())
                .to(preflight),
        )
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health_check))
                .route("/models", web::get().to(list_models))
                .route("/analyze-fashion", web::post().to(analyze_fashion))
                .route("/chat", web::post().to(chat)),
        );
}
