use actix_web::{web, HttpResponse, Result};

use crate::routes::{ohlc::configure_ohlc_routes, token::configure_token_routes};

/// Health check endpoint
async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "ok"})))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .configure(configure_token_routes)
        .configure(configure_ohlc_routes);
}
