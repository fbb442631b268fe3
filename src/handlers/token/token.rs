use actix_web::{web, HttpResponse};
use log::{error, info};
use std::sync::Arc;

use crate::{
    config::Config,
    errors::ApiError,
    handlers::token::dto::{HistoryQuery, TokenQuery},
    handlers::validation,
    services::MarketDataService,
};

/// GET /tokens?token=<id> - Returns the default tokens plus the requested one
///
/// # Returns
/// JSON object mapping token id to its snapshot
pub async fn get_tokens_handler(
    market: web::Data<MarketDataService>,
    config: web::Data<Arc<Config>>,
    query: web::Query<TokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let requested = validation::token_id(query.token.as_deref())?;
    info!("Handling GET /tokens request (token: {:?})", requested);

    match market.get_token_details(requested.as_deref()).await {
        Ok(tokens) => {
            info!("Successfully retrieved {} tokens", tokens.len());
            Ok(HttpResponse::Ok().json(tokens))
        }
        Err(e) => {
            error!("Error fetching token details: {}", e);
            Err(ApiError::internal(
                "Error fetching token details",
                &e,
                config.server.expose_error_details,
            ))
        }
    }
}

/// GET /tokens/{id}/history - Returns stored snapshots, newest first
///
/// # Arguments
/// * `path` - Path parameters containing the token id
/// * `query` - Optional `limit`
pub async fn get_token_history_handler(
    market: web::Data<MarketDataService>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();
    let token = validation::token_id(Some(raw.as_str()))?
        .ok_or_else(|| ApiError::BadRequest("Token id is required".to_string()))?;
    info!("Handling GET /tokens/{}/history request", token);

    let records = market.get_token_history(&token, query.limit).await;
    info!("Retrieved {} stored snapshots for {}", records.len(), token);
    Ok(HttpResponse::Ok().json(records))
}
