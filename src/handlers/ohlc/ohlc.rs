use actix_web::{web, HttpResponse};
use log::{error, info};
use std::sync::Arc;

use crate::{
    config::Config, errors::ApiError, handlers::ohlc::dto::OhlcQuery, handlers::validation,
    services::MarketDataService,
};

/// GET /ohlc?token=<id>&days=<n> - Returns the upstream OHLC array unchanged
pub async fn get_ohlc_handler(
    market: web::Data<MarketDataService>,
    config: web::Data<Arc<Config>>,
    query: web::Query<OhlcQuery>,
) -> Result<HttpResponse, ApiError> {
    let token = validation::token_id(query.token.as_deref())?;
    let days = validation::days(query.days.as_deref())?;
    info!(
        "Handling GET /ohlc request (token: {:?}, days: {:?})",
        token, days
    );

    match market
        .get_ohlc_data(token.as_deref(), days.as_deref())
        .await
    {
        Ok(points) => Ok(HttpResponse::Ok().json(points)),
        Err(e) => {
            error!("Error fetching OHLC data: {}", e);
            Err(ApiError::internal(
                "Error fetching OHLC data",
                &e,
                config.server.expose_error_details,
            ))
        }
    }
}
