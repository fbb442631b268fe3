use actix_web::web;

use crate::handlers::ohlc::get_ohlc_handler;

pub fn configure_ohlc_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ohlc", web::get().to(get_ohlc_handler));
}
