pub mod dto;
pub mod ohlc;

pub use dto::*;
pub use ohlc::get_ohlc_handler;
