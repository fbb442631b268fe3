pub mod ohlc;
pub mod routes;
pub mod token;

pub use routes::*;
