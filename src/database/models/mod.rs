pub mod ohlc;
pub mod token;

pub use ohlc::OhlcPoint;
pub use token::{PersistedRecord, TokenSnapshot};
