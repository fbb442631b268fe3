pub mod ohlc;
pub mod token;
pub mod validation;

pub use ohlc::*;
pub use token::*;
