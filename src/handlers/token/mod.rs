pub mod dto;
pub mod token;

pub use dto::*;
pub use token::{get_token_history_handler, get_tokens_handler};
