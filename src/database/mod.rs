// MongoDB modules
pub mod models;
pub mod mongodb;
pub mod repositories;
pub mod service;

// Re-export commonly used types
pub use mongodb::MongoDbClient;
pub use service::MongoDbService;
