pub mod token;

pub use token::{OfflineSnapshotStore, TokenSnapshotRepository};
