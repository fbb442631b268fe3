pub mod cache;
pub mod clock;
pub mod coingecko;
pub mod market;
pub mod persistence;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod upstream;

pub use cache::{CacheStore, MemoryCache, ResponseCache};
pub use clock::{Clock, SystemClock};
pub use market::{MarketDataService, MarketError};
pub use persistence::{PersistenceGate, SaveOutcome, SnapshotStore, WriteRateLimiter};
pub use upstream::{UpstreamClient, UpstreamError};
