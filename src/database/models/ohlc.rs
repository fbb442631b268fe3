use serde::{Deserialize, Serialize};

/// `[timestamp_ms, open, high, low, close]`, kept in the order the upstream returned it
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct OhlcPoint(pub i64, pub f64, pub f64, pub f64, pub f64);

impl OhlcPoint {
    pub fn timestamp_ms(&self) -> i64 {
        self.0
    }

    pub fn open(&self) -> f64 {
        self.1
    }

    pub fn high(&self) -> f64 {
        self.2
    }

    pub fn low(&self) -> f64 {
        self.3
    }

    pub fn close(&self) -> f64 {
        self.4
    }
}
