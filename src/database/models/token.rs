use serde::{Deserialize, Serialize};

/// One priced token at one point in time, as served to the dashboard
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenSnapshot {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: String,
    pub price: f64,
    pub price_change_1h: f64,
    pub price_change_24h: f64,
    pub price_change_7d: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub last_updated: String,
}

/// Durable copy of a snapshot; one document per token id
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PersistedRecord {
    #[serde(flatten)]
    pub snapshot: TokenSnapshot,
    /// Write time in epoch milliseconds
    pub timestamp: i64,
}

impl PersistedRecord {
    pub fn new(snapshot: TokenSnapshot, timestamp: i64) -> Self {
        Self {
            snapshot,
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persisted_record_is_flat() {
        let record = PersistedRecord::new(
            TokenSnapshot {
                id: "bitcoin".to_string(),
                name: "Bitcoin".to_string(),
                symbol: "btc".to_string(),
                image: "http://example.com/btc.png".to_string(),
                price: 50000.0,
                price_change_1h: 0.1,
                price_change_24h: -1.2,
                price_change_7d: 3.4,
                volume_24h: 1.0e9,
                market_cap: 1.0e12,
                last_updated: "2025-03-24T12:00:00Z".to_string(),
            },
            1_700_000_000_000,
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], json!("bitcoin"));
        assert_eq!(value["price"], json!(50000.0));
        assert_eq!(value["timestamp"], json!(1_700_000_000_000i64));
        assert!(value.get("snapshot").is_none());
        assert_eq!(record.id(), "bitcoin");
    }
}
