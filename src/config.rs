use anyhow::{anyhow, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: MongoDbConfig,
    pub cors: CorsConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub persistence: PersistenceConfig,
    pub market: MarketConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Adds the underlying error text to 500 responses
    #[serde(default)]
    pub expose_error_details: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MongoDbConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub connection_timeout_ms: u64,
    pub max_pool_size: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub supports_credentials: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub default_retry_after_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistenceConfig {
    pub min_write_interval_ms: i64,
}

/// What a multi-token request does when one of its tokens fails
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    #[default]
    AllOrNothing,
    Partial,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MarketConfig {
    pub default_tokens: Vec<String>,
    pub default_ohlc_token: String,
    pub default_ohlc_days: String,
    #[serde(default)]
    pub batch_policy: BatchPolicy,
    pub history_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5001,
                log_level: "info".to_string(),
                expose_error_details: false,
            },
            database: MongoDbConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "token_data".to_string(),
                collection: "tokens".to_string(),
                connection_timeout_ms: 5000,
                max_pool_size: Some(10),
            },
            cors: CorsConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                allowed_methods: vec!["GET".to_string(), "POST".to_string()],
                allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
                supports_credentials: false,
            },
            upstream: UpstreamConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
                api_key: None,
                api_key_header: "x-cg-api-key".to_string(),
                timeout_secs: 20,
                max_attempts: 3,
                default_retry_after_secs: 6,
            },
            cache: CacheConfig {
                ttl_secs: 30,
                sweep_interval_secs: 60,
            },
            persistence: PersistenceConfig {
                min_write_interval_ms: 60_000,
            },
            market: MarketConfig {
                default_tokens: vec!["ethereum".to_string(), "aver-ai".to_string()],
                default_ohlc_token: "ethereum".to_string(),
                default_ohlc_days: "7".to_string(),
                batch_policy: BatchPolicy::AllOrNothing,
                history_limit: 100,
            },
        }
    }
}

impl MongoDbConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(anyhow!("MongoDB URI not configured"));
        }

        if self.database.is_empty() {
            return Err(anyhow!("MongoDB database name not configured"));
        }

        if self.collection.is_empty() {
            return Err(anyhow!("MongoDB collection name not configured"));
        }

        Ok(())
    }
}

impl UpstreamConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| anyhow!("Invalid upstream base URL {}: {}", self.base_url, e))?;

        if self.max_attempts == 0 {
            return Err(anyhow!("Upstream max_attempts must be at least 1"));
        }

        Ok(())
    }
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        info!("Loading config from file");
        match Self::load_from_file(path) {
            Ok(config) => {
                info!("Config loaded from file");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load config from file: {}", e);
                // Fall back to environment variables or defaults
                info!("Falling back to environment variables or defaults");
                Ok(Self::from_env())
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("SERVER_PORT").or_else(|_| std::env::var("PORT")) {
            if let Ok(port_num) = port.parse::<u16>() {
                config.server.port = port_num;
            }
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.server.log_level = log_level;
        }

        if let Ok(app_env) = std::env::var("APP_ENV") {
            config.server.expose_error_details = app_env.eq_ignore_ascii_case("development");
        }

        if let Ok(uri) = std::env::var("MONGODB_URI") {
            config.database.uri = uri;
        }

        if let Ok(db_name) =
            std::env::var("MONGODB_DATABASE").or_else(|_| std::env::var("DB_NAME"))
        {
            config.database.database = db_name;
        }

        if let Ok(origins) =
            std::env::var("CORS_ORIGINS").or_else(|_| std::env::var("FRONTEND_URL"))
        {
            config.cors.allowed_origins =
                origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Upstream price API
        if let Ok(base_url) = std::env::var("COINGECKO_API_URL") {
            config.upstream.base_url = base_url;
        }

        if let Ok(api_key) = std::env::var("COINGECKO_API_KEY") {
            if !api_key.is_empty() {
                config.upstream.api_key = Some(api_key);
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.upstream.validate()?;

        if self.market.default_tokens.is_empty() {
            return Err(anyhow!("At least one default token must be configured"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.database.database, "token_data");
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.persistence.min_write_interval_ms, 60_000);
        assert_eq!(config.upstream.max_attempts, 3);
        assert_eq!(config.upstream.default_retry_after_secs, 6);
        assert_eq!(config.market.default_tokens, vec!["ethereum", "aver-ai"]);
        assert_eq!(config.market.batch_policy, BatchPolicy::AllOrNothing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("SERVER_PORT", "9090");
        std::env::set_var("MONGODB_URI", "mongodb://test:27017");
        std::env::set_var("COINGECKO_API_URL", "https://pro-api.coingecko.com/api/v3");
        std::env::set_var("APP_ENV", "development");

        let config = Config::from_env();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.uri, "mongodb://test:27017");
        assert_eq!(
            config.upstream.base_url,
            "https://pro-api.coingecko.com/api/v3"
        );
        assert!(config.server.expose_error_details);

        // Clean up
        std::env::remove_var("SERVER_PORT");
        std::env::remove_var("MONGODB_URI");
        std::env::remove_var("COINGECKO_API_URL");
        std::env::remove_var("APP_ENV");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();
        assert!(toml_string.contains("127.0.0.1"));
        assert!(toml_string.contains("5001"));
        assert!(toml_string.contains("all_or_nothing"));

        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.market.default_ohlc_days, "7");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_from("config/does-not-exist.toml").unwrap();
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.market.default_ohlc_token, "ethereum");
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let mut config = Config::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
