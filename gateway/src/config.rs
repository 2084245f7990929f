//! Gateway configuration.

use std::str::FromStr;
use std::time::Duration;

use coffer_ledger::LedgerConfig;

/// Which account store backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store; state is lost on exit.
    Memory,
    /// PostgreSQL via `DATABASE_URL`.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(format!("Unknown store backend: {}", other)),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL. Required for the postgres backend.
    pub url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
    /// How long a request waits for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Raw `LEDGER_STORE` value, parsed by [`GatewayConfig::store_backend`].
    pub store: String,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger engine configuration.
    pub ledger: LedgerConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 2609,
            store: "memory".to_string(),
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse leave the default in place.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("GATEWAY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("GATEWAY_LISTEN_PORT").and_then(|v| v.parse().ok()) {
            config.listen_port = port;
        }

        if let Some(store) = lookup("LEDGER_STORE") {
            config.store = store;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = Some(url);
        }

        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            config.database.max_connections = max;
        }

        if let Some(attempts) = lookup("RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            config.ledger.retry.max_attempts = attempts;
        }

        if let Some(ms) = lookup("RETRY_BASE_DELAY_MS").and_then(|v| v.parse().ok()) {
            config.ledger.retry.base_delay = Duration::from_millis(ms);
        }

        match lookup("RETRY_MAX_DELAY_MS").and_then(|v| v.parse().ok()) {
            Some(ms) => config.ledger.retry.max_delay = Duration::from_millis(ms),
            // Without an explicit cap, a larger base delay raises the default one.
            None => {
                let retry = &mut config.ledger.retry;
                retry.max_delay = retry.max_delay.max(retry.base_delay);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Parsed store backend.
    pub fn store_backend(&self) -> Result<StoreBackend, String> {
        self.store.parse()
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.store_backend()? == StoreBackend::Postgres {
            match self.database.url.as_deref() {
                Some(url) if !url.is_empty() => {}
                _ => return Err("DATABASE_URL is required for the postgres store".to_string()),
            }

            if self.database.max_connections == 0 {
                return Err("Database pool needs at least one connection".to_string());
            }
        }

        self.ledger.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> GatewayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:2609");
        assert_eq!(config.store_backend(), Ok(StoreBackend::Memory));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = GatewayConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = lookup(&[
            ("GATEWAY_LISTEN_PORT", "9000"),
            ("LEDGER_STORE", "Postgres"),
            ("DATABASE_URL", "postgres://localhost/coffer"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "20"),
        ]);

        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.store_backend(), Ok(StoreBackend::Postgres));
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.ledger.retry.max_attempts, 5);
        assert_eq!(config.ledger.retry.base_delay, Duration::from_millis(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_port_keeps_default() {
        let config = lookup(&[("GATEWAY_LISTEN_PORT", "eighty")]);
        assert_eq!(config.listen_port, 2609);
    }

    #[test]
    fn test_postgres_requires_url() {
        let config = lookup(&[("LEDGER_STORE", "postgres")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_store_rejected() {
        let config = lookup(&[("LEDGER_STORE", "redis")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_large_base_delay_raises_default_cap() {
        let config = lookup(&[("RETRY_BASE_DELAY_MS", "500")]);
        assert_eq!(config.ledger.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.ledger.retry.max_delay, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_max_delay() {
        let config = lookup(&[("RETRY_BASE_DELAY_MS", "500"), ("RETRY_MAX_DELAY_MS", "2000")]);
        assert_eq!(config.ledger.retry.max_delay, Duration::from_millis(2000));
        assert!(config.validate().is_ok());

        let config = lookup(&[("RETRY_BASE_DELAY_MS", "500"), ("RETRY_MAX_DELAY_MS", "100")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_validated() {
        let config = lookup(&[("RETRY_MAX_ATTEMPTS", "0")]);
        assert!(config.validate().is_err());
    }
}
