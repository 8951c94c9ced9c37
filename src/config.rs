use crate::selection::{MAX_ELIMINATION_ROUNDS, MAX_SPIN_SEC, MIN_SPIN_SEC};
use crate::timer::{MAX_DURATION_SEC, MIN_DURATION_SEC};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Defaults applied to newly created auctions and to the background pacer
#[derive(Debug, Clone)]
pub struct AuctionDefaults {
    pub duration_sec: u32,
    pub spin_sec: u32,
    pub max_elimination_rounds: u32,
    pub tick_interval_ms: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store
    pub database: Option<DatabaseConfig>,
    pub auction: AuctionDefaults,
    pub log_level: String,
    pub ws_port: Option<u16>,
    pub environment: String,
    pub snapshot_path: Option<PathBuf>,
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables.
    ///
    /// Returns `Ok(None)` when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Option<Self>, String> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };

        let max_connections = parse_env::<u32>("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = parse_env::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        let idle_timeout_secs = parse_env::<u64>("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600); // 10 minutes
        let max_lifetime_secs = parse_env::<u64>("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800); // 30 minutes
        let test_before_acquire = parse_env::<bool>("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Some(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        }))
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/lotwheel".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl AuctionDefaults {
    /// Read auction defaults, validating them against the same ranges the core enforces
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let duration_sec = parse_env::<u32>("AUCTION_DEFAULT_DURATION_SEC").unwrap_or(defaults.duration_sec);
        let spin_sec = parse_env::<u32>("AUCTION_DEFAULT_SPIN_SEC").unwrap_or(defaults.spin_sec);
        let max_elimination_rounds =
            parse_env::<u32>("AUCTION_MAX_ELIMINATION_ROUNDS").unwrap_or(defaults.max_elimination_rounds);
        let tick_interval_ms = parse_env::<u64>("TIMER_TICK_INTERVAL_MS").unwrap_or(defaults.tick_interval_ms);

        if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&duration_sec) {
            return Err(format!(
                "AUCTION_DEFAULT_DURATION_SEC must be between {} and {}",
                MIN_DURATION_SEC, MAX_DURATION_SEC
            ));
        }

        if !(MIN_SPIN_SEC..=MAX_SPIN_SEC).contains(&spin_sec) {
            return Err(format!(
                "AUCTION_DEFAULT_SPIN_SEC must be between {} and {}",
                MIN_SPIN_SEC, MAX_SPIN_SEC
            ));
        }

        if max_elimination_rounds == 0 {
            return Err("AUCTION_MAX_ELIMINATION_ROUNDS must be greater than 0".to_string());
        }

        if tick_interval_ms == 0 {
            return Err("TIMER_TICK_INTERVAL_MS must be greater than 0".to_string());
        }

        Ok(Self {
            duration_sec,
            spin_sec,
            max_elimination_rounds,
            tick_interval_ms,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for AuctionDefaults {
    fn default() -> Self {
        Self {
            duration_sec: 60,
            spin_sec: 5,
            max_elimination_rounds: MAX_ELIMINATION_ROUNDS,
            tick_interval_ms: 250,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let auction = AuctionDefaults::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let ws_port = parse_env::<u16>("WS_PORT");
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let snapshot_path = env::var("SNAPSHOT_PATH").ok().map(PathBuf::from);

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            auction,
            log_level: log_level.to_lowercase(),
            ws_port,
            environment: environment.to_lowercase(),
            snapshot_path,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Whether the PostgreSQL store is configured
    pub fn uses_database(&self) -> bool {
        self.database.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            auction: AuctionDefaults::default(),
            log_level: "info".to_string(),
            ws_port: None,
            environment: "development".to_string(),
            snapshot_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(!config.uses_database());
    }

    #[test]
    fn test_auction_defaults_in_range() {
        let defaults = AuctionDefaults::default();
        assert!((MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&defaults.duration_sec));
        assert!((MIN_SPIN_SEC..=MAX_SPIN_SEC).contains(&defaults.spin_sec));
        assert_eq!(defaults.max_elimination_rounds, 10_000);
        assert_eq!(defaults.tick_interval(), Duration::from_millis(250));
    }
}
