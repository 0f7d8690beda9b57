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

/// Settlement engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the auto-finalization sweep runs
    pub finalize_interval_secs: u64,
    /// Betting closes this many minutes before the event starts
    pub lock_buffer_minutes: i64,
    /// Max wagers settled per store transaction
    pub payout_batch_size: usize,
    /// Resolve immediately when a dispute vote upholds the proposal
    pub finalize_on_upheld_dispute: bool,
    pub oracle_url: Option<String>,
    pub oracle_timeout_secs: u64,
    pub audit_log_dir: PathBuf,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` selects the in-memory store
    pub database: Option<DatabaseConfig>,
    pub engine: EngineConfig,
    pub log_level: String,
    pub log_format: String,
    pub http_port: Option<u16>,
    pub environment: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        let idle_timeout_secs = env_parse("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600); // 10 minutes
        let max_lifetime_secs = env_parse("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800); // 30 minutes
        let test_before_acquire = env_parse("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
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
            url: "postgresql://localhost/tipster".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl EngineConfig {
    /// Create engine config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let finalize_interval_secs =
            env_parse("FINALIZE_INTERVAL_SECS").unwrap_or(defaults.finalize_interval_secs);
        let lock_buffer_minutes =
            env_parse("LOCK_BUFFER_MINUTES").unwrap_or(defaults.lock_buffer_minutes);
        let payout_batch_size = env_parse("PAYOUT_BATCH_SIZE").unwrap_or(defaults.payout_batch_size);
        let finalize_on_upheld_dispute = env_parse("FINALIZE_ON_UPHELD_DISPUTE")
            .unwrap_or(defaults.finalize_on_upheld_dispute);
        let oracle_url = env::var("ORACLE_URL").ok().filter(|s| !s.trim().is_empty());
        let oracle_timeout_secs =
            env_parse("ORACLE_TIMEOUT_SECS").unwrap_or(defaults.oracle_timeout_secs);
        let audit_log_dir = env::var("AUDIT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.audit_log_dir);

        let config = Self {
            finalize_interval_secs,
            lock_buffer_minutes,
            payout_batch_size,
            finalize_on_upheld_dispute,
            oracle_url,
            oracle_timeout_secs,
            audit_log_dir,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.finalize_interval_secs == 0 {
            return Err("FINALIZE_INTERVAL_SECS must be greater than 0".to_string());
        }
        if self.payout_batch_size == 0 {
            return Err("PAYOUT_BATCH_SIZE must be greater than 0".to_string());
        }
        if self.lock_buffer_minutes < 0 {
            return Err("LOCK_BUFFER_MINUTES must not be negative".to_string());
        }
        if self.oracle_timeout_secs == 0 {
            return Err("ORACLE_TIMEOUT_SECS must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn finalize_interval(&self) -> Duration {
        Duration::from_secs(self.finalize_interval_secs)
    }

    pub fn lock_buffer(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lock_buffer_minutes)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            finalize_interval_secs: 900,
            lock_buffer_minutes: 0,
            payout_batch_size: 400,
            finalize_on_upheld_dispute: false,
            oracle_url: None,
            oracle_timeout_secs: 20,
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = match env::var("DATABASE_URL") {
            Ok(_) => Some(DatabaseConfig::from_env()?),
            Err(_) => None,
        };

        let engine = EngineConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
        let http_port = env_parse("HTTP_PORT");
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["text", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        let config = Self {
            database,
            engine,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            http_port,
            environment: environment.to_lowercase(),
        };

        if config.is_production() && config.database.is_none() {
            return Err("DATABASE_URL is required in production".to_string());
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            engine: EngineConfig::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            http_port: None,
            environment: "development".to_string(),
        }
    }
}
