use chrono_tz::Tz;
use std::path::PathBuf;

use crate::waitlist::WaitlistConfig;

/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./data | ledger file and logs |
/// | HTTP_PORT | 3000 | HTTP / WebSocket port |
/// | ENVIRONMENT | development | development / staging / production |
/// | LOG_LEVEL | info | default tracing level |
/// | LOG_JSON | false | JSON log lines |
/// | DEFAULT_TIMEZONE | Asia/Seoul | admission day for restaurants without a timezone |
/// | SERVICE_MINUTES_PER_PARTY | 15 | ETA minutes per party |
/// | SNAPSHOT_TTL_SECS | 86400 | member snapshot lifetime |
/// | RECONCILE_INTERVAL_SECS | 300 | index reconciliation period |
/// | BROADCAST_QUEUE_CAPACITY | 1024 | pending broadcast jobs |
/// | DIRECTORY_SEED_PATH | - | JSON seed for members and restaurants |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | graceful shutdown bound |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/srv/waitlist HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub http_port: u16,
    /// development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub default_timezone: Tz,
    pub service_minutes_per_party: u32,
    pub snapshot_ttl_secs: u64,
    pub reconcile_interval_secs: u64,
    pub broadcast_queue_capacity: usize,
    pub directory_seed_path: Option<String>,
    pub shutdown_timeout_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load from environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            default_timezone: env_or("DEFAULT_TIMEZONE", chrono_tz::Asia::Seoul),
            service_minutes_per_party: env_or("SERVICE_MINUTES_PER_PARTY", 15),
            snapshot_ttl_secs: env_or("SNAPSHOT_TTL_SECS", 86_400),
            reconcile_interval_secs: env_or("RECONCILE_INTERVAL_SECS", 300),
            broadcast_queue_capacity: env_or("BROADCAST_QUEUE_CAPACITY", 1024),
            directory_seed_path: std::env::var("DIRECTORY_SEED_PATH").ok(),
            shutdown_timeout_ms: env_or("SHUTDOWN_TIMEOUT_MS", 10_000),
        }
    }

    /// Defaults rooted at `work_dir`, ignoring the environment
    ///
    /// Used by tests
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            http_port: 0,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            default_timezone: chrono_tz::Asia::Seoul,
            service_minutes_per_party: 15,
            snapshot_ttl_secs: 86_400,
            reconcile_interval_secs: 300,
            broadcast_queue_capacity: 1024,
            directory_seed_path: None,
            shutdown_timeout_ms: 10_000,
        }
    }

    pub fn waitlist(&self) -> WaitlistConfig {
        WaitlistConfig {
            service_minutes_per_party: self.service_minutes_per_party,
            default_timezone: self.default_timezone,
        }
    }

    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.database_dir().join("waitlist.redb")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// Create `database/` and `logs/` under the work dir
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
