//! # Store Configuration
//!
//! Configuration for the transactional store and the engines it drives.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KOPERASI_DB_PATH=/var/lib/koperasi/koperasi.db                     │
//! │     KOPERASI_POINT_AMOUNT=10000                                        │
//! │     KOPERASI_POINT_EXPIRY_DAYS=365                                     │
//! │     KOPERASI_TAX_BPS=1100                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/koperasi-pos/koperasi.toml (Linux)                       │
//! │     ~/Library/Application Support/id.koperasi.pos/koperasi.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! name = "Koperasi Sejahtera"
//!
//! [database]
//! path = "koperasi.db"
//! max_connections = 5
//!
//! [pricing]
//! tax_bps = 1100      # PPN 11%, contained in shelf prices
//!
//! [points]
//! amount_per_point = 10000
//! expiry_days = 365   # omit to never expire
//!
//! [retry]
//! max_retries = 3
//! initial_backoff_ms = 50
//! max_backoff_ms = 1000
//! ```

use koperasi_core::points::PointRate;
use koperasi_core::validation::validate_bps;
use koperasi_core::{Money, TaxRate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use crate::retry::RetryPolicy;

// =============================================================================
// Sections
// =============================================================================

/// Store identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_name")]
    pub name: String,
}

fn default_store_name() -> String {
    "Koperasi".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            name: default_store_name(),
        }
    }
}

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Relative paths resolve against the data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("koperasi.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Pricing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingSettings {
    /// PPN rate in basis points. 0 disables the tax breakdown.
    #[serde(default)]
    pub tax_bps: u32,
}

/// Point accrual settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSettings {
    /// Rupiah spent per point.
    #[serde(default = "default_amount_per_point")]
    pub amount_per_point: i64,

    /// Days an earned lot stays valid.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: Option<u32>,
}

fn default_amount_per_point() -> i64 {
    10_000
}

fn default_expiry_days() -> Option<u32> {
    Some(365)
}

impl Default for PointSettings {
    fn default() -> Self {
        PointSettings {
            amount_per_point: default_amount_per_point(),
            expiry_days: default_expiry_days(),
        }
    }
}

/// Conflict retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    1_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Koperasi Config
// =============================================================================

/// Complete store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KoperasiConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub points: PointSettings,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl KoperasiConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (koperasi.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.points.amount_per_point <= 0 {
            return Err(DbError::Config(
                "points.amount_per_point must be greater than 0".into(),
            ));
        }

        validate_bps("pricing.tax_bps", self.pricing.tax_bps)
            .map_err(|e| DbError::Config(e.to_string()))?;

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(DbError::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("KOPERASI_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(amount) = std::env::var("KOPERASI_POINT_AMOUNT") {
            match amount.parse::<i64>() {
                Ok(a) => self.points.amount_per_point = a,
                Err(_) => warn!(value = %amount, "Ignoring invalid KOPERASI_POINT_AMOUNT"),
            }
        }

        if let Ok(days) = std::env::var("KOPERASI_POINT_EXPIRY_DAYS") {
            // 0 or "never" disables expiry
            match days.parse::<u32>() {
                Ok(0) => self.points.expiry_days = None,
                Ok(d) => self.points.expiry_days = Some(d),
                Err(_) if days.eq_ignore_ascii_case("never") => self.points.expiry_days = None,
                Err(_) => warn!(value = %days, "Ignoring invalid KOPERASI_POINT_EXPIRY_DAYS"),
            }
        }

        if let Ok(bps) = std::env::var("KOPERASI_TAX_BPS") {
            match bps.parse::<u32>() {
                Ok(b) => self.pricing.tax_bps = b,
                Err(_) => warn!(value = %bps, "Ignoring invalid KOPERASI_TAX_BPS"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("id", "koperasi", "koperasi-pos")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("koperasi.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Database file, resolved against the platform data directory when
    /// relative.
    pub fn database_path(&self) -> PathBuf {
        let path = &self.database.path;
        if path.is_absolute() {
            return path.clone();
        }
        match Self::project_dirs() {
            Some(dirs) => dirs.data_dir().join(path),
            None => path.clone(),
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    pub fn point_rate(&self) -> DbResult<PointRate> {
        PointRate::new(
            Money::from_rupiah(self.points.amount_per_point),
            self.points.expiry_days,
        )
        .map_err(|e| DbError::Config(e.to_string()))
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.pricing.tax_bps)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
