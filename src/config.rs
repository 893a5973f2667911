// Layered application configuration
// Defaults, then an optional config file, then PROCESS_TRACKER__* environment variables

//! Settings shared by the server and the admin CLI.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/process-tracker.{toml,yaml,json}` when present
//! 3. environment variables such as `PROCESS_TRACKER__SERVER__PORT=8080`
//!
//! A `.env` file is read into the environment before the sources are built.

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::engine::{BusinessCalendar, EngineConfig};
use crate::Result;

pub const ENV_PREFIX: &str = "PROCESS_TRACKER";
pub const DEFAULT_CONFIG_FILE: &str = "config/process-tracker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Without a URL the server runs on the in-memory backend
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// Offset used for business-day boundaries and date formatting
    pub utc_offset_minutes: i32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: -180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub admin_email: Option<String>,
    pub admin_name: String,
    /// Seed the default department chain into an empty store
    pub seed_departments: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            admin_email: None,
            admin_name: "Administrator".to_string(),
            seed_departments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub calendar: CalendarSettings,
    pub cache: CacheSettings,
    pub bootstrap: BootstrapSettings,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            calendar: CalendarSettings::default(),
            cache: CacheSettings::default(),
            bootstrap: BootstrapSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, the default config file and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_builder(Self::sources(DEFAULT_CONFIG_FILE))
    }

    /// File (optional) and environment sources, in precedence order
    pub fn sources(file: &str) -> ConfigBuilder<config::builder::DefaultState> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
    }

    pub fn from_builder(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn calendar(&self) -> BusinessCalendar {
        BusinessCalendar::with_offset_minutes(self.calendar.utc_offset_minutes)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            calendar: self.calendar(),
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            ..EngineConfig::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
