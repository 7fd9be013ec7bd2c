use cadence_core::models::EngineConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    /// IANA timezone that decides what "today" is
    pub timezone: String,
    /// Stop a series from generating when all its open occurrences are deleted
    pub deactivate_on_series_delete: bool,
    /// Retries after another writer changed the same series
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "cadence.db".to_string(),
            timezone: detect_system_timezone(),
            deactivate_on_series_delete: true,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Defaults, overridden by `config.toml`, overridden by `CADENCE_*`
    /// environment variables.
    pub fn new() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("CADENCE_"))
            .extract()
    }

    pub fn tz(&self) -> Result<Tz, String> {
        validate_timezone(&self.timezone)
    }

    /// The current instant in the configured timezone.
    pub fn local_now(&self) -> anyhow::Result<DateTime<Tz>> {
        let tz = self.tz().map_err(anyhow::Error::msg)?;
        Ok(Utc::now().with_timezone(&tz))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            deactivate_on_series_delete: self.deactivate_on_series_delete,
        }
    }
}

/// Validates that a timezone string is a valid IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<Tz, String> {
    Tz::from_str(timezone).map_err(|_| {
        format!(
            "Invalid timezone: '{}'. Use IANA timezone names like 'America/New_York'",
            timezone
        )
    })
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(local_tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&local_tz).is_ok() {
            return local_tz;
        }
    }

    "UTC".to_string()
}
