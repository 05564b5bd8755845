use std::env;
use std::time::Duration;

use crate::engine::pool::DEFAULT_POOL_TARGET;
use crate::engine::sweeper::SweeperConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub pool_target: usize,
    pub sweep_interval_secs: u64,
    pub sweep_startup_delay_secs: u64,
    pub staleness_threshold_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = SweeperConfig::default();
        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 8000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            pool_target: parse_or_default("HORSE_POOL_TARGET", DEFAULT_POOL_TARGET)?,
            sweep_interval_secs: parse_or_default(
                "SWEEP_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?,
            sweep_startup_delay_secs: parse_or_default(
                "SWEEP_STARTUP_DELAY_SECS",
                defaults.startup_delay.as_secs(),
            )?,
            staleness_threshold_secs: parse_or_default(
                "STALENESS_THRESHOLD_SECS",
                defaults.staleness_threshold.as_secs(),
            )?,
        };

        if config.sweep_interval_secs == 0 {
            return Err(AppError::Internal(
                "invalid SWEEP_INTERVAL_SECS: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            startup_delay: Duration::from_secs(self.sweep_startup_delay_secs),
            interval: Duration::from_secs(self.sweep_interval_secs),
            staleness_threshold: Duration::from_secs(self.staleness_threshold_secs),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| AppError::Internal(format!("invalid {key}: {err}")))
}
