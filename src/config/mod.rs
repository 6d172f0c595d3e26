use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::limiter::RateLimitPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid number: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("RATE_LIMIT_PATH_PREFIXES must contain at least one prefix")]
    NoPathPrefixes,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_path_prefixes: Vec<String>,
    pub rate_limit_capacity: u64,
    pub rate_limit_refill_rate: u64,
    pub rate_limit_refill_interval_secs: u64,
    pub rate_limit_idle_eviction_secs: u64,
    pub rate_limit_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; unset variables take
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let rate_limit_path_prefixes: Vec<String> = var("RATE_LIMIT_PATH_PREFIXES")
            .unwrap_or_else(|| "/api/auth/".into())
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();
        if rate_limit_path_prefixes.is_empty() {
            return Err(ConfigError::NoPathPrefixes);
        }

        let refill_interval = positive(&var, "RATE_LIMIT_REFILL_INTERVAL_SECS", 60)?;

        Ok(Config {
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: number(&var, "SERVER_PORT", 3000)?,
            api_base_uri: var("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            rate_limit_path_prefixes,
            rate_limit_capacity: positive(&var, "RATE_LIMIT_CAPACITY", 10)?,
            rate_limit_refill_rate: positive(&var, "RATE_LIMIT_REFILL_RATE", 10)?,
            rate_limit_refill_interval_secs: refill_interval,
            rate_limit_idle_eviction_secs: positive(
                &var,
                "RATE_LIMIT_IDLE_EVICTION_SECS",
                refill_interval.saturating_mul(10),
            )?,
            rate_limit_sweep_interval_secs: positive(
                &var,
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                refill_interval,
            )?,
        })
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.rate_limit_capacity,
            self.rate_limit_refill_rate,
            Duration::from_secs(self.rate_limit_refill_interval_secs),
        )
    }

    pub fn rate_limit_idle_eviction(&self) -> Duration {
        Duration::from_secs(self.rate_limit_idle_eviction_secs)
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval_secs)
    }
}

fn number<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => match value.trim().parse() {
            Ok(n) => Ok(n),
            Err(_) => Err(ConfigError::InvalidNumber { name, value }),
        },
        None => Ok(default),
    }
}

fn positive<F>(var: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match number(var, name, default)? {
        0 => Err(ConfigError::NotPositive(name)),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_auth_policy() {
        let config = load(&[]).unwrap();

        assert_eq!(config.rate_limit_path_prefixes, vec!["/api/auth/"]);
        assert_eq!(config.rate_limit_policy(), RateLimitPolicy::default());
        assert_eq!(config.rate_limit_idle_eviction(), Duration::from_secs(600));
        assert_eq!(config.rate_limit_sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.api_base_uri, "/api");
    }

    #[test]
    fn idle_threshold_follows_refill_interval() {
        let config = load(&[("RATE_LIMIT_REFILL_INTERVAL_SECS", "5")]).unwrap();
        assert_eq!(config.rate_limit_idle_eviction_secs, 50);
        assert_eq!(config.rate_limit_sweep_interval_secs, 5);
    }

    #[test]
    fn parses_prefix_list() {
        let config = load(&[("RATE_LIMIT_PATH_PREFIXES", "/api/auth/, /api/reset/ ,")]).unwrap();
        assert_eq!(config.rate_limit_path_prefixes, vec!["/api/auth/", "/api/reset/"]);

        assert_eq!(
            load(&[("RATE_LIMIT_PATH_PREFIXES", " , ")]).unwrap_err(),
            ConfigError::NoPathPrefixes
        );
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert_eq!(
            load(&[("RATE_LIMIT_CAPACITY", "0")]).unwrap_err(),
            ConfigError::NotPositive("RATE_LIMIT_CAPACITY")
        );
        assert_eq!(
            load(&[("SERVER_PORT", "http")]).unwrap_err(),
            ConfigError::InvalidNumber {
                name: "SERVER_PORT",
                value: "http".into()
            }
        );
    }
}
