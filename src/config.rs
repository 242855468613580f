use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_access_token: Option<String>,
    pub http_timeout_secs: u64,
    pub autosave_delay_ms: u64,
    pub tick_interval_ms: u64,
    pub submit_retry_base_ms: u64,
    pub submit_retry_max_ms: u64,
    pub submit_max_retries: u32,
    pub low_time_warning_secs: u32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY").ok(),
            supabase_access_token: env::var("SUPABASE_ACCESS_TOKEN").ok(),
            http_timeout_secs: get_env_parse_or("HTTP_TIMEOUT_SECS", 30)?,
            autosave_delay_ms: get_env_parse_or("AUTOSAVE_DELAY_MS", 5_000)?,
            tick_interval_ms: get_env_parse_or("TICK_INTERVAL_MS", 1_000)?,
            submit_retry_base_ms: get_env_parse_or("SUBMIT_RETRY_BASE_MS", 2_000)?,
            submit_retry_max_ms: get_env_parse_or("SUBMIT_RETRY_MAX_MS", 30_000)?,
            submit_max_retries: get_env_parse_or("SUBMIT_MAX_RETRIES", 5)?,
            low_time_warning_secs: get_env_parse_or("LOW_TIME_WARNING_SECS", 60)?,
        };

        if config.tick_interval_ms == 0 {
            return Err(Error::Config(
                "TICK_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            autosave_delay: Duration::from_millis(self.autosave_delay_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            submit_retry_base: Duration::from_millis(self.submit_retry_base_ms),
            submit_retry_max: Duration::from_millis(self.submit_retry_max_ms),
            submit_max_retries: self.submit_max_retries,
            low_time_warning_secs: self.low_time_warning_secs,
        }
    }
}

/// Timing knobs for one attempt session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub autosave_delay: Duration,
    pub tick_interval: Duration,
    pub submit_retry_base: Duration,
    pub submit_retry_max: Duration,
    pub submit_max_retries: u32,
    pub low_time_warning_secs: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autosave_delay: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
            submit_retry_base: Duration::from_secs(2),
            submit_retry_max: Duration::from_secs(30),
            submit_max_retries: 5,
            low_time_warning_secs: 60,
        }
    }
}

impl SessionSettings {
    /// Exponential backoff for the `retry`-th automatic resubmission, capped at `submit_retry_max`.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.submit_retry_base
            .checked_mul(factor)
            .unwrap_or(self.submit_retry_max)
            .min(self.submit_retry_max)
    }
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_until_capped() {
        let settings = SessionSettings::default();
        assert_eq!(settings.retry_delay(0), Duration::from_secs(2));
        assert_eq!(settings.retry_delay(1), Duration::from_secs(4));
        assert_eq!(settings.retry_delay(3), Duration::from_secs(16));
        assert_eq!(settings.retry_delay(4), Duration::from_secs(30));
        assert_eq!(settings.retry_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn parse_or_falls_back_to_default() {
        let value: u64 = get_env_parse_or("CLASSBRIDGE_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_or_rejects_garbage() {
        env::set_var("CLASSBRIDGE_TEST_BAD_NUMBER", "five");
        let err = get_env_parse_or::<u64>("CLASSBRIDGE_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("CLASSBRIDGE_TEST_BAD_NUMBER"));
        env::remove_var("CLASSBRIDGE_TEST_BAD_NUMBER");
    }
}
