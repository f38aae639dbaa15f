use crate::error::ConfigError;
use std::{env, fmt::Display, str::FromStr, time::Duration};
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_QUIET_PERIOD_MS: u64 = 300;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
pub const RECONNECT_MIN: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_MAX_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api_base: Url,
    pub ws_url: Url,
    pub quiet_period: Duration,
    pub fetch_timeout: Duration,
    pub reconnect_max: Duration,
    pub read_retries: u32,
}

impl SyncConfig {
    pub fn new(api_base: Url, ws_url: Url) -> Self {
        Self {
            api_base,
            ws_url,
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            reconnect_max: Duration::from_secs(DEFAULT_RECONNECT_MAX_SECS),
            read_retries: 0,
        }
    }

    /// Flag, then environment, then default. Empty flags count as unset.
    pub fn resolve(api_flag: &str, ws_flag: &str) -> Result<Self, ConfigError> {
        Self::resolve_with(api_flag, ws_flag, |key| env::var(key).ok())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve("", "")
    }

    fn resolve_with(
        api_flag: &str,
        ws_flag: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_base = resolve_url(api_flag, "DDM_API", &lookup)?;
        let ws_url = resolve_url(ws_flag, "DDM_WS", &lookup)?;
        let mut config = Self::new(api_base, ws_url);
        config.quiet_period = Duration::from_millis(try_load(
            "DDM_QUIET_PERIOD_MS",
            DEFAULT_QUIET_PERIOD_MS,
            &lookup,
        )?);
        config.fetch_timeout = Duration::from_secs(try_load(
            "DDM_FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
            &lookup,
        )?);
        let reconnect_max: u64 =
            try_load("DDM_RECONNECT_MAX_SECS", DEFAULT_RECONNECT_MAX_SECS, &lookup)?;
        config.reconnect_max = Duration::from_secs(reconnect_max).max(RECONNECT_MIN);
        config.read_retries = try_load("DDM_READ_RETRIES", 0, &lookup)?;
        Ok(config)
    }

    /// Joins an API path (leading slash optional) onto the base URL without
    /// dropping the base's own path segments.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let base = self.api_base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|source| ConfigError::InvalidUrl {
            key: "DDM_API",
            source,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn resolve_url(
    flag: &str,
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Url, ConfigError> {
    let raw = if !flag.trim().is_empty() {
        flag.trim().to_string()
    } else {
        non_empty(lookup(key)).ok_or(ConfigError::Missing(key))?
    };
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })
}

fn try_load<T>(
    key: &'static str,
    default: T,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match non_empty(lookup(key)) {
        Some(value) => value.trim().parse().map_err(|err| {
            warn!("Invalid {key} value: {err}");
            ConfigError::InvalidValue { key, value }
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
