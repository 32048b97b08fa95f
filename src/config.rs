//! Service configuration from environment variables

use crate::client::{osm_api, osmose};
use crate::runtime::SessionSettings;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: cannot parse {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{name}: must be positive")]
    NotPositive { name: &'static str },
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub osmose_url: String,
    /// Preferred language for issue titles
    pub osmose_lang: String,
    pub osm_api_url: String,
    pub page_size: NonZeroUsize,
    pub search_radius_m: f64,
    /// Maximum number of issues per search
    pub result_limit: u32,
    pub idle_timeout: Duration,
    pub http_timeout: Duration,
    pub changeset_comment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset variables take their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("OSMATE_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.osmate/osmate.db")
        });

        let page_size: usize = parse(&lookup, "OSMATE_PAGE_SIZE", 10)?;
        let page_size = NonZeroUsize::new(page_size).ok_or(ConfigError::NotPositive {
            name: "OSMATE_PAGE_SIZE",
        })?;

        let search_radius_m: f64 = parse(&lookup, "OSMATE_SEARCH_RADIUS_M", 1000.0)?;
        if !(search_radius_m.is_finite() && search_radius_m > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "OSMATE_SEARCH_RADIUS_M",
            });
        }

        Ok(Self {
            db_path,
            port: parse(&lookup, "OSMATE_PORT", 8000)?,
            osmose_url: lookup("OSMOSE_URL").unwrap_or_else(|| osmose::DEFAULT_BASE_URL.to_string()),
            osmose_lang: lookup("OSMOSE_LANG").unwrap_or_else(|| "en".to_string()),
            osm_api_url: lookup("OSM_API_URL").unwrap_or_else(|| osm_api::DEFAULT_BASE_URL.to_string()),
            page_size,
            search_radius_m,
            result_limit: positive(&lookup, "OSMATE_RESULT_LIMIT", 500)?,
            idle_timeout: Duration::from_secs(positive(&lookup, "OSMATE_IDLE_TIMEOUT_SECS", 900)?),
            http_timeout: Duration::from_secs(positive(&lookup, "OSMATE_HTTP_TIMEOUT_SECS", 30)?),
            changeset_comment: lookup("OSMATE_CHANGESET_COMMENT")
                .unwrap_or_else(|| "Edited via osmate".to_string()),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            page_size: self.page_size,
            search_radius_m: self.search_radius_m,
            changeset_comment: self.changeset_comment.clone(),
            idle_timeout: self.idle_timeout,
        }
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn positive<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialOrd,
{
    let value = parse(lookup, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::NotPositive { name });
    }
    Ok(value)
}
