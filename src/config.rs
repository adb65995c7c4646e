//! Environment-derived runtime configuration.

use std::{env, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

pub(crate) const ENV_CLIENT_IP: &str = "CLIENT_IP";
pub(crate) const ENV_API_KEY: &str = "IPSSL_API_KEY";
pub(crate) const ENV_VALIDATION_DIR: &str = "IPSSL_VALIDATION_DIR";
pub(crate) const ENV_SSL_DIR: &str = "IPSSL_SSL_DIR";
pub(crate) const ENV_CONTAINER_NAME: &str = "IPSSL_CONTAINER_NAME";
pub(crate) const ENV_RENEWAL_INTERVAL: &str = "RENEWAL_INTERVAL";
pub(crate) const ENV_CERT_VALIDITY: &str = "CERT_VALIDITY";

const DEFAULT_CLIENT_IP: &str = "127.0.0.1";
const DEFAULT_VALIDATION_DIR: &str = "/usr/share/caddy/";
const DEFAULT_SSL_DIR: &str = "/ipssl/";
const DEFAULT_CONTAINER_NAME: &str = "caddy-1";
const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CERT_VALIDITY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Immutable snapshot of operating parameters, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address certificates are requested for.
    pub client_ip: String,

    /// Authority API access key. Required; startup fails without it.
    pub api_key: String,

    /// Web root the validation artifacts are placed under.
    pub validation_dir: PathBuf,

    /// Directory holding `cert.pem` and `key.pem`.
    pub ssl_dir: PathBuf,

    /// Container to signal after a successful renewal. `None` disables the
    /// reload step entirely.
    pub container_name: Option<String>,

    /// How often the stored certificate is re-checked.
    pub renewal_interval: Duration,

    /// How long before actual expiry a certificate is treated as invalid.
    pub cert_validity_threshold: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Only a missing API key is fatal; every other key falls back to its
    /// default, with unparsable durations logged and defaulted.
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("{ENV_API_KEY} environment variable is required"))
            })?;

        // an explicitly empty container name disables the reload step; an
        // absent variable keeps the default target
        let container_name = match lookup(ENV_CONTAINER_NAME) {
            Some(name) if name.is_empty() => None,
            Some(name) => Some(name),
            None => Some(DEFAULT_CONTAINER_NAME.to_owned()),
        };

        Ok(Config {
            client_ip: string_or(&lookup, ENV_CLIENT_IP, DEFAULT_CLIENT_IP),
            api_key,
            validation_dir: PathBuf::from(string_or(
                &lookup,
                ENV_VALIDATION_DIR,
                DEFAULT_VALIDATION_DIR,
            )),
            ssl_dir: PathBuf::from(string_or(&lookup, ENV_SSL_DIR, DEFAULT_SSL_DIR)),
            container_name,
            renewal_interval: duration_or(&lookup, ENV_RENEWAL_INTERVAL, DEFAULT_RENEWAL_INTERVAL),
            cert_validity_threshold: duration_or(&lookup, ENV_CERT_VALIDITY, DEFAULT_CERT_VALIDITY),
        })
    }
}

fn string_or(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    match lookup(key) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_owned(),
    }
}

fn duration_or(lookup: impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let Some(value) = lookup(key) else {
        return default;
    };

    match parse_duration(&value) {
        Some(duration) => duration,
        None => {
            log::warn!("unparsable duration {value:?} for {key}, using default {default:?}");
            default
        }
    }
}

/// Parses `"3600"` (seconds) or a single `s`/`m`/`h`/`d` suffixed integer.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || !value.is_ascii() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let (number, unit) = value.split_at(value.len() - 1);
    let number = number.parse::<u64>().ok()?;

    let secs_per_unit = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    Some(Duration::from_secs(number * secs_per_unit))
}
