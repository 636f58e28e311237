// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into a typed
//! [`Config`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the database, blobs and audit log | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `CLOAK_OPERATOR_SECRET` | Secret the per-submission passphrases derive from | Required |
//! | `CLOAK_RECIPIENT_KEY_PATH` | PKCS#8 PEM file with the recipient P-521 key | Required |
//! | `CLOAK_RECIPIENT_ID` | Principal id owning the inbox (JWT `sub`) | Required |
//! | `CLOAK_JWT_SECRET` | HS256 secret for admin tokens | Required |
//! | `STORAGE_TIMEOUT_SECS` | Bound on a single storage operation | `30` |
//! | `INLINE_THRESHOLD_BYTES` | Text ciphertext below this is stored inline | `65536` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::storage::content::{DEFAULT_INLINE_THRESHOLD, DEFAULT_STORAGE_TIMEOUT};
use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Secret fed to PBKDF2 with each submission's salt.
///
/// Rotating it makes every existing submission key unrecoverable.
pub const OPERATOR_SECRET_ENV: &str = "CLOAK_OPERATOR_SECRET";
pub const RECIPIENT_KEY_PATH_ENV: &str = "CLOAK_RECIPIENT_KEY_PATH";
pub const RECIPIENT_ID_ENV: &str = "CLOAK_RECIPIENT_ID";
pub const JWT_SECRET_ENV: &str = "CLOAK_JWT_SECRET";
pub const STORAGE_TIMEOUT_ENV: &str = "STORAGE_TIMEOUT_SECS";
pub const INLINE_THRESHOLD_ENV: &str = "INLINE_THRESHOLD_BYTES";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read recipient key {path}: {source}")]
    RecipientKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Typed service configuration.
#[derive(Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub operator_secret: Zeroizing<String>,
    pub recipient_key_path: PathBuf,
    pub recipient_id: String,
    pub jwt_secret: Zeroizing<String>,
    pub storage_timeout: Duration,
    pub inline_threshold: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("bind_addr", &self.bind_addr)
            .field("log_format", &self.log_format)
            .field("recipient_key_path", &self.recipient_key_path)
            .field("recipient_id", &self.recipient_id)
            .field("storage_timeout", &self.storage_timeout)
            .field("inline_threshold", &self.inline_threshold)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => parse(PORT_ENV, &raw)?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::default(),
            Some(f) if f == "json" => LogFormat::Json,
            Some(f) if f == "pretty" => LogFormat::Pretty,
            Some(other) => return Err(invalid(LOG_FORMAT_ENV, format!("unknown format {other}"))),
        };

        let storage_timeout = match get(STORAGE_TIMEOUT_ENV) {
            Some(raw) => {
                let secs: u64 = parse(STORAGE_TIMEOUT_ENV, &raw)?;
                if secs == 0 {
                    return Err(invalid(STORAGE_TIMEOUT_ENV, "must be positive"));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_STORAGE_TIMEOUT,
        };
        let inline_threshold = match get(INLINE_THRESHOLD_ENV) {
            Some(raw) => parse(INLINE_THRESHOLD_ENV, &raw)?,
            None => DEFAULT_INLINE_THRESHOLD,
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            bind_addr,
            log_format,
            operator_secret: Zeroizing::new(required(OPERATOR_SECRET_ENV)?),
            recipient_key_path: PathBuf::from(required(RECIPIENT_KEY_PATH_ENV)?),
            recipient_id: required(RECIPIENT_ID_ENV)?,
            jwt_secret: Zeroizing::new(required(JWT_SECRET_ENV)?),
            storage_timeout,
            inline_threshold,
        })
    }

    /// Read the recipient key PEM from disk.
    pub fn read_recipient_key(&self) -> Result<Zeroizing<String>, ConfigError> {
        std::fs::read_to_string(&self.recipient_key_path)
            .map(Zeroizing::new)
            .map_err(|source| ConfigError::RecipientKey {
                path: self.recipient_key_path.clone(),
                source,
            })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| invalid(name, e))
}

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
