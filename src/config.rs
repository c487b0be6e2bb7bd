use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("{var} must be a valid {expected} (got {value:?})")]
pub struct ConfigError {
    var: &'static str,
    expected: &'static str,
    value: String,
}

/// Server configuration loaded from `INNKEEP_*` environment variables.
///
/// | Env Var                         | Default   |
/// |---------------------------------|-----------|
/// | `INNKEEP_BIND`                  | `0.0.0.0` |
/// | `INNKEEP_PORT`                  | `8080`    |
/// | `INNKEEP_DATA_DIR`              | `./data`  |
/// | `INNKEEP_METRICS_PORT`          | disabled  |
/// | `INNKEEP_REQUEST_TIMEOUT_SECS`  | `30`      |
/// | `INNKEEP_COMPACT_THRESHOLD`     | `1000`    |
/// | `INNKEEP_AUDIT_INTERVAL_SECS`   | `300`     |
/// | `INNKEEP_PENDING_GRACE_SECS`    | `86400`   |
/// | `INNKEEP_CORS_ORIGINS`          | `*`       |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub request_timeout_secs: u64,
    /// WAL appends since the last compaction that trigger a rewrite.
    pub compact_threshold: u64,
    /// Overlap auditor period. 0 disables the auditor.
    pub audit_interval_secs: u64,
    /// How long after check-in an unconfirmed booking is kept. 0 disables expiry.
    pub pending_grace_secs: u64,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            request_timeout_secs: 30,
            compact_threshold: 1000,
            audit_interval_secs: 300,
            pending_grace_secs: 86_400,
            cors_origins: vec!["*".into()],
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            var,
            expected,
            value,
        }),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let metrics_port = match lookup("INNKEEP_METRICS_PORT") {
            Some(value) if !value.trim().is_empty() => {
                Some(value.trim().parse().map_err(|_| ConfigError {
                    var: "INNKEEP_METRICS_PORT",
                    expected: "port",
                    value,
                })?)
            }
            _ => None,
        };
        let cors_origins = match lookup("INNKEEP_CORS_ORIGINS") {
            Some(value) => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            bind: lookup("INNKEEP_BIND").unwrap_or(defaults.bind),
            port: parse(&lookup, "INNKEEP_PORT", "port", defaults.port)?,
            data_dir: lookup("INNKEEP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port,
            request_timeout_secs: parse(
                &lookup,
                "INNKEEP_REQUEST_TIMEOUT_SECS",
                "number of seconds",
                defaults.request_timeout_secs,
            )?,
            compact_threshold: parse(
                &lookup,
                "INNKEEP_COMPACT_THRESHOLD",
                "count",
                defaults.compact_threshold,
            )?,
            audit_interval_secs: parse(
                &lookup,
                "INNKEEP_AUDIT_INTERVAL_SECS",
                "number of seconds",
                defaults.audit_interval_secs,
            )?,
            pending_grace_secs: parse(
                &lookup,
                "INNKEEP_PENDING_GRACE_SECS",
                "number of seconds",
                defaults.pending_grace_secs,
            )?,
            cors_origins,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("innkeep.wal")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
