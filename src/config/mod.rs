//! Server configuration loaded from environment variables.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Hard upper bound on worker-pool concurrency.
const MAX_WORKERS_LIMIT: usize = 10;

/// Default HTTP listen port.
const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
///
/// All values come from the environment, with sensible defaults for local
/// development. Only the JWT secret is mandatory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for per-job scratch directories.
    pub scratch_root: PathBuf,
    /// Directory holding the outcome-store databases.
    pub data_dir: PathBuf,
    /// Document root of the direct-serve writer, exposed under `/files/`.
    pub serve_dir: PathBuf,
    /// Worker-pool concurrency, clamped to `[1, 10]`.
    pub max_workers: usize,
    /// Shared HS256 secret for upload tokens.
    pub jwt_secret: String,
    /// HTTP bind address.
    pub bind_address: String,
    /// HTTP port.
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `IMAGEMILL_JWT_SECRET` has no default and must be set.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("IMAGEMILL_JWT_SECRET")
            .map_err(|_| Error::config("IMAGEMILL_JWT_SECRET must be set"))?;

        Ok(Self {
            scratch_root: env_path("IMAGEMILL_SCRATCH_ROOT")
                .unwrap_or_else(std::env::temp_dir),
            data_dir: env_path("IMAGEMILL_DATA_DIR").unwrap_or_else(|| PathBuf::from("./data")),
            serve_dir: env_path("IMAGEMILL_SERVE_DIR").unwrap_or_else(|| PathBuf::from("./serve")),
            max_workers: max_workers_from_env(),
            jwt_secret,
            bind_address: std::env::var("IMAGEMILL_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("IMAGEMILL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
        })
    }

    /// Path of the success-store database file.
    pub fn success_db_path(&self) -> PathBuf {
        self.data_dir.join("success.db")
    }

    /// Path of the failure-store database file.
    pub fn failures_db_path(&self) -> PathBuf {
        self.data_dir.join("failures.db")
    }

    /// Path of the credentials-store database file.
    pub fn credentials_db_path(&self) -> PathBuf {
        self.data_dir.join("credentials.db")
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Resolve the worker count: `IMAGEMILL_MAX_WORKERS` if set, otherwise one
/// less than the available cores, always clamped to `[1, 10]`.
fn max_workers_from_env() -> usize {
    if let Ok(raw) = std::env::var("IMAGEMILL_MAX_WORKERS") {
        if let Ok(n) = raw.parse::<usize>() {
            return clamp_workers(n);
        }
    }
    clamp_workers(default_workers())
}

fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    cores.saturating_sub(1)
}

pub(crate) fn clamp_workers(n: usize) -> usize {
    n.clamp(1, MAX_WORKERS_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_workers_floor() {
        assert_eq!(clamp_workers(0), 1);
        assert_eq!(clamp_workers(1), 1);
    }

    #[test]
    fn test_clamp_workers_ceiling() {
        assert_eq!(clamp_workers(10), 10);
        assert_eq!(clamp_workers(64), 10);
    }

    #[test]
    fn test_clamp_workers_passthrough() {
        assert_eq!(clamp_workers(4), 4);
    }

    #[test]
    fn test_db_paths_under_data_dir() {
        let config = Config {
            scratch_root: PathBuf::from("/tmp"),
            data_dir: PathBuf::from("/var/lib/imagemill"),
            serve_dir: PathBuf::from("/srv/imagemill"),
            max_workers: 2,
            jwt_secret: "secret".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        };
        assert_eq!(
            config.success_db_path(),
            PathBuf::from("/var/lib/imagemill/success.db")
        );
        assert_eq!(
            config.failures_db_path(),
            PathBuf::from("/var/lib/imagemill/failures.db")
        );
        assert_eq!(
            config.credentials_db_path(),
            PathBuf::from("/var/lib/imagemill/credentials.db")
        );
    }
}
