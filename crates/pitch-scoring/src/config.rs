use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

const DEFAULT_BIND_PORT: u16 = 8004;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_CLASSIFIER_WORKERS: usize = 2;
const DEFAULT_CLASSIFIER_TEMPERATURE: f32 = 0.05;
const DEFAULT_SCORE_CACHE_TTL_SECS: u64 = 300;

/// Application configuration loaded explicitly from environment variables.
///
/// Paths have no defaults; the deployment must provide them.
/// Redis URL is optional; if absent, the score cache is disabled.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory where uploaded pitch decks are stored.
    pub upload_dir: PathBuf,
    /// SQLite database shared with the profile service.
    pub database_path: PathBuf,
    /// Redis connection URL (e.g. "redis://127.0.0.1:6379"). `None` disables caching.
    pub redis_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    /// Concurrent inference calls allowed on the blocking pool.
    pub classifier_workers: usize,
    pub classifier_temperature: f32,
    pub score_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `UPLOAD_DIR`: directory for stored documents
    /// - `DATABASE_PATH`: SQLite database file
    ///
    /// Optional:
    /// - `REDIS_URL`, `BIND_ADDR`, `MAX_UPLOAD_BYTES`, `CLASSIFIER_WORKERS`,
    ///   `CLASSIFIER_TEMPERATURE`, `SCORE_CACHE_TTL_SECS`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let upload_dir = lookup("UPLOAD_DIR").map(PathBuf::from).ok_or_else(|| {
            AppError::Config("UPLOAD_DIR environment variable is required".to_string())
        })?;

        let database_path = lookup("DATABASE_PATH").map(PathBuf::from).ok_or_else(|| {
            AppError::Config("DATABASE_PATH environment variable is required".to_string())
        })?;

        let redis_url = lookup("REDIS_URL").filter(|s| !s.trim().is_empty());

        let bind_addr = parse_or(&lookup, "BIND_ADDR", || {
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_BIND_PORT))
        })?;
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", || DEFAULT_MAX_UPLOAD_BYTES)?;
        let classifier_workers =
            parse_or(&lookup, "CLASSIFIER_WORKERS", || DEFAULT_CLASSIFIER_WORKERS)?;
        if classifier_workers == 0 {
            return Err(AppError::Config(
                "CLASSIFIER_WORKERS must be at least 1".to_string(),
            ));
        }
        let classifier_temperature =
            parse_or(&lookup, "CLASSIFIER_TEMPERATURE", || DEFAULT_CLASSIFIER_TEMPERATURE)?;
        if !(classifier_temperature > 0.0) {
            return Err(AppError::Config(
                "CLASSIFIER_TEMPERATURE must be positive".to_string(),
            ));
        }
        let score_cache_ttl_secs =
            parse_or(&lookup, "SCORE_CACHE_TTL_SECS", || DEFAULT_SCORE_CACHE_TTL_SECS)?;

        Ok(Self {
            upload_dir,
            database_path,
            redis_url,
            bind_addr,
            max_upload_bytes,
            classifier_workers,
            classifier_temperature,
            score_cache_ttl_secs,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl FnOnce() -> T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("invalid {key} '{raw}': {e}"))),
        None => Ok(default()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let config = load(&[("UPLOAD_DIR", "/tmp/up"), ("DATABASE_PATH", "/tmp/db.sqlite")])
            .unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.redis_url, None);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.bind_addr.port(), 8004);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.classifier_workers, 2);
        assert_eq!(config.score_cache_ttl_secs, 300);
    }

    #[test]
    fn missing_upload_dir_is_rejected() {
        let err = load(&[("DATABASE_PATH", "/tmp/db.sqlite")]).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("UPLOAD_DIR")));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = load(&[
            ("UPLOAD_DIR", "/tmp/up"),
            ("DATABASE_PATH", "/tmp/db.sqlite"),
            ("CLASSIFIER_WORKERS", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("CLASSIFIER_WORKERS")));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = load(&[
            ("UPLOAD_DIR", "/tmp/up"),
            ("DATABASE_PATH", "/tmp/db.sqlite"),
            ("CLASSIFIER_WORKERS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn blank_redis_url_disables_cache() {
        let config = load(&[
            ("UPLOAD_DIR", "/tmp/up"),
            ("DATABASE_PATH", "/tmp/db.sqlite"),
            ("REDIS_URL", "  "),
        ])
        .unwrap();
        assert!(config.redis_url.is_none());
    }
}
