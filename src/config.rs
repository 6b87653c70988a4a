use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            other => Err(AppError::Config(format!(
                "STORAGE_BACKEND must be 'local' or 's3', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket_name: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub storage_backend: StorageBackend,
    pub local_storage_root: PathBuf,
    pub s3: Option<S3Settings>,
    pub stale_session_hours: i64,
    pub cleanup_interval_secs: u64,
    pub cleanup_retry_delay_ms: u64,
    pub max_chunk_bytes: usize,
    pub max_upload_bytes: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| AppError::Config(format!("{} must be set", name)))
        };

        let database_url = required("DATABASE_URL")?;
        let storage_backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Local)?;

        let s3 = match storage_backend {
            StorageBackend::S3 => Some(S3Settings {
                bucket_name: required("S3_BUCKET_NAME")?,
                endpoint: lookup("S3_ENDPOINT"),
                region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: required("AWS_ACCESS_KEY_ID")?,
                secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            }),
            StorageBackend::Local => None,
        };

        let stale_session_hours = parse_or(&lookup, "STALE_SESSION_HOURS", 24i64)?;
        if stale_session_hours <= 0 || chrono::Duration::try_hours(stale_session_hours).is_none() {
            return Err(AppError::Config(format!(
                "STALE_SESSION_HOURS must be a positive number of hours, got {}",
                stale_session_hours
            )));
        }

        let cleanup_interval_secs = parse_or(&lookup, "CLEANUP_INTERVAL_SECS", 3600u64)?;
        if cleanup_interval_secs == 0 {
            return Err(AppError::Config(
                "CLEANUP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            storage_backend,
            local_storage_root: lookup("LOCAL_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./media")),
            s3,
            stale_session_hours,
            cleanup_interval_secs,
            cleanup_retry_delay_ms: parse_or(&lookup, "CLEANUP_RETRY_DELAY_MS", 200u64)?,
            max_chunk_bytes: parse_or(&lookup, "MAX_CHUNK_BYTES", 10 * 1024 * 1024usize)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 5 * 1024 * 1024 * 1024u64)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", name, raw))),
        None => Ok(default),
    }
}
