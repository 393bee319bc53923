use anyhow::{Context, Result};
use std::{env, str::FromStr, time::Duration};

/// Passing threshold applied when a quiz carries no `passingScore` of its own.
pub const DEFAULT_PASSING_SCORE: i32 = 60;

/// Placeholder used when the profile service cannot resolve a student.
pub const UNKNOWN_STUDENT: &str = "Unknown Student";

/// Placeholder used when the catalog service cannot resolve a course.
pub const UNKNOWN_COURSE: &str = "Unknown Course";

pub const CERTIFICATE_CODE_PREFIX: &str = "CERT-";
pub const CERTIFICATE_CODE_HEX_LEN: usize = 12;

/// Fresh codes drawn before issuance gives up on a run of collisions.
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub catalog_url: String,
    pub student_url: String,
    pub remote_timeout: Duration,
    /// Prefix of the public verification link printed on certificates.
    pub public_base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8084,
            database_url: None,
            db_max_connections: 10,
            catalog_url: "http://localhost:8082".into(),
            student_url: "http://localhost:8083".into(),
            remote_timeout: Duration::from_millis(3000),
            public_base_path: "/learning-service".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_env("PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            catalog_url: env::var("CATALOG_SERVICE_URL").unwrap_or(defaults.catalog_url),
            student_url: env::var("STUDENT_SERVICE_URL").unwrap_or(defaults.student_url),
            remote_timeout: Duration::from_millis(parse_env(
                "REMOTE_TIMEOUT_MS",
                defaults.remote_timeout.as_millis() as u64,
            )?),
            public_base_path: env::var("PUBLIC_BASE_PATH").unwrap_or(defaults.public_base_path),
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
