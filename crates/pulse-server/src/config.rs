use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

/// Server settings, read from `PULSE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Seconds between expired-story sweeps
    pub story_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("PULSE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PULSE_JWT_SECRET is unset or still a placeholder; it must match the auth layer's signing secret");
        }

        let port = match get("PULSE_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid PULSE_PORT {:?}", p))?,
            None => 6060,
        };
        let story_sweep_secs = match get("PULSE_STORY_SWEEP_SECS") {
            Some(s) => s
                .parse()
                .with_context(|| format!("invalid PULSE_STORY_SWEEP_SECS {:?}", s))?,
            None => 300,
        };
        if story_sweep_secs == 0 {
            bail!("PULSE_STORY_SWEEP_SECS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path: get("PULSE_DB_PATH").unwrap_or_else(|| "pulse.db".into()).into(),
            host: get("PULSE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            story_sweep_secs,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
