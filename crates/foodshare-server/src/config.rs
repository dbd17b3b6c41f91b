use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub session_days: i64,
    pub handover_ttl_hours: i64,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns `None` for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("FOODSHARE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("FOODSHARE_JWT_SECRET is unset or still a placeholder");
        }

        let port = get("FOODSHARE_PORT", "3000")
            .parse()
            .context("FOODSHARE_PORT must be a port number")?;
        let session_days = get("FOODSHARE_SESSION_DAYS", "30")
            .parse()
            .context("FOODSHARE_SESSION_DAYS must be a whole number")?;
        let handover_ttl_hours = get("FOODSHARE_HANDOVER_TTL_HOURS", "24")
            .parse()
            .context("FOODSHARE_HANDOVER_TTL_HOURS must be a whole number")?;
        if session_days < 1 || handover_ttl_hours < 1 {
            bail!("session and handover lifetimes must be positive");
        }
        let cookie_secure = matches!(
            get("FOODSHARE_COOKIE_SECURE", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        Ok(Self {
            db_path: get("FOODSHARE_DB_PATH", "foodshare.db").into(),
            host: get("FOODSHARE_HOST", "0.0.0.0"),
            port,
            jwt_secret,
            upload_dir: get("FOODSHARE_UPLOAD_DIR", "./uploads").into(),
            session_days,
            handover_ttl_hours,
            cookie_secure,
        })
    }
}
