use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub public_base_url: Option<String>,

    // Source playlist
    pub m3u_url: String,
    pub snapshot_path: PathBuf,

    // Fetching
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub max_m3u_size_mb: u64,
    pub user_agent: String,

    // Startup behavior
    pub wait_for_catalog: bool,
    pub snapshot_fallback: bool,
}

/// Parse a boolean flag, accepting the usual spellings
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),

            // Source playlist
            m3u_url: env::var("M3U_URL").unwrap_or_else(|_| {
                "https://iptv-org.github.io/iptv/countries/br.m3u".to_string()
            }),
            snapshot_path: env::var("M3U_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("lista_brasil.m3u")),

            // Fetching
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60_000), // 1 minute

            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),

            max_m3u_size_mb: env::var("MAX_M3U_SIZE_MB")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),

            // Startup behavior
            wait_for_catalog: env::var("WAIT_FOR_CATALOG")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            snapshot_fallback: env::var("SNAPSHOT_FALLBACK")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    /// Reject URLs that would make every ingestion run or export fail
    pub fn validate(&self) -> Result<()> {
        let source = url::Url::parse(&self.m3u_url)
            .with_context(|| format!("Invalid M3U_URL: {}", self.m3u_url))?;
        if !matches!(source.scheme(), "http" | "https") {
            bail!("M3U_URL must use http or https, got {}", source.scheme());
        }

        if let Some(base) = &self.public_base_url {
            url::Url::parse(base)
                .with_context(|| format!("Invalid PUBLIC_BASE_URL: {}", base))?;
        }

        if self.max_m3u_size_mb == 0 {
            bail!("MAX_M3U_SIZE_MB must be greater than zero");
        }

        Ok(())
    }

    /// Upper bound for a downloaded playlist, in bytes
    pub fn max_m3u_bytes(&self) -> u64 {
        self.max_m3u_size_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for tests, independent of the process environment
    pub fn for_tests(m3u_url: &str, snapshot_path: PathBuf) -> Self {
        Self {
            port: 8000,
            public_base_url: None,
            m3u_url: m3u_url.to_string(),
            snapshot_path,
            fetch_timeout_ms: 5_000,
            max_retries: 0,
            max_m3u_size_mb: 1,
            user_agent: "brasil-tv-test".to_string(),
            wait_for_catalog: false,
            snapshot_fallback: true,
        }
    }
}
