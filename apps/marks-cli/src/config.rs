use std::path::PathBuf;

use anyhow::Context;

const DEFAULT_API_URL: &str = "http://localhost:4100";

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the marks API.
    pub api_url: String,
    /// Where the signed-in session is persisted between invocations.
    pub session_file: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("MARKS_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let session_file = match std::env::var_os("MARKS_SESSION_FILE").filter(|s| !s.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .context("no config directory; set MARKS_SESSION_FILE")?
                .join("marks")
                .join("session.json"),
        };

        Ok(Self {
            api_url,
            session_file,
        })
    }
}
