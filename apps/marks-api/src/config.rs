/// Marks API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. Bookmarks are kept in memory when unset.
    pub database_url: Option<String>,
    /// Shared secret the identity provider signs identity assertions with (HS256).
    pub identity_secret: String,
    /// Expected `iss` of identity assertions.
    pub identity_issuer: String,
    /// Expected `aud` of identity assertions.
    pub identity_audience: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Externally reachable base URL (e.g. `https://marks.example.com`).
    /// Defaults to `http://localhost:{port}`.
    pub public_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            identity_secret: required_var("IDENTITY_JWT_SECRET"),
            identity_issuer: required_var("IDENTITY_ISSUER"),
            identity_audience: std::env::var("IDENTITY_AUDIENCE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "marks".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4100),
            public_url: std::env::var("PUBLIC_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Gateway URL advertised to clients: the public URL with its scheme
    /// switched to `ws`/`wss`.
    pub fn gateway_url(&self) -> String {
        let base = match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        };
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base
        };
        format!("{ws_base}/gateway")
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public_url: Option<&str>) -> Config {
        Config {
            database_url: None,
            identity_secret: "secret".into(),
            identity_issuer: "https://id.test".into(),
            identity_audience: "marks".into(),
            port: 4100,
            public_url: public_url.map(str::to_string),
        }
    }

    #[test]
    fn gateway_url_defaults_to_localhost() {
        assert_eq!(config(None).gateway_url(), "ws://localhost:4100/gateway");
    }

    #[test]
    fn gateway_url_follows_public_url() {
        assert_eq!(
            config(Some("https://marks.example.com/")).gateway_url(),
            "wss://marks.example.com/gateway"
        );
        assert_eq!(
            config(Some("http://10.0.0.5:8080")).gateway_url(),
            "ws://10.0.0.5:8080/gateway"
        );
    }
}
