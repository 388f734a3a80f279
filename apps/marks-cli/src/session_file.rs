//! The access token persisted between CLI invocations.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use marks_common::api::{LoginResponse, SessionUser};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// API the token was issued by.
    pub api_url: String,
    pub access_token: String,
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn from_login(api_url: &str, login: LoginResponse, now: DateTime<Utc>) -> Self {
        let ttl = i64::try_from(login.expires_in).unwrap_or(i64::MAX);
        Self {
            api_url: api_url.to_string(),
            access_token: login.access_token,
            user: login.user,
            expires_at: now + Duration::seconds(ttl.min(i64::from(i32::MAX))),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Read the stored session. A missing file is `None`.
pub fn load(path: &Path) -> anyhow::Result<Option<StoredSession>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let session = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(session))
}

pub fn save(path: &Path, session: &StoredSession) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting {}", path.display()))?;
    }
    Ok(())
}

/// Remove the stored session. Returns whether one existed.
pub fn clear(path: &Path) -> anyhow::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("marks-cli-test-{}-{name}", std::process::id()))
            .join("session.json")
    }

    fn stored(now: DateTime<Utc>) -> StoredSession {
        StoredSession::from_login(
            "http://localhost:4100",
            LoginResponse {
                access_token: "mat_abc".into(),
                token_type: "Bearer".into(),
                expires_in: 3600,
                user: SessionUser {
                    id: "usr_1".into(),
                    email: Some("me@example.com".into()),
                },
            },
            now,
        )
    }

    #[test]
    fn save_load_clear() {
        let path = scratch("roundtrip");
        let session = stored(Utc::now());

        assert_eq!(load(&path).unwrap(), None);
        save(&path, &session).unwrap();
        assert_eq!(load(&path).unwrap(), Some(session));

        assert!(clear(&path).unwrap());
        assert!(!clear(&path).unwrap());
        assert_eq!(load(&path).unwrap(), None);
    }

    #[test]
    fn expiry_follows_token_ttl() {
        let now = Utc::now();
        let session = stored(now);
        assert!(!session.is_expired(now + Duration::seconds(3599)));
        assert!(session.is_expired(now + Duration::seconds(3600)));
    }
}
