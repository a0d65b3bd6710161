//! Cookie jar for the backend's session authentication.
//!
//! The backend authenticates with a `sessionid` cookie and protects unsafe
//! methods with a `csrftoken` cookie echoed back in `X-CSRFToken`. Both are
//! kept here and persisted between CLI runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "sessionid";
pub const CSRF_COOKIE: &str = "csrftoken";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(session) => session,
                Err(e) => {
                    warn!("ignoring unreadable session file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        debug!("session saved to {}", path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_signed_in(&self) -> bool {
        self.get(SESSION_COOKIE).is_some()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Value for the `Cookie` request header, if any cookie is held.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Some(pairs.join("; "))
    }

    /// Apply one `Set-Cookie` header. Returns true if the jar changed.
    pub fn apply_set_cookie(&mut self, header: &str) -> bool {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return false;
        };
        let name = name.trim();
        let value = value.trim().trim_matches('"');
        if name.is_empty() {
            return false;
        }

        let expired = parts.any(|attr| {
            let attr = attr.trim().to_ascii_lowercase();
            attr == "max-age=0" || attr.starts_with("expires=thu, 01 jan 1970")
        });

        if value.is_empty() || expired {
            return self.cookies.remove(name).is_some();
        }
        self.cookies.insert(name.to_string(), value.to_string()) != Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_cookie_round() {
        let mut session = Session::default();
        assert!(session.apply_set_cookie(
            "csrftoken=abc123; expires=Fri, 14 Nov 2025 10:00:00 GMT; Max-Age=31449600; Path=/; SameSite=Lax"
        ));
        assert!(session.apply_set_cookie("sessionid=s3ss; HttpOnly; Path=/"));
        assert!(!session.apply_set_cookie("sessionid=s3ss; HttpOnly; Path=/"));
        assert_eq!(session.get(CSRF_COOKIE), Some("abc123"));
        assert!(session.is_signed_in());
        assert_eq!(
            session.cookie_header().as_deref(),
            Some("csrftoken=abc123; sessionid=s3ss")
        );
    }

    #[test]
    fn test_logout_cookie_removes_session() {
        let mut session = Session::default();
        session.apply_set_cookie("sessionid=s3ss; Path=/");
        assert!(session.apply_set_cookie(
            "sessionid=\"\"; expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Path=/"
        ));
        assert!(!session.is_signed_in());
        assert_eq!(session.cookie_header(), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("vault-session-{}.json", std::process::id()));
        let mut session = Session::default();
        session.apply_set_cookie("sessionid=persisted");
        session.save(&path).await.unwrap();

        let loaded = Session::load(&path);
        assert_eq!(loaded, session);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_empty_session() {
        let session = Session::load(Path::new("/nonexistent/vault/session.json"));
        assert!(!session.is_signed_in());
    }
}
