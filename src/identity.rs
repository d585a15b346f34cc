//! Signed-in user identity.
//!
//! User resolution order:
//! 1) CLI --user (explicit)
//! 2) PLANR_USER environment variable
//! 3) Persisted session in `<home>/identity.json`
//!
//! With none of these the user is signed out and the store is unavailable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::is_path_segment;
use crate::error::{Error, Result};
use crate::lock;
use crate::model::new_id;

pub const USER_ENV: &str = "PLANR_USER";

const IDENTITY_FILE: &str = "identity.json";

/// How a persisted session was established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    Anonymous,
    Federated { provider: String },
}

/// Persisted sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(flatten)]
    pub method: AuthMethod,
    pub signed_in_at: DateTime<Utc>,
}

/// Where the active user id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Flag,
    Env,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub source: IdentitySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

fn identity_path(home: &Path) -> PathBuf {
    home.join(IDENTITY_FILE)
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|value| !value.is_empty())
}

fn checked_user_id(user_id: &str) -> Result<String> {
    if !is_path_segment(user_id) {
        return Err(Error::InvalidArgument(format!(
            "user id '{user_id}' must be alphanumeric, '-' or '_'"
        )));
    }
    Ok(user_id.to_string())
}

/// Resolve the active user.
pub fn resolve_user(home: &Path, cli_user: Option<&str>) -> Result<Identity> {
    if let Some(user) = non_empty(cli_user) {
        return Ok(Identity {
            user_id: checked_user_id(user)?,
            source: IdentitySource::Flag,
            session: None,
        });
    }

    if let Ok(env_user) = std::env::var(USER_ENV) {
        if let Some(user) = non_empty(Some(env_user.as_str())) {
            return Ok(Identity {
                user_id: checked_user_id(user)?,
                source: IdentitySource::Env,
                session: None,
            });
        }
    }

    if let Some(session) = load_session(home)? {
        return Ok(Identity {
            user_id: checked_user_id(&session.user_id)?,
            source: IdentitySource::Session,
            session: Some(session),
        });
    }

    Err(Error::StoreUnavailable(
        "not signed in (run `planr auth login`)".to_string(),
    ))
}

/// Load the persisted session, if any.
pub fn load_session(home: &Path) -> Result<Option<Session>> {
    let path = identity_path(home);
    match std::fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::Io(err)),
    }
}

fn persist(home: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string_pretty(session)?;
    lock::write_atomic(identity_path(home), json.as_bytes())
}

/// Start an anonymous session with a fresh `anon-<ulid>` user id.
pub fn sign_in_anonymous(home: &Path) -> Result<Session> {
    let session = Session {
        user_id: format!("anon-{}", new_id()),
        method: AuthMethod::Anonymous,
        signed_in_at: Utc::now(),
    };
    persist(home, &session)?;
    Ok(session)
}

/// Start a session for an account at an external identity provider. The
/// user id is `<provider>-<uid>`, stable across sign-ins.
pub fn sign_in_federated(home: &Path, provider: &str, uid: &str) -> Result<Session> {
    let provider = non_empty(Some(provider))
        .ok_or_else(|| Error::InvalidArgument("identity provider cannot be empty".to_string()))?
        .to_ascii_lowercase();
    let uid = non_empty(Some(uid))
        .ok_or_else(|| Error::InvalidArgument("account id cannot be empty".to_string()))?;

    let session = Session {
        user_id: checked_user_id(&format!("{provider}-{uid}"))?,
        method: AuthMethod::Federated { provider },
        signed_in_at: Utc::now(),
    };
    persist(home, &session)?;
    Ok(session)
}

/// Forget the persisted session. Returns whether one existed.
pub fn sign_out(home: &Path) -> Result<bool> {
    lock::remove_if_exists(identity_path(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn flag_wins_over_session() {
        let temp = TempDir::new().unwrap();
        sign_in_anonymous(temp.path()).unwrap();

        let identity = resolve_user(temp.path(), Some("alice")).unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.source, IdentitySource::Flag);
    }

    #[test]
    fn anonymous_session_roundtrip() {
        let temp = TempDir::new().unwrap();
        let session = sign_in_anonymous(temp.path()).unwrap();
        assert!(session.user_id.starts_with("anon-"));

        let loaded = load_session(temp.path()).unwrap().unwrap();
        assert_eq!(loaded, session);

        assert!(sign_out(temp.path()).unwrap());
        assert!(!sign_out(temp.path()).unwrap());
        assert!(load_session(temp.path()).unwrap().is_none());
    }

    #[test]
    fn federated_ids_are_stable() {
        let temp = TempDir::new().unwrap();
        let first = sign_in_federated(temp.path(), "Google", "12345").unwrap();
        let second = sign_in_federated(temp.path(), "google", "12345").unwrap();
        assert_eq!(first.user_id, "google-12345");
        assert_eq!(first.user_id, second.user_id);
        assert_eq!(
            first.method,
            AuthMethod::Federated {
                provider: "google".to_string()
            }
        );
    }

    #[test]
    fn rejects_unsafe_ids() {
        let temp = TempDir::new().unwrap();
        assert!(sign_in_federated(temp.path(), "github", "../x").is_err());
        assert!(matches!(
            resolve_user(temp.path(), Some("a/b")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn session_file_format() {
        let temp = TempDir::new().unwrap();
        sign_in_federated(temp.path(), "github", "octo").unwrap();
        let raw = std::fs::read_to_string(temp.path().join(IDENTITY_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["user_id"], "github-octo");
        assert_eq!(value["method"], "federated");
        assert_eq!(value["provider"], "github");
    }
}
