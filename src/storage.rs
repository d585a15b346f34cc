//! Storage layout for planr
//!
//! All state lives under a data home (`PLANR_HOME`, or the platform data dir).
//!
//! # Directory Structure
//!
//! ```text
//! <home>/
//!   planr.toml                    # Configuration
//!   identity.json                 # Signed-in identity
//!   <project>/users/<userId>/     # One namespace per user
//!     tasks.json                  # Task collection document
//!     routines.json               # Routine collection document
//!     journal.json                # Pending batch (only while committing)
//!     store.lock                  # Writer lock
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::is_path_segment;
use crate::error::{Error, Result};
use crate::lock;

/// Environment variable overriding the data home
pub const HOME_ENV: &str = "PLANR_HOME";

/// Schema marker written into every collection document
pub const COLLECTION_SCHEMA_VERSION: &str = "planr.collection.v1";

const TASKS_FILE: &str = "tasks.json";
const ROUTINES_FILE: &str = "routines.json";
const JOURNAL_FILE: &str = "journal.json";
const LOCK_FILE: &str = "store.lock";

/// Resolve the data home: explicit path, then `PLANR_HOME`, then the
/// platform data directory.
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(HOME_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    directories::ProjectDirs::from("", "", "planr")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            Error::StoreUnavailable(format!(
                "cannot determine a data directory; set {HOME_ENV}"
            ))
        })
}

/// One user's namespace inside the data home
#[derive(Debug, Clone)]
pub struct Storage {
    home: PathBuf,
    user_id: String,
    namespace: PathBuf,
}

impl Storage {
    /// Namespace for `user_id` in `project`. Both must be single path
    /// segments.
    pub fn new(home: impl Into<PathBuf>, project: &str, user_id: &str) -> Result<Self> {
        if !is_path_segment(project) {
            return Err(Error::InvalidArgument(format!(
                "invalid project identifier '{project}'"
            )));
        }
        if !is_path_segment(user_id) {
            return Err(Error::InvalidArgument(format!(
                "invalid user id '{user_id}'"
            )));
        }
        let home = home.into();
        let namespace = home.join(project).join("users").join(user_id);
        Ok(Self {
            home,
            user_id: user_id.to_string(),
            namespace,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn namespace_dir(&self) -> &Path {
        &self.namespace
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.namespace.join(TASKS_FILE)
    }

    pub fn routines_file(&self) -> PathBuf {
        self.namespace.join(ROUTINES_FILE)
    }

    pub fn journal_file(&self) -> PathBuf {
        self.namespace.join(JOURNAL_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.namespace.join(LOCK_FILE)
    }

    /// Whether `path` names one of the collection documents. Compared by
    /// file name, since watcher events may report canonicalized paths.
    pub fn is_collection_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == TASKS_FILE || name == ROUTINES_FILE)
    }

    /// Create the namespace directory. Idempotent.
    pub fn init_namespace(&self) -> Result<()> {
        fs::create_dir_all(&self.namespace)?;
        Ok(())
    }

    /// The namespace is usable once its directory exists.
    pub fn is_ready(&self) -> bool {
        self.namespace.is_dir()
    }

    /// Fail with `StoreUnavailable` unless the namespace is ready.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(format!(
                "no store for user '{}' (run `planr init` or `planr auth login`)",
                self.user_id
            )))
        }
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON atomically (temp + rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    /// Read JSON, `None` when the file does not exist
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(err)),
        }
    }

    /// Load a collection document, empty at revision 0 when absent.
    pub fn load_collection<T: DeserializeOwned>(&self, path: &Path) -> Result<Collection<T>> {
        Ok(self.read_json(path)?.unwrap_or_default())
    }
}

/// On-disk collection document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    pub schema_version: String,
    /// Bumped by one on every committed change
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            schema_version: COLLECTION_SCHEMA_VERSION.to_string(),
            revision: 0,
            updated_at: None,
            items: Vec::new(),
        }
    }
}

impl<T> Collection<T> {
    /// Record a committed change.
    pub fn bump(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn namespace_layout() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path(), "default", "anon-01h").unwrap();

        assert_eq!(
            storage.tasks_file(),
            temp.path().join("default/users/anon-01h/tasks.json")
        );
        assert_eq!(
            storage.lock_file(),
            temp.path().join("default/users/anon-01h/store.lock")
        );
        assert!(storage.is_collection_file(&storage.routines_file()));
        assert!(!storage.is_collection_file(&storage.journal_file()));
    }

    #[test]
    fn rejects_path_escaping_ids() {
        let temp = TempDir::new().unwrap();
        assert!(Storage::new(temp.path(), "default", "../other").is_err());
        assert!(Storage::new(temp.path(), "a/b", "user").is_err());
        assert!(Storage::new(temp.path(), "default", "").is_err());
    }

    #[test]
    fn readiness_follows_namespace_dir() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path(), "default", "u1").unwrap();

        assert!(!storage.is_ready());
        assert!(matches!(
            storage.ensure_ready(),
            Err(Error::StoreUnavailable(_))
        ));

        storage.init_namespace().unwrap();
        assert!(storage.is_ready());
        storage.ensure_ready().unwrap();
    }

    #[test]
    fn missing_collection_loads_empty() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path(), "default", "u1").unwrap();

        let collection: Collection<String> =
            storage.load_collection(&storage.tasks_file()).unwrap();
        assert_eq!(collection.revision, 0);
        assert!(collection.items.is_empty());
    }

    #[test]
    fn collection_roundtrips_with_revision() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path(), "default", "u1").unwrap();

        let mut collection = Collection::default();
        collection.items.push("a".to_string());
        collection.bump(Utc::now());
        storage.write_json(&storage.tasks_file(), &collection).unwrap();

        let loaded: Collection<String> = storage.load_collection(&storage.tasks_file()).unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.items, vec!["a".to_string()]);
        assert!(loaded.updated_at.is_some());
    }
}
