#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::NaiveDate;
use planr::model::{NewRoutine, WeekdaySet};
use planr::storage::Storage;
use planr::store::Store;
use tempfile::TempDir;

/// Fixed "today" for CLI runs: a Monday.
pub const TODAY: &str = "2024-03-04";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn monday() -> NaiveDate {
    day(2024, 3, 4)
}

/// A throwaway planr data directory.
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file("planr.toml", contents)
    }

    pub fn storage(&self, user: &str) -> Storage {
        Storage::new(self.path(), "default", user).expect("storage")
    }

    /// Open a ready store for `user`.
    pub fn store(&self, user: &str) -> Store {
        let storage = self.storage(user);
        storage.init_namespace().expect("init namespace");
        Store::open(storage, 2000).expect("open store")
    }

    /// Another handle on the same namespace, as a second process would see it.
    pub fn reopen(&self, user: &str) -> Store {
        Store::open(self.storage(user), 2000).expect("reopen store")
    }

    /// planr binary pinned to this home and a fixed date.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("planr").expect("binary");
        cmd.env("PLANR_HOME", self.path())
            .env("PLANR_TODAY", TODAY)
            .env_remove("PLANR_USER")
            .env_remove("PLANR_AI_KEY")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run a command with `--json` and return the `data` payload.
    pub fn json(&self, args: &[&str]) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        let output = self.cmd().args(args).arg("--json").output()?;
        if !output.status.success() {
            return Err(format!(
                "planr {:?} failed: {}{}",
                args,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }
        let envelope: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(envelope["data"].clone())
    }
}

pub fn add_routine(store: &Store, title: &str, days: &[u8], start: NaiveDate) -> String {
    store
        .create_routine(NewRoutine::new(
            title,
            WeekdaySet::new(days.iter().copied()).expect("weekdays"),
            start,
        ))
        .expect("create routine")
}
