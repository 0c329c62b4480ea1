//! Macro configuration and its on-disk store.
//!
//! The macro is persisted as a small JSON document:
//!
//! ```json
//! {
//!   "repeat": "3",
//!   "rows": [ { "key": "a", "ms": "100" }, { "key": "", "ms": "" } ]
//! }
//! ```
//!
//! Numbers are written as strings, matching what an operator types into a
//! field. Every save first copies the current primary file to a backup, and
//! [`ConfigStore::load`] falls back to that backup (then to defaults) when the
//! primary is missing or unreadable.

use crate::error::{MacroError, Result};
use crate::token::{parse_token, ParsedAction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Number of rows in a macro.
pub const STEP_COUNT: usize = 10;

/// Longest hold a step may request, in milliseconds.
pub const MAX_MS: i64 = 60_000;

/// Largest accepted repeat count. `0` means repeat until stopped.
pub const MAX_REPEAT: i64 = 1_000_000;

const PRIMARY_FILE_NAME: &str = ".keyboardSupport.json";
const BACKUP_FILE_NAME: &str = ".keyboardSupport.bak.json";

/// One row of the macro: what to press and for how long.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroStep {
    pub token: String,
    pub hold_ms: i64,
}

impl MacroStep {
    pub fn new(token: impl Into<String>, hold_ms: i64) -> Self {
        Self {
            token: token.into(),
            hold_ms,
        }
    }

    /// Blank rows are skipped during playback.
    pub fn is_blank(&self) -> bool {
        self.token.trim().is_empty()
    }

    pub fn action(&self) -> Option<ParsedAction> {
        parse_token(&self.token)
    }
}

/// The full macro: a repeat count and exactly [`STEP_COUNT`] ordered steps.
///
/// Values are stored as loaded. Bounds are only enforced by
/// [`MacroConfig::clamp`], which the scheduler applies on start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroConfig {
    pub repeat_count: i64,
    pub steps: [MacroStep; STEP_COUNT],
}

impl MacroConfig {
    /// Clamp the repeat count and every hold duration into range.
    pub fn clamp(&mut self) {
        self.repeat_count = self.repeat_count.clamp(0, MAX_REPEAT);
        for step in &mut self.steps {
            step.hold_ms = step.hold_ms.clamp(0, MAX_MS);
        }
    }

    pub fn clamped(mut self) -> Self {
        self.clamp();
        self
    }

    /// Set a step by zero-based index. Out-of-range indices are ignored.
    pub fn set_step(&mut self, index: usize, token: impl Into<String>, hold_ms: i64) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                *step = MacroStep::new(token, hold_ms);
                true
            }
            None => false,
        }
    }

    /// Rows that will actually press something.
    pub fn active_steps(&self) -> impl Iterator<Item = (usize, &MacroStep, ParsedAction)> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| step.action().map(|action| (i, step, action)))
    }
}

/// A numeric field as it appears in the file: normally a string, but hand
/// edited files may carry a plain number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Null(()),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl FieldValue {
    /// Unparseable or empty values read as zero.
    fn to_int(&self) -> i64 {
        match self {
            FieldValue::Text(s) => s.trim().parse::<i64>().unwrap_or(0),
            FieldValue::Int(n) => *n,
            FieldValue::Float(f) => *f as i64,
            FieldValue::Null(()) => 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoredRowIn {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    ms: FieldValue,
}

#[derive(Debug, Default, Deserialize)]
struct StoredConfigIn {
    #[serde(default)]
    repeat: FieldValue,
    #[serde(default)]
    rows: Vec<StoredRowIn>,
}

#[derive(Debug, Serialize)]
struct StoredRowOut<'a> {
    key: &'a str,
    ms: String,
}

#[derive(Debug, Serialize)]
struct StoredConfigOut<'a> {
    repeat: String,
    rows: Vec<StoredRowOut<'a>>,
}

impl From<StoredConfigIn> for MacroConfig {
    fn from(stored: StoredConfigIn) -> Self {
        let mut config = MacroConfig {
            repeat_count: stored.repeat.to_int(),
            ..Default::default()
        };
        for (step, row) in config.steps.iter_mut().zip(stored.rows) {
            step.token = row.key.unwrap_or_default();
            step.hold_ms = row.ms.to_int();
        }
        config
    }
}

impl MacroConfig {
    /// Serialize to the pretty-printed file format.
    pub fn to_json(&self) -> Result<String> {
        let out = StoredConfigOut {
            repeat: self.repeat_count.to_string(),
            rows: self
                .steps
                .iter()
                .map(|step| StoredRowOut {
                    key: &step.token,
                    ms: step.hold_ms.to_string(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&out)?)
    }

    /// Parse the file format. Missing rows are blank, extra rows ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        let stored: StoredConfigIn = serde_json::from_str(json)?;
        Ok(stored.into())
    }
}

/// Primary/backup file pair holding the last configured macro.
///
/// Saves are serialized through an internal writer lock, so the backup copy
/// and primary write of two concurrent saves never interleave.
#[derive(Debug)]
pub struct ConfigStore {
    primary: PathBuf,
    backup: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the default home-relative locations.
    pub fn at_home() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| MacroError::unsupported_platform("cannot resolve home directory"))?;
        Ok(Self::new(
            home.join(PRIMARY_FILE_NAME),
            home.join(BACKUP_FILE_NAME),
        ))
    }

    /// Store for an explicit primary path; the backup sits next to it as
    /// `<stem>.bak.json`.
    pub fn for_primary(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let stem = primary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "macro".to_string());
        let backup = primary.with_file_name(format!("{}.bak.json", stem));
        Self::new(primary, backup)
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Persist `config`, backing up the current primary first.
    ///
    /// A failed backup copy is logged and ignored. If writing the primary
    /// fails, the write error is returned; the primary is only restored from
    /// the backup when it was left unreadable.
    pub fn save(&self, config: &MacroConfig) -> Result<()> {
        let json = config.to_json()?;
        let _guard = self.write_lock.lock();

        if self.primary.exists() {
            if let Err(e) = fs::copy(&self.primary, &self.backup) {
                warn!(
                    "Could not back up {} to {}: {}",
                    self.primary.display(),
                    self.backup.display(),
                    e
                );
            }
        }

        match self.write_primary(&json) {
            Ok(()) => {
                debug!("Saved macro config to {}", self.primary.display());
                Ok(())
            }
            Err(e) => {
                warn!("Writing {} failed: {}", self.primary.display(), e);
                self.restore_from_backup();
                Err(MacroError::config_save(
                    self.primary.display().to_string(),
                    e.to_string(),
                ))
            }
        }
    }

    fn write_primary(&self, json: &str) -> std::io::Result<()> {
        if let Some(parent) = self.primary.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to a temp file then rename so a crash never leaves half a file
        let temp_path = self.primary.with_extension("json.tmp");
        let result = fs::write(&temp_path, json).and_then(|_| fs::rename(&temp_path, &self.primary));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    /// Put the backup back in place, but only when the primary no longer
    /// parses and the backup does. A failed temp write leaves the primary
    /// intact, and it must win over a stale or half-copied backup.
    fn restore_from_backup(&self) {
        if Self::read(&self.primary).is_ok() {
            debug!("{} is intact, not restoring from backup", self.primary.display());
            return;
        }
        if let Err(e) = Self::read(&self.backup) {
            warn!("Backup unusable, leaving primary as is: {}", e);
            return;
        }
        match fs::copy(&self.backup, &self.primary) {
            Ok(_) => debug!("Restored {} from backup", self.primary.display()),
            Err(e) => warn!("Restoring {} from backup failed: {}", self.primary.display(), e),
        }
    }

    /// Load the macro, never failing: primary, then backup, then defaults.
    pub fn load(&self) -> MacroConfig {
        match Self::read(&self.primary) {
            Ok(config) => return config,
            Err(e) if self.primary.exists() => warn!("{}; trying backup", e),
            Err(e) => debug!("{}", e),
        }

        match Self::read(&self.backup) {
            Ok(config) => {
                warn!("Loaded macro config from backup {}", self.backup.display());
                config
            }
            Err(e) => {
                debug!("{}; using defaults", e);
                MacroConfig::default()
            }
        }
    }

    /// Read and parse a single macro file.
    pub fn read(path: &Path) -> Result<MacroConfig> {
        let contents = fs::read_to_string(path)
            .map_err(|e| MacroError::config_load(path.display().to_string(), e.to_string()))?;
        MacroConfig::from_json(&contents)
            .map_err(|e| MacroError::config_load(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MacroConfig {
        let mut config = MacroConfig {
            repeat_count: 3,
            ..Default::default()
        };
        config.set_step(0, "a", 100);
        config.set_step(4, "mouse.left", 0);
        config
    }

    #[test]
    fn test_json_uses_string_fields() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["repeat"], "3");
        let rows = value["rows"].as_array().unwrap();
        assert_eq!(rows.len(), STEP_COUNT);
        assert_eq!(rows[0]["key"], "a");
        assert_eq!(rows[0]["ms"], "100");
        assert_eq!(rows[1]["key"], "");
        assert_eq!(rows[1]["ms"], "0");
    }

    #[test]
    fn test_from_json_is_lenient() {
        let json = r#"
        {
            "repeat": 5,
            "rows": [
                { "key": "enter", "ms": "250" },
                { "key": "b" },
                { "ms": 70 },
                { "key": "c", "ms": "not a number" }
            ]
        }
        "#;

        let config = MacroConfig::from_json(json).unwrap();
        assert_eq!(config.repeat_count, 5);
        assert_eq!(config.steps[0], MacroStep::new("enter", 250));
        assert_eq!(config.steps[1], MacroStep::new("b", 0));
        assert_eq!(config.steps[2], MacroStep::new("", 70));
        assert_eq!(config.steps[3], MacroStep::new("c", 0));
        assert!(config.steps[4..].iter().all(MacroStep::is_blank));
    }

    #[test]
    fn test_from_json_ignores_extra_rows() {
        let rows: Vec<String> = (0..15)
            .map(|i| format!(r#"{{"key": "{}", "ms": "{}"}}"#, i % 10, i))
            .collect();
        let json = format!(r#"{{"repeat": "", "rows": [{}]}}"#, rows.join(","));

        let config = MacroConfig::from_json(&json).unwrap();
        assert_eq!(config.repeat_count, 0);
        assert_eq!(config.steps[9], MacroStep::new("9", 9));
    }

    #[test]
    fn test_out_of_range_values_survive_load() {
        let json = r#"{"repeat": "-4", "rows": [{"key": "a", "ms": "999999"}]}"#;
        let config = MacroConfig::from_json(json).unwrap();
        assert_eq!(config.repeat_count, -4);
        assert_eq!(config.steps[0].hold_ms, 999_999);

        let clamped = config.clamped();
        assert_eq!(clamped.repeat_count, 0);
        assert_eq!(clamped.steps[0].hold_ms, MAX_MS);
    }

    #[test]
    fn test_clamp_bounds() {
        let mut config = MacroConfig {
            repeat_count: 5_000_000,
            ..Default::default()
        };
        config.set_step(0, "a", -20);
        config.set_step(1, "", 70_000);
        config.clamp();

        assert_eq!(config.repeat_count, MAX_REPEAT);
        assert_eq!(config.steps[0].hold_ms, 0);
        assert_eq!(config.steps[1].hold_ms, MAX_MS);
    }

    #[test]
    fn test_set_step_out_of_range() {
        let mut config = MacroConfig::default();
        assert!(!config.set_step(STEP_COUNT, "a", 10));
        assert_eq!(config, MacroConfig::default());
    }

    #[test]
    fn test_active_steps_skip_blank_and_invalid() {
        let mut config = sample();
        config.set_step(2, "zz", 40);
        let active: Vec<usize> = config.active_steps().map(|(i, _, _)| i).collect();
        assert_eq!(active, vec![0, 4]);
    }

    #[test]
    fn test_backup_path_derivation() {
        let store = ConfigStore::for_primary("/tmp/macros/pad.json");
        assert_eq!(store.backup_path(), Path::new("/tmp/macros/pad.bak.json"));
    }

    #[test]
    fn test_save_creates_backup_of_previous_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));

        let first = sample();
        store.save(&first).unwrap();
        assert!(!store.backup_path().exists());

        let mut second = first.clone();
        second.repeat_count = 9;
        store.save(&second).unwrap();

        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert_eq!(backup, first.to_json().unwrap());
        assert_eq!(store.load(), second);
    }

    #[test]
    fn test_load_missing_files_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("absent.json"));
        assert_eq!(store.load(), MacroConfig::default());
    }

    #[test]
    fn test_load_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));

        fs::write(store.backup_path(), sample().to_json().unwrap()).unwrap();
        assert_eq!(store.load(), sample());

        fs::write(store.primary_path(), "{\"repeat\": \"3\", \"rows\": [").unwrap();
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn test_load_both_corrupt_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));
        fs::write(store.primary_path(), "garbage").unwrap();
        fs::write(store.backup_path(), "[1, 2").unwrap();
        assert_eq!(store.load(), MacroConfig::default());
    }

    #[test]
    fn test_failed_temp_write_leaves_primary_intact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));

        let current = sample();
        store.save(&current).unwrap();
        // Make the backup copy fail, then block the temp file
        fs::create_dir(store.backup_path()).unwrap();
        fs::write(store.backup_path().join("occupied"), "x").unwrap();
        let temp = dir.path().join("macro.json.tmp");
        fs::create_dir(&temp).unwrap();
        fs::write(temp.join("occupied"), "x").unwrap();

        let mut next = current.clone();
        next.repeat_count = 7;
        assert!(store.save(&next).is_err());
        assert_eq!(ConfigStore::read(store.primary_path()).unwrap(), current);
    }

    #[test]
    fn test_restore_skips_intact_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));

        let current = sample();
        fs::write(store.primary_path(), current.to_json().unwrap()).unwrap();
        let mut stale = current.clone();
        stale.set_step(0, "z", 5);
        fs::write(store.backup_path(), stale.to_json().unwrap()).unwrap();

        store.restore_from_backup();
        assert_eq!(ConfigStore::read(store.primary_path()).unwrap(), current);
    }

    #[test]
    fn test_restore_skips_broken_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));
        fs::write(store.primary_path(), "{\"repeat\": ").unwrap();
        fs::write(store.backup_path(), "{\"rows\": [").unwrap();

        store.restore_from_backup();
        assert_eq!(fs::read_to_string(store.primary_path()).unwrap(), "{\"repeat\": ");
    }

    #[test]
    fn test_restore_replaces_corrupt_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::for_primary(dir.path().join("macro.json"));
        fs::write(store.primary_path(), "garbage").unwrap();
        fs::write(store.backup_path(), sample().to_json().unwrap()).unwrap();

        store.restore_from_backup();
        assert_eq!(ConfigStore::read(store.primary_path()).unwrap(), sample());
    }

    #[test]
    fn test_failed_write_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the primary file should be makes the rename fail
        let primary = dir.path().join("macro.json");
        fs::create_dir(&primary).unwrap();
        fs::create_dir(primary.join("occupied")).unwrap();
        let store = ConfigStore::for_primary(&primary);

        let err = store.save(&sample()).unwrap_err();
        assert!(matches!(err, MacroError::ConfigSave { .. }));
        assert!(!dir.path().join("macro.json.tmp").exists());
    }
}
