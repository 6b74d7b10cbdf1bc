//! The shared configuration store.
//!
//! One mutex guards the tree. Snapshots copy out under it; patches merge,
//! validate, replace and persist under it as a single critical section, so no
//! reader ever sees a half-applied patch and the file always holds a complete
//! tree.

use super::merge::{deep_merge, kind_of};
use super::types::Config;
use crate::error::ConfigError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Partial configuration tree applied with deep-merge semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch(Map<String, Value>);

impl ConfigPatch {
    /// An empty patch: merges nothing, still re-persists.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a patch from a JSON document, which must be a mapping.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConfigError::NotAMapping(kind_of(&other))),
        }
    }

    /// Add (or replace) one top-level section.
    pub fn section(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// What happened to the durable copy after a patch was applied in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Memory and disk agree.
    Persisted,
    /// Memory holds the patch but the file write failed.
    PersistFailed,
}

/// Health of the durable copy, surfaced on `/api/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistHealth {
    /// Whether the most recent write succeeded.
    pub in_sync: bool,
    /// Number of failed writes since start.
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Process-wide configuration, shared through an `Arc`.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    tree: Mutex<Config>,
    health: Mutex<PersistHealth>,
}

impl ConfigStore {
    /// Wrap an already resolved tree without touching disk.
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            tree: Mutex::new(config),
            health: Mutex::new(PersistHealth::default()),
        }
    }

    /// Load the tree and immediately write the resolved result back, so the
    /// file always reflects defaults merged with any partial prior override.
    pub fn open(path: impl Into<PathBuf>, defaults: &Config) -> Self {
        let path = path.into();
        let config = Self::load(&path, defaults);
        let store = Self::new(path, config);
        store.persist_current();
        store
    }

    /// Resolve `defaults` overlaid with the persisted file, if any.
    ///
    /// Never fails: an unreadable or unparsable file yields the defaults, and a
    /// key that does not validate falls back to its default while its valid
    /// siblings are kept.
    pub fn load(path: &Path, defaults: &Config) -> Config {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return defaults.clone();
        }

        let persisted = match read_document(path) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to load {}, using defaults: {}", path.display(), e);
                return defaults.clone();
            }
        };

        let (config, rejected) = resolve(defaults.to_value(), persisted);
        for key in &rejected {
            warn!(
                "Ignoring invalid value for '{}' in {}, using the default",
                key,
                path.display()
            );
        }
        config.unwrap_or_else(|| defaults.clone())
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Independent deep copy of the current tree.
    pub fn snapshot(&self) -> Config {
        self.lock_tree().clone()
    }

    /// Deep-merge `patch` onto the tree, then persist the full tree.
    ///
    /// The patch is rejected, leaving the tree untouched, when the merged result
    /// does not fit the typed schema. A failed write is logged and reported as
    /// [`ApplyOutcome::PersistFailed`]; the in-memory tree keeps the patch.
    pub fn apply(&self, patch: ConfigPatch) -> Result<ApplyOutcome, ConfigError> {
        let mut tree = self.lock_tree();

        let merged = deep_merge(tree.to_value(), patch.into_value());
        let next: Config = serde_json::from_value(merged).map_err(ConfigError::InvalidPatch)?;
        *tree = next;

        Ok(self.persist_locked(&tree))
    }

    /// Current health of the durable copy.
    pub fn persistence(&self) -> PersistHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn persist_current(&self) -> ApplyOutcome {
        let tree = self.lock_tree();
        self.persist_locked(&tree)
    }

    fn persist_locked(&self, tree: &Config) -> ApplyOutcome {
        let result = write_document(&self.path, tree);
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(()) => {
                health.in_sync = true;
                ApplyOutcome::Persisted
            }
            Err(e) => {
                warn!("{}; keeping in-memory configuration", e);
                health.in_sync = false;
                health.failures += 1;
                health.last_error = Some(e.to_string());
                ApplyOutcome::PersistFailed
            }
        }
    }

    fn lock_tree(&self) -> MutexGuard<'_, Config> {
        // A panic elsewhere never leaves a half-merged tree behind: the tree
        // is only ever replaced whole.
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether `path` should be read and written as YAML.
fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value = if is_yaml(path) {
        serde_yaml::from_str::<Value>(&content)?
    } else {
        serde_json::from_str::<Value>(&content)?
    };
    Ok(value)
}

/// Serialize and atomically replace the document at `path`.
fn write_document(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let content = if is_yaml(path) {
        serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
    };

    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}

/// Merge `persisted` onto `defaults` and validate.
///
/// When the whole merge does not validate, persisted values are accepted one
/// key at a time, descending into mappings, so a bad leaf only costs itself.
/// The dotted paths of the keys that fell back to defaults are returned.
fn resolve(defaults: Value, persisted: Value) -> (Option<Config>, Vec<String>) {
    let merged = deep_merge(defaults.clone(), persisted.clone());
    if let Ok(config) = serde_json::from_value::<Config>(merged) {
        return (Some(config), Vec::new());
    }

    let Value::Object(entries) = persisted else {
        info!("Persisted config is {}, not a mapping", kind_of(&persisted));
        return (None, Vec::new());
    };

    let mut accepted = defaults;
    let mut rejected = Vec::new();
    let mut path = Vec::new();
    for (key, value) in entries {
        path.push(key);
        accept(&mut accepted, &mut path, value, &mut rejected);
        path.pop();
    }

    (serde_json::from_value(accepted).ok(), rejected)
}

fn accept(accepted: &mut Value, path: &mut Vec<String>, value: Value, rejected: &mut Vec<String>) {
    let candidate = merged_at(accepted, path, value.clone());
    if serde_json::from_value::<Config>(candidate.clone()).is_ok() {
        *accepted = candidate;
        return;
    }

    let existing_is_map = path
        .iter()
        .try_fold(&*accepted, |node, key| node.get(key))
        .is_some_and(Value::is_object);
    match value {
        Value::Object(entries) if existing_is_map => {
            for (key, child) in entries {
                path.push(key);
                accept(accepted, path, child, rejected);
                path.pop();
            }
        }
        _ => rejected.push(path.join(".")),
    }
}

/// `root` with `value` deep-merged in at `path`.
fn merged_at(root: &Value, path: &[String], value: Value) -> Value {
    let nested = path.iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.clone(), inner);
        Value::Object(map)
    });
    deep_merge(root.clone(), nested)
}
