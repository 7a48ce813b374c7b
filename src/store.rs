use crate::buffer::{is_builtin, Buffer, ViewedLedger};
use crate::usage::{UsageLedger, UsageRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const STATE_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state version {version} is newer than supported (max: {max_supported})")]
    VersionTooNew { version: u32, max_supported: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub version: u32,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub scratch: Option<String>,
    #[serde(default)]
    pub usage: UsageLedger,
    #[serde(default)]
    pub viewed: ViewedLedger,
    #[serde(default)]
    pub last_visit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub active: Option<String>,
}

impl Default for StoredState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            buffers: Vec::new(),
            scratch: None,
            usage: UsageLedger::default(),
            viewed: ViewedLedger::default(),
            last_visit: None,
            session: None,
            active: None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub upgraded_from: Option<u32>,
    pub dropped_usage: usize,
    pub dropped_viewed: usize,
    pub dropped_buffers: usize,
}

impl StoredState {
    pub fn parse(raw: &str) -> Result<(Self, Option<u32>), StoreError> {
        let mut value: Value = serde_json::from_str(raw)?;
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(1);
        if version > STATE_VERSION {
            return Err(StoreError::VersionTooNew {
                version,
                max_supported: STATE_VERSION,
            });
        }
        let upgraded_from = (version < STATE_VERSION).then_some(version);
        if version < 2 {
            upgrade_v1(&mut value);
        }
        let state: StoredState = serde_json::from_value(value)?;
        Ok((state, upgraded_from))
    }

    pub fn migrate<'a>(&mut self, commands: impl IntoIterator<Item = &'a str>) -> MigrationReport {
        let mut report = MigrationReport::default();
        if self.version < STATE_VERSION {
            report.upgraded_from = Some(self.version);
            self.version = STATE_VERSION;
        }

        let mut seen = BTreeSet::new();
        let before = self.buffers.len();
        self.buffers
            .retain(|b| !is_builtin(&b.id) && seen.insert(b.id.clone()));
        report.dropped_buffers = before - self.buffers.len();

        report.dropped_usage = self.usage.retain_known(commands);

        let ids: Vec<&str> = crate::buffer::BUILTINS
            .iter()
            .map(|b| b.id)
            .chain(self.buffers.iter().map(|b| b.id.as_str()))
            .collect();
        report.dropped_viewed = self.viewed.retain_known(ids);
        report
    }
}

fn upgrade_v1(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if let Some(Value::Object(usage)) = obj.get("usage") {
        let mut ledger = UsageLedger::default();
        for (name, count) in usage {
            let invocation_count = count
                .as_u64()
                .or_else(|| count.get("invocation_count").and_then(Value::as_u64))
                .unwrap_or(0);
            ledger.insert(
                name.clone(),
                UsageRecord {
                    invocation_count,
                    last_invoked_at: None,
                },
            );
        }
        if let Ok(upgraded) = serde_json::to_value(ledger) {
            obj.insert("usage".to_string(), upgraded);
        }
    }
    obj.insert("version".to_string(), Value::from(STATE_VERSION));
}

pub trait Store {
    fn load(&self) -> Result<Option<StoredState>, StoreError>;
    fn save(&self, state: &StoredState) -> Result<(), StoreError>;
    fn describe(&self) -> String;
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::data_dir().context("Could not determine data directory")?;
        Ok(base.join("mxsite").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Option<StoredState>, StoreError> {
        if !self.path.exists() {
            tracing::debug!("No state file at {:?}", self.path);
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let (state, upgraded_from) = StoredState::parse(&raw)?;
        if let Some(version) = upgraded_from {
            tracing::info!("Upgraded state file from version {version}");
        }
        Ok(Some(state))
    }

    fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        tracing::debug!("State saved to {:?}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_raw(raw: &str) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.to_string()))),
        }
    }

    #[cfg(test)]
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Option<StoredState>, StoreError> {
        match self.lock().as_deref() {
            Some(raw) => Ok(Some(StoredState::parse(raw)?.0)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)?;
        *self.lock() = Some(raw);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
