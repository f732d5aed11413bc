//! Persisted baseline and conflict ledgers
//!
//! Both ledgers are JSON documents under the state directory, replaced
//! atomically on every save so a reader never sees a half-written ledger.
//! Writers hold a [`LedgerLock`] across the whole load-modify-save.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};

use chrono::{DateTime, Utc};
use envsync_fs::{Fingerprint, NormalizedPath};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Conflict;
use crate::model::{ItemRef, ItemValue};
use crate::Result;

const LEDGER_VERSION: &str = "1";

fn load_json<T: DeserializeOwned + Default>(path: &NormalizedPath) -> Result<T> {
    let native = path.to_native();
    let content = match std::fs::read_to_string(&native) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(envsync_fs::Error::io(&native, e).into()),
    };
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn save_json<T: Serialize>(path: &NormalizedPath, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    envsync_fs::io::write_atomic(path, &content)?;
    Ok(())
}

/// Exclusive lock on a ledger's `<file>.lock` sidecar.
///
/// Saves replace the ledger file by rename, so the lock lives next to it
/// rather than on it. Released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    _file: File,
}

impl LedgerLock {
    /// Block until the lock for the ledger at `ledger` is free.
    pub fn acquire(ledger: &NormalizedPath) -> Result<Self> {
        let sidecar = NormalizedPath::new(format!("{}.lock", ledger.as_str())).to_native();
        if let Some(parent) = sidecar.parent() {
            std::fs::create_dir_all(parent).map_err(|e| envsync_fs::Error::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&sidecar)
            .map_err(|e| envsync_fs::Error::io(&sidecar, e))?;
        file.lock_exclusive()
            .map_err(|e| envsync_fs::Error::io(&sidecar, e))?;
        Ok(Self { _file: file })
    }
}

/// Last known-synchronized state of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    /// Fingerprint of the destination value; `None` means the item was absent
    pub fingerprint: Option<Fingerprint>,
    /// The value itself, kept so conflicts can show what changed
    #[serde(default)]
    pub value: Option<ItemValue>,
    pub recorded_at: DateTime<Utc>,
}

impl BaselineEntry {
    pub fn new(fingerprint: Option<Fingerprint>, value: Option<ItemValue>) -> Self {
        Self {
            fingerprint,
            value,
            recorded_at: Utc::now(),
        }
    }
}

/// Baselines keyed by item reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineLedger {
    version: String,
    entries: BTreeMap<String, BaselineEntry>,
}

impl Default for BaselineLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineLedger {
    pub fn new() -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the ledger; a missing file is an empty ledger.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        save_json(path, self)
    }

    pub fn get(&self, item: &ItemRef) -> Option<&BaselineEntry> {
        self.entries.get(&item.to_string())
    }

    pub fn record(&mut self, item: &ItemRef, entry: BaselineEntry) {
        self.entries.insert(item.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every conflict ever detected, in detection order.
///
/// Conflicts are never removed; a resolved conflict stays as a record of
/// the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLedger {
    version: String,
    conflicts: Vec<Conflict>,
}

impl Default for ConflictLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictLedger {
    pub fn new() -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            conflicts: Vec::new(),
        }
    }

    /// Load the ledger; a missing file is an empty ledger.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        save_json(path, self)
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Conflicts still waiting for a decision.
    pub fn unresolved(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| !c.resolved)
    }

    pub fn add(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn get(&self, id: Uuid) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Conflict> {
        self.conflicts.iter_mut().find(|c| c.id == id)
    }

    /// Most recent conflict on `item` recorded against the destination
    /// value with `fingerprint` and the current `baseline` entry.
    ///
    /// Without a baseline no conflict applies.
    pub fn for_destination(
        &self,
        item: &ItemRef,
        fingerprint: Option<&Fingerprint>,
        baseline: Option<&BaselineEntry>,
    ) -> Option<&Conflict> {
        let baseline = baseline?;
        self.conflicts
            .iter()
            .rev()
            .find(|c| &c.item_ref == item && c.applies_to(fingerprint, baseline))
    }
}
