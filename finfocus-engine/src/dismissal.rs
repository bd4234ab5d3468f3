//! # Dismissal Store (C3)
//!
//! Durable mapping from `recommendationId` to `DismissalRecord`, persisted
//! as a single versioned JSON document. Every mutating operation saves
//! atomically (write-to-temp + rename) so a crash mid-write never
//! corrupts the file. Callers are expected to serialize mutations
//! themselves; reads are cheap in-memory snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const CURRENT_VERSION: u32 = 1;

/// Lifecycle state of a recommendation's dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissalStatus {
    Active,
    Dismissed,
    Snoozed,
}

/// One recorded transition in a record's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub action: String,
    #[serde(default)]
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A snapshot of the recommendation's description/savings/type/resource at
/// the moment it was dismissed, kept so the dismissal reason stays legible
/// even if the plugin stops reporting the recommendation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastKnown {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_savings: f64,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub resource_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub recommendation_id: String,
    pub status: DismissalStatus,
    pub reason: String,
    #[serde(default)]
    pub custom_reason: String,
    pub dismissed_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub dismissed_by: String,
    #[serde(default)]
    pub last_known: LastKnown,
    #[serde(default)]
    pub history: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedDocument {
    version: u32,
    records: HashMap<String, DismissalRecord>,
}

impl Default for PersistedDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            records: HashMap::new(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DismissalStoreError {
    #[error("dismissed.json has unsupported version {0}, expected {CURRENT_VERSION}")]
    UnsupportedVersion(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cannot snooze with expiresAt in the past or absent")]
    InvalidSnoozeExpiry,
    #[error("reason \"Other\" requires a non-empty customReason")]
    MissingCustomReason,
}

/// Single-writer-semantics store over `<config-dir>/dismissed.json`.
/// Readers take a snapshot under a shared lock; every mutation persists
/// before returning.
pub struct DismissalStore {
    path: PathBuf,
    records: RwLock<HashMap<String, DismissalRecord>>,
}

impl DismissalStore {
    /// Load the store from `config_dir/dismissed.json`, creating an empty
    /// in-memory document if the file does not yet exist.
    pub fn load(config_dir: &Path) -> Result<Self, DismissalStoreError> {
        let path = config_dir.join("dismissed.json");
        let doc = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let doc: PersistedDocument = serde_json::from_str(&content)?;
            if doc.version > CURRENT_VERSION {
                return Err(DismissalStoreError::UnsupportedVersion(doc.version));
            }
            doc
        } else {
            PersistedDocument::default()
        };

        let store = Self {
            path,
            records: RwLock::new(doc.records),
        };
        store.clean_expired_snoozes()?;
        Ok(store)
    }

    fn save(&self) -> Result<(), DismissalStoreError> {
        let doc = PersistedDocument {
            version: CURRENT_VERSION,
            records: self.records.read().unwrap().clone(),
        };
        let content = serde_json::to_string_pretty(&doc)?;

        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("dismissed.json")
        ));
        std::fs::write(&tmp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Upsert a record and persist.
    pub fn set(&self, record: DismissalRecord) -> Result<(), DismissalStoreError> {
        self.records
            .write()
            .unwrap()
            .insert(record.recommendation_id.clone(), record);
        self.save()
    }

    pub fn get(&self, id: &str) -> Option<DismissalRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Remove a record from the active map. Callers must have already
    /// appended the terminal lifecycle event and persisted it via `set`
    /// before calling this (history is preserved up to the point of
    /// deletion, then the record itself is dropped).
    pub fn delete(&self, id: &str) -> Result<(), DismissalStoreError> {
        self.records.write().unwrap().remove(id);
        self.save()
    }

    /// Ids currently `Dismissed` or `Snoozed`; consumers filter
    /// recommendations out by default using this set.
    pub fn get_dismissed_ids(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap()
            .values()
            .filter(|r| matches!(r.status, DismissalStatus::Dismissed | DismissalStatus::Snoozed))
            .map(|r| r.recommendation_id.clone())
            .collect()
    }

    pub fn get_all_records(&self) -> HashMap<String, DismissalRecord> {
        self.records.read().unwrap().clone()
    }

    /// Transition a record to `Dismissed`, appending a lifecycle event.
    pub fn dismiss(
        &self,
        id: &str,
        reason: &str,
        custom_reason: &str,
        dismissed_by: &str,
        now: DateTime<Utc>,
        last_known: LastKnown,
    ) -> Result<DismissalRecord, DismissalStoreError> {
        if reason == "Other" && custom_reason.is_empty() {
            return Err(DismissalStoreError::MissingCustomReason);
        }

        let mut records = self.records.write().unwrap();
        let mut record = records.get(id).cloned().unwrap_or(DismissalRecord {
            recommendation_id: id.to_string(),
            status: DismissalStatus::Active,
            reason: String::new(),
            custom_reason: String::new(),
            dismissed_at: now,
            expires_at: None,
            dismissed_by: dismissed_by.to_string(),
            last_known: last_known.clone(),
            history: Vec::new(),
        });

        record.status = DismissalStatus::Dismissed;
        record.reason = reason.to_string();
        record.custom_reason = custom_reason.to_string();
        record.dismissed_at = now;
        record.expires_at = None;
        record.dismissed_by = dismissed_by.to_string();
        record.last_known = last_known;
        record.history.push(LifecycleEvent {
            action: "dismiss".to_string(),
            reason: reason.to_string(),
            timestamp: now,
            expires_at: None,
        });

        records.insert(id.to_string(), record.clone());
        drop(records);
        self.save()?;
        Ok(record)
    }

    /// Transition a record to `Snoozed`. Rejects `expires_at <= now`.
    pub fn snooze(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        dismissed_by: &str,
        last_known: LastKnown,
    ) -> Result<DismissalRecord, DismissalStoreError> {
        if expires_at <= now {
            return Err(DismissalStoreError::InvalidSnoozeExpiry);
        }

        let mut records = self.records.write().unwrap();
        let mut record = records.get(id).cloned().unwrap_or(DismissalRecord {
            recommendation_id: id.to_string(),
            status: DismissalStatus::Active,
            reason: String::new(),
            custom_reason: String::new(),
            dismissed_at: now,
            expires_at: None,
            dismissed_by: dismissed_by.to_string(),
            last_known: last_known.clone(),
            history: Vec::new(),
        });

        record.status = DismissalStatus::Snoozed;
        record.expires_at = Some(expires_at);
        record.dismissed_by = dismissed_by.to_string();
        record.last_known = last_known;
        record.history.push(LifecycleEvent {
            action: "snooze".to_string(),
            reason: String::new(),
            timestamp: now,
            expires_at: Some(expires_at),
        });

        records.insert(id.to_string(), record.clone());
        drop(records);
        self.save()?;
        Ok(record)
    }

    /// Undismiss: appends a terminal history event, persists it, then
    /// deletes the record from the active map.
    pub fn undismiss(&self, id: &str, now: DateTime<Utc>) -> Result<(), DismissalStoreError> {
        {
            let mut records = self.records.write().unwrap();
            if let Some(record) = records.get_mut(id) {
                record.history.push(LifecycleEvent {
                    action: "undismiss".to_string(),
                    reason: String::new(),
                    timestamp: now,
                    expires_at: None,
                });
            } else {
                return Ok(());
            }
        }
        self.save()?;
        self.delete(id)
    }

    /// Transition any `Snoozed` record whose `expires_at <= now` back to
    /// `Active`, appending a synthetic `expired` lifecycle event.
    pub fn clean_expired_snoozes(&self) -> Result<Vec<String>, DismissalStoreError> {
        self.clean_expired_snoozes_at(Utc::now())
    }

    /// Testable variant that takes an explicit `now`.
    pub fn clean_expired_snoozes_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DismissalStoreError> {
        let mut expired = Vec::new();
        {
            let mut records = self.records.write().unwrap();
            for record in records.values_mut() {
                if record.status == DismissalStatus::Snoozed {
                    if let Some(expires_at) = record.expires_at {
                        if expires_at <= now {
                            record.status = DismissalStatus::Active;
                            record.expires_at = None;
                            record.history.push(LifecycleEvent {
                                action: "expired".to_string(),
                                reason: String::new(),
                                timestamp: now,
                                expires_at: None,
                            });
                            expired.push(record.recommendation_id.clone());
                        }
                    }
                }
            }
        }
        if !expired.is_empty() {
            self.save()?;
        }
        Ok(expired)
    }
}
