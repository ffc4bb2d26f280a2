use crate::atomic_file;
use crate::baseline::AppliedConfig;
use crate::model::{PeerReplica, PeerReplicaSet, Sizing, TargetConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{fs, io};

/// BaselineStore is the durable mirror of the in-memory baseline.
///
/// Disk interaction is synchronous. The baseline is a few hundred bytes written at most once per
/// poll interval.
pub trait BaselineStore: Send {
    /// Returns `Ok(None)` if nothing has ever been stored.
    fn load(&self) -> Result<Option<AppliedConfig>, StoreError>;

    fn save(&mut self, baseline: &AppliedConfig) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("baseline I/O failure")]
    Io(#[from] io::Error),
    #[error("baseline is not valid JSON")]
    Decode(#[from] serde_json::Error),
    #[error("baseline is malformed: {0}")]
    Malformed(String),
}

// -- JsonFileBaselineStore --

/// JsonFileBaselineStore keeps the baseline as a JSON document:
///
/// ```text
/// {
///   "inited": true,
///   "root_auth": "...",
///   "resource": { "cache_size": 58720256, "write_buffer_size": 8388608 },
///   "updated": "2026-10-16T08:00:00Z",
///   "reps": [ { "id": 1, "role": "mirror", "host": "10.0.0.2", "port": 8888 } ]
/// }
/// ```
///
/// Budget deployments store `"resource": { "memory_budget": ... }` instead. Sizes are bytes.
pub struct JsonFileBaselineStore {
    path: PathBuf,
}

impl JsonFileBaselineStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileBaselineStore {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BaselineStore for JsonFileBaselineStore {
    fn load(&self) -> Result<Option<AppliedConfig>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        let record: BaselineRecord = serde_json::from_slice(&bytes)?;
        record.into_applied_config().map(Some)
    }

    fn save(&mut self, baseline: &AppliedConfig) -> Result<(), StoreError> {
        let record = BaselineRecord::from(baseline);
        let bytes = serde_json::to_vec_pretty(&record)?;
        atomic_file::write_atomically(&self.path, &bytes)?;

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BaselineRecord {
    inited: bool,
    #[serde(default)]
    root_auth: String,
    #[serde(default)]
    resource: ResourceRecord,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
    #[serde(default)]
    reps: Vec<PeerReplica>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    write_buffer_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_budget: Option<u64>,
}

impl BaselineRecord {
    fn into_applied_config(self) -> Result<AppliedConfig, StoreError> {
        // An uninitialized record carries nothing worth comparing against.
        if !self.inited {
            return Ok(AppliedConfig::empty());
        }

        let sizing = match self.resource {
            ResourceRecord {
                cache_size: Some(cache_size_bytes),
                write_buffer_size: Some(write_buffer_size_bytes),
                memory_budget: None,
            } => Sizing::LevelDb {
                cache_size_bytes,
                write_buffer_size_bytes,
            },
            ResourceRecord {
                cache_size: None,
                write_buffer_size: None,
                memory_budget: Some(memory_budget_bytes),
            } => Sizing::Budget { memory_budget_bytes },
            other => {
                return Err(StoreError::Malformed(format!(
                    "resource block mixes or lacks sizing fields: {:?}",
                    other
                )))
            }
        };

        Ok(AppliedConfig {
            initialized: true,
            config: Some(TargetConfig {
                sizing,
                auth_secret: self.root_auth,
                peer_replicas: PeerReplicaSet::new(self.reps),
            }),
            applied_at: self.updated,
        })
    }
}

impl From<&AppliedConfig> for BaselineRecord {
    fn from(baseline: &AppliedConfig) -> Self {
        let mut record = BaselineRecord {
            inited: baseline.initialized,
            root_auth: String::new(),
            resource: ResourceRecord::default(),
            updated: baseline.applied_at,
            reps: vec![],
        };

        if let Some(config) = &baseline.config {
            record.root_auth = config.auth_secret.clone();
            record.reps = config.peer_replicas.iter().cloned().collect();
            match config.sizing {
                Sizing::LevelDb {
                    cache_size_bytes,
                    write_buffer_size_bytes,
                } => {
                    record.resource.cache_size = Some(cache_size_bytes);
                    record.resource.write_buffer_size = Some(write_buffer_size_bytes);
                }
                Sizing::Budget { memory_budget_bytes } => {
                    record.resource.memory_budget = Some(memory_budget_bytes);
                }
            }
        }

        record
    }
}

// -- InMemoryBaselineStore --

/// InMemoryBaselineStore is a volatile store. Clones share state, so a test can keep one handle
/// and give the other to the controller.
#[derive(Clone, Default)]
pub struct InMemoryBaselineStore {
    inner: Arc<Mutex<InMemoryInner>>,
}

#[derive(Default)]
struct InMemoryInner {
    baseline: Option<AppliedConfig>,
    fail_saves: bool,
    loads: usize,
    saves: usize,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        InMemoryBaselineStore::default()
    }

    pub fn with_baseline(baseline: AppliedConfig) -> Self {
        let store = InMemoryBaselineStore::new();
        store.set(baseline);
        store
    }

    pub fn set(&self, baseline: AppliedConfig) {
        self.lock().baseline = Some(baseline);
    }

    pub fn current(&self) -> Option<AppliedConfig> {
        self.lock().baseline.clone()
    }

    /// While set, every `save()` fails with an I/O error and stores nothing.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryInner> {
        // A poisoned lock only means a test panicked mid-update. The data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn load(&self) -> Result<Option<AppliedConfig>, StoreError> {
        let mut inner = self.lock();
        inner.loads += 1;
        Ok(inner.baseline.clone())
    }

    fn save(&mut self, baseline: &AppliedConfig) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.saves += 1;
        if inner.fail_saves {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected save failure",
            )));
        }
        inner.baseline = Some(baseline.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReplicaId, ReplicaRole, MIB};

    fn applied(sizing: Sizing) -> AppliedConfig {
        AppliedConfig {
            initialized: true,
            config: Some(TargetConfig {
                sizing,
                auth_secret: "s3cret".to_string(),
                peer_replicas: PeerReplicaSet::new(vec![PeerReplica {
                    id: ReplicaId::new(2),
                    role: ReplicaRole::Mirror,
                    host: "10.0.0.2".to_string(),
                    port: 8888,
                }]),
            }),
            applied_at: Some(Utc::now()),
        }
    }

    #[test]
    fn missing_file_is_no_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileBaselineStore::new(dir.path().join("init_option.json"));

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_both_dialects() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileBaselineStore::new(dir.path().join("etc/init_option.json"));

        for sizing in vec![
            Sizing::LevelDb {
                cache_size_bytes: 56 * MIB,
                write_buffer_size_bytes: 8 * MIB,
            },
            Sizing::Budget {
                memory_budget_bytes: 512 * MIB,
            },
        ] {
            let baseline = applied(sizing);
            store.save(&baseline).unwrap();
            assert_eq!(store.load().unwrap(), Some(baseline));
        }
    }

    #[test]
    fn written_document_uses_durable_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init_option.json");
        let mut store = JsonFileBaselineStore::new(&path);

        store
            .save(&applied(Sizing::LevelDb {
                cache_size_bytes: 56 * MIB,
                write_buffer_size_bytes: 8 * MIB,
            }))
            .unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["inited"], true);
        assert_eq!(doc["root_auth"], "s3cret");
        assert_eq!(doc["resource"]["cache_size"], 56 * MIB);
        assert_eq!(doc["resource"]["write_buffer_size"], 8 * MIB);
        assert!(doc["resource"].get("memory_budget").is_none());
        assert_eq!(doc["reps"][0]["role"], "mirror");
        assert!(doc["updated"].is_string());
    }

    #[test]
    fn loads_legacy_document_without_replicas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init_option.json");
        fs::write(
            &path,
            r#"{
              "inited": true,
              "root_auth": "legacy",
              "resource": { "cache_size": 16777216, "write_buffer_size": 8388608 },
              "updated": "2019-03-01T10:00:00Z"
            }"#,
        )
        .unwrap();

        let baseline = JsonFileBaselineStore::new(&path).load().unwrap().unwrap();

        assert!(baseline.initialized);
        let config = baseline.config.unwrap();
        assert_eq!(config.auth_secret, "legacy");
        assert!(config.peer_replicas.is_empty());
    }

    #[test]
    fn uninitialized_document_is_empty_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init_option.json");
        fs::write(&path, r#"{ "inited": false, "root_auth": "x" }"#).unwrap();

        let baseline = JsonFileBaselineStore::new(&path).load().unwrap();

        assert_eq!(baseline, Some(AppliedConfig::empty()));
    }

    #[test]
    fn corrupt_documents_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init_option.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileBaselineStore::new(&path).load(),
            Err(StoreError::Decode(_))
        ));

        fs::write(&path, r#"{ "inited": true, "resource": { "cache_size": 1 } }"#).unwrap();
        assert!(matches!(
            JsonFileBaselineStore::new(&path).load(),
            Err(StoreError::Malformed(_))
        ));
    }
}
