use crate::model::{DesiredState, OptionValue, PeerEndpoint, ReplicaId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io;
use std::path::{Path, PathBuf};

/// SpecSource supplies the desired state of the managed store.
#[async_trait::async_trait]
pub trait SpecSource: Send + Sync {
    /// A cheap "last modified" marker. The control loop skips a cycle entirely if this hasn't
    /// moved past the last watermark it fully processed.
    async fn watermark(&self) -> Result<DateTime<Utc>, SourceError>;

    async fn fetch(&self) -> Result<DesiredState, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read pod descriptor '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("pod descriptor is not valid JSON")]
    Decode(#[from] serde_json::Error),
    #[error("pod descriptor has no spec.box.resources block")]
    MissingResources,
    #[error("no app in the pod descriptor carries option group '{0}'")]
    MissingOptionGroup(String),
}

/// PodFileSource reads the pod descriptor that the orchestrator drops into the container. The
/// watermark is the file's mtime.
pub struct PodFileSource {
    path: PathBuf,
    option_group: String,
}

impl PodFileSource {
    pub fn new<P: AsRef<Path>>(path: P, option_group: &str) -> Self {
        PodFileSource {
            path: path.as_ref().to_path_buf(),
            option_group: option_group.to_string(),
        }
    }

    fn io_error(&self, source: io::Error) -> SourceError {
        SourceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl SpecSource for PodFileSource {
    async fn watermark(&self) -> Result<DateTime<Utc>, SourceError> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| self.io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.io_error(e))?;

        Ok(DateTime::<Utc>::from(modified))
    }

    async fn fetch(&self) -> Result<DesiredState, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| self.io_error(e))?;
        let pod: PodDocument = serde_json::from_slice(&bytes)?;

        pod.into_desired_state(&self.option_group)
    }
}

// -- pod descriptor schema --
//
// Only the fields the controller reads. Everything else in the descriptor is ignored.

#[derive(Deserialize)]
struct PodDocument {
    #[serde(default)]
    spec: Option<PodSpec>,
    #[serde(default)]
    apps: Vec<AppDocument>,
}

#[derive(Deserialize)]
struct PodSpec {
    #[serde(rename = "box", default)]
    box_spec: Option<BoxSpec>,
}

#[derive(Deserialize)]
struct BoxSpec {
    #[serde(default)]
    resources: Option<ResourcesSpec>,
}

#[derive(Deserialize)]
struct ResourcesSpec {
    #[serde(default)]
    mem_limit: i64,
}

#[derive(Deserialize)]
struct AppDocument {
    #[serde(default)]
    operate: AppOperate,
}

#[derive(Default, Deserialize)]
struct AppOperate {
    #[serde(default)]
    options: Vec<OptionGroup>,
    #[serde(default)]
    replicas: Vec<ReplicaDocument>,
}

#[derive(Deserialize)]
struct OptionGroup {
    name: String,
    #[serde(default)]
    items: Vec<OptionItem>,
}

#[derive(Deserialize)]
struct OptionItem {
    name: String,
    value: OptionValue,
}

#[derive(Deserialize)]
struct ReplicaDocument {
    id: u32,
    host: String,
    port: u16,
}

impl PodDocument {
    fn into_desired_state(self, option_group: &str) -> Result<DesiredState, SourceError> {
        let resources = self
            .spec
            .and_then(|spec| spec.box_spec)
            .and_then(|box_spec| box_spec.resources)
            .ok_or(SourceError::MissingResources)?;
        // The orchestrator writes 0 or a negative number for "unlimited/unset".
        let memory_limit_bytes = u64::try_from(resources.mem_limit).unwrap_or(0);

        // First app carrying the group wins.
        let (group, replicas) = self
            .apps
            .into_iter()
            .find_map(|app| {
                let AppOperate { options, replicas } = app.operate;
                options
                    .into_iter()
                    .find(|group| group.name == option_group)
                    .map(|group| (group, replicas))
            })
            .ok_or_else(|| SourceError::MissingOptionGroup(option_group.to_string()))?;

        let options: HashMap<String, OptionValue> =
            group.items.into_iter().map(|item| (item.name, item.value)).collect();

        let peers = replicas
            .into_iter()
            .map(|r| PeerEndpoint {
                id: ReplicaId::new(r.id),
                host: r.host,
                port: r.port,
            })
            .collect();

        Ok(DesiredState {
            memory_limit_bytes,
            options,
            peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GROUP: &str = "cfg/ssdb-x1";

    fn write_pod(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("pod_instance.json");
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn decodes_resources_options_and_replicas() {
        // -- setup --
        let dir = tempfile::tempdir().unwrap();
        let path = write_pod(
            dir.path(),
            r#"{
              "meta": { "id": "ignored" },
              "spec": { "box": { "resources": { "mem_limit": 1073741824, "cpu_limit": 2 } } },
              "apps": [
                { "operate": { "options": [ { "name": "cfg/other", "items": [] } ] } },
                {
                  "operate": {
                    "options": [
                      {
                        "name": "cfg/ssdb-x1",
                        "items": [
                          { "name": "server_auth", "value": "s3cret" },
                          { "name": "cache_size", "value": "50" },
                          { "name": "write_buffer_size", "value": 64 }
                        ]
                      }
                    ],
                    "replicas": [
                      { "id": 0, "host": "10.0.0.1", "port": 8888 },
                      { "id": 1, "host": "10.0.0.2", "port": 8888 }
                    ]
                  }
                }
              ]
            }"#,
        );
        let source = PodFileSource::new(&path, GROUP);

        // -- execute --
        let desired = source.fetch().await.unwrap();

        // -- verify --
        assert_eq!(desired.memory_limit_bytes, 1 << 30);
        assert_eq!(desired.option("server_auth"), Some(&OptionValue::from("s3cret")));
        assert_eq!(desired.option("cache_size").and_then(|v| v.as_i64()), Some(50));
        assert_eq!(desired.option("write_buffer_size"), Some(&OptionValue::from(64i64)));
        assert_eq!(
            desired.peers,
            vec![
                PeerEndpoint {
                    id: ReplicaId::new(0),
                    host: "10.0.0.1".to_string(),
                    port: 8888,
                },
                PeerEndpoint {
                    id: ReplicaId::new(1),
                    host: "10.0.0.2".to_string(),
                    port: 8888,
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_resources_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pod(dir.path(), r#"{ "spec": { "box": {} }, "apps": [] }"#);

        let result = PodFileSource::new(&path, GROUP).fetch().await;

        assert!(matches!(result, Err(SourceError::MissingResources)));
    }

    #[tokio::test]
    async fn missing_option_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pod(
            dir.path(),
            r#"{
              "spec": { "box": { "resources": { "mem_limit": 1024 } } },
              "apps": [ { "operate": { "options": [ { "name": "cfg/other" } ] } } ]
            }"#,
        );

        let result = PodFileSource::new(&path, GROUP).fetch().await;

        assert!(matches!(result, Err(SourceError::MissingOptionGroup(ref g)) if g == GROUP));
    }

    #[tokio::test]
    async fn negative_memory_limit_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pod(
            dir.path(),
            r#"{
              "spec": { "box": { "resources": { "mem_limit": -1 } } },
              "apps": [ { "operate": { "options": [ { "name": "cfg/ssdb-x1", "items": [] } ] } } ]
            }"#,
        );

        let desired = PodFileSource::new(&path, GROUP).fetch().await.unwrap();

        assert_eq!(desired.memory_limit_bytes, 0);
        assert!(desired.peers.is_empty());
    }

    #[tokio::test]
    async fn unreadable_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let source = PodFileSource::new(&path, GROUP);

        assert!(matches!(source.watermark().await, Err(SourceError::Io { .. })));
        assert!(matches!(source.fetch().await, Err(SourceError::Io { .. })));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(source.fetch().await, Err(SourceError::Decode(_))));
    }

    #[tokio::test]
    async fn watermark_is_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pod(dir.path(), "{}");

        let watermark = PodFileSource::new(&path, GROUP).watermark().await.unwrap();

        let mtime = DateTime::<Utc>::from(fs::metadata(&path).unwrap().modified().unwrap());
        assert_eq!(watermark, mtime);
    }
}
