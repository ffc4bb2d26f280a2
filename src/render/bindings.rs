use crate::model::{PeerReplica, Sizing, TargetConfig, MIB};
use std::collections::BTreeMap;

pub(crate) const KEY_PROJECT_PREFIX: &str = "project_prefix";
pub(crate) const KEY_SERVER_AUTH: &str = "server_auth";
pub(crate) const KEY_LEVELDB_CACHE_SIZE: &str = "leveldb_cache_size";
pub(crate) const KEY_LEVELDB_WRITE_BUFFER_SIZE: &str = "leveldb_write_buffer_size";
pub(crate) const KEY_LEVELDB_COMPRESSION: &str = "leveldb_compression";
pub(crate) const KEY_MEMORY_BUDGET: &str = "memory_budget";
pub(crate) const KEY_REPLICAS: &str = "replicas";
pub(crate) const KEY_REPLICATION_ENABLED: &str = "replication_enabled";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindingValue {
    Text(String),
    Integer(u64),
    Flag(bool),
    Peers(Vec<PeerReplica>),
}

impl BindingValue {
    /// Decimal for integers, `yes`/`no` for flags. Lists have no scalar form.
    pub(crate) fn format(&self) -> Option<String> {
        match self {
            BindingValue::Text(s) => Some(s.clone()),
            BindingValue::Integer(i) => Some(i.to_string()),
            BindingValue::Flag(true) => Some("yes".to_string()),
            BindingValue::Flag(false) => Some("no".to_string()),
            BindingValue::Peers(_) => None,
        }
    }

    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            BindingValue::Text(s) => !s.is_empty(),
            BindingValue::Integer(i) => *i != 0,
            BindingValue::Flag(b) => *b,
            BindingValue::Peers(peers) => !peers.is_empty(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, BindingValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// The full binding set for one target config. Sizes are in MiB, the store's native unit.
    pub fn for_target(project_prefix: &str, target: &TargetConfig) -> Self {
        let mut bindings = Bindings::new();
        bindings.insert(KEY_PROJECT_PREFIX, BindingValue::Text(project_prefix.to_string()));
        bindings.insert(KEY_SERVER_AUTH, BindingValue::Text(target.auth_secret.clone()));

        match target.sizing {
            Sizing::LevelDb {
                cache_size_bytes,
                write_buffer_size_bytes,
            } => {
                bindings.insert(KEY_LEVELDB_CACHE_SIZE, BindingValue::Integer(cache_size_bytes / MIB));
                bindings.insert(
                    KEY_LEVELDB_WRITE_BUFFER_SIZE,
                    BindingValue::Integer(write_buffer_size_bytes / MIB),
                );
            }
            Sizing::Budget { memory_budget_bytes } => {
                bindings.insert(KEY_MEMORY_BUDGET, BindingValue::Integer(memory_budget_bytes / MIB));
            }
        }

        bindings.insert(KEY_LEVELDB_COMPRESSION, BindingValue::Flag(false));
        bindings.insert(
            KEY_REPLICAS,
            BindingValue::Peers(target.peer_replicas.iter().cloned().collect()),
        );
        bindings.insert(KEY_REPLICATION_ENABLED, BindingValue::Flag(target.replication_enabled()));

        bindings
    }

    pub fn insert(&mut self, key: &str, value: BindingValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&BindingValue> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PeerReplicaSet, ReplicaId, ReplicaRole};

    #[test]
    fn leveldb_bindings() {
        let target = TargetConfig {
            sizing: Sizing::LevelDb {
                cache_size_bytes: 56 * MIB,
                write_buffer_size_bytes: 8 * MIB,
            },
            auth_secret: "x".to_string(),
            peer_replicas: PeerReplicaSet::default(),
        };

        let b = Bindings::for_target("/home/action/apps/ssdb", &target);

        assert_eq!(b.get(KEY_PROJECT_PREFIX), Some(&BindingValue::Text("/home/action/apps/ssdb".into())));
        assert_eq!(b.get(KEY_SERVER_AUTH), Some(&BindingValue::Text("x".into())));
        assert_eq!(b.get(KEY_LEVELDB_CACHE_SIZE), Some(&BindingValue::Integer(56)));
        assert_eq!(b.get(KEY_LEVELDB_WRITE_BUFFER_SIZE), Some(&BindingValue::Integer(8)));
        assert_eq!(b.get(KEY_LEVELDB_COMPRESSION).and_then(|v| v.format()), Some("no".to_string()));
        assert_eq!(b.get(KEY_REPLICATION_ENABLED), Some(&BindingValue::Flag(false)));
        assert_eq!(b.get(KEY_REPLICAS), Some(&BindingValue::Peers(vec![])));
        assert_eq!(b.get(KEY_MEMORY_BUDGET), None);
    }

    #[test]
    fn budget_bindings_with_replication() {
        let peer = PeerReplica {
            id: ReplicaId::new(3),
            role: ReplicaRole::Mirror,
            host: "10.0.0.3".to_string(),
            port: 6379,
        };
        let target = TargetConfig {
            sizing: Sizing::Budget {
                memory_budget_bytes: 512 * MIB,
            },
            auth_secret: "x".to_string(),
            peer_replicas: PeerReplicaSet::new(vec![peer.clone()]),
        };

        let b = Bindings::for_target("/opt", &target);

        assert_eq!(b.get(KEY_MEMORY_BUDGET), Some(&BindingValue::Integer(512)));
        assert_eq!(b.get(KEY_LEVELDB_CACHE_SIZE), None);
        assert_eq!(b.get(KEY_REPLICATION_ENABLED).and_then(|v| v.format()), Some("yes".to_string()));
        assert_eq!(b.get(KEY_REPLICAS), Some(&BindingValue::Peers(vec![peer])));
    }
}
