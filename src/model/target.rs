use crate::model::PeerReplicaSet;

pub const MIB: u64 = 1024 * 1024;

/// TargetConfig is the normalized configuration derived from a `DesiredState`. It is what we
/// render and what we compare against the last-applied baseline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetConfig {
    pub sizing: Sizing,
    pub auth_secret: String,
    pub peer_replicas: PeerReplicaSet,
}

impl TargetConfig {
    pub fn replication_enabled(&self) -> bool {
        !self.peer_replicas.is_empty()
    }
}

/// Sizing strategies are mutually exclusive and depend on the deployment's sizing dialect.
/// All values are in bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Sizing {
    LevelDb {
        cache_size_bytes: u64,
        write_buffer_size_bytes: u64,
    },
    Budget {
        memory_budget_bytes: u64,
    },
}
