use serde::{Deserialize, Serialize};
use std::fmt;

/// ReplicaId identifies one instance of the managed store within the pod's replica topology.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(u32);

impl ReplicaId {
    pub fn new(id: u32) -> Self {
        ReplicaId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    Mirror,
}

impl ReplicaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaRole::Mirror => "mirror",
        }
    }
}

/// PeerReplica is one remote instance we replicate with. Field order matters: the derived `Ord`
/// gives us the canonical order used for set comparison.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PeerReplica {
    pub id: ReplicaId,
    pub role: ReplicaRole,
    pub host: String,
    pub port: u16,
}

/// PeerReplicaSet is an unordered multiset of peer replicas.
///
/// Two sets are equal iff they have the same cardinality and every entry has a matching entry in
/// the other on the full `(id, role, host, port)` tuple. Duplicates are kept, so a duplicated
/// entry only matches a duplicated entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerReplicaSet(Vec<PeerReplica>);

impl PeerReplicaSet {
    pub fn new(replicas: Vec<PeerReplica>) -> Self {
        PeerReplicaSet(replicas)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerReplica> {
        self.0.iter()
    }

    fn canonical(&self) -> Vec<&PeerReplica> {
        let mut sorted: Vec<&PeerReplica> = self.0.iter().collect();
        sorted.sort();
        sorted
    }
}

impl PartialEq for PeerReplicaSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.canonical() == other.canonical()
    }
}

impl Eq for PeerReplicaSet {}

impl From<Vec<PeerReplica>> for PeerReplicaSet {
    fn from(replicas: Vec<PeerReplica>) -> Self {
        PeerReplicaSet::new(replicas)
    }
}
