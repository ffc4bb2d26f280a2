mod desired;
mod peers;
mod target;

pub use desired::DesiredState;
pub use desired::OptionValue;
pub use desired::PeerEndpoint;
pub use peers::PeerReplica;
pub use peers::PeerReplicaSet;
pub use peers::ReplicaId;
pub use peers::ReplicaRole;
pub use target::Sizing;
pub use target::TargetConfig;
pub use target::MIB;
