use crate::deriver::sizing::{align_down, align_up, percent_of, ByteRange};
use crate::model::{DesiredState, PeerReplica, PeerReplicaSet, ReplicaId, ReplicaRole, Sizing, TargetConfig, MIB};
use std::fmt;
use std::str::FromStr;

const OPTION_SERVER_AUTH: &str = "server_auth";
const OPTION_CACHE_SIZE: &str = "cache_size";
const OPTION_WRITE_BUFFER_SIZE: &str = "write_buffer_size";
const OPTION_MEMORY_USAGE_LIMIT: &str = "memory_usage_limit";

const MIN_BUDGET_PERCENTAGE: i64 = 10;
const MAX_BUDGET_PERCENTAGE: i64 = 100;

/// Which sizing strategy the managed store's config file expects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SizingDialect {
    /// Separate block cache and write buffer sizes.
    LevelDb,
    /// A single memory budget as a percentage of the container's memory limit.
    Budget,
}

impl FromStr for SizingDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leveldb" => Ok(SizingDialect::LevelDb),
            "budget" => Ok(SizingDialect::Budget),
            other => Err(format!("unknown sizing dialect '{}', expected 'leveldb' or 'budget'", other)),
        }
    }
}

impl fmt::Display for SizingDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingDialect::LevelDb => write!(f, "leveldb"),
            SizingDialect::Budget => write!(f, "budget"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeriverConfig {
    pub my_replica_id: ReplicaId,
    pub dialect: SizingDialect,
    pub alignment_bytes: u64,
    pub cache_size: ByteRange,
    pub write_buffer_size: ByteRange,
    pub min_memory_budget_bytes: u64,
    pub default_budget_percentage: i64,
}

impl Default for DeriverConfig {
    fn default() -> Self {
        DeriverConfig {
            my_replica_id: ReplicaId::new(0),
            dialect: SizingDialect::LevelDb,
            alignment_bytes: 8 * MIB,
            cache_size: ByteRange::new(16 * MIB, 1024 * MIB),
            write_buffer_size: ByteRange::new(8 * MIB, 128 * MIB),
            min_memory_budget_bytes: 16 * MIB,
            default_budget_percentage: MAX_BUDGET_PERCENTAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DerivationError {
    #[error("option '{}' is missing or empty", OPTION_SERVER_AUTH)]
    MissingAuth,
    #[error("option '{key}' must be a percentage in [10, 100], got {value}")]
    InvalidPercentage { key: &'static str, value: i64 },
    #[error("memory limit of {memory_limit_bytes} bytes cannot fit minimum budget of {minimum_bytes} bytes")]
    InsufficientMemory { memory_limit_bytes: u64, minimum_bytes: u64 },
    #[error("option '{key}' must be a non-negative integer, got {value:?}")]
    InvalidOption { key: &'static str, value: String },
}

/// ConfigDeriver computes the target configuration. It holds no state besides its constants, so
/// the same input always derives the same output, and a failed derivation leaves nothing behind.
#[derive(Clone, Debug)]
pub struct ConfigDeriver {
    config: DeriverConfig,
}

impl ConfigDeriver {
    pub fn new(config: DeriverConfig) -> Self {
        ConfigDeriver { config }
    }

    pub fn dialect(&self) -> SizingDialect {
        self.config.dialect
    }

    pub fn derive(&self, desired: &DesiredState) -> Result<TargetConfig, DerivationError> {
        let auth_secret = Self::auth_secret(desired)?;

        let sizing = match self.config.dialect {
            SizingDialect::LevelDb => Sizing::LevelDb {
                cache_size_bytes: self.cache_size(desired)?,
                write_buffer_size_bytes: self.write_buffer_size(desired)?,
            },
            SizingDialect::Budget => Sizing::Budget {
                memory_budget_bytes: self.memory_budget(desired)?,
            },
        };

        Ok(TargetConfig {
            sizing,
            auth_secret,
            peer_replicas: self.peer_replicas(desired),
        })
    }

    fn auth_secret(desired: &DesiredState) -> Result<String, DerivationError> {
        match desired.option(OPTION_SERVER_AUTH).map(|v| v.as_text()) {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(DerivationError::MissingAuth),
        }
    }

    /// `floor(memory * pct / 100) / 10`, rounded up to alignment, then clamped.
    fn cache_size(&self, desired: &DesiredState) -> Result<u64, DerivationError> {
        let cache_size = match Self::non_negative_option(desired, OPTION_CACHE_SIZE)? {
            Some(pct) => percent_of(desired.memory_limit_bytes, pct) / 10,
            None => self.config.cache_size.min,
        };
        let cache_size = align_up(cache_size, self.config.alignment_bytes);

        Ok(self.config.cache_size.clamp(cache_size))
    }

    /// Write buffer rounds *down* (unlike cache) so it never pushes us past the memory cap.
    fn write_buffer_size(&self, desired: &DesiredState) -> Result<u64, DerivationError> {
        let mut write_buffer_size = match Self::non_negative_option(desired, OPTION_WRITE_BUFFER_SIZE)? {
            Some(mib) => mib.saturating_mul(MIB),
            None => self.config.write_buffer_size.min,
        };

        let cap = desired.memory_limit_bytes / 20;
        if write_buffer_size > cap {
            write_buffer_size = cap;
        }
        let write_buffer_size = align_down(write_buffer_size, self.config.alignment_bytes);

        Ok(self.config.write_buffer_size.clamp(write_buffer_size))
    }

    fn memory_budget(&self, desired: &DesiredState) -> Result<u64, DerivationError> {
        let pct = match desired.option(OPTION_MEMORY_USAGE_LIMIT) {
            Some(value) => value.as_i64().ok_or_else(|| DerivationError::InvalidOption {
                key: OPTION_MEMORY_USAGE_LIMIT,
                value: value.as_text(),
            })?,
            None => self.config.default_budget_percentage,
        };
        if pct < MIN_BUDGET_PERCENTAGE || pct > MAX_BUDGET_PERCENTAGE {
            return Err(DerivationError::InvalidPercentage {
                key: OPTION_MEMORY_USAGE_LIMIT,
                value: pct,
            });
        }

        let minimum = self.config.min_memory_budget_bytes;
        if desired.memory_limit_bytes < minimum {
            return Err(DerivationError::InsufficientMemory {
                memory_limit_bytes: desired.memory_limit_bytes,
                minimum_bytes: minimum,
            });
        }

        let budget = align_up(
            percent_of(desired.memory_limit_bytes, pct as u64),
            self.config.alignment_bytes,
        );

        Ok(budget.max(minimum))
    }

    fn peer_replicas(&self, desired: &DesiredState) -> PeerReplicaSet {
        desired
            .peers
            .iter()
            // Topology sources have been known to list us as our own peer.
            .filter(|peer| peer.id != self.config.my_replica_id)
            .map(|peer| PeerReplica {
                id: peer.id,
                role: ReplicaRole::Mirror,
                host: peer.host.clone(),
                port: peer.port,
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn non_negative_option(desired: &DesiredState, key: &'static str) -> Result<Option<u64>, DerivationError> {
        match desired.option(key) {
            None => Ok(None),
            Some(value) => match value.as_i64() {
                Some(i) if i >= 0 => Ok(Some(i as u64)),
                _ => Err(DerivationError::InvalidOption {
                    key,
                    value: value.as_text(),
                }),
            },
        }
    }
}
