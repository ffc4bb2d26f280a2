use crate::deriver::{is_aligned, ByteRange, DeriverConfig, SizingDialect};
use crate::model::{ReplicaId, MIB};
use crate::supervisor::{RestartPolicy, RetryPolicy};
use std::convert::TryFrom;
use std::path::PathBuf;
use tokio::time::Duration;

const DEFAULT_POD_DESCRIPTOR: &str = "/home/action/.sysinner/pod_instance.json";
const DEFAULT_INSTALL_PREFIX: &str = "/home/action/apps/ssdb";
const DEFAULT_OPTION_GROUP: &str = "cfg/ssdb-x1";

/// Every knob of the controller. Unset fields fall back to the managed store's deployment
/// conventions. Paths default relative to `install_prefix`.
#[derive(Clone, Debug, Default)]
pub struct ControllerOptions {
    pub pod_descriptor_path: Option<PathBuf>,
    pub option_group: Option<String>,
    pub install_prefix: Option<PathBuf>,
    pub server_binary: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub baseline_path: Option<PathBuf>,

    pub poll_interval: Option<Duration>,
    pub liveness_attempts: Option<u32>,
    pub liveness_backoff: Option<Duration>,
    pub restart_policy: Option<RestartPolicy>,

    pub my_replica_id: Option<u32>,
    pub sizing_dialect: Option<SizingDialect>,
    pub alignment_bytes: Option<u64>,
    pub cache_size_min_bytes: Option<u64>,
    pub cache_size_max_bytes: Option<u64>,
    pub write_buffer_size_min_bytes: Option<u64>,
    pub write_buffer_size_max_bytes: Option<u64>,
    pub min_memory_budget_bytes: Option<u64>,
    pub default_budget_percentage: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal controller options: {0}")]
pub struct OptionsError(String);

pub(super) struct ControllerOptionsValidated {
    pub pod_descriptor_path: PathBuf,
    pub option_group: String,
    pub install_prefix: PathBuf,
    pub server_binary: PathBuf,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub baseline_path: PathBuf,
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub restart_policy: RestartPolicy,
    pub deriver: DeriverConfig,
}

impl ControllerOptionsValidated {
    fn validate(&self) -> Result<(), String> {
        if self.poll_interval == Duration::from_secs(0) {
            return Err("Poll interval must be non-zero".to_string());
        }
        if self.retry_policy.max_attempts == 0 {
            return Err("Liveness check needs at least one attempt".to_string());
        }

        let deriver = &self.deriver;
        let alignment = deriver.alignment_bytes;
        if alignment == 0 {
            return Err("Alignment must be non-zero".to_string());
        }
        for (name, range) in &[("Cache size", deriver.cache_size), ("Write buffer size", deriver.write_buffer_size)] {
            if !range.is_valid() {
                return Err(format!("{} minimum {} exceeds maximum {}", name, range.min, range.max));
            }
            if !is_aligned(range.min, alignment) || !is_aligned(range.max, alignment) {
                return Err(format!(
                    "{} bounds [{}, {}] must be multiples of the {} byte alignment",
                    name, range.min, range.max, alignment
                ));
            }
        }
        if deriver.default_budget_percentage < 10 || deriver.default_budget_percentage > 100 {
            return Err(format!(
                "Default budget percentage must be in [10, 100], got {}",
                deriver.default_budget_percentage
            ));
        }

        Ok(())
    }
}

impl TryFrom<ControllerOptions> for ControllerOptionsValidated {
    type Error = OptionsError;

    fn try_from(options: ControllerOptions) -> Result<Self, Self::Error> {
        let install_prefix = options
            .install_prefix
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PREFIX));
        let defaults = DeriverConfig::default();
        let default_retry = RetryPolicy::default();

        let values = ControllerOptionsValidated {
            pod_descriptor_path: options
                .pod_descriptor_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POD_DESCRIPTOR)),
            option_group: options
                .option_group
                .unwrap_or_else(|| DEFAULT_OPTION_GROUP.to_string()),
            server_binary: options
                .server_binary
                .unwrap_or_else(|| install_prefix.join("bin/ssdb-server")),
            template_path: options
                .template_path
                .unwrap_or_else(|| install_prefix.join("etc/ssdb.conf.default")),
            config_path: options
                .config_path
                .unwrap_or_else(|| install_prefix.join("etc/ssdb.conf")),
            baseline_path: options
                .baseline_path
                .unwrap_or_else(|| install_prefix.join("etc/init_option.json")),
            install_prefix,
            poll_interval: options.poll_interval.unwrap_or(Duration::from_secs(10)),
            retry_policy: RetryPolicy {
                max_attempts: options.liveness_attempts.unwrap_or(default_retry.max_attempts),
                backoff: options.liveness_backoff.unwrap_or(default_retry.backoff),
            },
            restart_policy: options.restart_policy.unwrap_or_default(),
            deriver: DeriverConfig {
                my_replica_id: options.my_replica_id.map(ReplicaId::new).unwrap_or(defaults.my_replica_id),
                dialect: options.sizing_dialect.unwrap_or(defaults.dialect),
                alignment_bytes: options.alignment_bytes.unwrap_or(defaults.alignment_bytes),
                cache_size: ByteRange::new(
                    options.cache_size_min_bytes.unwrap_or(defaults.cache_size.min),
                    options.cache_size_max_bytes.unwrap_or(defaults.cache_size.max),
                ),
                write_buffer_size: ByteRange::new(
                    options
                        .write_buffer_size_min_bytes
                        .unwrap_or(defaults.write_buffer_size.min),
                    options
                        .write_buffer_size_max_bytes
                        .unwrap_or(defaults.write_buffer_size.max),
                ),
                min_memory_budget_bytes: options
                    .min_memory_budget_bytes
                    .unwrap_or(defaults.min_memory_budget_bytes),
                default_budget_percentage: options
                    .default_budget_percentage
                    .unwrap_or(defaults.default_budget_percentage),
            },
        };

        values.validate().map_err(OptionsError)?;
        Ok(values)
    }
}
