use clap::Parser;
use kv_sidecar::{ControllerOptions, RestartPolicy, SizingDialect, MIB};
use slog::Drain;
use std::error::Error;
use std::path::PathBuf;
use tokio::time::Duration;

/// Keeps a local key-value store's config file and process in line with its pod descriptor.
#[derive(Parser)]
#[command(name = "kv-sidecar", version)]
struct Cli {
    /// Pod descriptor written by the orchestrator
    #[arg(long, env = "KV_SIDECAR_POD_DESCRIPTOR")]
    pod_descriptor: Option<PathBuf>,

    /// Option group in the pod descriptor that holds the store's options
    #[arg(long, env = "KV_SIDECAR_OPTION_GROUP")]
    option_group: Option<String>,

    /// Installation prefix of the managed store
    #[arg(long, env = "KV_SIDECAR_PREFIX")]
    prefix: Option<PathBuf>,

    #[arg(long, env = "KV_SIDECAR_SERVER_BINARY")]
    server_binary: Option<PathBuf>,

    #[arg(long, env = "KV_SIDECAR_TEMPLATE")]
    template: Option<PathBuf>,

    #[arg(long, env = "KV_SIDECAR_CONFIG")]
    config: Option<PathBuf>,

    /// Where the last-applied baseline is kept
    #[arg(long, env = "KV_SIDECAR_BASELINE")]
    baseline: Option<PathBuf>,

    #[arg(long, env = "KV_SIDECAR_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    #[arg(long, env = "KV_SIDECAR_LIVENESS_ATTEMPTS")]
    liveness_attempts: Option<u32>,

    #[arg(long, env = "KV_SIDECAR_LIVENESS_BACKOFF_SECS")]
    liveness_backoff_secs: Option<u64>,

    /// skip-if-running | always-restart
    #[arg(long, env = "KV_SIDECAR_RESTART_POLICY")]
    restart_policy: Option<RestartPolicy>,

    /// This instance's replica id. Peers with the same id are dropped.
    #[arg(long, env = "KV_SIDECAR_REPLICA_ID")]
    replica_id: Option<u32>,

    /// leveldb | budget
    #[arg(long, env = "KV_SIDECAR_SIZING_DIALECT")]
    sizing_dialect: Option<SizingDialect>,

    #[arg(long, env = "KV_SIDECAR_ALIGNMENT_MIB")]
    alignment_mib: Option<u64>,

    #[arg(long)]
    cache_size_min_mib: Option<u64>,

    #[arg(long)]
    cache_size_max_mib: Option<u64>,

    #[arg(long)]
    write_buffer_size_min_mib: Option<u64>,

    #[arg(long)]
    write_buffer_size_max_mib: Option<u64>,

    #[arg(long)]
    min_memory_budget_mib: Option<u64>,

    /// Budget percentage used when the pod descriptor doesn't set one
    #[arg(long)]
    default_budget_percentage: Option<i64>,

    /// critical | error | warn | info | debug | trace
    #[arg(long, env = "KV_SIDECAR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_options(self) -> ControllerOptions {
        let mib = |v: Option<u64>| v.map(|v| v.saturating_mul(MIB));

        ControllerOptions {
            pod_descriptor_path: self.pod_descriptor,
            option_group: self.option_group,
            install_prefix: self.prefix,
            server_binary: self.server_binary,
            template_path: self.template,
            config_path: self.config,
            baseline_path: self.baseline,
            poll_interval: self.poll_interval_secs.map(Duration::from_secs),
            liveness_attempts: self.liveness_attempts,
            liveness_backoff: self.liveness_backoff_secs.map(Duration::from_secs),
            restart_policy: self.restart_policy,
            my_replica_id: self.replica_id,
            sizing_dialect: self.sizing_dialect,
            alignment_bytes: mib(self.alignment_mib),
            cache_size_min_bytes: mib(self.cache_size_min_mib),
            cache_size_max_bytes: mib(self.cache_size_max_mib),
            write_buffer_size_min_bytes: mib(self.write_buffer_size_min_mib),
            write_buffer_size_max_bytes: mib(self.write_buffer_size_max_mib),
            min_memory_budget_bytes: mib(self.min_memory_budget_mib),
            default_budget_percentage: self.default_budget_percentage,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let level: slog::Level = cli
        .log_level
        .parse()
        .map_err(|_| format!("unknown log level '{}'", cli.log_level))?;
    let logger = create_root_logger_for_stdout(cli.replica_id.unwrap_or(0), level);

    let reconciler = kv_sidecar::try_create_reconciler(cli.into_options(), logger.clone())?;

    let (shutdown_handle, shutdown_signal) = kv_sidecar::shutdown_signal();
    let signal_logger = logger.clone();
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(()) => {
                slog::info!(signal_logger, "Termination requested, finishing current cycle");
                shutdown_handle.shutdown();
            }
            Err(e) => {
                slog::error!(signal_logger, "Failed to listen for termination signals: {}", e);
                // Dropping the handle would stop the loop. Keep it alive instead.
                let _keep = shutdown_handle;
                std::future::pending::<()>().await;
            }
        }
    });

    reconciler.run(shutdown_signal).await;

    Ok(())
}

fn create_root_logger_for_stdout(instance: u32, level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().filter_level(level).fuse();

    slog::Logger::root(drain, slog::o!("instance" => instance))
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
