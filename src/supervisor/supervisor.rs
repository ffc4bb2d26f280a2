use crate::baseline::AppliedConfig;
use crate::clock::{Clock, RealClock};
use crate::supervisor::ProcessControl;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// What to do when a new config was rendered but the process is already alive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RestartPolicy {
    /// Leave a live process alone. It picks up the new file on its next restart.
    SkipIfRunning,
    /// Always issue the restart command after a render.
    AlwaysRestart,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::SkipIfRunning
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip-if-running" => Ok(RestartPolicy::SkipIfRunning),
            "always-restart" => Ok(RestartPolicy::AlwaysRestart),
            other => Err(format!(
                "unknown restart policy '{}', expected 'skip-if-running' or 'always-restart'",
                other
            )),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::SkipIfRunning => write!(f, "skip-if-running"),
            RestartPolicy::AlwaysRestart => write!(f, "always-restart"),
        }
    }
}

/// Bounded liveness polling: up to `max_attempts` probes, `backoff` apart.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RestartOutcome {
    /// Found a live process, so no command was issued.
    AlreadyRunning { pid: u32 },
    /// The restart command succeeded. `pid` is None if liveness polling never saw the process,
    /// which callers treat as "not running" rather than as an error.
    Restarted { pid: Option<u32> },
}

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("refusing to restart before the first successful render")]
    NotInitialized,
    #[error("restart command failed")]
    LaunchFailed(#[source] io::Error),
}

/// ProcessSupervisor owns every restart of the managed process. All entry points serialize on
/// one lock, so no two restart commands are ever in flight at once.
pub struct ProcessSupervisor<C: Clock = RealClock> {
    logger: slog::Logger,
    control: Box<dyn ProcessControl>,
    config_path: PathBuf,
    restart_policy: RestartPolicy,
    retry_policy: RetryPolicy,
    clock: C,
    restart_lock: Mutex<()>,
}

impl ProcessSupervisor<RealClock> {
    pub fn new(
        logger: slog::Logger,
        control: Box<dyn ProcessControl>,
        config_path: PathBuf,
        restart_policy: RestartPolicy,
        retry_policy: RetryPolicy,
    ) -> Self {
        ProcessSupervisor::with_clock(logger, control, config_path, restart_policy, retry_policy, RealClock)
    }
}

impl<C: Clock> ProcessSupervisor<C> {
    pub fn with_clock(
        logger: slog::Logger,
        control: Box<dyn ProcessControl>,
        config_path: PathBuf,
        restart_policy: RestartPolicy,
        retry_policy: RetryPolicy,
        clock: C,
    ) -> Self {
        ProcessSupervisor {
            logger,
            control,
            config_path,
            restart_policy,
            retry_policy,
            clock,
            restart_lock: Mutex::new(()),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    pub async fn binary_exists(&self) -> bool {
        self.control.binary_exists().await
    }

    /// Called after a new config was rendered. Whether a live process gets restarted depends on
    /// the `RestartPolicy`.
    pub async fn restart(&self, baseline: &AppliedConfig) -> Result<RestartOutcome, RestartError> {
        let _guard = self.restart_lock.lock().await;
        if !baseline.initialized {
            return Err(RestartError::NotInitialized);
        }

        if self.restart_policy == RestartPolicy::SkipIfRunning {
            if let Some(pid) = self.find_pid_with_retry().await {
                slog::info!(self.logger, "Process already running as pid {}, skipping restart", pid);
                return Ok(RestartOutcome::AlreadyRunning { pid });
            }
        }

        self.launch_and_verify().await
    }

    /// Starts the process only if it isn't running. Never restarts a live process, regardless of
    /// policy.
    pub async fn ensure_running(&self, baseline: &AppliedConfig) -> Result<RestartOutcome, RestartError> {
        let _guard = self.restart_lock.lock().await;
        if !baseline.initialized {
            return Err(RestartError::NotInitialized);
        }

        if let Some(pid) = self.find_pid_with_retry().await {
            slog::debug!(self.logger, "Process running as pid {}", pid);
            return Ok(RestartOutcome::AlreadyRunning { pid });
        }

        slog::info!(self.logger, "Process not running, starting it");
        self.launch_and_verify().await
    }

    // Caller must hold `restart_lock`.
    async fn launch_and_verify(&self) -> Result<RestartOutcome, RestartError> {
        slog::info!(self.logger, "Issuing restart with config {}", self.config_path.display());
        if let Err(e) = self.control.restart(&self.config_path).await {
            slog::error!(self.logger, "Restart command failed: {}", e);
            return Err(RestartError::LaunchFailed(e));
        }

        let pid = self.find_pid_with_retry().await;
        match pid {
            Some(pid) => slog::info!(self.logger, "Restart verified, pid {}", pid),
            None => slog::warn!(
                self.logger,
                "Restart command succeeded but no process found after {} probes",
                self.retry_policy.max_attempts,
            ),
        }

        Ok(RestartOutcome::Restarted { pid })
    }

    async fn find_pid_with_retry(&self) -> Option<u32> {
        let mut clock = self.clock.clone();

        for attempt in 1..=self.retry_policy.max_attempts {
            if let Some(pid) = self.control.find_pid().await {
                return Some(pid);
            }
            if attempt < self.retry_policy.max_attempts {
                clock.sleep(self.retry_policy.backoff).await;
            }
        }

        None
    }
}
