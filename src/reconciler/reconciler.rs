use crate::baseline::ReconciliationState;
use crate::clock::{Clock, RealClock};
use crate::deriver::{ConfigDeriver, DerivationError};
use crate::reconciler::ShutdownSignal;
use crate::render::{Bindings, ConfigApplier, RenderError};
use crate::source::{SourceError, SpecSource};
use crate::supervisor::{ProcessSupervisor, RestartError, RestartOutcome};
use chrono::{DateTime, Utc};
use tokio::time::Duration;

pub struct ReconcilerConfig<C: Clock = RealClock> {
    pub source: Box<dyn SpecSource>,
    pub deriver: ConfigDeriver,
    pub state: ReconciliationState,
    pub applier: Box<dyn ConfigApplier>,
    pub supervisor: ProcessSupervisor<C>,
    // Installation prefix handed to the template as `project_prefix`.
    pub project_prefix: String,
    pub poll_interval: Duration,
    pub clock: C,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// The source's watermark hasn't moved. Nothing was fetched.
    Unchanged,
    /// Fetched and derived, but the target matches the baseline. The process was only checked
    /// for liveness.
    Converged,
    /// A new config file was rendered and committed as the baseline.
    Applied { restart: RestartOutcome },
}

/// Every way a single cycle can fail. None of these stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("managed binary is missing")]
    BinaryMissing,
    #[error("desired state unavailable")]
    SourceUnavailable(#[from] SourceError),
    #[error("failed to derive target config")]
    Derivation(#[from] DerivationError),
    #[error("failed to render config file")]
    Render(#[from] RenderError),
    #[error("failed to restart managed process")]
    Restart(#[from] RestartError),
}

/// Reconciler is the control loop. It's strictly sequential: one cycle at a time, with a full
/// poll interval of sleep between cycles.
pub struct Reconciler<C: Clock = RealClock> {
    logger: slog::Logger,
    source: Box<dyn SpecSource>,
    deriver: ConfigDeriver,
    state: ReconciliationState,
    applier: Box<dyn ConfigApplier>,
    supervisor: ProcessSupervisor<C>,
    project_prefix: String,
    poll_interval: Duration,
    clock: C,
    // Watermark of the last cycle that ran to completion.
    last_observed: Option<DateTime<Utc>>,
}

impl<C: Clock> Reconciler<C> {
    pub fn new(logger: slog::Logger, config: ReconcilerConfig<C>) -> Self {
        Reconciler {
            logger,
            source: config.source,
            deriver: config.deriver,
            state: config.state,
            applier: config.applier,
            supervisor: config.supervisor,
            project_prefix: config.project_prefix,
            poll_interval: config.poll_interval,
            clock: config.clock,
            last_observed: None,
        }
    }

    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    /// Runs cycles until `shutdown` resolves. A cycle in progress always finishes first.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        slog::info!(
            self.logger,
            "Starting reconciliation loop (interval={:?}, dialect={:?}, restart_policy={})",
            self.poll_interval,
            self.deriver.dialect(),
            self.supervisor.restart_policy(),
        );

        loop {
            match self.run_cycle().await {
                Ok(CycleOutcome::Unchanged) => slog::debug!(self.logger, "Desired state unchanged"),
                Ok(CycleOutcome::Converged) => slog::debug!(self.logger, "Already converged"),
                Ok(CycleOutcome::Applied { restart }) => {
                    slog::info!(self.logger, "Applied new config ({:?})", restart)
                }
                Err(e) => slog::error!(self.logger, "Reconciliation cycle failed: {:?}", e),
            }

            let mut clock = self.clock.clone();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = clock.sleep(self.poll_interval) => {}
            }
        }

        slog::info!(self.logger, "Reconciliation loop stopped");
    }

    /// One fetch-derive-diff-apply iteration.
    ///
    /// The watermark only advances when the cycle succeeds, so any failure is retried from
    /// scratch on the next poll.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        if !self.supervisor.binary_exists().await {
            return Err(CycleError::BinaryMissing);
        }

        let watermark = self.source.watermark().await?;
        if let Some(last) = self.last_observed {
            if watermark <= last {
                return Ok(CycleOutcome::Unchanged);
            }
        }

        let desired = self.source.fetch().await?;
        let target = self.deriver.derive(&desired)?;

        self.state.ensure_loaded();

        let outcome = if self.state.needs_apply(&target) {
            slog::info!(self.logger, "Target config differs from baseline: {:?}", target.sizing);
            self.applier.apply(&Bindings::for_target(&self.project_prefix, &target))?;

            // The file on disk is now the new config, so the baseline follows it even if the
            // restart below fails. A later restart picks up the right file.
            if let Err(e) = self.state.commit(target, Utc::now()) {
                slog::warn!(self.logger, "Failed to persist baseline, continuing: {:?}", e);
            }

            let restart = self.supervisor.restart(self.state.baseline()).await?;
            CycleOutcome::Applied { restart }
        } else {
            self.supervisor.ensure_running(self.state.baseline()).await?;
            CycleOutcome::Converged
        };

        self.last_observed = Some(watermark);
        Ok(outcome)
    }
}
