use crate::baseline::{BaselineStore, StoreError};
use crate::model::TargetConfig;
use chrono::{DateTime, Utc};

/// AppliedConfig is the last configuration we successfully rendered. It's the baseline that
/// every new `TargetConfig` gets compared against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppliedConfig {
    pub initialized: bool,
    // None until the first successful render.
    pub config: Option<TargetConfig>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl AppliedConfig {
    pub fn empty() -> Self {
        AppliedConfig::default()
    }

    fn committed(target: TargetConfig, applied_at: DateTime<Utc>) -> Self {
        AppliedConfig {
            initialized: true,
            config: Some(target),
            applied_at: Some(applied_at),
        }
    }
}

/// `needs_apply()` returns true if `target` must be rendered. Scalars compare by value and peer
/// replicas compare as an unordered multiset (see `PeerReplicaSet`). An uninitialized baseline
/// always needs an apply.
pub fn needs_apply(applied: &AppliedConfig, target: &TargetConfig) -> bool {
    if !applied.initialized {
        return true;
    }

    match &applied.config {
        Some(config) => config != target,
        None => true,
    }
}

/// ReconciliationState owns the in-memory baseline and mirrors it to a durable `BaselineStore`.
///
/// The baseline is loaded lazily on first use, so a restarted controller resumes from its last
/// known-good baseline instead of re-rendering.
pub struct ReconciliationState {
    logger: slog::Logger,
    baseline: AppliedConfig,
    loaded: bool,
    store: Box<dyn BaselineStore>,
}

impl ReconciliationState {
    pub fn new(logger: slog::Logger, store: Box<dyn BaselineStore>) -> Self {
        ReconciliationState {
            logger,
            baseline: AppliedConfig::empty(),
            loaded: false,
            store,
        }
    }

    pub fn baseline(&self) -> &AppliedConfig {
        &self.baseline
    }

    /// Loads the durable baseline if we haven't yet. A missing or unreadable baseline leaves us
    /// with an empty one, which just means the next apply is unconditional.
    pub fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }

        match self.store.load() {
            Ok(Some(baseline)) => {
                slog::info!(
                    self.logger,
                    "Loaded baseline from durable storage (initialized={}, applied_at={:?})",
                    baseline.initialized,
                    baseline.applied_at,
                );
                self.baseline = baseline;
            }
            Ok(None) => {
                slog::info!(self.logger, "No durable baseline found. Starting from an empty baseline.");
            }
            Err(e) => {
                slog::warn!(self.logger, "Failed to load durable baseline, starting empty: {}", e);
            }
        }
        self.loaded = true;
    }

    pub fn needs_apply(&self, target: &TargetConfig) -> bool {
        needs_apply(&self.baseline, target)
    }

    /// Advances the baseline to `target`, then persists it.
    ///
    /// The in-memory baseline advances even if persisting fails. Worst case, a controller crash
    /// before the next successful persist redoes one idempotent render/restart cycle.
    pub fn commit(&mut self, target: TargetConfig, applied_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.baseline = AppliedConfig::committed(target, applied_at);
        self.loaded = true;

        self.store.save(&self.baseline)
    }
}
