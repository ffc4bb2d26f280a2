//! The control loop: fetch, derive, diff, render, restart, commit.
mod reconciler;
mod shutdown;

pub use reconciler::CycleError;
pub use reconciler::CycleOutcome;
pub use reconciler::Reconciler;
pub use reconciler::ReconcilerConfig;
pub use shutdown::shutdown_signal;
pub use shutdown::ShutdownHandle;
pub use shutdown::ShutdownSignal;
