//! Restarts the managed store process and confirms it came up.
mod process;
mod supervisor;

pub use process::CommandProcessControl;
pub use process::ProcessControl;
pub use process::ScriptedProcessControl;
pub use supervisor::ProcessSupervisor;
pub use supervisor::RestartError;
pub use supervisor::RestartOutcome;
pub use supervisor::RestartPolicy;
pub use supervisor::RetryPolicy;
