//! This mod holds the library's client-facing entry point: options in, a ready-to-run
//! reconciler out.
mod options;
mod wiring;

pub use options::ControllerOptions;
pub use options::OptionsError;
pub use wiring::try_create_reconciler;
