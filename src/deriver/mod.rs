//! Turns a raw `DesiredState` into a normalized `TargetConfig`. Pure; no I/O.
mod deriver;
mod sizing;

pub use deriver::ConfigDeriver;
pub use deriver::DerivationError;
pub use deriver::DeriverConfig;
pub use deriver::SizingDialect;
pub use sizing::ByteRange;

pub(crate) use sizing::is_aligned;
