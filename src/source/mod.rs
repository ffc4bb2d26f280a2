//! Where the desired state comes from.
mod pod_file;

pub use pod_file::PodFileSource;
pub use pod_file::SourceError;
pub use pod_file::SpecSource;
