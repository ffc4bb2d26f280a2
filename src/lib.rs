mod api;
mod atomic_file;
mod baseline;
mod clock;
mod deriver;
mod model;
mod reconciler;
mod render;
mod source;
mod supervisor;

pub use api::try_create_reconciler;
pub use api::ControllerOptions;
pub use api::OptionsError;
pub use baseline::needs_apply;
pub use baseline::AppliedConfig;
pub use baseline::BaselineStore;
pub use baseline::InMemoryBaselineStore;
pub use baseline::JsonFileBaselineStore;
pub use baseline::ReconciliationState;
pub use baseline::StoreError;
pub use clock::Clock;
pub use clock::RealClock;
pub use deriver::ByteRange;
pub use deriver::ConfigDeriver;
pub use deriver::DerivationError;
pub use deriver::DeriverConfig;
pub use deriver::SizingDialect;
pub use model::DesiredState;
pub use model::OptionValue;
pub use model::PeerEndpoint;
pub use model::PeerReplica;
pub use model::PeerReplicaSet;
pub use model::ReplicaId;
pub use model::ReplicaRole;
pub use model::Sizing;
pub use model::TargetConfig;
pub use model::MIB;
pub use reconciler::shutdown_signal;
pub use reconciler::CycleError;
pub use reconciler::CycleOutcome;
pub use reconciler::Reconciler;
pub use reconciler::ReconcilerConfig;
pub use reconciler::ShutdownHandle;
pub use reconciler::ShutdownSignal;
pub use render::render;
pub use render::BindingValue;
pub use render::Bindings;
pub use render::ConfigApplier;
pub use render::RenderError;
pub use render::TemplateFileApplier;
pub use source::PodFileSource;
pub use source::SourceError;
pub use source::SpecSource;
pub use supervisor::CommandProcessControl;
pub use supervisor::ProcessControl;
pub use supervisor::ProcessSupervisor;
pub use supervisor::RestartError;
pub use supervisor::RestartOutcome;
pub use supervisor::RestartPolicy;
pub use supervisor::RetryPolicy;
pub use supervisor::ScriptedProcessControl;

