use crate::api::options::ControllerOptionsValidated;
use crate::api::{ControllerOptions, OptionsError};
use crate::baseline::{JsonFileBaselineStore, ReconciliationState};
use crate::clock::RealClock;
use crate::deriver::ConfigDeriver;
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::render::{ConfigApplier, TemplateFileApplier};
use crate::source::PodFileSource;
use crate::supervisor::{CommandProcessControl, ProcessSupervisor};
use std::convert::TryFrom;

/// Builds the production reconciler: pod descriptor file in, rendered config file and
/// `pgrep`/restart commands out. Nothing touches the disk or the process table until it runs.
pub fn try_create_reconciler(options: ControllerOptions, logger: slog::Logger) -> Result<Reconciler, OptionsError> {
    let options = ControllerOptionsValidated::try_from(options)?;

    slog::info!(
        logger,
        "Managing {} (config {}, baseline {}, pod descriptor {})",
        options.server_binary.display(),
        options.config_path.display(),
        options.baseline_path.display(),
        options.pod_descriptor_path.display(),
    );

    let source = PodFileSource::new(&options.pod_descriptor_path, &options.option_group);
    let state = ReconciliationState::new(
        logger.clone(),
        Box::new(JsonFileBaselineStore::new(&options.baseline_path)),
    );
    let applier = TemplateFileApplier::new(logger.clone(), options.template_path, options.config_path);
    let control = CommandProcessControl::new(logger.clone(), options.server_binary);
    // The process is always started against the file the applier renders.
    let supervisor = ProcessSupervisor::new(
        logger.clone(),
        Box::new(control),
        applier.output_path().to_path_buf(),
        options.restart_policy,
        options.retry_policy,
    );

    Ok(Reconciler::new(
        logger,
        ReconcilerConfig {
            source: Box::new(source),
            deriver: ConfigDeriver::new(options.deriver),
            state,
            applier: Box::new(applier),
            supervisor,
            project_prefix: options.install_prefix.to_string_lossy().into_owned(),
            poll_interval: options.poll_interval,
            clock: RealClock,
        },
    ))
}
