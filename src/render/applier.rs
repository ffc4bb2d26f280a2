use crate::atomic_file;
use crate::render::{render, Bindings, RenderError};
use std::fs;
use std::path::{Path, PathBuf};

/// ConfigApplier writes the managed store's config file for one set of bindings.
pub trait ConfigApplier: Send + Sync {
    fn apply(&self, bindings: &Bindings) -> Result<(), RenderError>;

    /// Path of the rendered file, which is what the managed process gets started with.
    fn output_path(&self) -> &Path;
}

/// TemplateFileApplier re-reads the template on every apply, so an operator can edit the
/// template without restarting the controller.
pub struct TemplateFileApplier {
    logger: slog::Logger,
    template_path: PathBuf,
    output_path: PathBuf,
}

impl TemplateFileApplier {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(logger: slog::Logger, template_path: P, output_path: Q) -> Self {
        TemplateFileApplier {
            logger,
            template_path: template_path.into(),
            output_path: output_path.into(),
        }
    }
}

impl ConfigApplier for TemplateFileApplier {
    fn apply(&self, bindings: &Bindings) -> Result<(), RenderError> {
        let template = fs::read_to_string(&self.template_path).map_err(|source| RenderError::Io {
            path: self.template_path.clone(),
            source,
        })?;

        let rendered = render(&template, bindings)?;

        atomic_file::write_atomically(&self.output_path, rendered.as_bytes()).map_err(|source| {
            RenderError::Io {
                path: self.output_path.clone(),
                source,
            }
        })?;

        slog::info!(
            self.logger,
            "Rendered {} ({} bytes) from template {}",
            self.output_path.display(),
            rendered.len(),
            self.template_path.display(),
        );
        Ok(())
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }
}
