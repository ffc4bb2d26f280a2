//! Renders the managed store's config file from a template and a set of bindings.
mod applier;
mod bindings;
mod template;

pub use applier::ConfigApplier;
pub use applier::TemplateFileApplier;
pub use bindings::BindingValue;
pub use bindings::Bindings;
pub use template::render;
pub use template::RenderError;
