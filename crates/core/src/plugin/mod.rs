//! Plugin lifecycle for MV-Util plugins
//!
//! A plugin implements [`MvPlugin`]. Each plugin is wrapped in a
//! [`PluginHandle`], the state machine that runs its hooks and guarantees its
//! resources are released, and the [`PluginRegistry`] forwards the host's
//! lifecycle callbacks to the handles.

pub mod context;
pub mod lifecycle;
#[allow(clippy::module_inception)]
pub mod plugin;
pub mod registry;

pub use context::PluginContext;
pub use lifecycle::{PhaseOutcome, PluginHandle, PluginStats};
pub use plugin::{default_database_name, MvPlugin, PluginDescription, PluginErrorState, PluginState};
pub use registry::{PluginRegistry, PluginRegistryStats};
