//! Plugin lifecycle management

use super::{MvPlugin, PluginContext, PluginDescription, PluginErrorState, PluginState};
use crate::platform::Platform;
use crate::services::MvUtil;
use anyhow::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// What a lifecycle phase did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The hook ran and succeeded.
    Completed,
    /// The phase did not run, for instance because an earlier phase failed.
    Skipped,
    /// The hook failed and the plugin was torn down. The host should disable it.
    Failed(PluginErrorState),
}

impl PhaseOutcome {
    /// Whether the host should disable the plugin now.
    pub fn requests_disable(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Plugin statistics
#[derive(Debug, Clone, Default)]
pub struct PluginStats {
    /// Number of hooks that failed
    pub failure_count: u64,
    /// Time when the plugin was last enabled
    pub last_enabled_time: Option<Instant>,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_owned();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_owned()
}

/// Runs a hook, turning a panic into an error.
fn guard<T>(hook: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panic in {hook}: {}", panic_message(payload))),
    }
}

/// Drives one plugin through load, enable and disable.
///
/// Hook failures never escape: a failing `load` or `enable` sets the error
/// state, tears the plugin down and reports [`PhaseOutcome::Failed`]. Once an
/// error state is set, later phases are skipped.
pub struct PluginHandle<P: Platform> {
    description: PluginDescription,
    plugin: Box<dyn MvPlugin<P>>,
    context: Arc<PluginContext<P>>,
    state: PluginState,
    error_state: PluginErrorState,
    stats: PluginStats,
}

impl<P: Platform> PluginHandle<P> {
    pub fn new(plugin: Box<dyn MvPlugin<P>>, mv_util: Arc<MvUtil<P>>) -> Self {
        let description = plugin.description();
        let context = Arc::new(PluginContext::new(description.clone(), mv_util));
        Self {
            description,
            plugin,
            context,
            state: PluginState::Uninitialized,
            error_state: PluginErrorState::None,
            stats: PluginStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn version(&self) -> &semver::Version {
        &self.description.version
    }

    pub fn description(&self) -> &PluginDescription {
        &self.description
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn error_state(&self) -> PluginErrorState {
        self.error_state
    }

    pub fn stats(&self) -> &PluginStats {
        &self.stats
    }

    pub fn context(&self) -> &Arc<PluginContext<P>> {
        &self.context
    }

    /// Runs the load hook.
    pub fn load(&mut self) -> PhaseOutcome {
        if self.state != PluginState::Uninitialized {
            tracing::warn!(plugin = %self.name(), state = %self.state, "Plugin already loaded");
            return PhaseOutcome::Skipped;
        }

        self.context.reset_database_name();

        let context = Arc::clone(&self.context);
        let plugin = &mut self.plugin;
        match guard("load", || plugin.load(&context)) {
            Ok(true) => {
                self.set_state(PluginState::Loaded);
                tracing::info!("Loaded plugin: {} v{}", self.name(), self.version());
                PhaseOutcome::Completed
            }
            Ok(false) => self.fail(PluginErrorState::LoadFailed, None),
            Err(err) => self.fail(PluginErrorState::LoadFailed, Some(err)),
        }
    }

    /// Runs the enable hook unless an error state is set.
    pub fn enable(&mut self) -> PhaseOutcome {
        if self.error_state.is_set() {
            return PhaseOutcome::Skipped;
        }
        if self.state != PluginState::Loaded {
            tracing::warn!(plugin = %self.name(), state = %self.state, "Plugin cannot be enabled");
            return PhaseOutcome::Skipped;
        }

        let context = Arc::clone(&self.context);
        let plugin = &mut self.plugin;
        match guard("enable", || plugin.enable(&context)) {
            Ok(true) => {
                self.set_state(PluginState::Enabled);
                self.stats.last_enabled_time = Some(Instant::now());
                tracing::info!("Enabled plugin: {} v{}", self.name(), self.version());
                PhaseOutcome::Completed
            }
            Ok(false) => self.fail(PluginErrorState::EnableFailed, None),
            Err(err) => self.fail(PluginErrorState::EnableFailed, Some(err)),
        }
    }

    /// Tears the plugin down, then runs the disable hook.
    ///
    /// Skipped when an error state is set (teardown already happened) or the
    /// plugin is already disabled. A failing disable hook is only logged.
    pub fn disable(&mut self) -> PhaseOutcome {
        if self.error_state.is_set() || self.state == PluginState::Disabled {
            return PhaseOutcome::Skipped;
        }

        self.context.teardown();

        let context = Arc::clone(&self.context);
        let plugin = &mut self.plugin;
        if let Err(err) = guard("disable", || plugin.disable(&context)) {
            self.stats.failure_count += 1;
            tracing::error!(plugin = %self.name(), "Encountered exception upon disabling: {err:#}");
        }

        self.set_state(PluginState::Disabled);
        tracing::info!("Disabled plugin: {} v{}", self.name(), self.version());
        PhaseOutcome::Completed
    }

    fn fail(&mut self, error_state: PluginErrorState, err: Option<anyhow::Error>) -> PhaseOutcome {
        let phase = match error_state {
            PluginErrorState::EnableFailed => "enabling",
            _ => "loading",
        };
        match err {
            Some(err) => tracing::error!(plugin = %self.name(), "Encountered exception upon {phase}: {err:#}"),
            None => tracing::error!(plugin = %self.name(), "Plugin reported failure upon {phase}"),
        }
        tracing::warn!(plugin = %self.name(), "Disabling plugin...");

        self.error_state = error_state;
        self.stats.failure_count += 1;
        self.set_state(match error_state {
            PluginErrorState::EnableFailed => PluginState::EnableFailed,
            _ => PluginState::LoadFailed,
        });
        self.context.teardown();

        PhaseOutcome::Failed(error_state)
    }

    /// Set plugin state with validation
    fn set_state(&mut self, new_state: PluginState) {
        if !self.state.can_transition_to(new_state) {
            tracing::warn!(
                "Plugin '{}' unexpected transition from {} to {}",
                self.name(),
                self.state,
                new_state
            );
        }

        tracing::debug!(plugin = %self.name(), "Plugin state: {} -> {}", self.state, new_state);
        self.state = new_state;
        self.stats.last_state_change = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_converts_panics() {
        let err = guard::<bool>("load", || panic!("exploded")).unwrap_err();
        assert_eq!(err.to_string(), "panic in load: exploded");

        let formatted = guard::<bool>("enable", || panic!("{} exploded", "plugin")).unwrap_err();
        assert!(formatted.to_string().contains("plugin exploded"));

        assert!(guard("load", || Ok(true)).unwrap());
    }

    #[test]
    fn test_outcome_disable_signal() {
        assert!(PhaseOutcome::Failed(PluginErrorState::LoadFailed).requests_disable());
        assert!(!PhaseOutcome::Completed.requests_disable());
        assert!(!PhaseOutcome::Skipped.requests_disable());
    }
}
