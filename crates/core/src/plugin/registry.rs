//! Plugin registry driving plugin handles from host callbacks

use super::{MvPlugin, PhaseOutcome, PluginHandle, PluginState};
use crate::platform::Platform;
use crate::services::MvUtil;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The host adapter: owns every plugin handle and forwards the host's
/// load, enable and disable callbacks to them.
///
/// When a phase reports failure the registry does what a host does with a
/// disable signal: the plugin is marked not enabled and its disable phase runs
/// (which the handle skips, since it already tore itself down).
pub struct PluginRegistry<P: Platform> {
    mv_util: Arc<MvUtil<P>>,
    /// Map of plugin name to plugin handle
    plugins: HashMap<String, PluginHandle<P>>,
    /// Registration order, used for loading and enabling
    load_order: Vec<String>,
    /// Set of enabled plugins
    enabled_plugins: HashSet<String>,
}

impl<P: Platform> PluginRegistry<P> {
    pub fn new(mv_util: Arc<MvUtil<P>>) -> Self {
        Self {
            mv_util,
            plugins: HashMap::new(),
            load_order: Vec::new(),
            enabled_plugins: HashSet::new(),
        }
    }

    pub fn mv_util(&self) -> &Arc<MvUtil<P>> {
        &self.mv_util
    }

    /// Register a plugin
    pub fn register<M: MvPlugin<P> + 'static>(&mut self, plugin: M) -> Result<()> {
        let handle = PluginHandle::new(Box::new(plugin), Arc::clone(&self.mv_util));
        let name = handle.name().to_owned();

        if self.plugins.contains_key(&name) {
            return Err(anyhow::anyhow!("Plugin '{}' already registered", name));
        }

        tracing::debug!("Registered plugin: {} v{}", name, handle.version());
        self.plugins.insert(name.clone(), handle);
        self.load_order.push(name);

        Ok(())
    }

    /// Load a plugin by name
    pub fn load_plugin(&mut self, name: &str) -> Result<PhaseOutcome> {
        let outcome = self.handle_mut(name)?.load();
        self.react(name, outcome);
        Ok(outcome)
    }

    /// Enable a plugin by name
    pub fn enable_plugin(&mut self, name: &str) -> Result<PhaseOutcome> {
        let outcome = self.handle_mut(name)?.enable();
        if outcome == PhaseOutcome::Completed {
            self.enabled_plugins.insert(name.to_string());
        }
        self.react(name, outcome);
        Ok(outcome)
    }

    /// Disable a plugin by name
    pub fn disable_plugin(&mut self, name: &str) -> Result<PhaseOutcome> {
        let outcome = self.handle_mut(name)?.disable();
        self.enabled_plugins.remove(name);
        Ok(outcome)
    }

    fn react(&mut self, name: &str, outcome: PhaseOutcome) {
        if !outcome.requests_disable() {
            return;
        }
        self.enabled_plugins.remove(name);
        if let Some(handle) = self.plugins.get_mut(name) {
            handle.disable();
        }
    }

    fn handle_mut(&mut self, name: &str) -> Result<&mut PluginHandle<P>> {
        self.plugins
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("Plugin '{}' not found", name))
    }

    /// Get a plugin handle by name
    pub fn get_plugin(&self, name: &str) -> Option<&PluginHandle<P>> {
        self.plugins.get(name)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        self.enabled_plugins.contains(name)
    }

    /// Plugins in registration order
    pub fn plugins(&self) -> impl Iterator<Item = &PluginHandle<P>> {
        self.load_order.iter().filter_map(|name| self.plugins.get(name))
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn enabled_plugin_count(&self) -> usize {
        self.enabled_plugins.len()
    }

    /// Load all registered plugins in registration order
    pub fn load_all(&mut self) {
        for name in self.load_order.clone() {
            if let Err(e) = self.load_plugin(&name) {
                tracing::error!("Failed to load plugin {}: {}", name, e);
            }
        }
    }

    /// Enable all loaded plugins
    pub fn enable_all(&mut self) {
        for name in self.load_order.clone() {
            let loaded = self
                .plugins
                .get(&name)
                .is_some_and(|plugin| plugin.state() == PluginState::Loaded);
            if loaded {
                if let Err(e) = self.enable_plugin(&name) {
                    tracing::error!("Failed to enable plugin {}: {}", name, e);
                }
            }
        }
    }

    /// Disable all plugins in reverse registration order
    pub fn disable_all(&mut self) {
        for name in self.load_order.clone().into_iter().rev() {
            if let Err(e) = self.disable_plugin(&name) {
                tracing::error!("Failed to disable plugin {}: {}", name, e);
            }
        }
    }

    /// Disables every plugin and stops the shared services.
    pub fn shutdown(&mut self) {
        self.disable_all();
        self.mv_util.shutdown();
    }

    /// Get plugin statistics
    pub fn get_stats(&self) -> PluginRegistryStats {
        let mut stats = PluginRegistryStats {
            total_plugins: self.plugins.len(),
            enabled_plugins: self.enabled_plugins.len(),
            ..PluginRegistryStats::default()
        };

        for plugin in self.plugins.values() {
            match plugin.state() {
                PluginState::Uninitialized => stats.uninitialized_plugins += 1,
                PluginState::Loaded => stats.loaded_plugins += 1,
                PluginState::Enabled => {} // Already counted in enabled_plugins
                PluginState::Disabled => stats.disabled_plugins += 1,
                PluginState::LoadFailed | PluginState::EnableFailed => stats.failed_plugins += 1,
            }
        }

        stats
    }
}

/// Plugin registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistryStats {
    pub total_plugins: usize,
    pub enabled_plugins: usize,
    pub loaded_plugins: usize,
    pub disabled_plugins: usize,
    pub uninitialized_plugins: usize,
    pub failed_plugins: usize,
}
