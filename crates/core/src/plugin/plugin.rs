//! Core plugin trait and types

use super::PluginContext;
use crate::platform::Platform;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Trait implemented by every MV-Util plugin.
///
/// The host never calls these hooks directly: a [`PluginHandle`](super::PluginHandle)
/// drives them and owns the error handling. A hook that returns `Ok(false)`,
/// returns an error or panics is treated as a failure and the plugin is torn down.
pub trait MvPlugin<P: Platform>: Send + Sync {
    /// Get plugin information and metadata
    fn description(&self) -> PluginDescription;

    /// Called when the host loads the plugin.
    ///
    /// This is the place to change the database name.
    fn load(&mut self, _ctx: &Arc<PluginContext<P>>) -> Result<bool> {
        Ok(true)
    }

    /// Called when the host enables the plugin.
    ///
    /// Register commands, listeners, channels and tasks here.
    fn enable(&mut self, _ctx: &Arc<PluginContext<P>>) -> Result<bool> {
        Ok(true)
    }

    /// Called after the plugin's resources have been torn down.
    ///
    /// Errors are logged and otherwise ignored.
    fn disable(&mut self, _ctx: &Arc<PluginContext<P>>) -> Result<()> {
        Ok(())
    }
}

/// Plugin information and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescription {
    /// Plugin name (must be unique)
    pub name: String,
    pub version: semver::Version,
    pub description: String,
    pub authors: Vec<String>,
    /// Where the plugin keeps its files, `plugins/<name>` unless set.
    pub data_folder: PathBuf,
    /// Embedded default `config.toml`.
    #[serde(skip)]
    pub default_config: Option<&'static str>,
}

impl PluginDescription {
    pub fn new(name: impl Into<String>, version: semver::Version) -> Self {
        let name = name.into();
        Self {
            data_folder: PathBuf::from("plugins").join(&name),
            name,
            version,
            description: String::new(),
            authors: Vec::new(),
            default_config: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_data_folder(mut self, data_folder: impl Into<PathBuf>) -> Self {
        self.data_folder = data_folder.into();
        self
    }

    pub fn with_default_config(mut self, default_config: &'static str) -> Self {
        self.default_config = Some(default_config);
        self
    }

    pub fn default_database_name(&self) -> String {
        default_database_name(&self.name)
    }
}

/// Database name derived from a plugin name: lower-cased, with `-` and spaces as `_`.
pub fn default_database_name(plugin_name: &str) -> String {
    plugin_name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Plugin state in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginState {
    /// Not loaded yet
    Uninitialized,
    /// Loaded but not enabled
    Loaded,
    /// Enabled and active
    Enabled,
    /// Disabled after running normally
    Disabled,
    /// The load hook failed
    LoadFailed,
    /// The enable hook failed
    EnableFailed,
}

impl PluginState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::LoadFailed | Self::EnableFailed)
    }

    /// Get the next valid states from the current state
    pub fn valid_transitions(self) -> &'static [PluginState] {
        match self {
            Self::Uninitialized => &[Self::Loaded, Self::LoadFailed, Self::Disabled],
            Self::Loaded => &[Self::Enabled, Self::EnableFailed, Self::Disabled],
            Self::Enabled => &[Self::Disabled],
            Self::Disabled | Self::LoadFailed | Self::EnableFailed => &[],
        }
    }

    pub fn can_transition_to(self, target: PluginState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Loaded => write!(f, "Loaded"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
            Self::LoadFailed => write!(f, "LoadFailed"),
            Self::EnableFailed => write!(f, "EnableFailed"),
        }
    }
}

/// Which phase put the plugin into an error state. Set at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PluginErrorState {
    #[default]
    None,
    LoadFailed,
    EnableFailed,
}

impl PluginErrorState {
    pub fn is_set(self) -> bool {
        !matches!(self, Self::None)
    }
}
