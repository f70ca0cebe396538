//! Process-wide MV-Util services shared by every plugin.

use crate::config::MvUtilConfig;
use crate::database::Database;
use crate::logging;
use crate::megachunk::{MegaChunk, MegaChunkSettings};
use crate::platform::Platform;
use crate::plugin::PluginDescription;
use crate::runner::AsyncRunner;
use anyhow::Context;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State created once per host process and handed to every plugin.
pub struct MvUtil<P: Platform> {
    platform: P,
    config: MvUtilConfig,
    runner: AsyncRunner,
    megachunks: MegaChunkSettings,
    /// Databases opened on behalf of plugins, keyed by plugin name.
    databases: DashMap<String, Arc<P::Database>>,
    shut_down: AtomicBool,
}

impl<P: Platform> MvUtil<P> {
    /// Starts the services with an already loaded configuration.
    pub fn start(platform: P, config: MvUtilConfig) -> anyhow::Result<Arc<Self>> {
        config.validate().context("Invalid MV-Util configuration")?;

        let runner = AsyncRunner::new(config.runner.worker_threads).context("Failed to start async runner")?;
        let megachunks = MegaChunkSettings::from_config(&config.megachunk);

        tracing::info!(
            host = %platform.kind(),
            megachunk_size = megachunks.size,
            "MV-Util services started"
        );

        Ok(Arc::new(Self {
            platform,
            config,
            runner,
            megachunks,
            databases: DashMap::new(),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// Loads (or writes out) `config.toml` in `data_folder`, sets up logging and starts.
    pub fn load(platform: P, data_folder: &Path) -> anyhow::Result<Arc<Self>> {
        let mut config = MvUtilConfig::load_or_create(data_folder)
            .with_context(|| format!("Failed to load configuration from {}", data_folder.display()))?;
        config.resolve_paths(data_folder);

        logging::init(&config.logging);
        Self::start(platform, config)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &MvUtilConfig {
        &self.config
    }

    pub fn runner(&self) -> &AsyncRunner {
        &self.runner
    }

    pub fn pub_sub(&self) -> &P::PubSub {
        self.platform.pub_sub()
    }

    pub fn megachunk_settings(&self) -> MegaChunkSettings {
        self.megachunks
    }

    /// The mega-chunk holding block (`block_x`, `block_z`) of `world`.
    pub fn megachunk_at(&self, world: Option<&str>, block_x: i32, block_z: i32) -> MegaChunk {
        MegaChunk::from_block(block_x, block_z, world.map(str::to_owned), self.megachunks)
    }

    /// Opens `database_name` for `plugin` and tracks it until released or shut down.
    pub fn open_database(&self, database_name: &str, plugin: &PluginDescription) -> anyhow::Result<Arc<P::Database>> {
        if self.is_shut_down() {
            anyhow::bail!("MV-Util has been shut down");
        }

        let database = self
            .platform
            .prepare_database(database_name, plugin, &self.config.sql)
            .with_context(|| format!("Failed to open database '{}' for {}", database_name, plugin.name))?;
        let database = Arc::new(database);

        if let Some(previous) = self.databases.insert(plugin.name.clone(), Arc::clone(&database)) {
            tracing::warn!(plugin = %plugin.name, "Replacing a database that was never released");
            previous.close();
        }

        tracing::debug!(plugin = %plugin.name, database = database_name, "Opened database");
        Ok(database)
    }

    /// Stops tracking the database of `plugin_name` and hands it back for closing.
    pub fn release_database(&self, plugin_name: &str) -> Option<Arc<P::Database>> {
        self.databases.remove(plugin_name).map(|(_, database)| database)
    }

    pub fn open_database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Closes every database still open and stops the async runner.
    ///
    /// Outstanding background work gets `runner.shutdown_grace_secs` to finish.
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let names: Vec<String> = self.databases.iter().map(|entry| entry.key().clone()).collect();
        for name in names {
            if let Some((_, database)) = self.databases.remove(&name) {
                tracing::debug!(plugin = %name, "Closing database left open");
                database.close();
            }
        }

        self.runner.shutdown(self.config.runner.shutdown_grace());
        tracing::info!("MV-Util services stopped");
    }
}
