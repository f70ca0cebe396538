//! Global tracing subscriber setup.

use crate::config::LoggingConfig;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Installs the fmt subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.filter`. Only the first call in a
/// process has an effect; a subscriber installed by the host is left alone.
pub fn init(config: &LoggingConfig) {
    INIT_GUARD.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(&config.filter));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true);

        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };

        if let Err(err) = result {
            tracing::debug!("Tracing subscriber already installed: {err}");
        }
    });
}

fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("Invalid log filter '{directives}' ({err}), falling back to 'info'");
        EnvFilter::new("info")
    })
}
