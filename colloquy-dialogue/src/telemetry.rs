//! Tracing subscriber setup.

use colloquy_core::config::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(config: &GeneralConfig) -> bool {
    let level = &config.log_level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "colloquy_core={level},colloquy_llm={level},colloquy_dialogue={level},warn"
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);

    if config.json_logs {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
