//! Subscriber installation for hosts without their own `tracing` setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Installs a formatting subscriber filtered at `level`, unless `RUST_LOG` overrides it.
///
/// Returns `false` when the host already installed a global subscriber; that subscriber is
/// left untouched.
pub fn install(level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
