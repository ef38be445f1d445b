//! Tracing subscriber initialization
//!
//! Installs a `tracing_subscriber` registry with an `EnvFilter` (honoring
//! `RUST_LOG`) and a fmt layer. Unlike `init()`, a second installation
//! returns an error instead of panicking, so embedding services and tests can
//! call it unconditionally.
//!
//! # Example
//! ```no_run
//! use akidb_catalog::telemetry;
//!
//! telemetry::init_tracing("info,akidb_catalog=debug").ok();
//! ```

use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Initialize the global subscriber.
///
/// # Arguments
/// * `default_directive` - filter used when `RUST_LOG` is unset or invalid
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    subscriber(env_filter).try_init()
}

fn subscriber(env_filter: EnvFilter) -> impl Subscriber + Send + Sync + 'static {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    Registry::default().with(env_filter).with(fmt_layer)
}
