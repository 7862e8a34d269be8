//! Logging setup for structured logging.
//!
//! Console output via `tracing` with an environment-driven filter.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the logging system. Safe to call more than once; only the
/// first call installs the subscriber.
pub fn init_logger() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let console_layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
    });
}
