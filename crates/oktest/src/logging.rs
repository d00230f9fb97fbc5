//! Diagnostic logging for the runner itself.
//!
//! Events go to stderr so they never interleave with the report on stdout.

use oktest_config::LogLevel;
use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT_LOGGING: Once = Once::new();

/// Install the subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Safe to call multiple times; the first call wins. If the host already
/// installed a global subscriber that one is kept.
pub fn init_logging(level: LogLevel) {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    });
}
