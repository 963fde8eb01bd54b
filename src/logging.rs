//! Logging setup for the `vhub` binary.
//!
//! Output goes to stderr so command results on stdout stay machine readable.
//! `RUST_LOG` overrides the `[logging]` section of the config file:
//!
//! ```bash
//! RUST_LOG=vectorhub::services::webhook=debug vhub webhook test my-hook
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::models::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct ShortTime;

impl FormatTime for ShortTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Directive string built from the config. `verbose` lifts the default
/// level to `debug`.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        config.default.clone()
    };
    for (target, level) in &config.modules {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig, verbose: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, verbose))
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .with_timer(ShortTime)
            .with_filter(filter);

        tracing_subscriber::registry().with(layer).init();
    });
}
