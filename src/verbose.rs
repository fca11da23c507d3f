use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Install the stderr diagnostics subscriber. stdout carries only CSV.
///
/// `-v` enables debug events from this crate; otherwise only warnings are
/// shown. `RUST_LOG` overrides both.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "warn,sql2csv=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second install (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// A timer for measuring durations in verbose mode.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}
