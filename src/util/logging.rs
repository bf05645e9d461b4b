use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter used when neither `level` nor `RUST_LOG` gives a valid one.
const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber, logging to stderr. `level` is an
/// `EnvFilter` directive such as `debug` or `sclc::trans=trace`, and takes
/// precedence over `RUST_LOG`.
///
/// Only the first call in a process has any effect.
pub fn init_with_level(level: Option<&str>) {
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let directive = match level {
            Some(level) if !level.is_empty() => level.to_owned(),
            _ => std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_owned()),
        };
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|error| {
            eprintln!("warning: invalid log filter {directive:?} ({error}), using {DEFAULT_FILTER:?}");
            EnvFilter::new(DEFAULT_FILTER)
        });
        // Fails only if another subscriber won the race.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .try_init();
    });
}
