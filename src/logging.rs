//! Tracing subscriber setup for binaries and examples.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the embedding application.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG` plus `default_directive`
/// (for example `"regionwatch=debug"`).
///
/// Safe to call more than once: later calls leave the first subscriber in place.
pub fn init(default_directive: &str) {
    let mut filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("ignoring invalid log directive '{default_directive}': {e}"),
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
