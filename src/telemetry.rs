//! Logging setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,pagewise=debug";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber: compact `fmt` output filtered by
/// `RUST_LOG`, falling back to `info,pagewise=debug`.
///
/// Panics if a global subscriber is already set; embedders that install
/// their own should skip this.
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt_layer)
        .init();
}

/// Like [`init`] but writes through the test harness and tolerates being
/// called more than once.
pub fn try_init_for_tests() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_test_writer()
        .with_target(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt_layer)
        .try_init();
}
