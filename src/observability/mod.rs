//! Tracing setup helpers.
//!
//! Libraries embedding taskwire normally configure their own subscriber;
//! these helpers cover binaries and tests that want sensible defaults with
//! `RUST_LOG`-based filtering.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with console output and the default filter.
pub fn init_tracing() {
    init_tracing_with_filter("taskwire=info");
}

/// Initialize tracing with a custom filter string, e.g.
/// `"taskwire=debug,tower_http=debug"`. The `RUST_LOG` environment variable
/// takes precedence when set.
pub fn init_tracing_with_filter(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let fmt_layer = fmt::layer().with_target(true).with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
