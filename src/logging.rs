//! Process-wide `tracing` setup: env-filter controlled by `RUST_LOG`,
//! structured JSON output, thread ids for concurrent retrieval-task
//! diagnostics.
//!
//! There is no durable activity-log sink here — the vector repository is
//! an embedded store, not a row-oriented database, and multi-tenant
//! analytics/quota accounting is out of scope. Everything that would have
//! gone to such a sink is a plain `tracing` event instead.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();
}
