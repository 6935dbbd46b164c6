//! Helper functions: error type, tracing setup, id snapshots.

use std::collections::BTreeMap;
use std::sync::Once;

use feature_engine::Engine;
use uuid::Uuid;

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("feature not found: {name}")]
    FeatureNotFound { name: String },

    #[error("no shape tagged {tag} on {name}")]
    TagNotFound { name: String, tag: String },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("engine error: {0}")]
    Engine(#[from] feature_engine::EngineError),

    #[error("file error: {0}")]
    File(String),

    #[error("duplicate name: {name}")]
    DuplicateName { name: String },
}

// ── Tracing ─────────────────────────────────────────────────────────────────

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary. Filter with `RUST_LOG`,
/// default `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

// ── Snapshots ───────────────────────────────────────────────────────────────

/// Every feature's ids in table order, keyed by feature id.
pub fn id_snapshot(engine: &Engine) -> BTreeMap<Uuid, Vec<Uuid>> {
    engine
        .graph
        .features()
        .map(|f| (f.id, f.table.get_all_ids()))
        .collect()
}

/// Ids of `a` that are not in `b`.
pub fn missing_ids(a: &[Uuid], b: &[Uuid]) -> Vec<Uuid> {
    a.iter().filter(|id| !b.contains(id)).copied().collect()
}
