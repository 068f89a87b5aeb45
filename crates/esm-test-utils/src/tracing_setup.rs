//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them captured by the test harness. The subscriber is installed
//! at most once per process.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_TEST_FILTER: &str = "esm_core=debug,esm_config=debug,warn";

/// Install a subscriber writing to the test harness, honouring `RUST_LOG`.
///
/// Later calls are ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER)),
        )
        .with_test_writer()
        .try_init();
}
