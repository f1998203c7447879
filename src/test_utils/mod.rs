//! Test utilities shared by unit and integration tests.
//!
//! Available with the `test-utils` feature. Provides logging setup and
//! fixtures for layers, templates and bundles; the recording catalog client
//! lives in [`crate::catalog::mock`].

pub mod fixtures;

pub use fixtures::{TemplateFixture, layer, view_layer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Initializes the tracing subscriber once, however often it is called. Uses
/// `level` when given, otherwise `RUST_LOG`; with neither nothing is logged.
///
/// ```rust,no_run
/// use tracing::Level;
///
/// solution_deployer::test_utils::init_test_logging(Some(Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
