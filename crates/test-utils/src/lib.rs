pub mod builders;
pub mod fake_client;
pub mod recording_handler;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so output only shows for failing tests unless
/// run with `-- --nocapture`. Enable levels with e.g. `RUST_LOG=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a timeout measured on the Tokio clock.
///
/// Under `start_paused = true` this bounds virtual time, so long settle
/// delays still finish instantly.
pub async fn with_timeout<F, T>(limit: std::time::Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(limit, f)
        .await
        .expect("test timed out")
}
