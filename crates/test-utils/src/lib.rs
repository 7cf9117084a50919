pub mod builders;
pub mod fakes;

use std::path::Path;
use std::sync::{Arc, Once};

use procpool::context::ExecutionContext;
use procpool::exec::{CommandResolver, ProcessExecutor};
use procpool::fs::RealFileSystem;
use procpool::os::Kill;
use procpool::runfile::RunFileRegistry;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
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

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Executor on the real filesystem with its run directory under `root`.
pub fn executor_in(root: &Path) -> Arc<ProcessExecutor> {
    executor_with_kill(root, Kill::system())
}

/// Like [`executor_in`] but with a custom signal collaborator.
pub fn executor_with_kill(root: &Path, kill: Kill) -> Arc<ProcessExecutor> {
    let ctx = Arc::new(ExecutionContext::new(root, "test"));
    let registry =
        RunFileRegistry::new(Arc::new(RealFileSystem), ctx).expect("create run-file registry");
    Arc::new(ProcessExecutor::new(registry, kill, CommandResolver::new()))
}
