use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;
use std::sync::Arc;

static SCAN_POOL: OnceCell<Arc<rayon::ThreadPool>> = OnceCell::new();

/// Upper bound on the default pool size
const DEFAULT_MAX_THREADS: usize = 8;

fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("blockwatch-scan-{i}"))
        .build()
}

/// Initialize the scan pool with a fixed number of threads
///
/// # Errors
///
/// Returns an error if the pool cannot be built or was already initialized
pub fn init_thread_pool(num_threads: usize) -> anyhow::Result<()> {
    let pool = build_pool(num_threads)?;

    SCAN_POOL
        .set(Arc::new(pool))
        .map_err(|_| anyhow::anyhow!("Scan thread pool already initialized"))?;

    tracing::debug!(threads = num_threads, "Scan thread pool initialized");
    Ok(())
}

/// Default pool size: available cores, capped
#[must_use]
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(DEFAULT_MAX_THREADS)
}

/// Get the scan pool, building it with default settings on first use
///
/// Falls back to rayon's global pool if a dedicated pool cannot be built.
fn get_thread_pool() -> Option<Arc<rayon::ThreadPool>> {
    SCAN_POOL
        .get_or_try_init(|| build_pool(default_thread_count()).map(Arc::new))
        .ok()
        .cloned()
}

/// Run a function inside the scan pool
pub fn run_in_pool<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match get_thread_pool() {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Size the scan pool from configuration
///
/// # Errors
///
/// Returns an error if the pool has already been initialized
pub fn configure_from_config(config: &crate::config::Config) -> anyhow::Result<()> {
    if config.performance.parallel_threads > 0 {
        init_thread_pool(config.performance.parallel_threads)?;
    }
    Ok(())
}

pub use rayon::prelude::*;
