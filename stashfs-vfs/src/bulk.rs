//! Bounded-parallel per-key store calls.
//!
//! Jobs are launched in the order given (listing order) with at most
//! `concurrency` in flight. Returning from [`copy_all`] is the only point at
//! which a caller may start deleting.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use stashfs_common::backend::{ObjectStore, StoreError};

/// A key whose store call failed.
#[derive(Debug)]
pub(crate) struct KeyFailure {
    pub key: String,
    pub error: StoreError,
}

async fn run<J, F, Fut>(jobs: Vec<J>, concurrency: usize, fail_fast: bool, op: F) -> Vec<KeyFailure>
where
    J: Send + 'static,
    F: Fn(J) -> Fut,
    Fut: Future<Output = Result<(), KeyFailure>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let failed = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();
    let mut failures = Vec::new();

    for job in jobs {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        if fail_fast && failed.load(Ordering::SeqCst) {
            break;
        }
        let failed = Arc::clone(&failed);
        let fut = op(job);
        tasks.spawn(async move {
            let _permit = permit;
            let result = fut.await;
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            result
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                failures.push(failure);
                if fail_fast {
                    tasks.abort_all();
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => failures.push(KeyFailure {
                key: String::new(),
                error: StoreError::Unavailable(format!("store task failed: {}", e)),
            }),
        }
    }
    failures
}

/// Copy every `(src, dst)` pair. Stops launching new copies after the first
/// failure, aborts the ones still running, and returns that failure.
pub(crate) async fn copy_all(
    store: &Arc<dyn ObjectStore>,
    pairs: Vec<(String, String)>,
    concurrency: usize,
) -> Result<(), KeyFailure> {
    let total = pairs.len();
    let mut failures = run(pairs, concurrency, true, |(src, dst)| {
        let store = Arc::clone(store);
        async move {
            store
                .copy(&src, &dst)
                .await
                .map_err(|error| KeyFailure { key: src, error })
        }
    })
    .await;

    if failures.is_empty() {
        debug!(count = total, "Bulk copy complete");
        Ok(())
    } else {
        warn!(failed = failures.len(), total, "Bulk copy aborted");
        Err(failures.swap_remove(0))
    }
}

/// Delete every key, attempting all of them; returns the ones that failed.
pub(crate) async fn delete_all(
    store: &Arc<dyn ObjectStore>,
    keys: Vec<String>,
    concurrency: usize,
) -> Vec<KeyFailure> {
    let total = keys.len();
    let failures = run(keys, concurrency, false, |key| {
        let store = Arc::clone(store);
        async move { store.delete(&key).await.map_err(|error| KeyFailure { key, error }) }
    })
    .await;

    if failures.is_empty() {
        debug!(count = total, "Bulk delete complete");
    } else {
        warn!(failed = failures.len(), total, "Bulk delete incomplete");
    }
    failures
}
