use std::future::Future;

use futures::future::join_all;
use tracing::debug;

/// Fetch `ids` in chunks of `batch_size`, each chunk concurrently.
///
/// Items whose fetch yields `None` are dropped, so the result may be
/// shorter than `ids`. Surviving items keep the order of `ids`.
pub async fn load_batched<T, F, Fut>(ids: &[u64], batch_size: usize, fetch: F) -> Vec<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let batch_size = batch_size.max(1);
    let mut loaded = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(batch_size) {
        let results = join_all(chunk.iter().map(|&id| fetch(id))).await;
        loaded.extend(results.into_iter().flatten());
    }

    if loaded.len() < ids.len() {
        debug!(
            requested = ids.len(),
            loaded = loaded.len(),
            "Batch load skipped unreadable items"
        );
    }
    loaded
}
