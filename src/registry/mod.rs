//! Registry metadata enrichment.
//!
//! [`pypi`] holds the PyPI JSON API client; [`map_with_concurrency`] is the
//! bounded worker pool the lookups run on.

pub mod pypi;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;

/// Run `mapper` over `items` on at most `limit` concurrent workers, returning
/// results in input order.
///
/// Workers claim indices from a shared cursor, so each item is mapped exactly
/// once and every worker writes only the slots it claimed.
pub async fn map_with_concurrency<'a, T, R, F, Fut>(items: &'a [T], limit: usize, mapper: F) -> Vec<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let cursor = AtomicUsize::new(0);
    let worker_count = limit.max(1).min(items.len());
    let (cursor, mapper) = (&cursor, &mapper);

    let workers = (0..worker_count).map(|_| async move {
        let mut claimed = Vec::new();
        loop {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(item) = items.get(index) else {
                break;
            };
            claimed.push((index, mapper(item).await));
        }
        claimed
    });

    let mut slots: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    for (index, value) in join_all(workers).await.into_iter().flatten() {
        slots[index] = Some(value);
    }
    slots.into_iter().flatten().collect()
}
