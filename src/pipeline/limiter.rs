//! Batch-at-a-time bounded concurrency.

use futures_util::future::join_all;
use std::future::Future;
use tracing::debug;

/// Run `worker` over every item, at most `limit` at a time.
///
/// Items are taken in consecutive batches of `limit`; a batch starts only
/// after the previous one has fully settled. Every item is passed to the
/// worker exactly once, and results come back in submission order. A
/// `limit` of 0 is treated as 1.
pub async fn run_batched<T, R, F, Fut>(items: Vec<T>, limit: usize, worker: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);
    let total = items.len();
    let batches = total.div_ceil(limit);
    let mut results = Vec::with_capacity(total);
    let mut items = items.into_iter();

    for batch_no in 1..=batches {
        let batch: Vec<Fut> = items.by_ref().take(limit).map(&worker).collect();
        debug!("batch {batch_no}/{batches}: {} item(s)", batch.len());
        results.extend(join_all(batch).await);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit_and_runs_every_item_once() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let seen = Mutex::new(Vec::new());

        let results = run_batched((0..23).collect(), 5, |i: usize| {
            let in_flight = &in_flight;
            let peak = &peak;
            let seen = &seen;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later items finish first within a batch
                tokio::time::sleep(Duration::from_millis(20 - (i % 5) as u64 * 3)).await;
                seen.lock().unwrap().push(i);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if i % 4 == 0 { Err(i) } else { Ok(i * 10) }
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 5);
        assert_eq!(results.len(), 23);

        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());

        // Submission order is kept regardless of completion order
        for (i, result) in results.iter().enumerate() {
            if i % 4 == 0 {
                assert_eq!(*result, Err(i));
            } else {
                assert_eq!(*result, Ok(i * 10));
            }
        }
    }

    #[tokio::test]
    async fn batches_do_not_overlap() {
        let log = Mutex::new(Vec::new());

        run_batched((0..7).collect(), 3, |i: usize| {
            let log = &log;
            async move {
                log.lock().unwrap().push(("start", i));
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push(("end", i));
            }
        })
        .await;

        let log = log.into_inner().unwrap();
        let batch_of = |i: usize| i / 3;
        assert_eq!(log.len(), 14);
        for (pos, (event, i)) in log.iter().enumerate() {
            if *event != "start" {
                continue;
            }
            for j in (0..*i).filter(|&j| batch_of(j) < batch_of(*i)) {
                assert!(
                    log[..pos].contains(&("end", j)),
                    "item {j} still running when {i} started"
                );
            }
        }
    }

    #[tokio::test]
    async fn zero_limit_runs_sequentially() {
        let results =
            run_batched(vec!['a', 'b'], 0, |c: char| async move { c.to_ascii_uppercase() }).await;
        assert_eq!(results, vec!['A', 'B']);
    }

    #[tokio::test]
    async fn empty_input_returns_nothing() {
        let results: Vec<u8> = run_batched(Vec::<u8>::new(), 4, |x| async move { x }).await;
        assert!(results.is_empty());
    }
}
