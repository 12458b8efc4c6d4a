//! Work partitioning across a bounded pool of scoped worker threads.
//!
//! `N` items are split into contiguous, disjoint index ranges of
//! `ceil(N / W)` items each (the last one truncated), one OS thread per
//! range. Each worker returns its own result; nothing is shared between
//! workers while they run, and results are handed back to the coordinator
//! only after every worker has been joined.

use std::any::Any;
use std::ops::Range;
use std::thread;

use tracing::debug;

/// Number of workers actually used for `n` items: `min(max(requested, 1), n)`.
#[must_use]
pub fn effective_workers(n: usize, requested: usize) -> usize {
    requested.max(1).min(n)
}

/// Split `[0, n)` into contiguous ranges for `requested` workers.
///
/// Ranges are non-empty, ascending, disjoint and cover `[0, n)`. With
/// `ceil(n / w)` sized chunks the tail can run out before `w` ranges are
/// produced; those empty ranges are dropped, so fewer than `w` workers may
/// run. `n == 0` yields no ranges.
#[must_use]
pub fn partition(n: usize, requested: usize) -> Vec<Range<usize>> {
    let workers = effective_workers(n, requested);
    if workers == 0 {
        return Vec::new();
    }
    let chunk = n.div_ceil(workers);
    (0..workers)
        .map(|index| {
            let start = (index * chunk).min(n);
            let end = ((index + 1) * chunk).min(n);
            start..end
        })
        .filter(|range| !range.is_empty())
        .collect()
}

/// One joined worker.
#[derive(Debug)]
pub struct WorkerJoin<R> {
    pub worker: usize,
    pub range: Range<usize>,
    /// `Err` carries the panic payload when the worker panicked.
    pub result: thread::Result<R>,
}

/// Run `work` over `items` with up to `requested` workers and block until
/// all of them finish.
///
/// A panic in one worker is captured in its [`WorkerJoin`] and never
/// affects its siblings. Joins are returned in worker order.
pub fn fan_out<T, R, F>(items: &[T], requested: usize, work: F) -> Vec<WorkerJoin<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, Range<usize>, &[T]) -> R + Sync,
{
    let ranges = partition(items.len(), requested);
    debug!(target: "seglog.inspect", items = items.len(), requested, workers = ranges.len(), "fanning out");
    let work = &work;
    thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(worker, range)| {
                let slice = &items[range.clone()];
                let worker_range = range.clone();
                let handle = scope.spawn(move || work(worker, worker_range, slice));
                (worker, range, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(worker, range, handle)| WorkerJoin {
                worker,
                range,
                result: handle.join(),
            })
            .collect()
    })
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn assert_covering(n: usize, ranges: &[Range<usize>]) {
        let mut next = 0;
        for range in ranges {
            assert!(!range.is_empty(), "empty range {range:?}");
            assert_eq!(range.start, next, "gap or overlap at {range:?}");
            next = range.end;
        }
        assert_eq!(next, n);
    }

    #[test]
    fn default_single_worker_takes_everything() {
        assert_eq!(partition(5, 1), vec![0..5]);
    }

    #[test]
    fn worker_count_is_clamped_to_items() {
        assert_eq!(partition(3, 8), vec![0..1, 1..2, 2..3]);
        assert_eq!(effective_workers(3, 0), 1);
    }

    #[test]
    fn last_range_truncated() {
        assert_eq!(partition(10, 4), vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn exhausted_tail_drops_empty_ranges() {
        let ranges = partition(5, 4);
        assert_eq!(ranges, vec![0..2, 2..4, 4..5]);
        assert_covering(5, &ranges);
    }

    #[test]
    fn no_items_no_ranges() {
        assert!(partition(0, 4).is_empty());
        let joins = fan_out::<u32, u32, _>(&[], 4, |_, _, _| 0);
        assert!(joins.is_empty());
    }

    #[test]
    fn fan_out_visits_every_item_once() {
        let items: Vec<u32> = (0..37).collect();
        let joins = fan_out(&items, 5, |_, range, slice| {
            assert_eq!(range.len(), slice.len());
            slice.to_vec()
        });
        let mut seen: Vec<u32> = joins
            .into_iter()
            .flat_map(|join| join.result.expect("no panic"))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, items);
    }

    #[test]
    fn panicking_worker_does_not_affect_siblings() {
        let items: Vec<u32> = (0..6).collect();
        let joins = fan_out(&items, 3, |worker, _, slice| {
            assert!(worker != 1, "worker one blew up");
            slice.iter().sum::<u32>()
        });
        assert_eq!(joins.len(), 3);
        assert_eq!(*joins[0].result.as_ref().expect("worker 0"), 1);
        let payload = joins[1].result.as_ref().expect_err("worker 1 panicked");
        assert!(panic_message(payload.as_ref()).contains("worker one blew up"));
        assert_eq!(*joins[2].result.as_ref().expect("worker 2"), 9);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_without_overlap(n in 1usize..500, w in 1usize..64) {
            let ranges = partition(n, w.min(n));
            prop_assert!(ranges.len() <= w.min(n));
            let mut next = 0;
            for range in &ranges {
                prop_assert!(!range.is_empty());
                prop_assert_eq!(range.start, next);
                next = range.end;
            }
            prop_assert_eq!(next, n);
        }
    }
}
