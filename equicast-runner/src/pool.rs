//! Bounded per-batch worker pool.
//!
//! Each call builds a private rayon pool of `workers` threads, runs `job` on
//! every item (started in submission order), and returns results in
//! completion order. Callers sort.

use rayon::ThreadPoolBuilder;
use std::sync::mpsc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to build worker pool: {0}")]
pub struct PoolError(String);

pub fn fan_out<T, R, F>(workers: usize, items: &[T], job: F) -> Result<Vec<R>, PoolError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("equicast-worker-{i}"))
        .build()
        .map_err(|e| PoolError(e.to_string()))?;

    let (tx, rx) = mpsc::channel();
    let job = &job;
    pool.scope_fifo(|s| {
        for item in items {
            let tx = tx.clone();
            s.spawn_fifo(move |_| {
                // receiver outlives the scope
                let _ = tx.send(job(item));
            });
        }
    });
    drop(tx);
    Ok(rx.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn every_item_runs_once() {
        let items: Vec<u32> = (0..50).collect();
        let mut out = fan_out(4, &items, |x| x * 2).unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..50).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn single_worker_preserves_submission_order() {
        let items = vec!["c", "a", "b"];
        let out = fan_out(1, &items, |s| s.to_string()).unwrap();
        assert_eq!(out, vec!["c", "a", "b"]);
    }

    #[test]
    fn concurrency_is_bounded() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..12).collect();
        fan_out(2, &items, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn empty_input() {
        let out: Vec<u8> = fan_out(3, &Vec::<u8>::new(), |x| *x).unwrap();
        assert!(out.is_empty());
    }
}
