//! Bounded worker pool for evaluation units

use crate::error::{AuditError, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Worker count used when the caller does not pick one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Run `task` over every item on `workers` workers and return the outputs in
/// input order.
///
/// Workers pull from a shared queue and push `(index, outcome)` onto a
/// results channel. Every worker is joined before any outcome is inspected,
/// so a failure never leaves a sibling running. A fatal error stops workers
/// from taking further items and is returned ahead of any ordinary error;
/// otherwise the first error in input order is returned.
pub async fn run_all<T, R, F, Fut>(workers: usize, items: Vec<T>, task: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let queue = Arc::new(Mutex::new(
        items.into_iter().enumerate().collect::<VecDeque<_>>(),
    ));
    let halted = Arc::new(AtomicBool::new(false));
    let task = Arc::new(task);
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<R>)>();

    let worker_count = workers.clamp(1, total);
    debug!("dispatching {} units to {} workers", total, worker_count);

    let mut join_set = JoinSet::new();
    for _ in 0..worker_count {
        let queue = queue.clone();
        let halted = halted.clone();
        let task = task.clone();
        let tx = tx.clone();
        join_set.spawn(async move {
            loop {
                if halted.load(Ordering::SeqCst) {
                    break;
                }
                let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                let Some((index, item)) = next else {
                    break;
                };
                let outcome = (*task)(item).await;
                if matches!(&outcome, Err(e) if e.is_fatal()) {
                    halted.store(true, Ordering::SeqCst);
                }
                if tx.send((index, outcome)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut join_error = None;
    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            warn!("worker failed: {}", e);
            join_error.get_or_insert_with(|| AuditError::TaskFailed(e.to_string()));
        }
    }

    let mut slots: Vec<Option<Result<R>>> = (0..total).map(|_| None).collect();
    while let Some((index, outcome)) = rx.recv().await {
        slots[index] = Some(outcome);
    }

    let fatal = slots
        .iter()
        .position(|slot| matches!(slot, Some(Err(e)) if e.is_fatal()));
    let first_error = fatal.or_else(|| slots.iter().position(|slot| matches!(slot, Some(Err(_)))));
    if let Some(index) = first_error {
        if let Some(Some(Err(e))) = slots.get_mut(index).map(Option::take) {
            return Err(e);
        }
    }
    if let Some(e) = join_error {
        return Err(e);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(outcome) => outcome,
            None => Err(AuditError::TaskFailed(format!("unit {} produced no result", index))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_outputs_follow_input_order() {
        let items: Vec<u64> = (0..20).collect();
        let out = run_all(4, items, |n| async move {
            tokio::time::sleep(Duration::from_millis(20 - n)).await;
            Ok(n * 2)
        })
        .await
        .unwrap();
        assert_eq!(out, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_error_waits_for_siblings() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let err = run_all(2, vec![0u32, 1], move |n| {
            let flag = flag.clone();
            async move {
                if n == 0 {
                    return Err(AuditError::fetch("https://registry.example/a", Some("E404".into()), "Not found"));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), Some("E404"));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_error_in_input_order() {
        let err = run_all(3, vec![0u64, 1, 2], |n| async move {
            tokio::time::sleep(Duration::from_millis(30 - n * 10)).await;
            if n == 0 {
                Ok(n)
            } else {
                Err(AuditError::version(format!("unit {}", n)))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid version: unit 1");
    }

    #[tokio::test]
    async fn test_fatal_error_halts_queue_and_wins() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let err = run_all(1, vec![0u32, 1, 2, 3], move |n| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 => Err(AuditError::version("bad")),
                    1 => Err(AuditError::config("duplicate entry")),
                    _ => Ok(n),
                }
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let out: Vec<u8> = run_all(4, Vec::<u8>::new(), |n| async move { Ok(n) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
