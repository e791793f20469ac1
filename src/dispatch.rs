//! Concurrency-limited, throttled wrapper around an async operation.
//!
//! Admission is a single FIFO line guarded by a fair mutex: the caller at the
//! head of the line first waits for a free slot, then for the throttle
//! interval to elapse since the previous start, and only then lets the next
//! caller in. Slots are RAII permits, so a call that fails (or is dropped)
//! hands its slot back.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{Error, Result};

pub struct Dispatcher<F> {
    op: F,
    capacity: usize,
    slots: Semaphore,
    /// Start time of the most recently admitted call.
    last_start: Mutex<Option<Instant>>,
    interval: Duration,
}

impl<F> Dispatcher<F> {
    pub fn new(op: F, concurrency: usize, interval: Duration) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::Config("dispatcher concurrency must be at least 1".into()));
        }
        Ok(Self {
            op,
            capacity: concurrency,
            slots: Semaphore::new(concurrency),
            last_start: Mutex::new(None),
            interval,
        })
    }

    /// Run the wrapped operation once the dispatcher admits this call.
    /// The result is exactly what the operation returned for `input`.
    pub async fn call<I, Fut>(&self, input: I) -> Fut::Output
    where
        F: Fn(I) -> Fut,
        Fut: Future,
    {
        let _slot = self.admit().await;
        (self.op)(input).await
    }

    async fn admit(&self) -> SemaphorePermit<'_> {
        let mut last_start = self.last_start.lock().await;
        let slot = self
            .slots
            .acquire()
            .await
            .expect("dispatcher semaphore is never closed");
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last_start = Some(Instant::now());
        trace!(in_flight = self.in_flight(), "dispatching call");
        slot
    }

    fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use futures::future::{join_all, BoxFuture};
    use futures::FutureExt;

    use super::*;

    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        starts: StdMutex<Vec<(usize, Instant)>>,
        ends: StdMutex<Vec<(usize, Instant)>>,
    }

    impl Probe {
        async fn work(&self, id: usize, hold: Duration) -> std::result::Result<usize, String> {
            self.starts.lock().unwrap().push((id, Instant::now()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.ends.lock().unwrap().push((id, Instant::now()));
            if id == 3 {
                Err(format!("call {} failed", id))
            } else {
                Ok(id * 10)
            }
        }
    }

    type Call = BoxFuture<'static, std::result::Result<usize, String>>;

    fn probed(probe: &Arc<Probe>, hold: Duration) -> impl Fn(usize) -> Call {
        let probe = Arc::clone(probe);
        move |id| {
            let probe = Arc::clone(&probe);
            async move { probe.work(id, hold).await }.boxed()
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = Dispatcher::new(|x: u32| async move { x }, 0, Duration::ZERO);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_bound() {
        let probe = Arc::new(Probe::default());
        let dispatcher =
            Dispatcher::new(probed(&probe, Duration::from_millis(100)), 2, Duration::ZERO).unwrap();

        let results = join_all((0..6).map(|id| dispatcher.call(id))).await;

        assert_eq!(results.len(), 6);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);

        // The third call may only start once one of the first two has finished.
        let starts = probe.starts.lock().unwrap().clone();
        let ends = probe.ends.lock().unwrap().clone();
        let first_end = ends.iter().map(|(_, at)| *at).min().unwrap();
        assert!(starts[2].1 >= first_end);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_are_spaced_by_interval_in_submission_order() {
        let probe = Arc::new(Probe::default());
        let interval = Duration::from_millis(300);
        let dispatcher =
            Dispatcher::new(probed(&probe, Duration::from_millis(10)), 4, interval).unwrap();

        join_all((0..5).map(|id| dispatcher.call(id))).await;

        let starts = probe.starts.lock().unwrap().clone();
        let order: Vec<usize> = starts.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in starts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn free_slot_does_not_bypass_throttle() {
        let probe = Arc::new(Probe::default());
        let interval = Duration::from_millis(500);
        let dispatcher =
            Dispatcher::new(probed(&probe, Duration::from_millis(1)), 1, interval).unwrap();

        join_all((0..3).map(|id| dispatcher.call(id))).await;

        let starts = probe.starts.lock().unwrap().clone();
        for pair in starts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_isolated_and_releases_its_slot() {
        let probe = Arc::new(Probe::default());
        let dispatcher =
            Dispatcher::new(probed(&probe, Duration::from_millis(50)), 1, Duration::ZERO).unwrap();

        let results = join_all((0..6).map(|id| dispatcher.call(id))).await;

        assert_eq!(results[2], Ok(20));
        assert_eq!(results[3], Err("call 3 failed".to_string()));
        assert_eq!(results[4], Ok(40));
        assert_eq!(results[5], Ok(50));
        assert_eq!(probe.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_order_may_differ_from_start_order() {
        let dispatcher = Dispatcher::new(
            |hold_ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                hold_ms
            },
            3,
            Duration::ZERO,
        )
        .unwrap();
        let finished = StdMutex::new(Vec::new());

        join_all([300u64, 100, 200].into_iter().map(|hold| {
            let dispatcher = &dispatcher;
            let finished = &finished;
            async move {
                let value = dispatcher.call(hold).await;
                finished.lock().unwrap().push(value);
            }
        }))
        .await;

        assert_eq!(*finished.lock().unwrap(), vec![100, 200, 300]);
    }
}
