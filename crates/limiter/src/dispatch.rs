//! Bridge from the periodic trigger to the host's serialized mutation context.
//!
//! The context is a single-consumer FIFO queue. Whoever owns the host state
//! drains it; the [`Dispatcher`] only ever enqueues.

use popguard_common::{Host, ObserverRoster};
use popguard_config::ConfigReader;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::scanner;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("mutation queue is closed")]
    QueueClosed,
}

/// Timer bounds for periods that did not come through the loader.
const MIN_PERIOD: Duration = Duration::from_secs(1);
const MAX_PERIOD: Duration = Duration::from_secs(365 * 86_400);

/// A unit of work bound for the mutation context.
pub struct Job<H: ?Sized> {
    task: Box<dyn FnOnce(&mut H) + Send>,
    pending: Arc<AtomicUsize>,
}

impl<H: ?Sized> Job<H> {
    /// Execute against the host. Call only from the mutation context.
    pub fn run(self, host: &mut H) {
        let _done = Finished(self.pending);
        (self.task)(host);
    }
}

/// Marks a job finished when dropped, including when the task panics.
struct Finished(Arc<AtomicUsize>);

impl Drop for Finished {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Create a linked submit handle and consumer queue.
pub fn mutation_queue<H: ?Sized>() -> (MutationHandle<H>, MutationQueue<H>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        MutationHandle {
            tx,
            pending: Arc::clone(&pending),
        },
        MutationQueue { rx, pending },
    )
}

/// Submit side. Cloneable and usable from any thread.
pub struct MutationHandle<H: ?Sized> {
    tx: mpsc::UnboundedSender<Job<H>>,
    pending: Arc<AtomicUsize>,
}

impl<H: ?Sized> Clone for MutationHandle<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<H: ?Sized> MutationHandle<H> {
    /// Enqueue `task` behind everything already submitted. Never blocks.
    pub fn submit(&self, task: impl FnOnce(&mut H) + Send + 'static) -> Result<(), DispatchError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            task: Box::new(task),
            pending: Arc::clone(&self.pending),
        };
        self.tx.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            DispatchError::QueueClosed
        })
    }

    /// Jobs submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Consumer side, owned by the mutation context.
pub struct MutationQueue<H: ?Sized> {
    rx: mpsc::UnboundedReceiver<Job<H>>,
    pending: Arc<AtomicUsize>,
}

impl<H: ?Sized> MutationQueue<H> {
    /// Wait for the next job. `None` once every handle is dropped and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Job<H>> {
        self.rx.recv().await
    }

    /// Run everything currently queued, in submission order.
    pub fn run_pending(&mut self, host: &mut H) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job.run(host);
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Periodic trigger: one reconcile unit per online observer per tick.
pub struct Dispatcher<H: ?Sized, R> {
    config: ConfigReader,
    roster: R,
    handle: MutationHandle<H>,
}

impl<H, R> Dispatcher<H, R>
where
    H: Host + ?Sized + 'static,
    R: ObserverRoster,
{
    pub fn new(config: ConfigReader, roster: R, handle: MutationHandle<H>) -> Self {
        Self {
            config,
            roster,
            handle,
        }
    }

    /// Capture the current snapshot once and enqueue a pass for every online
    /// observer. Returns how many units were enqueued.
    pub fn dispatch_cycle(&self) -> Result<usize, DispatchError> {
        let snapshot = self.config.current();
        let observers = self.roster.online();
        let _span = tracing::info_span!("dispatch_cycle", observers = observers.len()).entered();

        let backlog = self.handle.pending();
        if backlog > 0 {
            tracing::warn!(backlog, "units from an earlier cycle are still pending");
        }

        for &observer in &observers {
            let snapshot = Arc::clone(&snapshot);
            self.handle.submit(move |host: &mut H| {
                scanner::reconcile(host, observer, &snapshot);
            })?;
        }
        Ok(observers.len())
    }

    /// Tick until `shutdown` resolves or the queue consumer goes away. The
    /// first cycle runs immediately. A new snapshot with a different
    /// `scan_interval` restarts the timer with the new period.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut period = self.config.current().scan_interval.clamp(MIN_PERIOD, MAX_PERIOD);
        let mut ticker = ticker_from(Instant::now(), period);
        let mut config_live = true;
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs(), "dispatcher started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_cycle() {
                        tracing::warn!(error = %e, "stopping dispatcher");
                        break;
                    }
                }
                next = self.config.changed(), if config_live => match next {
                    Some(snapshot) => {
                        let next_period = snapshot.scan_interval.clamp(MIN_PERIOD, MAX_PERIOD);
                        if next_period != period {
                            match Instant::now().checked_add(next_period) {
                                Some(start) => {
                                    period = next_period;
                                    ticker = ticker_from(start, period);
                                    tracing::info!(period_secs = period.as_secs(), "scan interval changed");
                                }
                                None => tracing::warn!(
                                    period_secs = next_period.as_secs(),
                                    "scan interval out of range, keeping the current one"
                                ),
                            }
                        }
                    }
                    None => config_live = false,
                },
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

fn ticker_from(start: Instant, period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_run_in_submission_order() {
        let (handle, mut queue) = mutation_queue::<Vec<u32>>();
        for i in 0..5 {
            handle.submit(move |log: &mut Vec<u32>| log.push(i)).unwrap();
        }
        assert_eq!(handle.pending(), 5);

        let mut log = Vec::new();
        assert_eq!(queue.run_pending(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn submit_fails_once_consumer_is_gone() {
        let (handle, queue) = mutation_queue::<Vec<u32>>();
        drop(queue);
        assert!(matches!(
            handle.submit(|_: &mut Vec<u32>| {}),
            Err(DispatchError::QueueClosed)
        ));
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn backlog_grows_without_a_consumer_draining() {
        let (handle, _queue) = mutation_queue::<Vec<u32>>();
        for _ in 0..1000 {
            handle.submit(|_: &mut Vec<u32>| {}).unwrap();
        }
        assert_eq!(handle.pending(), 1000);
    }

    #[test]
    fn panicking_job_still_counts_as_finished() {
        let (handle, mut queue) = mutation_queue::<Vec<u32>>();
        handle
            .submit(|_: &mut Vec<u32>| panic!("job failed"))
            .unwrap();
        let job = queue.rx.try_recv().unwrap();

        let mut log = Vec::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run(&mut log)));
        assert!(outcome.is_err());
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn recv_yields_jobs_then_none_after_handles_drop() {
        let (handle, mut queue) = mutation_queue::<Vec<u32>>();
        handle.submit(|log: &mut Vec<u32>| log.push(7)).unwrap();
        drop(handle);

        let mut log = Vec::new();
        let job = queue.recv().await.unwrap();
        job.run(&mut log);
        assert_eq!(log, vec![7]);
        assert!(queue.recv().await.is_none());
    }
}
