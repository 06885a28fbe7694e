//! Background retraining thread.
//!
//! [`RetrainMonitor`] owns one OS thread that wakes on a fixed interval,
//! drains every batch submitted since the last wake, and runs the
//! ensemble's drift-then-adapt path over the drained examples. Batches
//! that show no drift are discarded, not requeued.
//!
//! Shutdown is explicit: [`RetrainMonitor::stop`] raises a flag, the
//! thread performs one final drain so already-submitted work still
//! reaches the scorer, and the handle is joined.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use verdict_core::RetrainConfig;
use verdict_scoring::{EnsembleScorer, TrainingExample};

/// Sleep granularity inside the interval loop. Short slices keep
/// shutdown latency bounded regardless of the configured interval.
const POLL_SLICE: Duration = Duration::from_millis(50);

pub struct RetrainMonitor {
    queue: Arc<Mutex<Vec<TrainingExample>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RetrainMonitor {
    /// Start the monitor thread over `scorer`.
    pub fn spawn(scorer: Arc<EnsembleScorer>, config: RetrainConfig) -> Self {
        let queue: Arc<Mutex<Vec<TrainingExample>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_queue = Arc::clone(&queue);
        let thread_shutdown = Arc::clone(&shutdown);
        let interval = Duration::from_secs(config.interval_secs);

        let handle = thread::spawn(move || {
            info!(
                interval_secs = config.interval_secs,
                "retrain monitor started"
            );
            loop {
                let mut slept = Duration::ZERO;
                while slept < interval && !thread_shutdown.load(Ordering::Relaxed) {
                    let slice = POLL_SLICE.min(interval - slept);
                    thread::sleep(slice);
                    slept += slice;
                }
                if thread_shutdown.load(Ordering::Relaxed) {
                    break;
                }
                drain_and_adapt(&scorer, &thread_queue);
            }
            // Final drain: work submitted before stop() must not be lost.
            drain_and_adapt(&scorer, &thread_queue);
            info!("retrain monitor stopped");
        });

        Self {
            queue,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Queue a labeled batch for the next drain.
    pub fn submit(&self, batch: Vec<TrainingExample>) {
        if batch.is_empty() {
            return;
        }
        let mut queue = self.queue.lock().expect("retrain queue lock poisoned");
        queue.extend(batch);
        debug!(pending = queue.len(), "batch queued for retraining");
    }

    /// Number of examples waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("retrain queue lock poisoned").len()
    }

    /// Signal shutdown, drain once more, and join the thread.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("retrain monitor thread panicked");
            }
        }
    }
}

impl Drop for RetrainMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn drain_and_adapt(scorer: &EnsembleScorer, queue: &Mutex<Vec<TrainingExample>>) {
    let batch = {
        let mut queue = queue.lock().expect("retrain queue lock poisoned");
        mem::take(&mut *queue)
    };
    if batch.is_empty() {
        return;
    }

    match scorer.adapt(&batch) {
        Ok(result) if result.retrained => {
            info!(
                batch = batch.len(),
                accuracy_before = result.accuracy_before,
                accuracy_after = result.accuracy_after,
                "drift detected, ensemble retrained"
            );
        }
        Ok(result) => {
            debug!(
                batch = batch.len(),
                mean_distance = result.drift.mean_distance,
                "no drift, batch discarded"
            );
        }
        Err(err) => {
            warn!(batch = batch.len(), error = %err, "adaptation failed");
        }
    }
}
