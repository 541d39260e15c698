use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{client::TelemetryClient, models::QueuedEvent};
use crate::posture::PostureAnalysisResult;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "telemetry";

use crate::{log_error, log_info, log_warn};

type EventQueue = Arc<Mutex<Vec<QueuedEvent>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Delivered(usize),
    /// Delivery failed; these events are gone.
    Dropped(usize),
}

/// Queues telemetry from the frame loop and delivers it in batches from a background worker.
///
/// Enqueueing never waits on the network. A flush swaps the whole queue out under the lock,
/// so events enqueued during delivery land in a fresh queue. Failed batches are dropped,
/// not retried.
pub struct EventBatcher<T: TelemetryClient> {
    queue: EventQueue,
    client: T,
    device_id: String,
    session_start: DateTime<Utc>,
    worker: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl<T: TelemetryClient> EventBatcher<T> {
    /// Resumes the session clock from the aggregator when it knows an elapsed time,
    /// otherwise starts it now.
    pub async fn new(client: T, device_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let session_start = match client.fetch_session_elapsed().await {
            Ok(elapsed) => {
                let resumed = now - chrono::Duration::milliseconds((elapsed * 1000.0) as i64);
                log_info!("resuming session started {elapsed:.0}s ago");
                resumed
            }
            Err(err) => {
                log_warn!("session resume unavailable, starting fresh: {err:#}");
                now
            }
        };

        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            client,
            device_id: device_id.into(),
            session_start,
            worker: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Spawns the periodic flush worker. Calling it again while running is a no-op.
    pub fn start(&mut self, flush_interval: Duration) {
        if self.worker.is_some() {
            return;
        }
        let queue = Arc::clone(&self.queue);
        let client = self.client.clone();
        let token = self.cancel_token.clone();
        self.worker = Some(tokio::spawn(flush_loop(queue, client, flush_interval, token)));
    }

    pub fn client(&self) -> &T {
        &self.client
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn restart_session(&mut self, now: DateTime<Utc>) {
        self.session_start = now;
    }

    pub fn pending(&self) -> usize {
        lock_queue(&self.queue).len()
    }

    pub fn enqueue(&self, analysis: &PostureAnalysisResult) {
        self.enqueue_at(analysis, Utc::now());
    }

    pub fn enqueue_at(&self, analysis: &PostureAnalysisResult, now: DateTime<Utc>) {
        let event = QueuedEvent::from_analysis(&self.device_id, self.session_start, now, analysis);
        lock_queue(&self.queue).push(event);
    }

    /// One swap-and-deliver cycle, on demand.
    pub async fn flush_now(&self) -> FlushOutcome {
        flush_once(&self.queue, &self.client).await
    }

    /// Stops the worker, waits for it, then delivers whatever is still queued.
    pub async fn stop(&mut self) -> FlushOutcome {
        self.cancel_token.cancel();
        if let Some(handle) = self.worker.take() {
            if let Err(err) = handle.await {
                log_error!("flush worker failed to join: {err}");
            }
        }
        self.flush_now().await
    }
}

async fn flush_loop<T: TelemetryClient>(
    queue: EventQueue,
    client: T,
    flush_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&queue, &client).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("flush worker shutting down");
                break;
            }
        }
    }
}

async fn flush_once<T: TelemetryClient>(queue: &EventQueue, client: &T) -> FlushOutcome {
    let batch = std::mem::take(&mut *lock_queue(queue));
    if batch.is_empty() {
        return FlushOutcome::Empty;
    }

    match client.post_batch(&batch).await {
        Ok(()) => {
            log_info!("sent {} events", batch.len());
            FlushOutcome::Delivered(batch.len())
        }
        Err(err) => {
            log_warn!("dropping batch of {} events: {err:#}", batch.len());
            FlushOutcome::Dropped(batch.len())
        }
    }
}

fn lock_queue(queue: &EventQueue) -> std::sync::MutexGuard<'_, Vec<QueuedEvent>> {
    // A panic while holding the lock cannot leave a half-written Vec behind.
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
