//! Download progress fan-out.
//!
//! Every subscriber gets its own single-slot channel. Publishing waits until
//! each live subscriber has room, so a slow consumer slows the download
//! instead of growing a buffer. Dropping a stream unsubscribes it.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes received so far.
    pub transferred: u64,
    /// Total size announced by the server, if any.
    pub expected: Option<u64>,
    /// Average throughput since the transfer started.
    pub bytes_per_second: f64,
    /// Estimated time left, when the total size and rate are known.
    pub eta: Option<Duration>,
}

impl DownloadProgress {
    /// Derive rate and ETA from counters and the elapsed time.
    pub fn measure(transferred: u64, expected: Option<u64>, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let bytes_per_second = if seconds > 0.0 {
            transferred as f64 / seconds
        } else {
            0.0
        };
        let eta = expected.and_then(|total| {
            if bytes_per_second <= 0.0 {
                return None;
            }
            let remaining = total.saturating_sub(transferred) as f64;
            Some(Duration::from_secs_f64(remaining / bytes_per_second))
        });
        Self {
            transferred,
            expected,
            bytes_per_second,
            eta,
        }
    }

    /// Completed share in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) => Some(1.0),
            Some(total) => Some((self.transferred as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: Vec<mpsc::Sender<DownloadProgress>>,
    finished: bool,
}

/// Multicasts [`DownloadProgress`] to any number of subscribers.
#[derive(Debug, Default)]
pub struct ProgressHub {
    state: Mutex<HubState>,
}

impl ProgressHub {
    /// Create a hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to future events. After [`finish`](Self::finish) the
    /// returned stream ends immediately.
    pub fn subscribe(&self) -> ReceiverStream<DownloadProgress> {
        let (tx, rx) = mpsc::channel(1);
        let mut state = self.lock();
        if !state.finished {
            state.subscribers.push(tx);
        }
        ReceiverStream::new(rx)
    }

    /// Deliver `event` to every subscriber, waiting for room in each channel.
    pub async fn publish(&self, event: DownloadProgress) {
        let subscribers = self.lock().subscribers.clone();
        if subscribers.is_empty() {
            return;
        }
        let mut closed = false;
        for subscriber in &subscribers {
            if subscriber.send(event).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.lock().subscribers.retain(|tx| !tx.is_closed());
        }
    }

    /// End every stream and make new subscriptions end immediately.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.subscribers.clear();
    }

    /// Accept subscribers again after [`finish`](Self::finish).
    pub fn reset(&self) {
        self.lock().finished = false;
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
