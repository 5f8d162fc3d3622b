use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Receives acknowledged byte counts.
///
/// Sinks are telemetry only: they never influence the transfer. `advance`
/// may be called from several tasks at once when files are streamed in
/// parallel.
pub trait ProgressSink: Send + Sync {
    /// Called once before any data is sent.
    fn start(&self, _total_bytes: u64, _description: &str) {}

    /// `delta` more bytes were acknowledged by the server.
    fn advance(&self, delta: u64);

    /// Called once after the session finished.
    fn finish(&self) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn start(&self, total_bytes: u64, description: &str) {
        (**self).start(total_bytes, description);
    }

    fn advance(&self, delta: u64) {
        (**self).advance(delta);
    }

    fn finish(&self) {
        (**self).finish();
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn advance(&self, _delta: u64) {}
}

// ---------------------------------------------------------------------------
// ProgressCounter
// ---------------------------------------------------------------------------

/// Point-in-time view of a [`ProgressCounter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub bytes_per_second: f64,
    pub finished: bool,
}

/// Callback invoked with a snapshot after every advance.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Counting sink with throughput estimation and optional callbacks.
pub struct ProgressCounter {
    total: AtomicU64,
    transferred: AtomicU64,
    finished: std::sync::atomic::AtomicBool,
    speed: SpeedCalculator,
    callbacks: RwLock<Vec<ProgressCallback>>,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            finished: std::sync::atomic::AtomicBool::new(false),
            speed: SpeedCalculator::new(None, None),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, callback: ProgressCallback) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        callbacks.push(callback);
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_bytes: self.total_bytes(),
            transferred_bytes: self.transferred_bytes(),
            bytes_per_second: self.speed.bytes_per_second(),
            finished: self.finished.load(Ordering::SeqCst),
        }
    }

    /// Estimated time until every byte is acknowledged.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total_bytes().saturating_sub(self.transferred_bytes());
        self.speed.eta(remaining)
    }

    fn notify(&self) {
        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        if callbacks.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for cb in callbacks.iter() {
            cb(&snapshot);
        }
    }
}

impl ProgressSink for ProgressCounter {
    fn start(&self, total_bytes: u64, description: &str) {
        self.total.store(total_bytes, Ordering::SeqCst);
        self.transferred.store(0, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.speed.reset();
        tracing::debug!(total_bytes, description, "progress started");
        self.notify();
    }

    fn advance(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        self.transferred.fetch_add(delta, Ordering::SeqCst);
        self.speed.add_sample(delta);
        self.notify();
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.notify();
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if s.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.clear();
    }
}
