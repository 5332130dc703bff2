//! Progress tracking for archive creation.
//!
//! Packing is sequential, so the tracker is a plain owned value updated by the
//! writer after every stored entry and every finished comic. Updates are
//! delivered to a callback, throttled by `emit_interval`.

use std::time::{Duration, Instant};

/// Progress snapshot handed to the callback.
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    /// Asset entries stored so far (covers, avatars, pictures).
    pub entries_written: u64,
    /// Of which pictures.
    pub pictures_written: u64,
    /// Asset bytes received from the fetcher.
    pub plain_bytes: u64,
    /// Bytes after compression, as stored in the container.
    pub stored_bytes: u64,
    pub completed_comics: usize,
    pub total_comics: usize,
    pub elapsed_time: Duration,
    pub speed_mbps: f32,
    pub progress_percent: f32,
}

impl ProgressState {
    /// Stored size relative to input size; `0.0` before anything was written.
    pub fn ratio(&self) -> f64 {
        if self.plain_bytes == 0 {
            return 0.0;
        }
        self.stored_bytes as f64 / self.plain_bytes as f64
    }
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(ProgressState);

/// Progress tracker for one write pass
pub struct ProgressTracker {
    /// Whether progress tracking is enabled
    enabled: bool,
    state: ProgressState,
    start_time: Instant,
    last_emit_time: Instant,
    emit_interval: Duration,
    callback: Option<Box<ProgressCallback>>,
}

impl ProgressTracker {
    pub fn new(emit_interval: Duration) -> Self {
        Self {
            enabled: false,
            state: ProgressState::default(),
            start_time: Instant::now(),
            last_emit_time: Instant::now(),
            emit_interval,
            callback: None,
        }
    }

    /// Enable progress tracking with a callback
    pub fn enable_with_callback<F>(&mut self, callback: F)
    where
        F: Fn(ProgressState) + 'static,
    {
        self.enabled = true;
        self.callback = Some(Box::new(callback));
        self.start_time = Instant::now();
        self.last_emit_time = Instant::now();
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.callback = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Comic count becomes known right after `comic_count()` is fetched.
    pub fn set_total_comics(&mut self, total: usize) {
        self.state.total_comics = total;
    }

    /// Record one stored asset entry.
    pub fn record_entry(&mut self, plain: u64, stored: u64, is_picture: bool) {
        self.state.entries_written += 1;
        self.state.plain_bytes += plain;
        self.state.stored_bytes += stored;
        if is_picture {
            self.state.pictures_written += 1;
        }
        self.maybe_emit_progress();
    }

    pub fn record_comic_completed(&mut self) {
        self.state.completed_comics += 1;
        self.maybe_emit_progress();
    }

    /// Force emit progress update
    pub fn emit_progress(&mut self) {
        if !self.enabled {
            return;
        }
        self.last_emit_time = Instant::now();
        let state = self.get_progress_state();
        if let Some(ref callback) = self.callback {
            callback(state);
        }
    }

    /// Emit a final 100% update.
    pub fn force_completion(&mut self) {
        if !self.enabled {
            return;
        }
        let mut state = self.get_progress_state();
        state.progress_percent = 100.0;
        state.completed_comics = state.total_comics;
        if let Some(ref callback) = self.callback {
            callback(state);
        }
    }

    fn maybe_emit_progress(&mut self) {
        if !self.enabled {
            return;
        }
        if self.last_emit_time.elapsed() >= self.emit_interval {
            self.emit_progress();
        }
    }

    /// Current progress state
    pub fn get_progress_state(&self) -> ProgressState {
        let mut state = self.state.clone();
        state.elapsed_time = self.start_time.elapsed();

        // Calculate speed in MB/s
        state.speed_mbps = if state.elapsed_time.as_secs_f32() > 0.0 {
            (state.plain_bytes as f32 / (1024.0 * 1024.0)) / state.elapsed_time.as_secs_f32()
        } else {
            0.0
        };
        state.progress_percent = if state.total_comics > 0 {
            (state.completed_comics as f32 / state.total_comics as f32 * 100.0).min(100.0)
        } else {
            0.0
        };
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
