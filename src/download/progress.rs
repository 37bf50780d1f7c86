// kindle-core - Kindle e-book delivery client
// Copyright (C) 2025 kindle-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Part download progress
//!
//! The executor streams each part to disk and reports through an optional
//! [`ProgressCallback`]. Reports are throttled to one per
//! [`UPDATE_INTERVAL`] while bytes are flowing; the first report and the
//! terminal one (completed or failed) are always delivered.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum time between two in-flight progress reports
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Progress of a single part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartProgress {
    /// Title the part belongs to
    pub content_id: String,

    pub resource_id: String,

    /// Bytes written so far
    pub bytes_received: u64,

    /// Expected size; 0 when neither the manifest nor the response knows it
    pub total_bytes: u64,

    /// 0.0 - 100.0
    pub progress_percentage: f64,

    pub bytes_per_second: u64,

    pub time_remaining: Option<Duration>,

    pub state: PartState,

    pub error_message: Option<String>,
}

impl PartProgress {
    pub fn new(content_id: String, resource_id: String, total_bytes: u64) -> Self {
        Self {
            content_id,
            resource_id,
            bytes_received: 0,
            total_bytes,
            progress_percentage: 0.0,
            bytes_per_second: 0,
            time_remaining: None,
            state: PartState::Pending,
            error_message: None,
        }
    }

    /// Record a new byte count and recompute derived values
    pub fn update_bytes(&mut self, bytes_received: u64, bytes_per_second: u64) {
        self.bytes_received = bytes_received;
        self.bytes_per_second = bytes_per_second;

        self.progress_percentage = if self.total_bytes > 0 {
            (bytes_received.min(self.total_bytes) as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        };

        self.time_remaining = if bytes_per_second > 0 && bytes_received < self.total_bytes {
            Some(Duration::from_secs((self.total_bytes - bytes_received) / bytes_per_second))
        } else {
            None
        };
    }

    pub fn is_complete(&self) -> bool {
        self.state == PartState::Completed
    }
}

/// Lifecycle of a part download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartState {
    Pending,
    Downloading,
    Completed,
    /// Failed and skipped; the cycle continues without it
    Skipped,
}

/// Progress callback, shared across concurrently running parts
pub type ProgressCallback = Arc<dyn Fn(PartProgress) + Send + Sync>;

/// Per-part progress state with throttled reporting
pub struct ProgressTracker {
    progress: PartProgress,
    speed: AverageSpeed,
    last_report: Option<Instant>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(progress: PartProgress, callback: Option<ProgressCallback>) -> Self {
        Self {
            progress,
            speed: AverageSpeed::new(),
            last_report: None,
            callback,
        }
    }

    /// Learn the real size from the response when the manifest had none
    pub fn set_total_if_unknown(&mut self, total_bytes: Option<u64>) {
        if self.progress.total_bytes == 0 {
            if let Some(total) = total_bytes {
                self.progress.total_bytes = total;
            }
        }
    }

    pub fn start(&mut self) {
        self.progress.state = PartState::Downloading;
        self.report(true);
    }

    pub fn advance(&mut self, bytes_received: u64) {
        self.speed.add_position(bytes_received);
        self.progress.update_bytes(bytes_received, self.speed.average());
        self.report(false);
    }

    pub fn complete(&mut self) {
        self.progress.state = PartState::Completed;
        self.progress.time_remaining = None;
        self.report(true);
    }

    pub fn skip(&mut self, error: String) {
        self.progress.state = PartState::Skipped;
        self.progress.error_message = Some(error);
        self.report(true);
    }

    pub fn progress(&self) -> &PartProgress {
        &self.progress
    }

    fn report(&mut self, force: bool) {
        let Some(callback) = &self.callback else {
            return;
        };
        let due = self
            .last_report
            .map_or(true, |t| t.elapsed() >= UPDATE_INTERVAL);
        if force || due {
            callback(self.progress.clone());
            self.last_report = Some(Instant::now());
        }
    }
}

/// Moving-window transfer speed
pub struct AverageSpeed {
    samples: Vec<(u64, Instant)>,
    max_samples: usize,
}

impl AverageSpeed {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            max_samples: 10,
        }
    }

    pub fn add_position(&mut self, position: u64) {
        self.add_sample(position, Instant::now());
    }

    fn add_sample(&mut self, position: u64, at: Instant) {
        self.samples.push((position, at));
        if self.samples.len() > self.max_samples {
            self.samples.remove(0);
        }
    }

    /// Bytes per second over the sample window
    pub fn average(&self) -> u64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0;
        };
        let elapsed = last.1.duration_since(first.1).as_secs_f64();
        if self.samples.len() < 2 || elapsed <= 0.0 {
            return 0;
        }
        (last.0.saturating_sub(first.0) as f64 / elapsed) as u64
    }
}

impl Default for AverageSpeed {
    fn default() -> Self {
        Self::new()
    }
}
