use serde::Serialize;
use std::time::Instant;

/// Collects statistics for one relay run.
pub struct RelayStats {
    captured: u64,
    relayed: u64,
    timeouts: u64,
    skipped: u64,
    sink_failures: u64,
    start_time: Instant,
    last_relay_time: Option<Instant>,
}

/// Snapshot of relay stats for logging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySnapshot {
    pub fps: f64,
    pub captured: u64,
    pub relayed: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub skip_rate: f64,
    pub sink_failures: u64,
    pub uptime_secs: f64,
}

impl RelayStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            captured: 0,
            relayed: 0,
            timeouts: 0,
            skipped: 0,
            sink_failures: 0,
            start_time: Instant::now(),
            last_relay_time: None,
        }
    }

    /// Record a frame returned by the capture device.
    pub fn record_capture(&mut self) {
        self.captured += 1;
    }

    /// Record a frame that reached at least one sink.
    pub fn record_relay(&mut self) {
        self.relayed += 1;
        self.last_relay_time = Some(Instant::now());
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    /// Record a captured frame that could not be converted.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_sink_failure(&mut self) {
        self.sink_failures += 1;
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures
    }

    /// Relayed frames per second since the run started.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.relayed as f64 / elapsed
    }

    /// Share of captured frames that were skipped, as a percentage.
    pub fn skip_rate(&self) -> f64 {
        if self.captured == 0 {
            return 0.0;
        }
        (self.skipped as f64 / self.captured as f64) * 100.0
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> RelaySnapshot {
        let end = self.last_relay_time.unwrap_or_else(Instant::now);
        RelaySnapshot {
            fps: self.fps(),
            captured: self.captured,
            relayed: self.relayed,
            timeouts: self.timeouts,
            skipped: self.skipped,
            skip_rate: self.skip_rate(),
            sink_failures: self.sink_failures,
            uptime_secs: end.duration_since(self.start_time).as_secs_f64(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
