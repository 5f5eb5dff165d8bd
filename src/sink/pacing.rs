//! Output-rate pacing for sinks that must emit at a fixed frame rate.

use std::time::{Duration, Instant};

/// Slowest output rate a sink accepts: one frame every ten seconds.
pub const MIN_FPS: f64 = 0.1;

/// Holds emission to at most one frame per interval.
///
/// `wait` is called after each frame is handed off. It blocks until at least
/// one interval has passed since the previous `wait` returned, so the sink
/// regulates its own output rate whatever the capture rate is. The first call
/// returns immediately.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
    total_delay: Duration,
}

impl FramePacer {
    /// Pace to `fps` frames per second. Non-positive rates disable pacing;
    /// rates below [`MIN_FPS`] are held to its interval.
    pub fn new(fps: f64) -> Self {
        Self::with_interval(interval_for(fps))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            total_delay: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time spent sleeping so far.
    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    /// Block until the next emission slot. Returns the time slept.
    pub fn wait(&mut self) -> Duration {
        let mut slept = Duration::ZERO;
        if let Some(last) = self.last {
            let due = last + self.interval;
            let now = Instant::now();
            if now < due {
                slept = due - now;
                std::thread::sleep(slept);
                // sleep may wake early on some platforms
                while Instant::now() < due {
                    std::thread::yield_now();
                }
            }
        }
        self.total_delay += slept;
        self.last = Some(Instant::now());
        slept
    }

    /// Forget the previous emission; the next `wait` returns immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn interval_for(fps: f64) -> Duration {
    if !(fps > 0.0 && fps.is_finite()) {
        return Duration::ZERO;
    }
    let longest = Duration::from_secs_f64(1.0 / MIN_FPS);
    Duration::try_from_secs_f64(1.0 / fps)
        .map(|interval| interval.min(longest))
        .unwrap_or(longest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_wait_returns_immediately() {
        let mut pacer = FramePacer::new(1.0);
        let started = Instant::now();
        assert_eq!(pacer.wait(), Duration::ZERO);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn consecutive_waits_are_an_interval_apart() {
        let mut pacer = FramePacer::new(50.0);
        pacer.wait();
        let started = Instant::now();
        for _ in 0..5 {
            pacer.wait();
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    }

    #[test]
    fn slow_producer_is_not_delayed() {
        let mut pacer = FramePacer::with_interval(Duration::from_millis(10));
        pacer.wait();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(pacer.wait(), Duration::ZERO);
    }

    #[test]
    fn zero_fps_disables_pacing() {
        let mut pacer = FramePacer::new(0.0);
        assert_eq!(pacer.interval(), Duration::ZERO);
        pacer.wait();
        assert_eq!(pacer.wait(), Duration::ZERO);
    }

    #[test]
    fn tiny_rates_are_held_to_the_slowest_interval() {
        for fps in [1e-20, 1e-3, f64::MIN_POSITIVE] {
            assert_eq!(FramePacer::new(fps).interval(), Duration::from_secs(10));
        }
        assert_eq!(FramePacer::new(0.5).interval(), Duration::from_secs(2));
    }

    #[test]
    fn reset_skips_the_next_wait() {
        let mut pacer = FramePacer::new(1.0);
        pacer.wait();
        pacer.reset();
        assert_eq!(pacer.wait(), Duration::ZERO);
        assert_eq!(pacer.total_delay(), Duration::ZERO);
    }
}
