// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Frame clock. `update` samples the time since `start`; the driver derives
/// the per-frame delta from two consecutive samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct Clock {
    start: Option<Instant>,
    elapsed: Duration,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.elapsed = Duration::ZERO;
    }

    /// No-op on a stopped clock.
    pub fn update(&mut self) {
        if let Some(start) = self.start {
            self.elapsed = start.elapsed();
        }
    }

    pub fn stop(&mut self) {
        self.start = None;
    }

    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Updates the clock and returns the seconds elapsed since the previous
    /// call, for feeding `draw_frame`.
    pub fn tick(&mut self) -> f32 {
        let before = self.elapsed;
        self.update();
        (self.elapsed.saturating_sub(before)).as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_clock_does_not_advance() {
        let mut clock = Clock::new();
        clock.update();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert!(!clock.is_running());
    }

    #[test]
    fn running_clock_is_monotonic() {
        let mut clock = Clock::new();
        clock.start();
        std::thread::sleep(Duration::from_millis(2));
        clock.update();
        let first = clock.elapsed();
        assert!(first >= Duration::from_millis(2));
        clock.update();
        assert!(clock.elapsed() >= first);
        assert!(clock.tick() >= 0.0);
    }
}
