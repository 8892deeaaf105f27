use std::time::Instant;

/// Monotonic millisecond source for the keep-alive, advertise and response
/// timers.
pub trait Clock {
    /// Milliseconds since some fixed point in the past.
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by `std::time::Instant`.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// One-shot countdown measured against caller-supplied clock readings.
///
/// Never fires before `start`; restarting re-arms it with the previous
/// duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct Countdown {
    started_at: u64,
    duration: u64,
    running: bool,
}

impl Countdown {
    pub fn start(&mut self, now: u64, duration: u64) {
        self.started_at = now;
        self.duration = duration;
        self.running = true;
    }

    pub fn restart(&mut self, now: u64) {
        self.started_at = now;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn expired(&self, now: u64) -> bool {
        self.running && now.saturating_sub(self.started_at) >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown() {
        let mut timer = Countdown::default();
        assert!(!timer.expired(0), "never fires before start");
        assert!(!timer.expired(u64::max_value()));

        timer.start(100, 50);
        assert!(!timer.expired(100));
        assert!(!timer.expired(149));
        assert!(timer.expired(150));
        assert!(timer.expired(1_000));

        timer.restart(1_000);
        assert!(!timer.expired(1_049));
        assert!(timer.expired(1_050));

        timer.stop();
        assert!(!timer.expired(u64::max_value()));
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        assert!(clock.now_ms() >= first);
    }
}
