#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownTimer {
    last_time: u64,
    duration: u64,
}

impl CooldownTimer {
    pub fn new(duration: u64, start_time: u64) -> Self {
        Self {
            last_time: start_time,
            duration,
        }
    }

    /// Consuming check: a true result rebases the window on `now`.
    pub fn is_over(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_time) > self.duration {
            self.last_time = now;
            return true;
        }
        false
    }

    pub fn is_running(&self, now: u64) -> bool {
        now.saturating_sub(self.last_time) <= self.duration
    }

    pub fn remaining(&self, now: u64) -> u64 {
        self.duration
            .saturating_sub(now.saturating_sub(self.last_time))
    }

    pub fn reset(&mut self, time: u64) {
        self.last_time = time;
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_over_fires_once_per_window() {
        let mut timer = CooldownTimer::new(1000, 0);

        assert!(!timer.is_over(1000));
        assert!(timer.is_over(1001));
        assert!(!timer.is_over(1200));
        assert!(!timer.is_over(2001));
        assert!(timer.is_over(2002));
    }

    #[test]
    fn inspection_does_not_consume() {
        let mut timer = CooldownTimer::new(500, 100);

        assert!(timer.is_running(400));
        assert_eq!(timer.remaining(400), 200);
        assert!(!timer.is_running(700));
        assert_eq!(timer.remaining(700), 0);
        assert!(timer.is_over(700));
    }

    #[test]
    fn reset_rebases_window() {
        let mut timer = CooldownTimer::new(100, 0);
        timer.reset(1_000);

        assert!(!timer.is_over(1_050));
        assert!(timer.is_over(1_101));
    }
}
