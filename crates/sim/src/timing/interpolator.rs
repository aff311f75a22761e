use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolatorEvent<W> {
    Update { wiring: W, value: i32 },
    Complete { wiring: W, value: i32 },
}

impl<W: Copy> InterpolatorEvent<W> {
    pub fn wiring(&self) -> W {
        match self {
            Self::Update { wiring, .. } | Self::Complete { wiring, .. } => *wiring,
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            Self::Update { value, .. } | Self::Complete { value, .. } => *value,
        }
    }
}

/// Linear integer tween driven by explicit timestamps.
///
/// The wiring tag identifies what the produced values drive; the owner matches
/// on the returned event instead of registering closures.
#[derive(Debug, Clone)]
pub struct Interpolator<W> {
    start_time: u64,
    start_value: i32,
    end_value: i32,
    duration: u64,
    wiring: Option<W>,
    in_progress: bool,
    pending_frame_skips: u32,
}

impl<W: Copy> Default for Interpolator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Copy> Interpolator<W> {
    pub fn new() -> Self {
        Self {
            start_time: 0,
            start_value: 0,
            end_value: 0,
            duration: 0,
            wiring: None,
            in_progress: false,
            pending_frame_skips: 0,
        }
    }

    pub fn start(&mut self, now: u64, wiring: W, start_value: i32, end_value: i32, duration: u64) {
        self.start_time = now;
        self.start_value = start_value;
        self.end_value = end_value;
        self.duration = duration;
        self.wiring = Some(wiring);
        self.in_progress = true;
    }

    pub fn step(&mut self, now: u64) -> Option<InterpolatorEvent<W>> {
        if !self.in_progress {
            return None;
        }
        if self.pending_frame_skips > 0 {
            self.pending_frame_skips -= 1;
            debug!(
                remaining = self.pending_frame_skips,
                "interpolator_frame_skipped"
            );
            return None;
        }
        let wiring = self.wiring?;

        let elapsed = now.saturating_sub(self.start_time).min(self.duration);
        let value = self.value_at(elapsed);
        if elapsed == self.duration || value == self.end_value {
            self.in_progress = false;
            return Some(InterpolatorEvent::Complete {
                wiring,
                value: self.end_value,
            });
        }
        Some(InterpolatorEvent::Update { wiring, value })
    }

    /// Restarts with the previously registered wiring and steps once.
    pub fn restart(
        &mut self,
        now: u64,
        start_value: i32,
        end_value: i32,
    ) -> Option<InterpolatorEvent<W>> {
        let Some(wiring) = self.wiring else {
            warn!(start_value, end_value, "interpolator_restart_without_wiring");
            return None;
        };
        self.start(now, wiring, start_value, end_value, self.duration);
        self.step(now)
    }

    pub fn skip_frames(&mut self, count: u32) {
        self.pending_frame_skips = self.pending_frame_skips.saturating_add(count);
    }

    pub fn stop(&mut self) {
        self.in_progress = false;
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn end_value(&self) -> i32 {
        self.end_value
    }

    pub fn wiring(&self) -> Option<W> {
        self.wiring
    }

    fn value_at(&self, elapsed: u64) -> i32 {
        if self.duration == 0 {
            return self.end_value;
        }
        let span = f64::from(self.end_value) - f64::from(self.start_value);
        let progress = elapsed as f64 / self.duration as f64;
        (f64::from(self.start_value) + span * progress).round() as i32
    }
}
