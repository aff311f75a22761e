use sim::FrameReport;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LoopMetricsSnapshot {
    pub(crate) fps: f32,
    pub(crate) tps: f32,
    pub(crate) frame_time_ms: f32,
    pub(crate) motions: u32,
    pub(crate) attacks: u32,
}

/// Per-interval frame and tick counters, measured on the simulated clock.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start_ms: u64,
    interval_ms: u64,
    frames: u32,
    ticks: u32,
    frame_time_sum_ms: u64,
    motions: u32,
    attacks: u32,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval_ms: u64, start_ms: u64) -> Self {
        Self {
            interval_start_ms: start_ms,
            interval_ms: interval_ms.max(1),
            frames: 0,
            ticks: 0,
            frame_time_sum_ms: 0,
            motions: 0,
            attacks: 0,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt_ms: u64) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum_ms = self.frame_time_sum_ms.saturating_add(frame_dt_ms);
    }

    pub(crate) fn record_tick(&mut self, report: &FrameReport) {
        self.ticks = self.ticks.saturating_add(1);
        self.motions = self.motions.saturating_add(report.motions_updated as u32);
        self.attacks = self.attacks.saturating_add(report.attacks as u32);
    }

    pub(crate) fn maybe_snapshot(&mut self, now_ms: u64) -> Option<LoopMetricsSnapshot> {
        let elapsed_ms = now_ms.saturating_sub(self.interval_start_ms);
        if elapsed_ms < self.interval_ms {
            return None;
        }

        let elapsed_seconds = (elapsed_ms as f32 / 1000.0).max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            self.frame_time_sum_ms as f32 / self.frames as f32
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            motions: self.motions,
            attacks: self.attacks,
        };

        self.interval_start_ms = now_ms;
        self.frames = 0;
        self.ticks = 0;
        self.frame_time_sum_ms = 0;
        self.motions = 0;
        self.attacks = 0;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32, epsilon: f32) -> bool {
        (a - b).abs() <= epsilon
    }

    #[test]
    fn snapshot_computes_expected_values() {
        let mut metrics = MetricsAccumulator::new(1_000, 0);
        metrics.record_frame(10);
        metrics.record_frame(20);
        let report = FrameReport {
            motions_updated: 2,
            attacks: 1,
            ..FrameReport::default()
        };
        metrics.record_tick(&report);
        metrics.record_tick(&FrameReport::default());
        metrics.record_tick(&report);

        let snapshot = metrics.maybe_snapshot(2_000).expect("snapshot");
        assert!(approx_eq(snapshot.fps, 1.0, 0.01));
        assert!(approx_eq(snapshot.tps, 1.5, 0.01));
        assert!(approx_eq(snapshot.frame_time_ms, 15.0, 0.01));
        assert_eq!(snapshot.motions, 4);
        assert_eq!(snapshot.attacks, 2);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut metrics = MetricsAccumulator::new(1_000, 500);
        metrics.record_frame(16);
        metrics.record_tick(&FrameReport::default());

        assert!(metrics.maybe_snapshot(1_499).is_none());
        assert!(metrics.maybe_snapshot(1_500).is_some());
        assert!(metrics.maybe_snapshot(1_600).is_none());
    }
}
