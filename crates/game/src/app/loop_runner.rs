use std::process::ExitCode;
use std::time::Duration;

use sim::{FrameOrchestrator, World};
use tracing::{error, info, warn};

use super::bootstrap::{AppError, AppWiring};
use super::metrics::MetricsAccumulator;
use super::scenario::Scenario;

pub(crate) const SLOW_FRAME_ENV_VAR: &str = "TILESIM_SLOW_FRAME_MS";

/// Host loop settings. The host clock is simulated: every host frame
/// advances it by one target frame period plus any injected slow-frame delay.
#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_fps: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) metrics_log_interval: Duration,
    pub(crate) simulated_slow_frame_ms: u64,
    pub(crate) slow_frame_every: u32,
    pub(crate) frame_count: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            slow_frame_every: 300,
            frame_count: 60 * 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LoopSummary {
    pub(crate) host_frames: u32,
    pub(crate) ticks: u64,
    pub(crate) sim_time_ms: u64,
    pub(crate) dropped_backlog_ms: u64,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_scenario(app) {
        Ok(summary) => {
            info!(
                host_frames = summary.host_frames,
                ticks = summary.ticks,
                sim_time_ms = summary.sim_time_ms,
                dropped_backlog_ms = summary.dropped_backlog_ms,
                "session_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_scenario(app: AppWiring) -> Result<LoopSummary, AppError> {
    let (mut world, mut scenario) = Scenario::build(app.sim_config, app.kinds)?;
    let mut orchestrator = FrameOrchestrator::new(world.config());
    let mut config = app.loop_config;
    config.simulated_slow_frame_ms = resolve_slow_frame_ms(config.simulated_slow_frame_ms);

    let summary = run_headless(&config, &mut world, &mut orchestrator, &mut scenario);

    let outcome = scenario.summary();
    info!(
        commands = outcome.commands_run,
        hits = outcome.hits,
        absorbed = outcome.absorbed,
        deaths = outcome.deaths,
        loot = outcome.loot_messages.len(),
        "scenario_finished"
    );
    let snapshot = world.snapshot().to_json_pretty().map_err(AppError::Snapshot)?;
    info!(snapshot = snapshot.as_str(), "world_snapshot");
    Ok(summary)
}

/// Drives the world with fixed simulation ticks from a simulated host clock.
fn run_headless(
    config: &LoopConfig,
    world: &mut World,
    orchestrator: &mut FrameOrchestrator,
    scenario: &mut Scenario,
) -> LoopSummary {
    let fixed_dt = Duration::from_millis(world.config().frame_duration_ms());
    let host_frame = normalize_non_zero_duration(
        Duration::from_secs(1) / config.target_fps.max(1),
        fixed_dt,
    );
    let metrics_interval = normalize_non_zero_duration(
        config.metrics_log_interval,
        Duration::from_secs(1),
    );
    let mut metrics = MetricsAccumulator::new(duration_ms(metrics_interval), 0);
    let mut accumulator = Duration::ZERO;
    let mut host_time = Duration::ZERO;
    let mut sim_time_ms = world.current_time();
    let mut summary = LoopSummary::default();

    for frame_index in 0..config.frame_count {
        let mut raw_frame_dt = host_frame;
        if config.simulated_slow_frame_ms > 0
            && config.slow_frame_every > 0
            && frame_index % config.slow_frame_every == config.slow_frame_every - 1
        {
            raw_frame_dt += Duration::from_millis(config.simulated_slow_frame_ms);
        }
        host_time += raw_frame_dt;
        let frame_dt = clamp_frame_delta(raw_frame_dt, config.max_frame_delta);
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_frame_steps(accumulator, fixed_dt, config.max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_backlog_ms = duration_ms(plan.dropped_backlog),
                max_ticks_per_frame = config.max_ticks_per_frame,
                "frame_backlog_dropped"
            );
            summary.dropped_backlog_ms += duration_ms(plan.dropped_backlog);
        }

        for _ in 0..plan.ticks_to_run {
            sim_time_ms += duration_ms(fixed_dt);
            scenario.before_tick(world, sim_time_ms);
            let report = orchestrator.update(world, sim_time_ms);
            scenario.after_tick(world);
            metrics.record_tick(&report);
            summary.ticks += 1;
        }

        metrics.record_frame(duration_ms(frame_dt));
        summary.host_frames += 1;
        if let Some(snapshot) = metrics.maybe_snapshot(duration_ms(host_time)) {
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                motions = snapshot.motions,
                attacks = snapshot.attacks,
                entities = world.entity_count(),
                "frame_metrics"
            );
        }
    }

    summary.sim_time_ms = sim_time_ms;
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_frame_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn duration_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

fn resolve_slow_frame_ms(config_slow_frame_ms: u64) -> u64 {
    match std::env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => ms,
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid_slow_frame_env_var"
                );
                config_slow_frame_ms
            }
        },
        Err(_) => config_slow_frame_ms,
    }
}
