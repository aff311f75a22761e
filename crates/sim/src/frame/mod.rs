use serde::Serialize;
use tracing::debug;

use crate::config::SimConfig;
use crate::entity::Animatable;
use crate::timing::CooldownTimer;
use crate::world::World;

mod effects;
mod tiles;

pub use effects::{EffectAnimation, TimedLabel, TimedOverlay};
pub use tiles::AnimatedTile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePhase {
    Zoning,
    Movement,
    Combat,
    Aggro,
    Animations,
    Tiles,
    TransientTimers,
    ScheduledEffects,
}

pub const FRAME_PHASE_ORDER: [FramePhase; 8] = [
    FramePhase::Zoning,
    FramePhase::Movement,
    FramePhase::Combat,
    FramePhase::Aggro,
    FramePhase::Animations,
    FramePhase::Tiles,
    FramePhase::TransientTimers,
    FramePhase::ScheduledEffects,
];

impl FramePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zoning => "zoning",
            Self::Movement => "movement",
            Self::Combat => "combat",
            Self::Aggro => "aggro",
            Self::Animations => "animations",
            Self::Tiles => "tiles",
            Self::TransientTimers => "transient_timers",
            Self::ScheduledEffects => "scheduled_effects",
        }
    }
}

/// What one frame did, phase by phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub time_ms: u64,
    pub zoning_started: bool,
    pub zoning_completed: bool,
    pub motions_started: usize,
    pub motions_updated: usize,
    pub steps_completed: usize,
    pub attacks: usize,
    pub aggro_polled: bool,
    pub animations_advanced: usize,
    pub effects_advanced: usize,
    pub tiles_advanced: usize,
    pub overlays_expired: usize,
    pub scheduled_fired: usize,
    pub phases: Vec<FramePhase>,
}

/// Per-frame driver over a [`World`] plus the decorative state that lives
/// outside it.
pub struct FrameOrchestrator {
    aggro_timer: CooldownTimer,
    tiles: Vec<AnimatedTile>,
    effects: Vec<EffectAnimation>,
    overlays: Vec<Box<dyn TimedOverlay>>,
    frame_count: u64,
}

impl FrameOrchestrator {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            aggro_timer: CooldownTimer::new(config.aggro_poll_interval_ms, 0),
            tiles: Vec::new(),
            effects: Vec::new(),
            overlays: Vec::new(),
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn add_tile(&mut self, tile: AnimatedTile) {
        self.tiles.push(tile);
    }

    pub fn tiles(&self) -> &[AnimatedTile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [AnimatedTile] {
        &mut self.tiles
    }

    pub fn add_effect(&mut self, effect: EffectAnimation) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[EffectAnimation] {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut [EffectAnimation] {
        &mut self.effects
    }

    /// Overlays are dropped once they report expiry.
    pub fn add_overlay(&mut self, overlay: Box<dyn TimedOverlay>) {
        self.overlays.push(overlay);
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn update(&mut self, world: &mut World, now: u64) -> FrameReport {
        world.set_current_time(now);
        let mut report = FrameReport {
            time_ms: now,
            ..FrameReport::default()
        };
        for phase in FRAME_PHASE_ORDER {
            self.run_phase(phase, world, now, &mut report);
            report.phases.push(phase);
        }
        self.frame_count += 1;
        report
    }

    fn run_phase(
        &mut self,
        phase: FramePhase,
        world: &mut World,
        now: u64,
        report: &mut FrameReport,
    ) {
        match phase {
            FramePhase::Zoning => {
                report.zoning_started = world.update_zoning(now);
            }
            FramePhase::Movement => {
                report.motions_started = world.start_pending_motions(now);
                let stats = world.step_motions(now);
                report.motions_updated = stats.updated;
                report.steps_completed = stats.completed;
                report.zoning_completed = world.step_zoning(now);
            }
            FramePhase::Combat => {
                report.attacks = world.update_combat(now);
            }
            FramePhase::Aggro => {
                report.aggro_polled = self.poll_aggro(world, now);
            }
            FramePhase::Animations => {
                report.animations_advanced = world.update_entity_animations(now);
                report.effects_advanced = self
                    .effects
                    .iter_mut()
                    .map(|effect| effect.update_animation(now).advanced())
                    .filter(|advanced| *advanced)
                    .count();
            }
            FramePhase::Tiles => {
                report.tiles_advanced = self
                    .tiles
                    .iter_mut()
                    .map(|tile| tile.animate(now))
                    .filter(|advanced| *advanced)
                    .count();
            }
            FramePhase::TransientTimers => {
                for overlay in self.overlays.iter_mut() {
                    overlay.update(now);
                }
                let before = self.overlays.len();
                self.overlays.retain(|overlay| !overlay.is_expired());
                report.overlays_expired = before - self.overlays.len();
            }
            FramePhase::ScheduledEffects => {
                report.scheduled_fired = world.poll_scheduled(now);
            }
        }
    }

    /// Runs the player's aggro check when the player stands idle and the
    /// poll interval has elapsed. The interval is only consumed by a poll.
    fn poll_aggro(&mut self, world: &mut World, now: u64) -> bool {
        let Some(player) = world.player_id() else {
            return false;
        };
        let ready = world
            .combatant(player)
            .map(|c| !c.is_moving() && !c.is_attacking() && !c.is_dead())
            .unwrap_or(false);
        if !ready || !self.aggro_timer.is_over(now) {
            return false;
        }
        debug!(player_id = player.0, now, "aggro_polled");
        world.check_aggro(player);
        true
    }
}
