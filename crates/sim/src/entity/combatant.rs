use std::collections::BTreeSet;

use serde::Serialize;

use crate::nav::{Axis, GridPos};
use crate::timing::{CooldownTimer, Interpolator};

use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantState {
    Idle,
    Moving,
    Attacking,
    Dead,
}

/// Movement and targeting state carried by every character.
///
/// `path.is_some()` is the moving flag; `step` always indexes into the path
/// while one exists. Links to other entities are ids resolved through the
/// world arena.
#[derive(Debug, Clone)]
pub struct Combatant {
    pub(crate) path: Option<Vec<GridPos>>,
    pub(crate) step: usize,
    pub(crate) next_cell: Option<GridPos>,
    pub(crate) destination: Option<GridPos>,
    pub(crate) new_destination: Option<GridPos>,
    pub(crate) interrupted: bool,
    pub(crate) movement: Interpolator<Axis>,
    pub(crate) target: Option<EntityId>,
    pub(crate) unconfirmed_target: Option<EntityId>,
    pub(crate) previous_target: Option<EntityId>,
    pub(crate) attackers: BTreeSet<EntityId>,
    pub(crate) attacking: bool,
    pub(crate) following: bool,
    pub(crate) dead: bool,
    pub(crate) hit_points: i32,
    pub(crate) max_hit_points: i32,
    pub(crate) move_speed: u64,
    pub(crate) attack_cooldown: CooldownTimer,
}

impl Combatant {
    pub fn new(hit_points: i32, move_speed: u64, attack_rate: u64) -> Self {
        Self {
            path: None,
            step: 0,
            next_cell: None,
            destination: None,
            new_destination: None,
            interrupted: false,
            movement: Interpolator::new(),
            target: None,
            unconfirmed_target: None,
            previous_target: None,
            attackers: BTreeSet::new(),
            attacking: false,
            following: false,
            dead: false,
            hit_points,
            max_hit_points: hit_points,
            move_speed,
            attack_cooldown: CooldownTimer::new(attack_rate, 0),
        }
    }

    pub fn state(&self) -> CombatantState {
        if self.dead {
            CombatantState::Dead
        } else if self.attacking {
            CombatantState::Attacking
        } else if self.is_moving() {
            CombatantState::Moving
        } else {
            CombatantState::Idle
        }
    }

    pub fn is_moving(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_attacking(&self) -> bool {
        self.attacking
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn has_next_step(&self) -> bool {
        self.path
            .as_ref()
            .map(|path| self.step + 1 < path.len())
            .unwrap_or(false)
    }

    pub fn has_changed_path(&self) -> bool {
        self.new_destination.is_some()
    }

    pub fn path(&self) -> Option<&[GridPos]> {
        self.path.as_deref()
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn current_path_cell(&self) -> Option<GridPos> {
        self.path.as_ref().and_then(|path| path.get(self.step).copied())
    }

    pub fn next_cell(&self) -> Option<GridPos> {
        self.next_cell
    }

    pub fn destination(&self) -> Option<GridPos> {
        self.destination
    }

    pub fn pending_destination(&self) -> Option<GridPos> {
        self.new_destination
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn previous_target(&self) -> Option<EntityId> {
        self.previous_target
    }

    pub fn is_waiting_to_attack(&self, target: EntityId) -> bool {
        self.unconfirmed_target == Some(target)
    }

    pub fn attackers(&self) -> &BTreeSet<EntityId> {
        &self.attackers
    }

    pub fn is_attacked_by(&self, attacker: EntityId) -> bool {
        self.attackers.contains(&attacker)
    }

    pub fn hit_points(&self) -> i32 {
        self.hit_points
    }

    pub fn max_hit_points(&self) -> i32 {
        self.max_hit_points
    }

    pub fn set_hit_points(&mut self, hit_points: i32) {
        self.hit_points = hit_points.clamp(0, self.max_hit_points);
    }

    pub fn move_speed(&self) -> u64 {
        self.move_speed
    }

    pub fn movement(&self) -> &Interpolator<Axis> {
        &self.movement
    }

    /// Returns false when the attacker was already registered.
    pub(crate) fn add_attacker(&mut self, attacker: EntityId) -> bool {
        self.attackers.insert(attacker)
    }

    /// Returns false when the attacker was not registered.
    pub(crate) fn remove_attacker(&mut self, attacker: EntityId) -> bool {
        self.attackers.remove(&attacker)
    }

    pub(crate) fn clear_path(&mut self) {
        self.path = None;
        self.step = 0;
        self.next_cell = None;
        self.new_destination = None;
        self.interrupted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_tracks_path_presence() {
        let mut combatant = Combatant::new(10, 120, 800);
        assert!(!combatant.is_moving());
        assert_eq!(combatant.state(), CombatantState::Idle);

        combatant.path = Some(vec![GridPos::new(0, 0), GridPos::new(1, 0)]);
        assert!(combatant.is_moving());
        assert!(combatant.has_next_step());
        assert_eq!(combatant.state(), CombatantState::Moving);

        combatant.clear_path();
        assert!(!combatant.is_moving());
        assert_eq!(combatant.step_index(), 0);
    }

    #[test]
    fn attacking_and_dead_take_precedence_in_state() {
        let mut combatant = Combatant::new(10, 120, 800);
        combatant.path = Some(vec![GridPos::new(0, 0), GridPos::new(1, 0)]);
        combatant.attacking = true;
        assert_eq!(combatant.state(), CombatantState::Attacking);
        assert!(combatant.is_moving());

        combatant.dead = true;
        assert_eq!(combatant.state(), CombatantState::Dead);
    }

    #[test]
    fn attacker_registration_reports_duplicates_and_absences() {
        let mut combatant = Combatant::new(10, 120, 800);

        assert!(combatant.add_attacker(EntityId(4)));
        assert!(!combatant.add_attacker(EntityId(4)));
        assert!(combatant.is_attacked_by(EntityId(4)));
        assert!(combatant.remove_attacker(EntityId(4)));
        assert!(!combatant.remove_attacker(EntityId(4)));
    }

    #[test]
    fn hit_points_are_clamped() {
        let mut combatant = Combatant::new(10, 120, 800);
        combatant.set_hit_points(-5);
        assert_eq!(combatant.hit_points(), 0);
        combatant.set_hit_points(50);
        assert_eq!(combatant.hit_points(), 10);
    }
}
