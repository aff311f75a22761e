use std::collections::BTreeSet;

use crate::nav::GridPos;

use super::animation::AnimationStep;
use super::EntityId;

pub(crate) static NO_ATTACKERS: BTreeSet<EntityId> = BTreeSet::new();

pub trait Movable {
    fn grid_position(&self) -> GridPos;

    fn is_moving(&self) -> bool;

    fn next_cell(&self) -> Option<GridPos>;

    /// The cell this entity claims: its next cell mid-motion, else its current one.
    fn occupied_cell(&self) -> GridPos {
        if self.is_moving() {
            self.next_cell().unwrap_or_else(|| self.grid_position())
        } else {
            self.grid_position()
        }
    }
}

pub trait Targetable {
    fn attackers(&self) -> &BTreeSet<EntityId>;

    fn is_attacked_by(&self, attacker: EntityId) -> bool {
        self.attackers().contains(&attacker)
    }
}

pub trait Animatable {
    fn update_animation(&mut self, now: u64) -> AnimationStep;

    fn is_dirty(&self) -> bool;

    fn clear_dirty(&mut self);
}
