use std::fmt;

use crate::content::EquipmentSlot;
use crate::entity::EntityId;
use crate::nav::{GridPos, Orientation};

use super::player::LootError;

/// Holds at most one observer; registering again replaces the previous one.
pub struct HookSlot<E> {
    handler: Option<Box<dyn FnMut(&E)>>,
}

impl<E> Default for HookSlot<E> {
    fn default() -> Self {
        Self { handler: None }
    }
}

impl<E> fmt::Debug for HookSlot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlot")
            .field("registered", &self.handler.is_some())
            .finish()
    }
}

impl<E> HookSlot<E> {
    /// Returns true when an earlier observer was replaced.
    pub fn register(&mut self, handler: impl FnMut(&E) + 'static) -> bool {
        self.handler.replace(Box::new(handler)).is_some()
    }

    pub fn clear(&mut self) -> bool {
        self.handler.take().is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn emit(&mut self, event: &E) {
        if let Some(handler) = self.handler.as_mut() {
            handler(event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub entity: EntityId,
    pub cell: GridPos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub entity: EntityId,
    pub path: Vec<GridPos>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub entity: EntityId,
    pub pixel_x: i32,
    pub pixel_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggroEvent {
    pub monster: EntityId,
    pub player: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackEvent {
    pub attacker: EntityId,
    pub target: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeathEvent {
    pub entity: EntityId,
    pub cell: GridPos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentEvent {
    pub entity: EntityId,
    pub slot: EquipmentSlot,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvincibilityEvent {
    pub entity: EntityId,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootEvent {
    pub player: EntityId,
    pub item_kind: String,
    pub result: Result<String, LootError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoningEvent {
    pub orientation: Option<Orientation>,
    pub camera: GridPos,
}

/// Every notification the world emits to collaborators.
#[derive(Debug, Default)]
pub struct WorldHooks {
    pub before_step: HookSlot<StepEvent>,
    pub step: HookSlot<StepEvent>,
    pub start_pathing: HookSlot<PathEvent>,
    pub stop_pathing: HookSlot<StepEvent>,
    pub has_moved: HookSlot<MotionEvent>,
    pub check_aggro: HookSlot<StepEvent>,
    pub aggro: HookSlot<AggroEvent>,
    pub attack: HookSlot<AttackEvent>,
    pub death: HookSlot<DeathEvent>,
    pub equipment: HookSlot<EquipmentEvent>,
    pub invincibility: HookSlot<InvincibilityEvent>,
    pub loot: HookSlot<LootEvent>,
    pub zoning_started: HookSlot<ZoningEvent>,
    pub zoning_ended: HookSlot<ZoningEvent>,
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn registering_replaces_previous_observer() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut slot = HookSlot::<AttackEvent>::default();
        let first = Rc::clone(&seen);
        assert!(!slot.register(move |_| first.borrow_mut().push("first")));
        let second = Rc::clone(&seen);
        assert!(slot.register(move |_| second.borrow_mut().push("second")));

        slot.emit(&AttackEvent {
            attacker: EntityId(1),
            target: EntityId(2),
        });

        assert_eq!(*seen.borrow(), vec!["second"]);
    }

    #[test]
    fn empty_slot_emits_nothing() {
        let mut slot = HookSlot::<DeathEvent>::default();
        slot.emit(&DeathEvent {
            entity: EntityId(1),
            cell: GridPos::new(0, 0),
        });
        assert!(!slot.is_registered());
        assert!(!slot.clear());
    }
}
