use thiserror::Error;
use tracing::{debug, info, warn};

use crate::content::{EquipmentSlot, ItemEffect, SpriteSource};
use crate::entity::{Entity, EntityId, EntityKind, EntityRole, WeaponSwitch};
use crate::nav::GridPos;

use super::hooks::{EquipmentEvent, InvincibilityEvent, LootEvent};
use super::World;

const INVINCIBLE_SPRITE: &str = "firefox";

/// Why an item stayed on the ground. The message is shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LootError {
    #[error("You already have this {slot}")]
    AlreadyHave { slot: EquipmentSlot },
    #[error("You are wielding a better weapon")]
    BetterWeapon,
    #[error("You are wearing a better armor")]
    BetterArmor,
    #[error("This cannot be looted")]
    NotLootable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootOutcome {
    pub item_kind: String,
    pub slot: EquipmentSlot,
    pub message: String,
}

/// One pending timed effect per entity and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskSlot {
    Invincibility,
    WeaponSwitch,
    ArmorSwitch,
    Hurt,
    Blink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEffect {
    EndInvincibility,
    WeaponSwitchBlink,
    ArmorSwitchBlink,
    StopHurting,
    ToggleVisibility,
}

impl World {
    /// Equips or consumes `item` for `player` and removes the item on success.
    pub fn loot(&mut self, player: EntityId, item: EntityId) -> Result<LootOutcome, LootError> {
        let (item_kind, info) = match self.entities.get(&item) {
            Some(entity) => match entity.role() {
                EntityRole::Item(info) => (entity.kind_name.clone(), info.clone()),
                _ => return Err(LootError::NotLootable),
            },
            None => return Err(LootError::NotLootable),
        };
        let Some(state) = self.entities.get(&player).and_then(Entity::player_state) else {
            return Err(LootError::NotLootable);
        };

        let equipped = match info.slot {
            EquipmentSlot::Weapon => state.weapon().map(str::to_string),
            EquipmentSlot::Armor => Some(state.armor().to_string()),
            EquipmentSlot::Consumable => None,
        };
        let invincible = state.is_invincible();
        let current_rank = equipped.and_then(|name| self.kinds.rank_of(&name));
        if let (Some(rank), Some(current)) = (info.rank, current_rank) {
            if rank == current {
                return Err(LootError::AlreadyHave { slot: info.slot });
            }
            if rank < current {
                return Err(match info.slot {
                    EquipmentSlot::Armor => LootError::BetterArmor,
                    _ => LootError::BetterWeapon,
                });
            }
        }

        info!(
            player_id = player.0,
            item_id = item.0,
            kind = %item_kind,
            slot = info.slot.as_str(),
            "item_looted"
        );
        match info.slot {
            EquipmentSlot::Weapon => self.switch_weapon(player, &item_kind),
            EquipmentSlot::Armor => {
                if invincible {
                    self.stop_invincibility(player);
                }
                self.switch_armor(player, &item_kind);
            }
            EquipmentSlot::Consumable => {
                if info.effect == Some(ItemEffect::Invincibility) {
                    self.start_invincibility(player);
                }
            }
        }
        self.despawn(item);
        Ok(LootOutcome {
            item_kind,
            slot: info.slot,
            message: info.loot_message,
        })
    }

    /// Loots the first item under the player, reporting through the loot hook.
    pub(crate) fn loot_at(&mut self, player: EntityId, cell: GridPos) {
        let Some((item, item_kind)) = self
            .entities
            .values()
            .find(|entity| entity.kind() == EntityKind::Item && entity.grid == cell)
            .map(|entity| (entity.id, entity.kind_name.clone()))
        else {
            return;
        };
        let result = self.loot(player, item).map(|outcome| outcome.message);
        if let Err(err) = &result {
            info!(player_id = player.0, kind = %item_kind, reason = %err, "loot_refused");
        }
        self.hooks.loot.emit(&LootEvent {
            player,
            item_kind,
            result,
        });
    }

    /// Blinks between no weapon and `weapon` before settling on it.
    pub fn switch_weapon(&mut self, id: EntityId, weapon: &str) {
        let now = self.now;
        let interval = self.config.switch_blink_interval_ms;
        let count = self.config.switch_blink_count;
        let Some(state) = self.entities.get_mut(&id).and_then(Entity::player_state_mut) else {
            warn!(entity_id = id.0, "switch_weapon_ignored_not_player");
            return;
        };
        if state.weapon.as_deref() == Some(weapon) {
            return;
        }
        if count <= 1 {
            state.weapon = Some(weapon.to_string());
            self.finish_weapon_switch(id);
            return;
        }
        state.weapon_switch = Some(WeaponSwitch {
            weapon: weapon.to_string(),
            remaining: count,
            shown: true,
        });
        self.scheduler.schedule_repeating(
            (id, TaskSlot::WeaponSwitch),
            now,
            interval,
            ScheduledEffect::WeaponSwitchBlink,
        );
    }

    fn weapon_switch_blink(&mut self, id: EntityId) {
        let Some(state) = self.entities.get_mut(&id).and_then(Entity::player_state_mut) else {
            return;
        };
        let Some(switch) = state.weapon_switch.as_mut() else {
            self.scheduler.cancel_key(&(id, TaskSlot::WeaponSwitch));
            return;
        };
        switch.shown = !switch.shown;
        switch.remaining = switch.remaining.saturating_sub(1);
        let weapon = switch.weapon.clone();
        let settled = switch.remaining <= 1;
        state.weapon = if switch.shown || settled {
            Some(weapon)
        } else {
            None
        };
        if settled {
            self.finish_weapon_switch(id);
        }
    }

    fn finish_weapon_switch(&mut self, id: EntityId) {
        self.scheduler.cancel_key(&(id, TaskSlot::WeaponSwitch));
        let Some(state) = self.entities.get_mut(&id).and_then(Entity::player_state_mut) else {
            return;
        };
        if let Some(switch) = state.weapon_switch.take() {
            state.weapon = Some(switch.weapon);
        }
        let name = state.weapon.clone().unwrap_or_default();
        debug!(entity_id = id.0, weapon = %name, "weapon_switched");
        self.hooks.equipment.emit(&EquipmentEvent {
            entity: id,
            slot: EquipmentSlot::Weapon,
            name,
        });
    }

    /// Changes the armor sprite at once and blinks the entity while the
    /// switch settles.
    pub fn switch_armor(&mut self, id: EntityId, armor: &str) {
        let now = self.now;
        let interval = self.config.switch_blink_interval_ms;
        let count = self.config.switch_blink_count;
        let Some(sprite) = self.kinds.sprite(armor) else {
            warn!(entity_id = id.0, armor, "unknown_armor_sprite");
            return;
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        match entity.player_state() {
            Some(state) if state.armor() != armor => {}
            _ => return,
        }
        entity.set_sprite(sprite);
        entity.idle();
        if let Some(state) = entity.player_state_mut() {
            state.armor = armor.to_string();
            state.armor_switch_remaining = Some(count);
        }
        if count <= 1 {
            self.finish_armor_switch(id);
            return;
        }
        self.scheduler.schedule_repeating(
            (id, TaskSlot::ArmorSwitch),
            now,
            interval,
            ScheduledEffect::ArmorSwitchBlink,
        );
    }

    fn armor_switch_blink(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        entity.toggle_visibility();
        let Some(state) = entity.player_state_mut() else {
            return;
        };
        let remaining = state
            .armor_switch_remaining
            .map(|remaining| remaining.saturating_sub(1))
            .unwrap_or(0);
        state.armor_switch_remaining = Some(remaining);
        if remaining <= 1 {
            self.finish_armor_switch(id);
        }
    }

    fn finish_armor_switch(&mut self, id: EntityId) {
        self.scheduler.cancel_key(&(id, TaskSlot::ArmorSwitch));
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        entity.set_visible(true);
        let Some(state) = entity.player_state_mut() else {
            return;
        };
        state.armor_switch_remaining = None;
        let name = state.armor.clone();
        debug!(entity_id = id.0, armor = %name, "armor_switched");
        self.hooks.equipment.emit(&EquipmentEvent {
            entity: id,
            slot: EquipmentSlot::Armor,
            name,
        });
    }

    /// Shows the invincible sprite for the configured duration. Starting again
    /// while active restarts the timer.
    pub fn start_invincibility(&mut self, id: EntityId) {
        let now = self.now;
        let duration = self.config.invincibility_duration_ms;
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(state) = entity.player_state_mut() else {
            warn!(entity_id = id.0, "invincibility_ignored_not_player");
            return;
        };
        let already = std::mem::replace(&mut state.invincible, true);
        if !already {
            match self.kinds.sprite(INVINCIBLE_SPRITE) {
                Some(sprite) => {
                    entity.set_sprite(sprite);
                    entity.idle();
                }
                None => warn!(sprite = INVINCIBLE_SPRITE, "invincible_sprite_missing"),
            }
            info!(entity_id = id.0, duration_ms = duration, "invincibility_started");
            self.hooks.invincibility.emit(&InvincibilityEvent {
                entity: id,
                active: true,
            });
        }
        self.scheduler.schedule_once(
            (id, TaskSlot::Invincibility),
            now,
            duration,
            ScheduledEffect::EndInvincibility,
        );
    }

    pub fn stop_invincibility(&mut self, id: EntityId) {
        self.scheduler.cancel_key(&(id, TaskSlot::Invincibility));
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(state) = entity.player_state_mut() else {
            return;
        };
        if !std::mem::replace(&mut state.invincible, false) {
            return;
        }
        let armor = state.armor.clone();
        if let Some(sprite) = self.kinds.sprite(&armor) {
            entity.set_sprite(sprite);
            entity.idle();
        }
        info!(entity_id = id.0, "invincibility_ended");
        self.hooks.invincibility.emit(&InvincibilityEvent {
            entity: id,
            active: false,
        });
    }

    /// Flags the entity as hurt for a short flash.
    pub fn hurt(&mut self, id: EntityId) {
        let now = self.now;
        let flash = self.config.hurt_flash_ms;
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        entity.hurting = true;
        self.scheduler.schedule_once(
            (id, TaskSlot::Hurt),
            now,
            flash,
            ScheduledEffect::StopHurting,
        );
    }

    pub fn blink(&mut self, id: EntityId, interval: u64) {
        if !self.entities.contains_key(&id) {
            return;
        }
        let now = self.now;
        self.scheduler.schedule_repeating(
            (id, TaskSlot::Blink),
            now,
            interval,
            ScheduledEffect::ToggleVisibility,
        );
    }

    pub fn stop_blinking(&mut self, id: EntityId) {
        self.scheduler.cancel_key(&(id, TaskSlot::Blink));
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_visible(true);
        }
    }

    /// Fires every timed effect due at `now`.
    pub(crate) fn poll_scheduled(&mut self, now: u64) -> usize {
        let due = self.scheduler.poll_due(now);
        let fired = due.len();
        for task in due {
            let (id, _) = task.key;
            if !self.entities.contains_key(&id) {
                continue;
            }
            match task.payload {
                ScheduledEffect::EndInvincibility => self.stop_invincibility(id),
                ScheduledEffect::WeaponSwitchBlink => self.weapon_switch_blink(id),
                ScheduledEffect::ArmorSwitchBlink => self.armor_switch_blink(id),
                ScheduledEffect::StopHurting => {
                    if let Some(entity) = self.entities.get_mut(&id) {
                        entity.hurting = false;
                    }
                }
                ScheduledEffect::ToggleVisibility => {
                    if let Some(entity) = self.entities.get_mut(&id) {
                        entity.toggle_visibility();
                    }
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::test_support::{open_world, run_motions};
    use super::*;

    fn poll_until(world: &mut World, from: u64, to: u64) {
        let mut now = from;
        while now <= to {
            world.set_current_time(now);
            world.poll_scheduled(now);
            now += 10;
        }
    }

    #[test]
    fn lower_or_equal_rank_items_are_refused() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let sword = world.spawn("sword1", GridPos::new(1, 0)).expect("sword");
        let cloth = world.spawn("clotharmor", GridPos::new(2, 0)).expect("armor");
        let chest = world.spawn("chest", GridPos::new(3, 0)).expect("chest");

        assert_eq!(
            world.loot(player, sword),
            Err(LootError::AlreadyHave {
                slot: EquipmentSlot::Weapon
            })
        );
        assert_eq!(
            world.loot(player, sword).map_err(|err| err.to_string()),
            Err("You already have this weapon".to_string())
        );
        assert_eq!(
            world.loot(player, cloth),
            Err(LootError::AlreadyHave {
                slot: EquipmentSlot::Armor
            })
        );
        assert_eq!(world.loot(player, chest), Err(LootError::NotLootable));
        assert!(world.contains(sword));
    }

    #[test]
    fn better_weapon_blinks_then_settles() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let axe = world.spawn("axe", GridPos::new(1, 0)).expect("axe");
        let sword = world.spawn("sword2", GridPos::new(2, 0)).expect("sword");
        let equipped = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&equipped);
        world
            .hooks_mut()
            .equipment
            .register(move |event| seen.borrow_mut().push(event.name.clone()));

        let outcome = world.loot(player, axe).expect("loot axe");
        assert_eq!(outcome.slot, EquipmentSlot::Weapon);
        assert!(!world.contains(axe));
        let state = world.entity(player).and_then(Entity::player_state).expect("state");
        assert!(state.is_switching_weapon());

        poll_until(&mut world, 0, 2_000);

        let state = world.entity(player).and_then(Entity::player_state).expect("state");
        assert!(!state.is_switching_weapon());
        assert_eq!(state.weapon(), Some("axe"));
        assert_eq!(*equipped.borrow(), vec!["axe".to_string()]);
        assert!(!world.scheduler().is_scheduled(&(player, TaskSlot::WeaponSwitch)));

        assert_eq!(world.loot(player, sword), Err(LootError::BetterWeapon));
    }

    #[test]
    fn armor_switch_ends_visible_with_new_sprite() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let mail = world.spawn("mailarmor", GridPos::new(1, 0)).expect("mail");
        let leather = world.spawn("leatherarmor", GridPos::new(2, 0)).expect("leather");

        world.loot(player, mail).expect("loot mail");
        assert_eq!(world.entity(player).map(Entity::sprite_name), Some("mailarmor"));

        poll_until(&mut world, 0, 2_000);

        let entity = world.entity(player).expect("player");
        assert!(entity.is_visible());
        assert!(!entity.player_state().expect("state").is_switching_armor());
        assert_eq!(world.loot(player, leather), Err(LootError::BetterArmor));
    }

    #[test]
    fn potion_grants_timed_invincibility() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let potion = world.spawn("firepotion", GridPos::new(1, 0)).expect("potion");
        world.set_current_time(1_000);

        let outcome = world.loot(player, potion).expect("loot potion");
        assert_eq!(outcome.message, "You feel the power of Firefox!");
        let entity = world.entity(player).expect("player");
        assert_eq!(entity.sprite_name(), "firefox");
        assert!(entity.player_state().expect("state").is_invincible());
        assert_eq!(
            world.scheduler().due_at(&(player, TaskSlot::Invincibility)),
            Some(16_000)
        );

        world.poll_scheduled(15_999);
        assert!(world.entity(player).and_then(Entity::player_state).expect("state").is_invincible());
        world.poll_scheduled(16_000);

        let entity = world.entity(player).expect("player");
        assert!(!entity.player_state().expect("state").is_invincible());
        assert_eq!(entity.sprite_name(), "clotharmor");
    }

    #[test]
    fn armor_loot_ends_invincibility_first() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let mail = world.spawn("mailarmor", GridPos::new(1, 0)).expect("mail");
        world.start_invincibility(player);

        world.loot(player, mail).expect("loot mail");

        let entity = world.entity(player).expect("player");
        assert!(!entity.player_state().expect("state").is_invincible());
        assert_eq!(entity.sprite_name(), "mailarmor");
        assert!(!world.scheduler().is_scheduled(&(player, TaskSlot::Invincibility)));
    }

    #[test]
    fn stopping_on_item_loots_it() {
        let mut world = open_world(6, 1);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let potion = world.spawn("firepotion", GridPos::new(3, 0)).expect("potion");
        let loots = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&loots);
        world
            .hooks_mut()
            .loot
            .register(move |event| seen.borrow_mut().push(event.result.clone()));

        world.go(player, GridPos::new(3, 0));
        run_motions(&mut world, 20, 2_000);

        assert!(!world.contains(potion));
        assert_eq!(
            *loots.borrow(),
            vec![Ok("You feel the power of Firefox!".to_string())]
        );
    }

    #[test]
    fn hurt_flash_and_blink_are_timed() {
        let mut world = open_world(4, 4);
        let rat = world.spawn("rat", GridPos::new(1, 1)).expect("rat");

        world.hurt(rat);
        assert!(world.entity(rat).expect("rat").is_hurting());
        world.poll_scheduled(75);
        assert!(!world.entity(rat).expect("rat").is_hurting());

        world.blink(rat, 150);
        world.poll_scheduled(150);
        assert!(!world.entity(rat).expect("rat").is_visible());
        world.poll_scheduled(300);
        assert!(world.entity(rat).expect("rat").is_visible());

        world.poll_scheduled(450);
        world.stop_blinking(rat);
        assert!(world.entity(rat).expect("rat").is_visible());
        assert!(!world.scheduler().is_scheduled(&(rat, TaskSlot::Blink)));
    }
}
