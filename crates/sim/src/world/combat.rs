use tracing::{debug, info, warn};

use crate::content::SpriteSource;
use crate::entity::{
    Animatable, AnimationEnd, AnimationStep, Entity, EntityId, EntityKind, EntityRole, Movable,
    DEATH_CLIP,
};
use crate::nav::{GridPos, Orientation};

use super::hooks::{AggroEvent, AttackEvent, DeathEvent, StepEvent};
use super::World;

const DEATH_SPRITE: &str = "death";

impl World {
    /// Marks the entity as attacking `target` and starts closing in on it.
    pub fn engage(&mut self, id: EntityId, target: EntityId) {
        if !self.is_live_combatant(id) {
            warn!(entity_id = id.0, target_id = target.0, "engage_ignored");
            return;
        }
        let available = self
            .entities
            .get(&target)
            .map(|entity| !entity.is_dead())
            .unwrap_or(false);
        if !available || target == id {
            warn!(entity_id = id.0, target_id = target.0, "engage_target_unavailable");
            return;
        }
        if let Some(combatant) = self.combatant_mut(id) {
            combatant.attacking = true;
        }
        self.set_target(id, target);
        self.follow(id, target);
    }

    pub fn disengage(&mut self, id: EntityId) {
        let Some(combatant) = self.combatant_mut(id) else {
            return;
        };
        combatant.attacking = false;
        combatant.following = false;
        self.remove_target(id);
    }

    /// Points the entity at `target` and registers the reverse attacker link.
    pub fn set_target(&mut self, id: EntityId, target: EntityId) {
        if !self.entities.contains_key(&target) {
            warn!(entity_id = id.0, target_id = target.0, "target_missing");
            return;
        }
        let Some(combatant) = self.combatant_mut(id) else {
            warn!(entity_id = id.0, "set_target_ignored_not_combatant");
            return;
        };
        if combatant.target == Some(target) {
            debug!(entity_id = id.0, target_id = target.0, "target_already_set");
            return;
        }
        let replaced = combatant.target.is_some();
        if replaced {
            self.remove_target(id);
        }
        if let Some(combatant) = self.combatant_mut(id) {
            combatant.unconfirmed_target = None;
            combatant.target = Some(target);
        }
        self.add_attacker(target, id);
    }

    pub fn remove_target(&mut self, id: EntityId) {
        let Some(target) = self.combatant_mut(id).and_then(|c| c.target.take()) else {
            return;
        };
        self.remove_attacker(target, id);
    }

    /// Returns false for non-combatant targets and duplicate registrations.
    pub fn add_attacker(&mut self, target: EntityId, attacker: EntityId) -> bool {
        let Some(combatant) = self.combatant_mut(target) else {
            return false;
        };
        if !combatant.add_attacker(attacker) {
            warn!(
                entity_id = target.0,
                attacker_id = attacker.0,
                "attacker_already_registered"
            );
            return false;
        }
        true
    }

    pub fn remove_attacker(&mut self, target: EntityId, attacker: EntityId) -> bool {
        let Some(combatant) = self.combatant_mut(target) else {
            return false;
        };
        if !combatant.remove_attacker(attacker) {
            warn!(
                entity_id = target.0,
                attacker_id = attacker.0,
                "attacker_not_registered"
            );
            return false;
        }
        true
    }

    /// True when the target stands in an orthogonally adjacent or the same
    /// cell and the attack cooldown has elapsed. A successful check restarts
    /// the cooldown.
    pub fn can_attack(&mut self, id: EntityId, now: u64) -> bool {
        let in_reach = match self.entities.get(&id) {
            Some(entity) => entity
                .combatant()
                .and_then(|c| c.target)
                .and_then(|target| self.entities.get(&target))
                .map(|target| entity.is_adjacent_non_diagonal(target))
                .unwrap_or(false),
            None => false,
        };
        if !in_reach {
            return false;
        }
        self.combatant_mut(id)
            .map(|c| c.attack_cooldown.is_over(now))
            .unwrap_or(false)
    }

    /// Facing from one entity toward another; `None` on the same cell.
    pub fn orientation_to(&self, id: EntityId, other: EntityId) -> Option<Orientation> {
        let from = self.entities.get(&id)?;
        let to = self.entities.get(&other)?;
        from.orientation_to(to)
    }

    pub fn look_at_target(&mut self, id: EntityId) {
        let Some(target) = self.combatant(id).and_then(|c| c.target) else {
            return;
        };
        if let Some(orientation) = self.orientation_to(id, target) {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.turn_to(orientation);
            }
        }
    }

    /// Records a pending attack that the server has not confirmed yet.
    pub fn wait_to_attack(&mut self, id: EntityId, target: EntityId) {
        if let Some(combatant) = self.combatant_mut(id) {
            combatant.unconfirmed_target = Some(target);
        }
    }

    /// Aggro check run whenever an entity enters a cell. Only the player
    /// provokes monsters.
    pub fn check_aggro(&mut self, id: EntityId) {
        let Some(player) = self.entities.get(&id) else {
            return;
        };
        if player.kind() != EntityKind::Player || player.is_dead() {
            return;
        }
        let cell = player.grid;
        self.hooks.check_aggro.emit(&StepEvent { entity: id, cell });

        let monsters: Vec<EntityId> = self
            .entities
            .values()
            .filter(|monster| match monster.role() {
                EntityRole::Monster(traits) => {
                    traits.aggressive
                        && !monster.is_dead()
                        && !monster.combatant().map(|c| c.attacking).unwrap_or(false)
                        && monster.is_near(player, traits.aggro_range)
                }
                _ => false,
            })
            .map(Entity::id)
            .collect();
        for monster in monsters {
            self.aggro(id, monster, cell);
        }
    }

    fn aggro(&mut self, player: EntityId, monster: EntityId, cell: GridPos) {
        let waiting = self
            .combatant(monster)
            .map(|c| c.is_waiting_to_attack(player))
            .unwrap_or(false);
        let attacked = self
            .combatant(player)
            .map(|c| c.is_attacked_by(monster))
            .unwrap_or(false);
        if waiting || attacked {
            return;
        }
        info!(
            player_id = player.0,
            monster_id = monster.0,
            x = cell.x,
            y = cell.y,
            "player_aggroed"
        );
        self.wait_to_attack(monster, player);
        self.hooks.aggro.emit(&AggroEvent { monster, player });
    }

    /// Kills the entity: links are broken, attackers stand down, and the
    /// death clip plays before removal.
    pub fn die(&mut self, id: EntityId) {
        let Some(combatant) = self.combatant(id) else {
            warn!(entity_id = id.0, "die_ignored_not_combatant");
            return;
        };
        if combatant.is_dead() {
            warn!(entity_id = id.0, "die_ignored_already_dead");
            return;
        }
        self.remove_target(id);
        self.unregister_position(id);

        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let cell = entity.grid;
        let kind = entity.kind_name.clone();
        let attackers: Vec<EntityId> = match entity.combatant.as_mut() {
            Some(combatant) => {
                combatant.dead = true;
                combatant.attacking = false;
                combatant.following = false;
                combatant.unconfirmed_target = None;
                combatant.previous_target = None;
                combatant.clear_path();
                combatant.movement.stop();
                combatant.attackers.iter().copied().collect()
            }
            None => Vec::new(),
        };
        for attacker in attackers {
            self.disengage(attacker);
            if let Some(entity) = self.entities.get_mut(&attacker) {
                entity.idle();
            }
        }
        self.scheduler.cancel_where(|(owner, _)| *owner == id);

        info!(entity_id = id.0, kind = %kind, x = cell.x, y = cell.y, "entity_died");
        self.hooks.death.emit(&DeathEvent { entity: id, cell });
        self.play_death_animation(id);
    }

    fn play_death_animation(&mut self, id: EntityId) {
        let speed = self.config.death_animation_speed_ms;
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        entity.set_visible(true);
        entity.hurting = false;
        if !entity.animations.contains_key(DEATH_CLIP) {
            if let Some(sprite) = self.kinds.sprite(DEATH_SPRITE) {
                entity.set_sprite(sprite);
            }
        }
        if !entity.set_animation(DEATH_CLIP, speed, 1, AnimationEnd::Remove) {
            self.despawn(id);
        }
    }

    /// Per-frame attack logic for every live combatant.
    pub(crate) fn update_combat(&mut self, now: u64) -> usize {
        let mut hits = 0;
        for id in self.live_combatant_ids() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            let Some(combatant) = entity.combatant() else {
                continue;
            };
            if combatant.is_dead() {
                continue;
            }
            if let Some(previous) = combatant.previous_target {
                if !combatant.is_moving() && entity.kind() == EntityKind::Monster {
                    if let Some(c) = self.combatant_mut(id) {
                        c.previous_target = None;
                    }
                    let alive = self
                        .entities
                        .get(&previous)
                        .map(|target| !target.is_dead())
                        .unwrap_or(false);
                    if alive {
                        self.engage(id, previous);
                    }
                }
                continue;
            }
            if !combatant.attacking {
                continue;
            }
            let Some(target) = combatant.target else {
                continue;
            };

            let moving_aside = self.try_moving_aside(id);
            if self.can_attack(id, now) {
                if moving_aside {
                    continue;
                }
                let facing = self.entities.get(&id).map(Entity::orientation);
                let wanted = self.orientation_to(id, target);
                if wanted.is_some() && wanted != facing {
                    self.look_at_target(id);
                }
                if let Some(entity) = self.entities.get_mut(&id) {
                    entity.hit();
                }
                debug!(attacker_id = id.0, target_id = target.0, "attack_started");
                self.hooks.attack.emit(&AttackEvent {
                    attacker: id,
                    target,
                });
                hits += 1;
            } else if self.should_chase_diagonal(id, target) {
                self.follow(id, target);
            }
        }
        hits
    }

    fn should_chase_diagonal(&self, id: EntityId, target: EntityId) -> bool {
        match (self.entities.get(&id), self.entities.get(&target)) {
            (Some(entity), Some(target)) => {
                target.kind() == EntityKind::Player
                    && !target.is_moving()
                    && entity.is_diagonally_adjacent(target)
            }
            _ => false,
        }
    }

    /// Steps an attacker off a cell it shares with an idle player, or off a
    /// cell another monster also attacks from.
    fn try_moving_aside(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get(&id) else {
            return false;
        };
        let Some(target_id) = entity.combatant().and_then(|c| c.target) else {
            return false;
        };
        let Some(target) = self.entities.get(&target_id) else {
            return false;
        };
        if target.kind() != EntityKind::Player || target.is_moving() {
            return false;
        }

        let destination = if entity.grid == target.grid {
            let ahead = target.grid.offset(target.orientation);
            if self.is_cell_free(ahead, id) {
                Some(ahead)
            } else {
                self.free_cell_around(target.grid, id)
            }
        } else if entity.is_adjacent_non_diagonal(target) && self.shares_cell_with_monster(id) {
            self.free_cell_around(target.grid, id)
        } else {
            None
        };
        let Some(destination) = destination else {
            return false;
        };

        debug!(
            entity_id = id.0,
            x = destination.x,
            y = destination.y,
            "attacker_moving_aside"
        );
        if let Some(combatant) = self.combatant_mut(id) {
            combatant.previous_target = Some(target_id);
        }
        self.disengage(id);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.idle();
        }
        self.go(id, destination);
        true
    }

    fn shares_cell_with_monster(&self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get(&id) else {
            return false;
        };
        self.entities.values().any(|other| {
            other.id != id
                && other.kind() == EntityKind::Monster
                && !other.is_dead()
                && other.grid == entity.grid
        })
    }

    fn is_cell_free(&self, cell: GridPos, except: EntityId) -> bool {
        if let Some(grid) = self.pathing_grid() {
            if grid.is_colliding(cell) {
                return false;
            }
        }
        !self.entities.values().any(|other| {
            other.id != except
                && other.combatant.is_some()
                && !other.is_dead()
                && other.grid == cell
        })
    }

    fn free_cell_around(&self, center: GridPos, except: EntityId) -> Option<GridPos> {
        Orientation::ALL
            .into_iter()
            .map(|orientation| center.offset(orientation))
            .find(|cell| self.is_cell_free(*cell, except))
    }

    /// Advances every entity's clip; finished one-shot clips return to idle or
    /// remove the entity.
    pub(crate) fn update_entity_animations(&mut self, now: u64) -> usize {
        let mut advanced = 0;
        let mut finished = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            let step = entity.update_animation(now);
            if step.advanced() {
                advanced += 1;
            }
            if let AnimationStep::Finished(on_end) = step {
                finished.push((*id, on_end));
            }
        }
        for (id, on_end) in finished {
            match on_end {
                AnimationEnd::Idle => {
                    if let Some(entity) = self.entities.get_mut(&id) {
                        entity.idle();
                    }
                }
                AnimationEnd::Remove => {
                    self.despawn(id);
                }
            }
        }
        advanced
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::test_support::{open_world, run_motions};
    use super::*;

    fn attack_links_are_symmetric(world: &World) -> bool {
        world.entities().all(|entity| {
            let Some(combatant) = entity.combatant() else {
                return true;
            };
            let forward = combatant.target().map_or(true, |target| {
                world
                    .combatant(target)
                    .map_or(true, |t| t.is_attacked_by(entity.id()))
            });
            let backward = combatant.attackers().iter().all(|attacker| {
                world.combatant(*attacker).and_then(|a| a.target()) == Some(entity.id())
            });
            forward && backward
        })
    }

    #[test]
    fn engage_and_disengage_keep_links_symmetric() {
        let mut world = open_world(8, 8);
        let player = world.spawn("warrior", GridPos::new(1, 1)).expect("player");
        let rat = world.spawn("rat", GridPos::new(5, 1)).expect("rat");
        let goblin = world.spawn("goblin", GridPos::new(1, 5)).expect("goblin");

        world.engage(rat, player);
        world.engage(goblin, player);
        assert!(attack_links_are_symmetric(&world));
        assert_eq!(world.combatant(player).expect("player").attackers().len(), 2);

        world.engage(rat, goblin);
        assert!(attack_links_are_symmetric(&world));
        assert!(!world.combatant(player).expect("player").is_attacked_by(rat));

        world.disengage(rat);
        assert!(attack_links_are_symmetric(&world));
        assert!(world.combatant(goblin).expect("goblin").attackers().is_empty());
    }

    #[test]
    fn set_target_twice_warns_only_once() {
        let mut world = open_world(4, 4);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let rat = world.spawn("rat", GridPos::new(1, 0)).expect("rat");

        world.set_target(rat, player);
        world.set_target(rat, player);
        assert_eq!(world.combatant(player).expect("player").attackers().len(), 1);

        assert!(!world.add_attacker(player, rat));
        assert!(world.remove_attacker(player, rat));
        assert!(!world.remove_attacker(player, rat));
    }

    #[test]
    fn can_attack_requires_orthogonal_reach_and_cooldown() {
        let mut world = open_world(4, 4);
        let player = world.spawn("warrior", GridPos::new(1, 1)).expect("player");
        let rat = world.spawn("rat", GridPos::new(2, 2)).expect("rat");
        world.set_target(rat, player);

        assert!(!world.can_attack(rat, 5_000));

        world.despawn(rat);
        let rat = world.spawn("rat", GridPos::new(2, 1)).expect("rat");
        world.set_target(rat, player);
        assert!(world.can_attack(rat, 5_000));
        assert!(!world.can_attack(rat, 5_500));
        assert!(world.can_attack(rat, 6_001));
    }

    #[test]
    fn die_clears_links_and_attackers_go_idle() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(2, 2)).expect("player");
        let rat = world.spawn("rat", GridPos::new(3, 2)).expect("rat");
        let goblin = world.spawn("goblin", GridPos::new(2, 3)).expect("goblin");
        world.engage(rat, player);
        world.engage(goblin, player);
        world.engage(player, rat);

        let deaths = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&deaths);
        world
            .hooks_mut()
            .death
            .register(move |event| seen.borrow_mut().push(event.entity));

        world.die(player);

        let state = world.combatant(player).expect("player");
        assert!(state.is_dead());
        assert!(state.attackers().is_empty());
        assert_eq!(state.target(), None);
        assert!(!world.combatant(rat).expect("rat").is_attacking());
        assert!(world.combatant(rat).expect("rat").attackers().is_empty());
        assert!(!world.combatant(goblin).expect("goblin").is_attacking());
        assert!(attack_links_are_symmetric(&world));
        assert_eq!(*deaths.borrow(), vec![player]);
        assert_eq!(
            world.entity(player).and_then(Entity::current_animation_name),
            Some(DEATH_CLIP)
        );
        assert_eq!(world.entity(player).map(Entity::sprite_name), Some("death"));

        world.die(player);
        assert_eq!(deaths.borrow().len(), 1);
    }

    #[test]
    fn death_clip_removes_entity_when_finished() {
        let mut world = open_world(4, 4);
        let rat = world.spawn("rat", GridPos::new(1, 1)).expect("rat");
        world.die(rat);
        assert_eq!(world.entity(rat).map(Entity::sprite_name), Some("rat"));
        assert!(!world.is_pathing_blocked(GridPos::new(1, 1)));

        let mut now = 0;
        while world.contains(rat) && now < 5_000 {
            now += 20;
            world.update_entity_animations(now);
        }

        assert!(!world.contains(rat));
    }

    #[test]
    fn aggro_fires_once_per_monster_within_range() {
        let mut world = open_world(10, 3);
        let player = world.spawn("warrior", GridPos::new(0, 1)).expect("player");
        let rat = world.spawn("rat", GridPos::new(4, 1)).expect("rat");
        let goblin = world.spawn("goblin", GridPos::new(9, 1)).expect("goblin");
        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&events);
        world
            .hooks_mut()
            .aggro
            .register(move |event| seen.borrow_mut().push(event.monster));

        world.go(player, GridPos::new(3, 1));
        run_motions(&mut world, 20, 3_000);
        world.check_aggro(player);

        assert_eq!(*events.borrow(), vec![rat]);
        assert!(world.combatant(rat).expect("rat").is_waiting_to_attack(player));
        assert!(!world.combatant(goblin).expect("goblin").is_waiting_to_attack(player));
    }

    #[test]
    fn only_player_steps_report_aggro_checks() {
        let mut world = open_world(10, 3);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let rat = world.spawn("rat", GridPos::new(0, 2)).expect("rat");
        let checks = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&checks);
        world
            .hooks_mut()
            .check_aggro
            .register(move |event| seen.borrow_mut().push(event.entity));

        world.go(rat, GridPos::new(2, 2));
        run_motions(&mut world, 20, 3_000);
        assert!(checks.borrow().is_empty());

        world.check_aggro(rat);
        world.check_aggro(player);
        assert_eq!(*checks.borrow(), vec![player]);
    }

    #[test]
    fn monster_sharing_player_cell_moves_aside() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(2, 2)).expect("player");
        let rat = world.spawn("rat", GridPos::new(2, 2)).expect("rat");
        world.engage(rat, player);

        world.update_combat(1_000);

        let state = world.combatant(rat).expect("rat");
        assert_eq!(state.previous_target(), Some(player));
        assert!(!state.is_attacking());
        assert!(state.is_moving());
        assert_eq!(state.destination(), Some(GridPos::new(2, 3)));
        assert!(attack_links_are_symmetric(&world));

        run_motions(&mut world, 1_020, 2_000);
        world.update_combat(3_500);

        let state = world.combatant(rat).expect("rat");
        assert!(state.is_attacking());
        assert_eq!(state.target(), Some(player));
    }

    #[test]
    fn adjacent_attacker_hits_and_faces_target() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(2, 2)).expect("player");
        let rat = world.spawn("rat", GridPos::new(2, 1)).expect("rat");
        let hits = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&hits);
        world
            .hooks_mut()
            .attack
            .register(move |_| *seen.borrow_mut() += 1);
        world.engage(rat, player);

        assert_eq!(world.update_combat(2_000), 1);
        assert_eq!(world.update_combat(2_100), 0);

        let entity = world.entity(rat).expect("rat");
        assert_eq!(entity.orientation(), Orientation::Down);
        assert_eq!(entity.current_animation_name(), Some("atk_down"));
        assert_eq!(*hits.borrow(), 1);
    }
}
