use tracing::{debug, warn};

use crate::entity::{Entity, EntityId, EntityKind};
use crate::nav::{Axis, GridPos, Orientation};
use crate::timing::InterpolatorEvent;

use super::hooks::{MotionEvent, PathEvent, StepEvent};
use super::World;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionStats {
    pub updated: usize,
    pub completed: usize,
}

impl World {
    /// Walks toward `goal`, dropping any attack or follow link first.
    pub fn go(&mut self, id: EntityId, goal: GridPos) {
        let Some(combatant) = self.combatant_mut(id) else {
            warn!(entity_id = id.0, "go_ignored_not_combatant");
            return;
        };
        if combatant.dead {
            warn!(entity_id = id.0, "go_ignored_dead");
            return;
        }
        if combatant.attacking {
            self.disengage(id);
        } else if combatant.following {
            combatant.following = false;
            self.remove_target(id);
        }
        self.move_to(id, goal);
    }

    /// Requests a path now, or defers the new destination to the next cell
    /// boundary when already moving.
    pub fn move_to(&mut self, id: EntityId, goal: GridPos) {
        let Some(combatant) = self.combatant_mut(id) else {
            return;
        };
        if combatant.dead {
            return;
        }
        combatant.destination = Some(goal);
        if combatant.is_moving() {
            combatant.new_destination = Some(goal);
            return;
        }
        let path = self.request_path(id, goal);
        self.follow_path(id, path);
    }

    pub fn follow(&mut self, id: EntityId, target: EntityId) {
        let Some(cell) = self.entities.get(&target).map(|entity| entity.grid) else {
            warn!(entity_id = id.0, target_id = target.0, "follow_target_missing");
            return;
        };
        let Some(combatant) = self.combatant_mut(id) else {
            return;
        };
        if combatant.dead {
            return;
        }
        combatant.following = true;
        self.move_to(id, cell);
    }

    /// Requests that the current path end at the next cell boundary.
    pub fn stop(&mut self, id: EntityId) {
        if let Some(combatant) = self.combatant_mut(id) {
            if combatant.is_moving() {
                combatant.interrupted = true;
            }
        }
    }

    /// Starts walking `path`. Paths of one cell or fewer are ignored; a
    /// following entity stops one cell short of its target.
    pub(crate) fn follow_path(&mut self, id: EntityId, mut path: Vec<GridPos>) -> bool {
        if path.len() <= 1 {
            return false;
        }
        let Some(combatant) = self.combatant_mut(id) else {
            return false;
        };
        if combatant.following {
            path.pop();
        }
        combatant.path = Some(path.clone());
        combatant.step = 0;
        debug!(entity_id = id.0, path_len = path.len(), "path_started");
        self.hooks
            .start_pathing
            .emit(&PathEvent { entity: id, path });
        self.next_step(id);
        true
    }

    /// Runs at every cell boundary of a path.
    pub(crate) fn next_step(&mut self, id: EntityId) {
        let tile_size = self.config.tile_size;
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(current) = entity.combatant().and_then(|c| c.current_path_cell()) else {
            return;
        };
        let before = entity.grid;
        self.hooks.before_step.emit(&StepEvent {
            entity: id,
            cell: before,
        });
        self.unregister_position(id);

        let interrupted = {
            let Some(entity) = self.entities.get_mut(&id) else {
                return;
            };
            entity.set_grid_position(current, tile_size);
            let Some(combatant) = entity.combatant.as_mut() else {
                return;
            };
            std::mem::take(&mut combatant.interrupted)
        };
        self.check_aggro(id);

        let mut finished = interrupted;
        if !interrupted {
            if let Some(combatant) = self.combatant_mut(id) {
                combatant.next_cell = combatant
                    .path
                    .as_ref()
                    .and_then(|path| path.get(combatant.step + 1).copied());
            }
            self.hooks.step.emit(&StepEvent {
                entity: id,
                cell: current,
            });
            self.react_to_step(id);

            let Some(combatant) = self.combatant_mut(id) else {
                return;
            };
            if !combatant.is_moving() {
                return;
            }
            if let Some(destination) = combatant.new_destination.take() {
                let path = self.request_path(id, destination);
                if path.len() < 2 {
                    finished = true;
                } else {
                    self.follow_path(id, path);
                }
            } else if combatant.has_next_step() {
                combatant.step += 1;
                self.face_next_cell(id);
            } else {
                finished = true;
            }
        }
        if finished {
            self.finish_path(id);
        }
    }

    fn face_next_cell(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let Some(orientation) = entity
            .combatant()
            .and_then(|c| path_direction(c.path.as_deref()?, c.step))
        else {
            return;
        };
        entity.walk(orientation);
    }

    /// Occupancy and attacker reactions after an entity enters a cell.
    fn react_to_step(&mut self, id: EntityId) {
        self.register_dual_position(id);

        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let cell = entity.grid;
        let is_player = entity.kind() == EntityKind::Player;
        let attackers: Vec<EntityId> = entity
            .combatant()
            .map(|c| c.attackers.iter().copied().collect())
            .unwrap_or_default();

        for attacker in attackers {
            if !self.is_live_combatant(attacker) {
                continue;
            }
            if self.is_adjacent_to_target(attacker) {
                self.look_at_target(attacker);
            } else {
                self.follow(attacker, id);
            }
        }

        if is_player && self.camera.is_zoning_cell(cell) {
            self.enqueue_zoning(cell);
        }
    }

    pub(crate) fn is_adjacent_to_target(&self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get(&id) else {
            return false;
        };
        entity
            .combatant()
            .and_then(|c| c.target)
            .and_then(|target| self.entities.get(&target))
            .map(|target| entity.is_adjacent(target))
            .unwrap_or(false)
    }

    /// Ends the current path and runs the stop reactions.
    pub(crate) fn finish_path(&mut self, id: EntityId) {
        // Lift the dual registration while `next_cell` is still known.
        self.unregister_position(id);
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let cell = entity.grid;
        let is_player = entity.kind() == EntityKind::Player;
        if let Some(combatant) = entity.combatant.as_mut() {
            combatant.clear_path();
            combatant.movement.stop();
        }
        entity.idle();
        self.register_position(id);
        debug!(entity_id = id.0, x = cell.x, y = cell.y, "path_stopped");
        self.hooks.stop_pathing.emit(&StepEvent { entity: id, cell });

        if !self.is_live_combatant(id) {
            return;
        }
        if self.is_adjacent_to_target(id) {
            self.look_at_target(id);
        }
        let attackers: Vec<EntityId> = self
            .combatant(id)
            .map(|c| c.attackers.iter().copied().collect())
            .unwrap_or_default();
        for attacker in attackers {
            let stranded = match (self.entities.get(&attacker), self.entities.get(&id)) {
                (Some(attacker), Some(entity)) => {
                    !attacker.is_dead() && !attacker.is_adjacent_non_diagonal(entity)
                }
                _ => false,
            };
            if stranded {
                self.follow(attacker, id);
            }
        }

        if is_player {
            self.loot_at(id, cell);
        }
    }

    /// Starts the pixel tween for every mover waiting at a cell boundary.
    pub(crate) fn start_pending_motions(&mut self, now: u64) -> usize {
        let tile_size = self.config.tile_size;
        let mut started = 0;
        for entity in self.entities.values_mut() {
            let (pixel_x, pixel_y) = (entity.pixel_x, entity.pixel_y);
            let Some(combatant) = entity.combatant.as_mut() else {
                continue;
            };
            if combatant.dead || combatant.movement.is_in_progress() {
                continue;
            }
            let Some(path) = combatant.path.as_deref() else {
                continue;
            };
            if combatant.step == 0 {
                continue;
            }
            let Some(direction) = path_direction(path, combatant.step) else {
                continue;
            };
            let tick = self.config.motion_tick_px(combatant.move_speed);
            let sign = direction.sign();
            let (axis, origin) = match direction.axis() {
                Axis::Horizontal => (Axis::Horizontal, pixel_x),
                Axis::Vertical => (Axis::Vertical, pixel_y),
            };
            combatant.movement.start(
                now,
                axis,
                origin + sign * tick,
                origin + sign * tile_size,
                combatant.move_speed,
            );
            started += 1;
        }
        started
    }

    /// Advances every running tween; completed crossings trigger the next step.
    pub(crate) fn step_motions(&mut self, now: u64) -> MotionStats {
        let mut stats = MotionStats::default();
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            let Some(event) = entity
                .combatant
                .as_mut()
                .and_then(|combatant| combatant.movement.step(now))
            else {
                continue;
            };
            apply_motion(entity, event.wiring(), event.value());
            let (pixel_x, pixel_y) = entity.pixel_position();
            self.hooks.has_moved.emit(&MotionEvent {
                entity: id,
                pixel_x,
                pixel_y,
            });
            stats.updated += 1;
            if let InterpolatorEvent::Complete { .. } = event {
                stats.completed += 1;
                self.next_step(id);
            }
        }
        stats
    }
}

fn apply_motion(entity: &mut Entity, axis: Axis, value: i32) {
    match axis {
        Axis::Horizontal => entity.pixel_x = value,
        Axis::Vertical => entity.pixel_y = value,
    }
    entity.dirty = true;
}

/// Direction of the crossing that ends at `path[step]`.
fn path_direction(path: &[GridPos], step: usize) -> Option<Orientation> {
    let to = *path.get(step)?;
    let from = *path.get(step.checked_sub(1)?)?;
    Orientation::between(from, to)
}
