use tracing::{debug, error, info};

use crate::entity::{Entity, EntityId, EntityKind};
use crate::nav::{GridPos, OccupancyGrid, Pathfinder, BLOCKED};

use super::World;

/// Static collision plus a working copy that also marks blocking entities.
#[derive(Debug, Clone)]
pub(crate) struct PathingLayer {
    pub(crate) collision: OccupancyGrid,
    pub(crate) pathing: OccupancyGrid,
    pub(crate) pathfinder: Pathfinder,
}

impl PathingLayer {
    fn restore(&mut self, cell: GridPos) {
        if let Some(value) = self.collision.cell(cell) {
            self.pathing.set_cell(cell, value);
        }
    }
}

fn blocks_pathing(entity: &Entity) -> bool {
    matches!(
        entity.kind(),
        EntityKind::Monster | EntityKind::Npc | EntityKind::Chest
    ) && !entity.is_dead()
}

impl World {
    /// Installs the map collision grid and re-marks every blocking entity.
    pub fn load_map(&mut self, collision: OccupancyGrid) {
        info!(
            width = collision.width(),
            height = collision.height(),
            "map_loaded"
        );
        self.pathing = Some(PathingLayer {
            pathing: collision.clone(),
            collision,
            pathfinder: Pathfinder::new(),
        });
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.register_position(id);
        }
    }

    pub fn collision_grid(&self) -> Option<&OccupancyGrid> {
        self.pathing.as_ref().map(|layer| &layer.collision)
    }

    pub fn pathing_grid(&self) -> Option<&OccupancyGrid> {
        self.pathing.as_ref().map(|layer| &layer.pathing)
    }

    pub fn is_pathing_blocked(&self, cell: GridPos) -> bool {
        self.pathing
            .as_ref()
            .map(|layer| layer.pathing.is_colliding(cell))
            .unwrap_or(false)
    }

    pub fn is_colliding(&self, cell: GridPos) -> bool {
        self.pathing
            .as_ref()
            .map(|layer| layer.collision.is_colliding(cell))
            .unwrap_or(false)
    }

    pub(crate) fn register_position(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(layer) = self.pathing.as_mut() else {
            return;
        };
        if blocks_pathing(entity) {
            layer.pathing.set_cell(entity.grid, BLOCKED);
        }
    }

    /// Blocks both the current cell and the cell being entered.
    pub(crate) fn register_dual_position(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(layer) = self.pathing.as_mut() else {
            return;
        };
        if !blocks_pathing(entity) {
            return;
        }
        layer.pathing.set_cell(entity.grid, BLOCKED);
        if let Some(next) = entity.combatant().and_then(|combatant| combatant.next_cell) {
            layer.pathing.set_cell(next, BLOCKED);
        }
    }

    pub(crate) fn unregister_position(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(layer) = self.pathing.as_mut() else {
            return;
        };
        if !matches!(
            entity.kind(),
            EntityKind::Monster | EntityKind::Npc | EntityKind::Chest
        ) {
            return;
        }
        layer.restore(entity.grid);
        if let Some(next) = entity.combatant().and_then(|combatant| combatant.next_cell) {
            layer.restore(next);
        }
    }

    /// Shortest path from the entity to `goal`, ignoring the entity itself and
    /// its target. Empty when no map is loaded, the goal collides, or the goal
    /// is unreachable.
    pub fn request_path(&mut self, id: EntityId, goal: GridPos) -> Vec<GridPos> {
        let Some(layer) = self.pathing.as_mut() else {
            error!(
                entity_id = id.0,
                goal_x = goal.x,
                goal_y = goal.y,
                "pathing_grid_missing"
            );
            return Vec::new();
        };
        if layer.collision.is_colliding(goal) {
            debug!(
                entity_id = id.0,
                goal_x = goal.x,
                goal_y = goal.y,
                "path_goal_colliding"
            );
            return Vec::new();
        }
        let Some(entity) = self.entities.get(&id) else {
            return Vec::new();
        };

        layer.pathfinder.ignore(entity);
        if let Some(target) = entity
            .combatant()
            .and_then(|combatant| combatant.target)
            .and_then(|target| self.entities.get(&target))
        {
            layer.pathfinder.ignore(target);
        }
        let path = layer.pathfinder.find_path(
            &mut layer.pathing,
            entity,
            goal,
            self.config.allow_incomplete_paths,
        );
        layer.pathfinder.clear_ignore_list(&mut layer.pathing);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{open_world, world_with_rows};
    use super::*;

    #[test]
    fn player_and_items_never_block_pathing() {
        let mut world = open_world(4, 1);
        world.spawn("warrior", GridPos::new(1, 0)).expect("player");
        world.spawn("sword1", GridPos::new(2, 0)).expect("item");

        assert!(!world.is_pathing_blocked(GridPos::new(1, 0)));
        assert!(!world.is_pathing_blocked(GridPos::new(2, 0)));
    }

    #[test]
    fn monsters_block_cells_and_paths_route_around() {
        let mut world = world_with_rows(&["...", "...", "..."]);
        let player = world.spawn("warrior", GridPos::new(0, 1)).expect("player");
        world.spawn("rat", GridPos::new(1, 1)).expect("rat");

        let path = world.request_path(player, GridPos::new(2, 1));

        assert_eq!(path.len(), 5);
        assert!(!path.contains(&GridPos::new(1, 1)));
        assert!(world.is_pathing_blocked(GridPos::new(1, 1)));
    }

    #[test]
    fn target_cell_is_ignored_while_searching() {
        let mut world = open_world(4, 1);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        let rat = world.spawn("rat", GridPos::new(3, 0)).expect("rat");
        world.set_target(player, rat);

        let path = world.request_path(player, GridPos::new(3, 0));

        assert_eq!(path.last(), Some(&GridPos::new(3, 0)));
        assert!(world.is_pathing_blocked(GridPos::new(3, 0)));
    }

    #[test]
    fn colliding_goal_and_missing_map_yield_empty_paths() {
        let mut world = world_with_rows(&["..#"]);
        let player = world.spawn("warrior", GridPos::new(0, 0)).expect("player");
        assert!(world.request_path(player, GridPos::new(2, 0)).is_empty());

        let kinds = crate::content::builtin_kind_database().expect("kinds");
        let mut bare = World::new(crate::config::SimConfig::default(), std::sync::Arc::new(kinds));
        let lone = bare.spawn("warrior", GridPos::new(0, 0)).expect("player");
        assert!(bare.request_path(lone, GridPos::new(1, 0)).is_empty());
    }
}
