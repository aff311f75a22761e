use serde::Serialize;

use crate::entity::{CombatantState, Entity, EntityId, EntityKind};
use crate::nav::{GridPos, Orientation};

use super::World;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub kind_name: String,
    pub cell: GridPos,
    pub pixel_x: i32,
    pub pixel_y: i32,
    pub orientation: Orientation,
    pub sprite: String,
    pub animation: Option<String>,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CombatantState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_points: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attackers: Vec<EntityId>,
}

impl EntitySnapshot {
    fn capture(entity: &Entity) -> Self {
        let combatant = entity.combatant();
        let (pixel_x, pixel_y) = entity.pixel_position();
        Self {
            id: entity.id(),
            kind: entity.kind(),
            kind_name: entity.kind_name().to_string(),
            cell: entity.grid,
            pixel_x,
            pixel_y,
            orientation: entity.orientation(),
            sprite: entity.sprite_name().to_string(),
            animation: entity.current_animation_name().map(str::to_string),
            visible: entity.is_visible(),
            state: combatant.map(|c| c.state()),
            hit_points: combatant.map(|c| c.hit_points()),
            target: combatant.and_then(|c| c.target()),
            attackers: combatant
                .map(|c| c.attackers().iter().copied().collect())
                .unwrap_or_default(),
        }
    }
}

/// Serializable view of the world for logs and debugging tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSnapshot {
    pub time_ms: u64,
    pub camera: GridPos,
    pub zoning: bool,
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl World {
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            time_ms: self.now,
            camera: self.camera.grid_position(),
            zoning: self.is_zoning(),
            entities: self.entities.values().map(EntitySnapshot::capture).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_world;
    use super::*;

    #[test]
    fn snapshot_lists_entities_in_id_order_with_links() {
        let mut world = open_world(6, 6);
        let player = world.spawn("warrior", GridPos::new(1, 1)).expect("player");
        let rat = world.spawn("rat", GridPos::new(2, 1)).expect("rat");
        world.spawn("sword2", GridPos::new(4, 4)).expect("item");
        world.engage(rat, player);

        let snapshot = world.snapshot();

        assert_eq!(snapshot.entities.len(), 3);
        assert_eq!(snapshot.entities[0].attackers, vec![rat]);
        assert_eq!(snapshot.entities[1].target, Some(player));
        assert_eq!(snapshot.entities[1].state, Some(CombatantState::Attacking));
        assert_eq!(snapshot.entities[2].state, None);

        let json = snapshot.to_json_pretty().expect("json");
        assert!(json.contains("\"kind\": \"monster\""));
        assert!(json.contains("\"state\": \"attacking\""));
    }
}
