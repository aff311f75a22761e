use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SimConfig;
use crate::content::{KindClass, KindDatabase, SpriteSource};
use crate::entity::{
    AnimationSpeeds, Combatant, Entity, EntityId, EntityIdAllocator, EntityRole,
    MonsterTraits, PlayerState,
};
use crate::nav::GridPos;
use crate::timing::Scheduler;

mod combat;
mod hooks;
mod movement;
mod occupancy;
mod player;
mod snapshot;
mod viewport;

pub use hooks::{
    AggroEvent, AttackEvent, DeathEvent, EquipmentEvent, HookSlot, InvincibilityEvent, LootEvent,
    MotionEvent, PathEvent, StepEvent, WorldHooks, ZoningEvent,
};
pub use movement::MotionStats;
pub use player::{LootError, LootOutcome, ScheduledEffect, TaskSlot};
pub use snapshot::{EntitySnapshot, WorldSnapshot};
pub use viewport::Camera;

use occupancy::PathingLayer;
use viewport::ZoningState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("unknown kind '{0}'")]
    UnknownKind(String),
    #[error("kind '{kind}' uses sprite '{sprite}' which is not loaded")]
    MissingSprite { kind: String, sprite: String },
    #[error("item kind '{0}' has no item definition")]
    MissingItemDef(String),
    #[error("cell ({x}, {y}) is outside the loaded map")]
    OutOfBounds { x: i32, y: i32 },
}

/// Arena of every entity plus the shared state the simulation mutates.
///
/// Links between entities are ids; removing an entity breaks every link that
/// names it.
#[derive(Debug)]
pub struct World {
    pub(crate) config: SimConfig,
    pub(crate) kinds: Arc<KindDatabase>,
    allocator: EntityIdAllocator,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) player_id: Option<EntityId>,
    pub(crate) pathing: Option<PathingLayer>,
    pub(crate) scheduler: Scheduler<(EntityId, TaskSlot), ScheduledEffect>,
    pub(crate) camera: Camera,
    pub(crate) zoning: ZoningState,
    pub(crate) hooks: WorldHooks,
    pub(crate) now: u64,
}

impl World {
    pub fn new(config: SimConfig, kinds: Arc<KindDatabase>) -> Self {
        let camera = Camera::new(
            config.camera_grid_width,
            config.camera_grid_height,
            config.tile_size,
        );
        Self {
            config,
            kinds,
            allocator: EntityIdAllocator::default(),
            entities: BTreeMap::new(),
            player_id: None,
            pathing: None,
            scheduler: Scheduler::new(),
            camera,
            zoning: ZoningState::default(),
            hooks: WorldHooks::default(),
            now: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn kinds(&self) -> &KindDatabase {
        &self.kinds
    }

    pub fn hooks_mut(&mut self) -> &mut WorldHooks {
        &mut self.hooks
    }

    pub fn current_time(&self) -> u64 {
        self.now
    }

    pub fn set_current_time(&mut self, now: u64) {
        self.now = now;
    }

    pub fn scheduler(&self) -> &Scheduler<(EntityId, TaskSlot), ScheduledEffect> {
        &self.scheduler
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    pub fn player(&self) -> Option<&Entity> {
        self.player_id.and_then(|id| self.entities.get(&id))
    }

    pub fn combatant(&self, id: EntityId) -> Option<&Combatant> {
        self.entities.get(&id).and_then(Entity::combatant)
    }

    pub(crate) fn combatant_mut(&mut self, id: EntityId) -> Option<&mut Combatant> {
        self.entities.get_mut(&id).and_then(Entity::combatant_mut)
    }

    pub fn entities_at(&self, cell: GridPos) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.grid == cell)
            .map(Entity::id)
            .collect()
    }

    /// Server-driven hit point update; values are clamped to the kind maximum.
    pub fn set_hit_points(&mut self, id: EntityId, hit_points: i32) -> bool {
        match self.combatant_mut(id) {
            Some(combatant) => {
                combatant.set_hit_points(hit_points);
                true
            }
            None => false,
        }
    }

    pub fn spawn(&mut self, kind_name: &str, cell: GridPos) -> Result<EntityId, WorldError> {
        let def = self
            .kinds
            .kind(kind_name)
            .cloned()
            .ok_or_else(|| WorldError::UnknownKind(kind_name.to_string()))?;
        if let Some(layer) = &self.pathing {
            if !layer.collision.contains(cell) {
                return Err(WorldError::OutOfBounds {
                    x: cell.x,
                    y: cell.y,
                });
            }
        }
        let sprite = self
            .kinds
            .sprite(&def.sprite)
            .ok_or_else(|| WorldError::MissingSprite {
                kind: def.name.clone(),
                sprite: def.sprite.clone(),
            })?;

        let role = match def.class {
            KindClass::Player => EntityRole::Player(PlayerState::new(
                def.sprite.clone(),
                def.weapon.clone(),
            )),
            KindClass::Monster => EntityRole::Monster(MonsterTraits {
                aggro_range: def.aggro_range,
                aggressive: def.aggressive,
            }),
            KindClass::Npc => EntityRole::Npc,
            KindClass::Item => EntityRole::Item(
                def.item
                    .clone()
                    .ok_or_else(|| WorldError::MissingItemDef(def.name.clone()))?,
            ),
            KindClass::Chest => EntityRole::Chest,
        };
        let speeds = AnimationSpeeds {
            idle_ms: if def.class == KindClass::Item {
                self.config.item_idle_speed_ms
            } else {
                def.idle_speed
            },
            walk_ms: def.walk_speed,
            attack_ms: def.attack_speed,
        };

        let id = self.allocator.allocate();
        let mut entity = Entity::new(id, &def.name, role, cell, self.config.tile_size, speeds);
        if def.class.is_character() {
            entity = entity.with_combatant(Combatant::new(
                def.hit_points,
                def.move_speed,
                def.attack_rate,
            ));
        }
        entity.set_sprite(sprite);
        entity.idle();
        self.entities.insert(id, entity);

        if def.class == KindClass::Player {
            if let Some(previous) = self.player_id.replace(id) {
                warn!(
                    previous_id = previous.0,
                    entity_id = id.0,
                    "player_replaced"
                );
            }
        }
        self.register_position(id);
        debug!(
            entity_id = id.0,
            kind = %def.name,
            x = cell.x,
            y = cell.y,
            "entity_spawned"
        );
        Ok(id)
    }

    /// Removes an entity and breaks every link naming it. Returns false when
    /// the id is unknown.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.contains_key(&id) {
            return false;
        }
        self.remove_target(id);

        let attackers: Vec<EntityId> = self
            .combatant(id)
            .map(|combatant| combatant.attackers.iter().copied().collect())
            .unwrap_or_default();
        for attacker in attackers {
            if let Some(combatant) = self.combatant_mut(attacker) {
                if combatant.target == Some(id) {
                    combatant.target = None;
                    combatant.attacking = false;
                    combatant.following = false;
                }
            }
        }
        for entity in self.entities.values_mut() {
            if let Some(combatant) = entity.combatant.as_mut() {
                if combatant.unconfirmed_target == Some(id) {
                    combatant.unconfirmed_target = None;
                }
                if combatant.previous_target == Some(id) {
                    combatant.previous_target = None;
                }
            }
        }

        let cancelled = self.scheduler.cancel_where(|(owner, _)| *owner == id);
        self.unregister_position(id);
        self.entities.remove(&id);
        if self.player_id == Some(id) {
            self.player_id = None;
        }
        debug!(entity_id = id.0, cancelled_tasks = cancelled, "entity_despawned");
        true
    }

    pub(crate) fn is_live_combatant(&self, id: EntityId) -> bool {
        self.combatant(id)
            .map(|combatant| !combatant.is_dead())
            .unwrap_or(false)
    }

    pub(crate) fn live_combatant_ids(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.combatant.is_some() && !entity.is_dead())
            .map(Entity::id)
            .collect()
    }
}
