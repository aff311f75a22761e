use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use crate::content::{ItemDef, SpriteDef};
use crate::nav::{GridPos, Orientation};

mod animation;
mod capability;
mod combatant;

pub use animation::{
    oriented_clip_name, Animation, AnimationEnd, AnimationStep, ClipAction, FrameRect, DEATH_CLIP,
};
pub use capability::{Animatable, Movable, Targetable};
pub use combatant::{Combatant, CombatantState};

use capability::NO_ATTACKERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Monster,
    Npc,
    Item,
    Chest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponSwitch {
    pub(crate) weapon: String,
    pub(crate) remaining: u32,
    pub(crate) shown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub(crate) weapon: Option<String>,
    pub(crate) armor: String,
    pub(crate) invincible: bool,
    pub(crate) weapon_switch: Option<WeaponSwitch>,
    pub(crate) armor_switch_remaining: Option<u32>,
}

impl PlayerState {
    pub fn new(armor: impl Into<String>, weapon: Option<String>) -> Self {
        Self {
            weapon,
            armor: armor.into(),
            invincible: false,
            weapon_switch: None,
            armor_switch_remaining: None,
        }
    }

    pub fn weapon(&self) -> Option<&str> {
        self.weapon.as_deref()
    }

    /// Worn armor; the displayed sprite differs while invincible.
    pub fn armor(&self) -> &str {
        &self.armor
    }

    pub fn is_invincible(&self) -> bool {
        self.invincible
    }

    pub fn is_switching_weapon(&self) -> bool {
        self.weapon_switch.is_some()
    }

    pub fn is_switching_armor(&self) -> bool {
        self.armor_switch_remaining.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonsterTraits {
    pub aggro_range: i32,
    pub aggressive: bool,
}

/// Kind-specific data; the variant is the entity's kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRole {
    Player(PlayerState),
    Monster(MonsterTraits),
    Npc,
    Item(ItemDef),
    Chest,
}

impl EntityRole {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Player(_) => EntityKind::Player,
            Self::Monster(_) => EntityKind::Monster,
            Self::Npc => EntityKind::Npc,
            Self::Item(_) => EntityKind::Item,
            Self::Chest => EntityKind::Chest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationSpeeds {
    pub idle_ms: u64,
    pub walk_ms: u64,
    pub attack_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) kind_name: String,
    pub(crate) role: EntityRole,
    pub(crate) grid: GridPos,
    pub(crate) pixel_x: i32,
    pub(crate) pixel_y: i32,
    pub(crate) orientation: Orientation,
    pub(crate) oriented: bool,
    pub(crate) sprite_name: String,
    pub(crate) animations: BTreeMap<String, Animation>,
    pub(crate) current_animation: Option<String>,
    pub(crate) flip_x: bool,
    pub(crate) visible: bool,
    pub(crate) dirty: bool,
    pub(crate) hurting: bool,
    pub(crate) speeds: AnimationSpeeds,
    pub(crate) combatant: Option<Combatant>,
}

impl Entity {
    pub fn new(
        id: EntityId,
        kind_name: impl Into<String>,
        role: EntityRole,
        grid: GridPos,
        tile_size: i32,
        speeds: AnimationSpeeds,
    ) -> Self {
        let oriented = matches!(
            role.kind(),
            EntityKind::Player | EntityKind::Monster | EntityKind::Npc
        );
        Self {
            id,
            kind_name: kind_name.into(),
            role,
            grid,
            pixel_x: grid.x * tile_size,
            pixel_y: grid.y * tile_size,
            orientation: Orientation::Down,
            oriented,
            sprite_name: String::new(),
            animations: BTreeMap::new(),
            current_animation: None,
            flip_x: false,
            visible: true,
            dirty: true,
            hurting: false,
            speeds,
            combatant: None,
        }
    }

    pub fn with_combatant(mut self, combatant: Combatant) -> Self {
        self.combatant = Some(combatant);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.role.kind()
    }

    pub fn kind_name(&self) -> &str {
        &self.kind_name
    }

    pub fn role(&self) -> &EntityRole {
        &self.role
    }

    pub fn player_state(&self) -> Option<&PlayerState> {
        match &self.role {
            EntityRole::Player(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn player_state_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.role {
            EntityRole::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn combatant(&self) -> Option<&Combatant> {
        self.combatant.as_ref()
    }

    pub fn combatant_mut(&mut self) -> Option<&mut Combatant> {
        self.combatant.as_mut()
    }

    pub fn pixel_position(&self) -> (i32, i32) {
        (self.pixel_x, self.pixel_y)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn sprite_name(&self) -> &str {
        &self.sprite_name
    }

    pub fn current_animation_name(&self) -> Option<&str> {
        self.current_animation.as_deref()
    }

    pub fn current_animation(&self) -> Option<&Animation> {
        self.current_animation
            .as_ref()
            .and_then(|name| self.animations.get(name))
    }

    pub fn is_flipped(&self) -> bool {
        self.flip_x
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_hurting(&self) -> bool {
        self.hurting
    }

    pub fn is_dead(&self) -> bool {
        self.combatant.as_ref().map(Combatant::is_dead).unwrap_or(false)
    }

    pub fn set_grid_position(&mut self, pos: GridPos, tile_size: i32) {
        self.grid = pos;
        self.pixel_x = pos.x * tile_size;
        self.pixel_y = pos.y * tile_size;
        self.dirty = true;
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.dirty = true;
    }

    pub fn toggle_visibility(&mut self) {
        self.set_visible(!self.visible);
    }

    /// Swaps the sprite sheet. The current clip is dropped so the caller picks
    /// a clip that exists on the new sheet.
    pub fn set_sprite(&mut self, sprite: &SpriteDef) {
        self.sprite_name = sprite.name.clone();
        self.animations = sprite.create_animations();
        self.current_animation = None;
        self.dirty = true;
    }

    pub fn distance_to(&self, other: &Entity) -> i32 {
        self.grid.chebyshev_distance(other.grid)
    }

    pub fn is_adjacent(&self, other: &Entity) -> bool {
        self.distance_to(other) <= 1
    }

    pub fn is_adjacent_non_diagonal(&self, other: &Entity) -> bool {
        self.is_adjacent(other) && (self.grid.x == other.grid.x || self.grid.y == other.grid.y)
    }

    pub fn is_diagonally_adjacent(&self, other: &Entity) -> bool {
        self.is_adjacent(other) && !self.is_adjacent_non_diagonal(other)
    }

    pub fn is_near(&self, other: &Entity, distance: i32) -> bool {
        (self.grid.x - other.grid.x).abs() <= distance
            && (self.grid.y - other.grid.y).abs() <= distance
    }

    pub fn orientation_to(&self, other: &Entity) -> Option<Orientation> {
        Orientation::between(self.grid, other.grid)
    }

    /// Selects a clip by exact name. Re-selecting the current clip keeps its
    /// frame; attack clips restart whenever they are selected.
    pub fn set_animation(
        &mut self,
        name: &str,
        speed: u64,
        count: u32,
        on_end: AnimationEnd,
    ) -> bool {
        if self.current_animation.as_deref() == Some(name) {
            return false;
        }
        let Some(animation) = self.animations.get_mut(name) else {
            warn!(
                entity_id = self.id.0,
                sprite = %self.sprite_name,
                animation = name,
                "unknown_animation"
            );
            return false;
        };
        if animation.is_attack() {
            animation.reset();
        }
        animation.set_speed(speed);
        animation.set_count(count, on_end);
        self.current_animation = Some(name.to_string());
        self.dirty = true;
        true
    }

    /// Composes the oriented clip for characters; a dying entity keeps its
    /// death clip.
    pub fn animate(&mut self, action: ClipAction, speed: u64, count: u32, on_end: AnimationEnd) {
        if self.current_animation.as_deref() == Some(DEATH_CLIP) {
            return;
        }
        if self.oriented {
            let (name, flip_x) = oriented_clip_name(action, self.orientation);
            self.flip_x = flip_x;
            self.set_animation(&name, speed, count, on_end);
        } else {
            self.flip_x = false;
            self.set_animation(action.as_str(), speed, count, on_end);
        }
    }

    pub fn idle(&mut self) {
        self.animate(ClipAction::Idle, self.speeds.idle_ms, 0, AnimationEnd::Idle);
    }

    pub fn walk(&mut self, orientation: Orientation) {
        self.orientation = orientation;
        self.animate(ClipAction::Walk, self.speeds.walk_ms, 0, AnimationEnd::Idle);
    }

    pub fn hit(&mut self) {
        self.animate(ClipAction::Attack, self.speeds.attack_ms, 1, AnimationEnd::Idle);
    }

    pub fn turn_to(&mut self, orientation: Orientation) {
        self.orientation = orientation;
        self.idle();
    }
}

impl Movable for Entity {
    fn grid_position(&self) -> GridPos {
        self.grid
    }

    fn is_moving(&self) -> bool {
        self.combatant.as_ref().map(Combatant::is_moving).unwrap_or(false)
    }

    fn next_cell(&self) -> Option<GridPos> {
        self.combatant.as_ref().and_then(Combatant::next_cell)
    }
}

impl Targetable for Entity {
    fn attackers(&self) -> &BTreeSet<EntityId> {
        match &self.combatant {
            Some(combatant) => combatant.attackers(),
            None => &NO_ATTACKERS,
        }
    }
}

impl Animatable for Entity {
    fn update_animation(&mut self, now: u64) -> AnimationStep {
        let Some(name) = self.current_animation.as_ref() else {
            return AnimationStep::Unchanged;
        };
        let Some(animation) = self.animations.get_mut(name) else {
            return AnimationStep::Unchanged;
        };
        let step = animation.update(now);
        if step.advanced() {
            self.dirty = true;
        }
        step
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{builtin_kind_database, SpriteSource};

    fn speeds() -> AnimationSpeeds {
        AnimationSpeeds {
            idle_ms: 450,
            walk_ms: 100,
            attack_ms: 50,
        }
    }

    fn character(id: u64, x: i32, y: i32) -> Entity {
        let database = builtin_kind_database().expect("builtin");
        let mut entity = Entity::new(
            EntityId(id),
            "rat",
            EntityRole::Monster(MonsterTraits {
                aggro_range: 1,
                aggressive: true,
            }),
            GridPos::new(x, y),
            16,
            speeds(),
        )
        .with_combatant(Combatant::new(10, 120, 800));
        entity.set_sprite(database.sprite("rat").expect("rat sprite"));
        entity.idle();
        entity
    }

    #[test]
    fn adjacency_distinguishes_diagonals() {
        let origin = character(0, 5, 5);
        let east = character(1, 6, 5);
        let diagonal = character(2, 6, 6);
        let far = character(3, 7, 5);

        assert!(origin.is_adjacent_non_diagonal(&east));
        assert!(origin.is_adjacent(&diagonal));
        assert!(!origin.is_adjacent_non_diagonal(&diagonal));
        assert!(origin.is_diagonally_adjacent(&diagonal));
        assert!(!origin.is_adjacent(&far));
        assert!(origin.is_near(&far, 2));
        assert_eq!(origin.orientation_to(&east), Some(Orientation::Right));
    }

    #[test]
    fn set_grid_position_snaps_pixels() {
        let mut entity = character(0, 1, 1);
        entity.set_grid_position(GridPos::new(3, 4), 16);

        assert_eq!(entity.grid_position(), GridPos::new(3, 4));
        assert_eq!(entity.pixel_position(), (48, 64));
    }

    #[test]
    fn left_walk_uses_flipped_right_clip() {
        let mut entity = character(0, 1, 1);
        entity.walk(Orientation::Left);

        assert_eq!(entity.current_animation_name(), Some("walk_right"));
        assert!(entity.is_flipped());
    }

    #[test]
    fn unknown_animation_keeps_previous_clip() {
        let mut entity = character(0, 1, 1);

        assert!(!entity.set_animation("dance", 100, 0, AnimationEnd::Idle));
        assert_eq!(entity.current_animation_name(), Some("idle_down"));
    }

    #[test]
    fn death_clip_is_never_replaced() {
        let mut entity = character(0, 1, 1);
        assert!(entity.set_animation(DEATH_CLIP, 120, 1, AnimationEnd::Remove));

        entity.walk(Orientation::Up);
        entity.hit();

        assert_eq!(entity.current_animation_name(), Some(DEATH_CLIP));
    }

    #[test]
    fn reselecting_current_clip_keeps_frame() {
        let mut entity = character(0, 1, 1);
        let _ = entity.update_animation(1_000);
        let frame = entity.current_animation().expect("clip").frame_index();

        entity.idle();

        assert_eq!(entity.current_animation().expect("clip").frame_index(), frame);
    }

    #[test]
    fn non_combatant_has_no_attackers_and_never_moves() {
        let item = Entity::new(
            EntityId(9),
            "potion",
            EntityRole::Chest,
            GridPos::new(0, 0),
            16,
            speeds(),
        );

        assert!(item.attackers().is_empty());
        assert!(!item.is_moving());
        assert_eq!(item.occupied_cell(), GridPos::new(0, 0));
    }
}
