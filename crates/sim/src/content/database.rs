use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::entity::Animation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KindClass {
    Player,
    Monster,
    Npc,
    Item,
    Chest,
}

impl KindClass {
    pub fn is_character(self) -> bool {
        matches!(self, Self::Player | Self::Monster | Self::Npc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentSlot {
    Weapon,
    Armor,
    Consumable,
}

impl EquipmentSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weapon => "weapon",
            Self::Armor => "armor",
            Self::Consumable => "consumable",
        }
    }
}

impl fmt::Display for EquipmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemEffect {
    Invincibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipDef {
    pub name: String,
    pub length: u32,
    pub row: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteDef {
    pub name: String,
    pub frame_width: i32,
    pub frame_height: i32,
    pub clips: Vec<ClipDef>,
}

impl SpriteDef {
    pub fn create_animations(&self) -> BTreeMap<String, Animation> {
        self.clips
            .iter()
            .map(|clip| {
                (
                    clip.name.clone(),
                    Animation::new(
                        clip.name.clone(),
                        clip.length,
                        clip.row,
                        self.frame_width,
                        self.frame_height,
                    ),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDef {
    pub slot: EquipmentSlot,
    pub rank: Option<u32>,
    pub effect: Option<ItemEffect>,
    pub loot_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDef {
    pub name: String,
    pub class: KindClass,
    pub sprite: String,
    pub move_speed: u64,
    pub walk_speed: u64,
    pub idle_speed: u64,
    pub attack_speed: u64,
    pub attack_rate: u64,
    pub hit_points: i32,
    pub aggro_range: i32,
    pub aggressive: bool,
    pub weapon: Option<String>,
    pub item: Option<ItemDef>,
}

/// Provides sprite geometry and named clips to entities.
pub trait SpriteSource {
    fn sprite(&self, name: &str) -> Option<&SpriteDef>;

    fn create_animations(&self, sprite_name: &str) -> Option<BTreeMap<String, Animation>> {
        self.sprite(sprite_name).map(SpriteDef::create_animations)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KindDatabase {
    kinds: BTreeMap<String, KindDef>,
    sprites: BTreeMap<String, SpriteDef>,
}

impl KindDatabase {
    pub(crate) fn from_parts(
        kinds: BTreeMap<String, KindDef>,
        sprites: BTreeMap<String, SpriteDef>,
    ) -> Self {
        Self { kinds, sprites }
    }

    pub fn kind(&self, name: &str) -> Option<&KindDef> {
        self.kinds.get(name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindDef> {
        self.kinds.values()
    }

    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    /// Equipment rank of a weapon or armor kind, when it declares one.
    pub fn rank_of(&self, kind_name: &str) -> Option<u32> {
        self.kinds
            .get(kind_name)
            .and_then(|kind| kind.item.as_ref())
            .and_then(|item| item.rank)
    }
}

impl SpriteSource for KindDatabase {
    fn sprite(&self, name: &str) -> Option<&SpriteDef> {
        self.sprites.get(name)
    }
}
