use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};
use tracing::info;

use super::database::{
    ClipDef, EquipmentSlot, ItemDef, ItemEffect, KindClass, KindDatabase, KindDef, SpriteDef,
};

const BUILTIN_SOURCE_NAME: &str = "<builtin>/kinds.xml";
const BUILTIN_KINDS_XML: &str = include_str!("../../assets/kinds.xml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub source_name: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code, self.message, self.source_name, loc.line, loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code, self.message, self.source_name
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Clone, Copy)]
struct ParseSource<'a, 'input> {
    name: &'a str,
    doc: &'a Document<'input>,
}

#[derive(Debug, Clone)]
struct PendingKindDef {
    def: KindDef,
    location: SourceLocation,
}

pub fn builtin_kind_database() -> Result<KindDatabase, ContentCompileError> {
    compile_kind_database(BUILTIN_SOURCE_NAME, BUILTIN_KINDS_XML)
}

pub fn load_kind_database(path: &Path) -> Result<KindDatabase, ContentCompileError> {
    let source_name = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|error| ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read content file: {error}"),
        source_name: source_name.clone(),
        location: None,
    })?;
    compile_kind_database(&source_name, &raw)
}

pub fn compile_kind_database(
    source_name: &str,
    raw: &str,
) -> Result<KindDatabase, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        source_name: source_name.to_string(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let source = ParseSource {
        name: source_name,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            source,
            root,
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
        ));
    }

    let mut sprites = BTreeMap::<String, SpriteDef>::new();
    let mut pending_kinds = Vec::<PendingKindDef>::new();
    let mut kind_names = HashSet::<String>::new();
    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "SpriteDef" => {
                let sprite = parse_sprite_def(source, child)?;
                if sprites.contains_key(&sprite.name) {
                    return Err(error_at_node(
                        source,
                        child,
                        ContentErrorCode::DuplicateDef,
                        format!("duplicate SpriteDef '{}'", sprite.name),
                    ));
                }
                sprites.insert(sprite.name.clone(), sprite);
            }
            "KindDef" => {
                let pending = parse_kind_def(source, child)?;
                if !kind_names.insert(pending.def.name.clone()) {
                    return Err(error_at_node(
                        source,
                        child,
                        ContentErrorCode::DuplicateDef,
                        format!("duplicate KindDef '{}'", pending.def.name),
                    ));
                }
                pending_kinds.push(pending);
            }
            other => {
                return Err(error_at_node(
                    source,
                    child,
                    ContentErrorCode::UnknownDefType,
                    format!("unsupported def type <{other}>; expected <SpriteDef> or <KindDef>"),
                ))
            }
        }
    }

    let mut kinds = BTreeMap::<String, KindDef>::new();
    for pending in &pending_kinds {
        if !sprites.contains_key(&pending.def.sprite) {
            return Err(reference_error(
                source_name,
                pending.location,
                format!(
                    "kind '{}' references unknown sprite '{}'",
                    pending.def.name, pending.def.sprite
                ),
            ));
        }
        if let Some(weapon) = &pending.def.weapon {
            if !kind_names.contains(weapon) {
                return Err(reference_error(
                    source_name,
                    pending.location,
                    format!(
                        "kind '{}' references unknown weapon '{}'",
                        pending.def.name, weapon
                    ),
                ));
            }
        }
        kinds.insert(pending.def.name.clone(), pending.def.clone());
    }

    info!(
        source = source_name,
        kinds = kinds.len(),
        sprites = sprites.len(),
        "kind_database_compiled"
    );
    Ok(KindDatabase::from_parts(kinds, sprites))
}

fn parse_sprite_def(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
) -> Result<SpriteDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut name: Option<String> = None;
    let mut frame_width: Option<i32> = None;
    let mut frame_height: Option<i32> = None;
    let mut clips: Option<Vec<ClipDef>> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                source,
                field,
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <SpriteDef>"),
            ));
        }

        match field_name.as_str() {
            "name" => name = Some(required_text(source, field, "name")?),
            "frameWidth" => frame_width = Some(parse_positive_i32(source, field, "frameWidth")?),
            "frameHeight" => {
                frame_height = Some(parse_positive_i32(source, field, "frameHeight")?)
            }
            "clips" => clips = Some(parse_clips(source, field)?),
            _ => {
                return Err(error_at_node(
                    source,
                    field,
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <SpriteDef>"),
                ))
            }
        }
    }

    Ok(SpriteDef {
        name: require_field(source, node, name, "name", "SpriteDef")?,
        frame_width: require_field(source, node, frame_width, "frameWidth", "SpriteDef")?,
        frame_height: require_field(source, node, frame_height, "frameHeight", "SpriteDef")?,
        clips: clips.unwrap_or_default(),
    })
}

fn parse_clips(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<ClipDef>, ContentCompileError> {
    let mut clips = Vec::new();
    let mut names = HashSet::<String>::new();
    for clip in node.children().filter(|child| child.is_element()) {
        if clip.tag_name().name() != "clip" {
            return Err(error_at_node(
                source,
                clip,
                ContentErrorCode::UnknownField,
                format!("unknown element <{}> in <clips>", clip.tag_name().name()),
            ));
        }
        let name = required_attribute(source, clip, "name")?;
        let length = parse_attribute_u32(source, clip, "length")?;
        let row = parse_attribute_u32(source, clip, "row")?;
        if length == 0 {
            return Err(error_at_node(
                source,
                clip,
                ContentErrorCode::InvalidValue,
                format!("clip '{name}' must have length >= 1"),
            ));
        }
        if !names.insert(name.clone()) {
            return Err(error_at_node(
                source,
                clip,
                ContentErrorCode::DuplicateDef,
                format!("duplicate clip '{name}'"),
            ));
        }
        clips.push(ClipDef { name, length, row });
    }
    Ok(clips)
}

fn parse_kind_def(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
) -> Result<PendingKindDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut name: Option<String> = None;
    let mut class: Option<KindClass> = None;
    let mut sprite: Option<String> = None;
    let mut move_speed: Option<u64> = None;
    let mut walk_speed: Option<u64> = None;
    let mut idle_speed: Option<u64> = None;
    let mut attack_speed: Option<u64> = None;
    let mut attack_rate: Option<u64> = None;
    let mut hit_points: Option<i32> = None;
    let mut aggro_range: Option<i32> = None;
    let mut aggressive: Option<bool> = None;
    let mut weapon: Option<String> = None;
    let mut slot: Option<EquipmentSlot> = None;
    let mut rank: Option<u32> = None;
    let mut effect: Option<ItemEffect> = None;
    let mut loot_message: Option<String> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                source,
                field,
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <KindDef>"),
            ));
        }

        match field_name.as_str() {
            "name" => name = Some(required_text(source, field, "name")?),
            "class" => {
                let value = required_text(source, field, "class")?;
                class = Some(match value.as_str() {
                    "player" => KindClass::Player,
                    "monster" => KindClass::Monster,
                    "npc" => KindClass::Npc,
                    "item" => KindClass::Item,
                    "chest" => KindClass::Chest,
                    _ => {
                        return Err(error_at_node(
                            source,
                            field,
                            ContentErrorCode::InvalidValue,
                            format!(
                                "invalid class '{value}'; allowed values: player, monster, npc, item, chest"
                            ),
                        ))
                    }
                });
            }
            "sprite" => sprite = Some(required_text(source, field, "sprite")?),
            "moveSpeed" => move_speed = Some(parse_u64(source, field, "moveSpeed")?),
            "walkSpeed" => walk_speed = Some(parse_u64(source, field, "walkSpeed")?),
            "idleSpeed" => idle_speed = Some(parse_u64(source, field, "idleSpeed")?),
            "atkSpeed" => attack_speed = Some(parse_u64(source, field, "atkSpeed")?),
            "attackRate" => attack_rate = Some(parse_u64(source, field, "attackRate")?),
            "hitPoints" => hit_points = Some(parse_positive_i32(source, field, "hitPoints")?),
            "aggroRange" => aggro_range = Some(parse_positive_i32(source, field, "aggroRange")?),
            "aggressive" => {
                let value = required_text(source, field, "aggressive")?;
                aggressive = Some(match value.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(error_at_node(
                            source,
                            field,
                            ContentErrorCode::InvalidValue,
                            format!("aggressive '{value}' must be true or false"),
                        ))
                    }
                });
            }
            "weapon" => weapon = Some(required_text(source, field, "weapon")?),
            "slot" => {
                let value = required_text(source, field, "slot")?;
                slot = Some(match value.as_str() {
                    "weapon" => EquipmentSlot::Weapon,
                    "armor" => EquipmentSlot::Armor,
                    "consumable" => EquipmentSlot::Consumable,
                    _ => {
                        return Err(error_at_node(
                            source,
                            field,
                            ContentErrorCode::InvalidValue,
                            format!(
                                "invalid slot '{value}'; allowed values: weapon, armor, consumable"
                            ),
                        ))
                    }
                });
            }
            "rank" => {
                let value = parse_u64(source, field, "rank")?;
                rank = Some(u32::try_from(value).map_err(|_| {
                    error_at_node(
                        source,
                        field,
                        ContentErrorCode::InvalidValue,
                        format!("rank '{value}' is out of range"),
                    )
                })?);
            }
            "effect" => {
                let value = required_text(source, field, "effect")?;
                effect = Some(match value.as_str() {
                    "invincibility" => ItemEffect::Invincibility,
                    _ => {
                        return Err(error_at_node(
                            source,
                            field,
                            ContentErrorCode::InvalidValue,
                            format!("invalid effect '{value}'; allowed values: invincibility"),
                        ))
                    }
                });
            }
            "lootMessage" => loot_message = Some(required_text(source, field, "lootMessage")?),
            _ => {
                return Err(error_at_node(
                    source,
                    field,
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <KindDef>"),
                ))
            }
        }
    }

    let name = require_field(source, node, name, "name", "KindDef")?;
    let class = require_field(source, node, class, "class", "KindDef")?;
    let item = match (class, slot) {
        (KindClass::Item, Some(slot)) => Some(ItemDef {
            slot,
            rank,
            effect,
            loot_message: loot_message.unwrap_or_else(|| format!("You pick up {name}")),
        }),
        (KindClass::Item, None) => {
            return Err(error_at_node(
                source,
                node,
                ContentErrorCode::MissingField,
                format!("item kind '{name}' is missing required field <slot>"),
            ))
        }
        (_, Some(_)) => {
            return Err(error_at_node(
                source,
                node,
                ContentErrorCode::InvalidValue,
                format!("<slot> is only valid on item kinds; '{name}' is not an item"),
            ))
        }
        (_, None) => None,
    };

    let pos = source.doc.text_pos_at(node.range().start);
    Ok(PendingKindDef {
        def: KindDef {
            sprite: sprite.unwrap_or_else(|| name.clone()),
            move_speed: move_speed.unwrap_or(120),
            walk_speed: walk_speed.unwrap_or(100),
            idle_speed: idle_speed.unwrap_or(450),
            attack_speed: attack_speed.unwrap_or(50),
            attack_rate: attack_rate.unwrap_or(800),
            hit_points: hit_points.unwrap_or(10),
            aggro_range: aggro_range.unwrap_or(1),
            aggressive: aggressive.unwrap_or(class == KindClass::Monster),
            weapon,
            item,
            name,
            class,
        },
        location: SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        },
    })
}

fn require_field<T>(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    value: Option<T>,
    field_name: &str,
    def_type: &str,
) -> Result<T, ContentCompileError> {
    value.ok_or_else(|| {
        error_at_node(
            source,
            node,
            ContentErrorCode::MissingField,
            format!("missing required field <{field_name}> in <{def_type}>"),
        )
    })
}

fn required_text(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            source,
            node,
            ContentErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
        ));
    }
    Ok(value)
}

fn required_attribute(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    attribute: &str,
) -> Result<String, ContentCompileError> {
    match node.attribute(attribute).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(error_at_node(
            source,
            node,
            ContentErrorCode::MissingField,
            format!("<clip> requires attribute '{attribute}'"),
        )),
    }
}

fn parse_attribute_u32(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    attribute: &str,
) -> Result<u32, ContentCompileError> {
    let value = required_attribute(source, node, attribute)?;
    value.parse::<u32>().map_err(|_| {
        error_at_node(
            source,
            node,
            ContentErrorCode::InvalidValue,
            format!("{attribute} '{value}' is not a valid non-negative integer"),
        )
    })
}

fn parse_u64(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<u64, ContentCompileError> {
    let value = required_text(source, node, field_name)?;
    value.parse::<u64>().map_err(|_| {
        error_at_node(
            source,
            node,
            ContentErrorCode::InvalidValue,
            format!("{field_name} '{value}' is not a valid non-negative integer"),
        )
    })
}

fn parse_positive_i32(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<i32, ContentCompileError> {
    let value = required_text(source, node, field_name)?;
    match value.parse::<i32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(error_at_node(
            source,
            node,
            ContentErrorCode::InvalidValue,
            format!("{field_name} '{value}' must be an integer >= 1"),
        )),
    }
}

fn reference_error(
    source_name: &str,
    location: SourceLocation,
    message: String,
) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::UnknownReference,
        message,
        source_name: source_name.to_string(),
        location: Some(location),
    }
}

fn error_at_node(
    source: ParseSource<'_, '_>,
    node: Node<'_, '_>,
    code: ContentErrorCode,
    message: String,
) -> ContentCompileError {
    let pos = source.doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        source_name: source.name.to_string(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}
