mod compiler;
mod database;

pub use compiler::{
    builtin_kind_database, compile_kind_database, load_kind_database, ContentCompileError,
    ContentErrorCode, SourceLocation,
};
pub use database::{
    ClipDef, EquipmentSlot, ItemDef, ItemEffect, KindClass, KindDatabase, KindDef, SpriteDef,
    SpriteSource,
};
