pub mod config;
pub mod content;
pub mod entity;
pub mod frame;
pub mod nav;
pub mod timing;
pub mod world;

pub use config::SimConfig;
pub use content::{
    builtin_kind_database, load_kind_database, ContentCompileError, ContentErrorCode, KindDatabase,
    SpriteSource,
};
pub use entity::{CombatantState, Entity, EntityId, EntityKind};
pub use frame::{FrameOrchestrator, FramePhase, FrameReport, FRAME_PHASE_ORDER};
pub use nav::{GridError, GridPos, OccupancyGrid, Orientation};
pub use world::{LootError, LootOutcome, World, WorldError, WorldSnapshot};
