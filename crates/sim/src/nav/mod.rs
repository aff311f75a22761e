mod grid;
mod pathfinder;

pub use grid::{Axis, GridError, GridPos, OccupancyGrid, Orientation, BLOCKED, WALKABLE};
pub use pathfinder::Pathfinder;
