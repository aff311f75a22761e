use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use crate::entity::Entity;
use crate::nav::{Axis, GridPos, Orientation};
use crate::timing::{Interpolator, InterpolatorEvent};

use super::hooks::ZoningEvent;
use super::World;

/// Viewport over the map in pixels, with its grid origin derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Camera {
    x: i32,
    y: i32,
    grid_x: i32,
    grid_y: i32,
    grid_width: i32,
    grid_height: i32,
    tile_size: i32,
}

impl Camera {
    pub fn new(grid_width: i32, grid_height: i32, tile_size: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            grid_x: 0,
            grid_y: 0,
            grid_width,
            grid_height,
            tile_size: tile_size.max(1),
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn grid_position(&self) -> GridPos {
        GridPos::new(self.grid_x, self.grid_y)
    }

    pub fn grid_width(&self) -> i32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> i32 {
        self.grid_height
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.grid_x = x.div_euclid(self.tile_size);
        self.grid_y = y.div_euclid(self.tile_size);
    }

    pub fn set_grid_position(&mut self, pos: GridPos) {
        self.grid_x = pos.x;
        self.grid_y = pos.y;
        self.x = pos.x * self.tile_size;
        self.y = pos.y * self.tile_size;
    }

    /// Centers the viewport on an entity's pixel position.
    pub fn look_at(&mut self, entity: &Entity) {
        let (px, py) = entity.pixel_position();
        let x = px - (self.grid_width / 2) * self.tile_size;
        let y = py - (self.grid_height / 2) * self.tile_size;
        self.set_position(x, y);
    }

    /// Snaps to the screen containing `cell`. Screens overlap by one border
    /// cell on each side.
    pub fn focus_on(&mut self, cell: GridPos) {
        let span_x = (self.grid_width - 2).max(1);
        let span_y = (self.grid_height - 2).max(1);
        let x = (cell.x - 1).div_euclid(span_x) * span_x;
        let y = (cell.y - 1).div_euclid(span_y) * span_y;
        self.set_grid_position(GridPos::new(x, y));
    }

    pub fn is_visible_cell(&self, cell: GridPos) -> bool {
        cell.x >= self.grid_x
            && cell.x < self.grid_x + self.grid_width
            && cell.y >= self.grid_y
            && cell.y < self.grid_y + self.grid_height
    }

    pub fn is_visible(&self, entity: &Entity) -> bool {
        self.is_visible_cell(entity.grid)
    }

    /// Visible cells row by row, widened by `margin` on every side.
    pub fn visible_cells(&self, margin: i32) -> Vec<GridPos> {
        let mut cells = Vec::new();
        for y in (self.grid_y - margin)..(self.grid_y + self.grid_height + margin) {
            for x in (self.grid_x - margin)..(self.grid_x + self.grid_width + margin) {
                cells.push(GridPos::new(x, y));
            }
        }
        cells
    }

    /// True for the outer ring of the viewport.
    pub fn is_zoning_cell(&self, cell: GridPos) -> bool {
        if !self.is_visible_cell(cell) {
            return false;
        }
        let x = cell.x - self.grid_x;
        let y = cell.y - self.grid_y;
        x == 0 || y == 0 || x == self.grid_width - 1 || y == self.grid_height - 1
    }

    /// Direction to pan when leaving through `cell`. Corners resolve
    /// left, then up, then right, then down.
    pub fn zoning_orientation(&self, cell: GridPos) -> Option<Orientation> {
        let x = cell.x - self.grid_x;
        let y = cell.y - self.grid_y;
        if x == 0 {
            Some(Orientation::Left)
        } else if y == 0 {
            Some(Orientation::Up)
        } else if x == self.grid_width - 1 {
            Some(Orientation::Right)
        } else if y == self.grid_height - 1 {
            Some(Orientation::Down)
        } else {
            None
        }
    }

    fn pan_span(&self, orientation: Orientation) -> i32 {
        match orientation.axis() {
            Axis::Horizontal => (self.grid_width - 2) * self.tile_size,
            Axis::Vertical => (self.grid_height - 2) * self.tile_size,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ZoningState {
    queue: VecDeque<GridPos>,
    current: Option<Orientation>,
    pan: Interpolator<Axis>,
}

impl World {
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn is_zoning(&self) -> bool {
        self.zoning.current.is_some() || self.zoning.pan.is_in_progress()
    }

    pub fn zoning_queue_len(&self) -> usize {
        self.zoning.queue.len()
    }

    /// Queues a screen transition for the zoning cell the player entered.
    /// The head of the queue starts on the next zoning update.
    pub fn enqueue_zoning(&mut self, cell: GridPos) {
        if self.zoning.queue.contains(&cell) {
            return;
        }
        self.zoning.queue.push_back(cell);
        debug!(
            x = cell.x,
            y = cell.y,
            queued = self.zoning.queue.len(),
            "zoning_enqueued"
        );
    }

    /// Starts the queued transition when none is running. Returns true when
    /// one started.
    pub(crate) fn update_zoning(&mut self, now: u64) -> bool {
        if self.is_zoning() {
            return false;
        }
        let Some(cell) = self.zoning.queue.front().copied() else {
            return false;
        };
        let Some(orientation) = self.camera.zoning_orientation(cell) else {
            self.zoning.queue.pop_front();
            return false;
        };
        self.zoning.current = Some(orientation);
        let camera = self.camera.grid_position();
        info!(
            orientation = orientation.as_str(),
            camera_x = camera.x,
            camera_y = camera.y,
            "zoning_started"
        );
        self.hooks.zoning_started.emit(&ZoningEvent {
            orientation: Some(orientation),
            camera,
        });

        let span = self.camera.pan_span(orientation);
        let (x, y) = self.camera.position();
        let sign = orientation.sign();
        let tile = self.camera.tile_size;
        if self.config.instant_zoning {
            match orientation.axis() {
                Axis::Horizontal => self.camera.set_position(x + sign * span, y),
                Axis::Vertical => self.camera.set_position(x, y + sign * span),
            }
            self.end_zoning();
            return true;
        }
        let (axis, origin) = match orientation.axis() {
            Axis::Horizontal => (Axis::Horizontal, x),
            Axis::Vertical => (Axis::Vertical, y),
        };
        self.zoning.pan.start(
            now,
            axis,
            origin + sign * tile,
            origin + sign * span,
            self.config.zoning_duration_ms,
        );
        true
    }

    /// Advances the camera pan. Returns true when the transition completed.
    pub(crate) fn step_zoning(&mut self, now: u64) -> bool {
        let Some(event) = self.zoning.pan.step(now) else {
            return false;
        };
        let (x, y) = self.camera.position();
        match event.wiring() {
            Axis::Horizontal => self.camera.set_position(event.value(), y),
            Axis::Vertical => self.camera.set_position(x, event.value()),
        }
        if let InterpolatorEvent::Complete { .. } = event {
            self.end_zoning();
            return true;
        }
        false
    }

    fn end_zoning(&mut self) {
        self.zoning.queue.pop_front();
        let orientation = self.zoning.current.take();
        let camera = self.camera.grid_position();
        info!(camera_x = camera.x, camera_y = camera.y, "zoning_ended");
        self.hooks
            .zoning_ended
            .emit(&ZoningEvent { orientation, camera });
    }
}
