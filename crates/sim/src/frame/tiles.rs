/// Decorative map tile cycling through consecutive tile ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedTile {
    start_id: u32,
    id: u32,
    length: u32,
    speed: u64,
    last_time: u64,
    index: usize,
    dirty: bool,
}

impl AnimatedTile {
    pub fn new(start_id: u32, length: u32, speed: u64, index: usize) -> Self {
        Self {
            start_id,
            id: start_id,
            length: length.max(1),
            speed,
            last_time: 0,
            index,
            dirty: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Row-major map cell the tile is drawn on.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn tick(&mut self) {
        if self.id - self.start_id < self.length - 1 {
            self.id += 1;
        } else {
            self.id = self.start_id;
        }
        self.dirty = true;
    }

    /// Returns true when the tile advanced a frame.
    pub fn animate(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_time) > self.speed {
            self.tick();
            self.last_time = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_wraps_after_last_frame() {
        let mut tile = AnimatedTile::new(40, 3, 100, 7);

        assert!(!tile.animate(100));
        assert!(tile.animate(101));
        assert_eq!(tile.id(), 41);
        assert!(tile.animate(202));
        assert_eq!(tile.id(), 42);
        assert!(tile.animate(303));
        assert_eq!(tile.id(), 40);
        assert!(tile.is_dirty());
    }

    #[test]
    fn advance_requires_strictly_more_than_speed() {
        let mut tile = AnimatedTile::new(0, 2, 100, 0);
        assert!(tile.animate(150));
        assert!(!tile.animate(250));
        assert!(tile.animate(251));
    }
}
