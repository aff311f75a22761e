use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub tile_size: i32,
    pub frame_rate: u32,
    pub aggro_poll_interval_ms: u64,
    pub zoning_duration_ms: u64,
    pub instant_zoning: bool,
    pub camera_grid_width: i32,
    pub camera_grid_height: i32,
    pub allow_incomplete_paths: bool,
    pub invincibility_duration_ms: u64,
    pub switch_blink_interval_ms: u64,
    pub switch_blink_count: u32,
    pub hurt_flash_ms: u64,
    pub death_animation_speed_ms: u64,
    pub item_idle_speed_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            frame_rate: 50,
            aggro_poll_interval_ms: 1000,
            zoning_duration_ms: 500,
            instant_zoning: false,
            camera_grid_width: 30,
            camera_grid_height: 14,
            allow_incomplete_paths: false,
            invincibility_duration_ms: 15_000,
            switch_blink_interval_ms: 90,
            switch_blink_count: 14,
            hurt_flash_ms: 75,
            death_animation_speed_ms: 120,
            item_idle_speed_ms: 150,
        }
    }
}

impl SimConfig {
    pub fn frame_duration_ms(&self) -> u64 {
        1000 / u64::from(self.frame_rate.max(1))
    }

    /// Pixels covered by the first frame of a tile crossing, derived from how
    /// many frames the crossing spans at the configured frame rate.
    pub fn motion_tick_px(&self, move_speed_ms: u64) -> i32 {
        let frame_ms = 1000.0 / f64::from(self.frame_rate.max(1));
        let frames = (move_speed_ms as f64 / frame_ms).round().max(1.0);
        (f64::from(self.tile_size) / frames).round() as i32
    }
}
