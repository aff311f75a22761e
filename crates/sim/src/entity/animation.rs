use serde::Serialize;

use crate::nav::Orientation;

pub const DEATH_CLIP: &str = "death";
const ATTACK_PREFIX: &str = "atk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEnd {
    Idle,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStep {
    Unchanged,
    Advanced,
    Finished(AnimationEnd),
}

impl AnimationStep {
    pub fn advanced(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipAction {
    Idle,
    Walk,
    Attack,
}

impl ClipAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Attack => ATTACK_PREFIX,
        }
    }
}

/// Left-facing clips reuse the right-facing frames mirrored.
pub fn oriented_clip_name(action: ClipAction, orientation: Orientation) -> (String, bool) {
    let (suffix, flip_x) = match orientation {
        Orientation::Left => (Orientation::Right.as_str(), true),
        other => (other.as_str(), false),
    };
    (format!("{}_{}", action.as_str(), suffix), flip_x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    name: String,
    length: u32,
    row: u32,
    width: i32,
    height: i32,
    speed: u64,
    count: u32,
    on_end: AnimationEnd,
    last_time: u64,
    frame_index: u32,
}

impl Animation {
    pub fn new(name: impl Into<String>, length: u32, row: u32, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            length: length.max(1),
            row,
            width,
            height,
            speed: 100,
            count: 0,
            on_end: AnimationEnd::Idle,
            last_time: 0,
            frame_index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_attack(&self) -> bool {
        self.name.starts_with(ATTACK_PREFIX)
    }

    pub fn speed(&self) -> u64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: u64) {
        self.speed = speed;
    }

    /// A zero count loops forever.
    pub fn set_count(&mut self, count: u32, on_end: AnimationEnd) {
        self.count = count;
        self.on_end = on_end;
    }

    pub fn reset(&mut self) {
        self.last_time = 0;
        self.frame_index = 0;
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn frame(&self) -> FrameRect {
        FrameRect {
            x: self.width * self.frame_index as i32,
            y: self.height * self.row as i32,
            width: self.width,
            height: self.height,
        }
    }

    pub fn tick(&mut self) -> AnimationStep {
        let next = if self.frame_index + 1 < self.length {
            self.frame_index + 1
        } else {
            0
        };
        if self.count > 0 && next == 0 {
            self.count -= 1;
            if self.count == 0 {
                self.frame_index = 0;
                return AnimationStep::Finished(self.on_end);
            }
        }
        self.frame_index = next;
        AnimationStep::Advanced
    }

    pub fn update(&mut self, now: u64) -> AnimationStep {
        if self.last_time == 0 && self.is_attack() {
            self.last_time = now;
        }
        if now.saturating_sub(self.last_time) > self.speed {
            self.last_time = now;
            return self.tick();
        }
        AnimationStep::Unchanged
    }
}
