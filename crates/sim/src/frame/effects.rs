use crate::content::SpriteDef;
use crate::entity::{Animatable, Animation, AnimationStep};
use crate::nav::GridPos;

/// Standalone clip not owned by an entity, such as impact sparks or the
/// target reticle.
#[derive(Debug, Clone)]
pub struct EffectAnimation {
    name: String,
    cell: Option<GridPos>,
    animation: Animation,
    visible: bool,
    dirty: bool,
}

impl EffectAnimation {
    pub fn new(name: impl Into<String>, animation: Animation) -> Self {
        Self {
            name: name.into(),
            cell: None,
            animation,
            visible: true,
            dirty: true,
        }
    }

    /// Builds the effect from one clip of a sprite sheet.
    pub fn from_sprite(sprite: &SpriteDef, clip: &str, speed: u64) -> Option<Self> {
        let mut animation = sprite.create_animations().remove(clip)?;
        animation.set_speed(speed);
        Some(Self::new(sprite.name.clone(), animation))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self) -> Option<GridPos> {
        self.cell
    }

    pub fn set_cell(&mut self, cell: Option<GridPos>) {
        self.cell = cell;
        self.dirty = true;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.dirty = true;
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }
}

impl Animatable for EffectAnimation {
    fn update_animation(&mut self, now: u64) -> AnimationStep {
        if !self.visible {
            return AnimationStep::Unchanged;
        }
        let step = self.animation.update(now);
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

/// Short-lived UI element (chat bubble, damage popup) refreshed every frame.
pub trait TimedOverlay {
    fn update(&mut self, now: u64);

    fn is_expired(&self) -> bool {
        false
    }
}

/// Text shown over a cell until its duration elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLabel {
    text: String,
    cell: GridPos,
    duration: u64,
    shown_at: Option<u64>,
    expired: bool,
}

impl TimedLabel {
    pub fn new(text: impl Into<String>, cell: GridPos, duration: u64) -> Self {
        Self {
            text: text.into(),
            cell,
            duration,
            shown_at: None,
            expired: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cell(&self) -> GridPos {
        self.cell
    }
}

impl TimedOverlay for TimedLabel {
    fn update(&mut self, now: u64) {
        let shown_at = *self.shown_at.get_or_insert(now);
        if now.saturating_sub(shown_at) >= self.duration {
            self.expired = true;
        }
    }

    fn is_expired(&self) -> bool {
        self.expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{builtin_kind_database, SpriteSource};

    #[test]
    fn hidden_effect_does_not_advance() {
        let database = builtin_kind_database().expect("builtin");
        let sprite = database.sprite("death").expect("death sprite");
        let mut effect = EffectAnimation::from_sprite(sprite, "death", 50).expect("clip");
        effect.set_visible(false);

        assert_eq!(effect.update_animation(500), AnimationStep::Unchanged);

        effect.set_visible(true);
        assert_eq!(effect.update_animation(500), AnimationStep::Advanced);
        assert_eq!(effect.animation().frame_index(), 1);
    }

    #[test]
    fn unknown_clip_yields_no_effect() {
        let database = builtin_kind_database().expect("builtin");
        let sprite = database.sprite("death").expect("death sprite");
        assert!(EffectAnimation::from_sprite(sprite, "sparks", 50).is_none());
    }

    #[test]
    fn label_expires_after_duration_from_first_update() {
        let mut label = TimedLabel::new("-5", GridPos::new(1, 1), 1_000);
        label.update(2_000);
        assert!(!label.is_expired());
        label.update(2_999);
        assert!(!label.is_expired());
        label.update(3_000);
        assert!(label.is_expired());
    }
}
