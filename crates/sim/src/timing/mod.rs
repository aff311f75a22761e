mod cooldown;
mod interpolator;
mod scheduler;

pub use cooldown::CooldownTimer;
pub use interpolator::{Interpolator, InterpolatorEvent};
pub use scheduler::{DueTask, Scheduler, TaskId};
