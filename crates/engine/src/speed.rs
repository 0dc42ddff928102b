//! The outer speed layer: one factor applied to the clip that embeds the whole
//! nested timeline, independent of the per-dialogue segment speeds.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::timecode::{microseconds_to_seconds, TimeValue};

/// Speed of the outer composite clip. Kept as its own type so it cannot be
/// confused with a dialogue's segment speed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OuterSpeed(f64);

impl OuterSpeed {
    pub const NORMAL: OuterSpeed = OuterSpeed(1.0);

    pub fn new(value: f64) -> EngineResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "outer speed must be a positive number, got {value}"
            )));
        }
        Ok(OuterSpeed(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Position in the rendered output, in seconds, of a nested-timeline time.
    pub fn rendered_seconds(self, nested: TimeValue) -> f64 {
        microseconds_to_seconds(nested) / self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedPlan {
    pub nested_duration: TimeValue,
    pub required_speed: f64,
    pub outer_speed: OuterSpeed,
    pub final_duration: TimeValue,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalSpeedNormalizer {
    target_duration_seconds: f64,
    max_speed: f64,
}

impl GlobalSpeedNormalizer {
    pub fn new(target_duration_seconds: f64, max_speed: f64) -> EngineResult<Self> {
        if !(target_duration_seconds > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "target duration must be positive, got {target_duration_seconds}"
            )));
        }
        if !(max_speed >= 1.0) || !max_speed.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "max speed must be at least 1.0, got {max_speed}"
            )));
        }
        Ok(GlobalSpeedNormalizer {
            target_duration_seconds,
            max_speed,
        })
    }

    /// `clamp(nested / target, 1.0, max_speed)`. The ceiling wins over the target,
    /// so the final duration may exceed it.
    pub fn normalize(&self, nested_duration: TimeValue) -> SpeedPlan {
        let nested_seconds = microseconds_to_seconds(nested_duration);
        let required_speed = nested_seconds / self.target_duration_seconds;
        let speed = required_speed.clamp(1.0, self.max_speed);
        let final_duration = (nested_duration as f64 / speed).round() as TimeValue;

        info!(
            nested_seconds,
            target_seconds = self.target_duration_seconds,
            required_speed,
            outer_speed = speed,
            final_seconds = microseconds_to_seconds(final_duration),
            "outer speed computed"
        );

        SpeedPlan {
            nested_duration,
            required_speed,
            outer_speed: OuterSpeed(speed),
            final_duration,
        }
    }
}
