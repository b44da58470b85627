//! Motion of the object while the hand is not holding it: easing back to
//! rest, and ballistic flight after a throw.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::ObjectTransform;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnCurve {
    /// Fixed per-frame lerp factor.
    Constant { rate: f32 },
    /// Starts at `fast_rate` and slows by `decay` over `period_ms`.
    TwoPhase {
        fast_rate: f32,
        decay: f32,
        period_ms: f64,
    },
}

impl Default for ReturnCurve {
    fn default() -> Self {
        ReturnCurve::TwoPhase {
            fast_rate: 0.22,
            decay: 0.14,
            period_ms: 1200.0,
        }
    }
}

impl ReturnCurve {
    /// Lerp factor for a frame `since_delay_ms` after the return began.
    pub fn rate(&self, since_delay_ms: f64) -> f32 {
        match *self {
            ReturnCurve::Constant { rate } => rate,
            ReturnCurve::TwoPhase {
                fast_rate,
                decay,
                period_ms,
            } => {
                let t = if period_ms > 0.0 {
                    (since_delay_ms / period_ms).clamp(0.0, 1.0) as f32
                } else {
                    1.0
                };
                fast_rate - decay * t
            }
        }
    }
}

/// One easing step toward `rest`. Distance to rest never grows for rates in (0, 1].
pub fn ease_toward(current: &ObjectTransform, rest: &ObjectTransform, rate: f32) -> ObjectTransform {
    let rate = rate.clamp(0.0, 1.0);
    ObjectTransform {
        position: current.position.lerp(rest.position, rate),
        scale: current.scale + (rest.scale - current.scale) * rate,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrowConfig {
    pub enabled: bool,
    /// Minimum release speed (world units/s) that turns a release into a throw.
    pub velocity_threshold: f32,
    pub velocity_scale: f32,
    pub gravity: f32,
    /// Closest the object may come to the camera (z is negative in front).
    pub near_z: f32,
    pub restitution: f32,
    pub far_z: f32,
    pub floor_y: f32,
    pub min_horizontal_speed: f32,
    pub min_vertical_speed: f32,
}

impl Default for ThrowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            velocity_threshold: 0.3,
            velocity_scale: 1.0,
            gravity: -3.0,
            near_z: -0.3,
            restitution: 0.5,
            far_z: -8.0,
            floor_y: -3.0,
            min_horizontal_speed: 0.05,
            min_vertical_speed: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TooFar,
    BelowFloor,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowStep {
    Flying,
    Bounced,
    Stopped(StopReason),
}

/// Semi-implicit Euler flight with boundary checks.
#[derive(Debug, Clone)]
pub struct Ballistic {
    pub velocity: Vec3,
}

impl Ballistic {
    pub fn new(velocity: Vec3) -> Self {
        Self { velocity }
    }

    pub fn step(&mut self, transform: &mut ObjectTransform, dt: f32, cfg: &ThrowConfig) -> ThrowStep {
        transform.position += self.velocity * dt;
        self.velocity.y += cfg.gravity * dt;

        let mut bounced = false;
        if transform.position.z > cfg.near_z {
            transform.position.z = cfg.near_z;
            self.velocity.z = -self.velocity.z * cfg.restitution;
            bounced = true;
        }

        let too_far = transform.position.z < cfg.far_z;
        let below_floor = transform.position.y < cfg.floor_y;
        let horizontal = self.velocity.x.hypot(self.velocity.z);
        let settled = horizontal < cfg.min_horizontal_speed
            && self.velocity.y.abs() < cfg.min_vertical_speed;

        let stop = if too_far {
            Some(StopReason::TooFar)
        } else if below_floor {
            Some(StopReason::BelowFloor)
        } else if settled {
            Some(StopReason::Settled)
        } else {
            None
        };

        match stop {
            Some(reason) => {
                self.velocity = Vec3::ZERO;
                ThrowStep::Stopped(reason)
            }
            None if bounced => ThrowStep::Bounced,
            None => ThrowStep::Flying,
        }
    }
}
