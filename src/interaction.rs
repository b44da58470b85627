//! Grab/release state machine for the avatar group.
//!
//! One controller owns every piece of interaction state (current state,
//! timers, grab reference, flight) and is advanced once per frame with the
//! classifier's observation of the primary hand.

use glam::Vec3;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::clock::FrameTick;
use crate::geometry::{self, CameraModel, DepthModel, ModelBounds, ObjectTransform};
use crate::gestures::{GestureSignals, HandObservation};
use crate::integrator::{self, Ballistic, ReturnCurve, StopReason, ThrowConfig, ThrowStep};
use crate::landmarks::{Joint, LandmarkSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Idle,
    Grabbed,
    Returning,
    Thrown,
}

impl InteractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Grabbed => "grabbed",
            Self::Returning => "returning",
            Self::Thrown => "thrown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingertipScale {
    /// Shrinks/grows with hand distance so the apparent size stays constant.
    #[default]
    DistanceCompensated,
    /// Matches the avatar height to the hand's on-screen size.
    HandSized,
}

/// How the object is attached to the hand while grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrabModel {
    /// Keeps the object-to-hand offset captured at grab time.
    Offset { anchor: Joint },
    /// Hangs the object's head top from the anchor joint.
    Fingertip {
        anchor: Joint,
        #[serde(default)]
        scale: FingertipScale,
    },
}

impl GrabModel {
    pub fn anchor(&self) -> Joint {
        match *self {
            GrabModel::Offset { anchor } | GrabModel::Fingertip { anchor, .. } => anchor,
        }
    }
}

impl Default for GrabModel {
    fn default() -> Self {
        GrabModel::Fingertip {
            anchor: Joint::ThumbTip,
            scale: FingertipScale::DistanceCompensated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// No new grab is accepted this long after a release.
    pub pinch_cooldown_ms: f64,
    /// Inactivity before the object eases back to rest.
    pub return_delay_ms: f64,
    pub grab: GrabModel,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Floor on the hand-to-camera distance used for scale compensation.
    pub min_hand_distance: f32,
    /// Forced releases (hand lost, invalid, out of view) jump straight to rest.
    pub snap_on_forced_release: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            pinch_cooldown_ms: 1000.0,
            return_delay_ms: 2000.0,
            grab: GrabModel::default(),
            scale_min: 0.45,
            scale_max: 1.2,
            min_hand_distance: 0.3,
            snap_on_forced_release: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnConfig {
    pub curve: ReturnCurve,
    /// Distance to rest under which the object snaps home.
    pub epsilon: f32,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            curve: ReturnCurve::default(),
            epsilon: 0.03,
        }
    }
}

/// Everything the controller reads from the profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuning {
    pub interaction: InteractionConfig,
    pub returning: ReturnConfig,
    pub throw: ThrowConfig,
    pub depth: DepthModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    PinchOpened,
    HandInvalid,
    OutOfView,
    HandLost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InteractionEvent {
    GrabStarted { anchor: Vec3 },
    Released { reason: ReleaseReason },
    Thrown { velocity: Vec3 },
    Bounced,
    ThrowStopped { reason: StopReason },
    ReturnStarted,
    Settled,
}

pub struct FrameInput<'a> {
    pub tick: FrameTick,
    pub observation: HandObservation,
    pub hand: Option<&'a LandmarkSet>,
    pub camera: &'a CameraModel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub state: InteractionState,
    pub transform: Option<ObjectTransform>,
    pub indicator_visible: bool,
    pub events: Vec<InteractionEvent>,
}

#[derive(Debug, Clone)]
struct Grabbable {
    transform: ObjectTransform,
    rest: ObjectTransform,
    bounds: ModelBounds,
}

#[derive(Debug)]
pub struct InteractionController {
    tuning: Tuning,
    state: InteractionState,
    object: Option<Grabbable>,
    last_pinch_end_ms: Option<f64>,
    last_interaction_ms: Option<f64>,
    grab_offset: Vec3,
    /// Anchor position and the frame time it was sampled at.
    last_hand_sample: Option<(Vec3, f64)>,
    hand_velocity: Vec3,
    flight: Option<Ballistic>,
    easing: bool,
}

impl InteractionController {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            tuning,
            state: InteractionState::Idle,
            object: None,
            last_pinch_end_ms: None,
            last_interaction_ms: None,
            grab_offset: Vec3::ZERO,
            last_hand_sample: None,
            hand_velocity: Vec3::ZERO,
            flight: None,
            easing: false,
        }
    }

    pub fn set_tuning(&mut self, tuning: Tuning) {
        self.tuning = tuning;
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn transform(&self) -> Option<ObjectTransform> {
        self.object.as_ref().map(|o| o.transform)
    }

    pub fn rest_pose(&self) -> Option<ObjectTransform> {
        self.object.as_ref().map(|o| o.rest)
    }

    pub fn indicator_visible(&self) -> bool {
        self.state == InteractionState::Grabbed
    }

    /// Makes an object grabbable, placed at its rest pose.
    pub fn attach(&mut self, bounds: ModelBounds, rest: ObjectTransform, now_ms: f64) {
        self.object = Some(Grabbable {
            transform: rest,
            rest,
            bounds,
        });
        self.to_idle(now_ms);
    }

    pub fn detach(&mut self) {
        self.object = None;
        self.state = InteractionState::Idle;
        self.flight = None;
        self.easing = false;
    }

    /// New rest pose after a resize. A held object stays in the hand.
    pub fn set_rest_pose(&mut self, rest: ObjectTransform, now_ms: f64) {
        let Some(obj) = self.object.as_mut() else {
            return;
        };
        obj.rest = rest;
        if self.state != InteractionState::Grabbed {
            obj.transform = rest;
            self.to_idle(now_ms);
        }
    }

    pub fn set_bounds(&mut self, bounds: ModelBounds) {
        if let Some(obj) = self.object.as_mut() {
            obj.bounds = bounds;
        }
    }

    /// Moves the object without a grab; it drifts home after the usual delay.
    pub fn place(&mut self, transform: ObjectTransform, now_ms: f64) {
        let Some(obj) = self.object.as_mut() else {
            return;
        };
        obj.transform = transform;
        if self.state != InteractionState::Grabbed {
            self.state = InteractionState::Idle;
            self.flight = None;
            self.easing = false;
            self.last_interaction_ms = Some(now_ms);
        }
    }

    fn to_idle(&mut self, now_ms: f64) {
        self.state = InteractionState::Idle;
        self.flight = None;
        self.easing = false;
        self.last_interaction_ms = Some(now_ms);
    }

    fn in_cooldown(&self, now_ms: f64) -> bool {
        self.last_pinch_end_ms
            .is_some_and(|t| now_ms - t < self.tuning.interaction.pinch_cooldown_ms)
    }

    pub fn update(&mut self, input: FrameInput<'_>) -> FrameOutput {
        let mut events = Vec::new();

        if self.object.is_some() {
            let released = self.step_hand(&input, &mut events);
            if !released && self.state != InteractionState::Grabbed {
                self.step_free(&input.tick, &mut events);
            }
        }

        FrameOutput {
            state: self.state,
            transform: self.transform(),
            indicator_visible: self.indicator_visible(),
            events,
        }
    }

    /// Hand-driven transitions. Returns true if a release happened this frame.
    fn step_hand(&mut self, input: &FrameInput<'_>, events: &mut Vec<InteractionEvent>) -> bool {
        let now = input.tick.now_ms;

        if self.state == InteractionState::Grabbed {
            let release = match input.observation {
                HandObservation::Absent => Some(ReleaseReason::HandLost),
                HandObservation::Invalid(_) => Some(ReleaseReason::HandInvalid),
                HandObservation::Valid(s) if s.is_out_of_view => Some(ReleaseReason::OutOfView),
                HandObservation::Valid(s) if !s.is_pinching => Some(ReleaseReason::PinchOpened),
                HandObservation::Valid(_) => None,
            };
            match (release, input.hand, input.observation.signals()) {
                (Some(reason), _, _) => {
                    self.release(reason, input, events);
                    return true;
                }
                (None, Some(hand), Some(signals)) => {
                    let anchor = self.anchor_world(hand, input.camera);
                    self.follow(anchor, signals, input.camera, now);
                    self.last_interaction_ms = Some(now);
                }
                _ => {}
            }
            return false;
        }

        let HandObservation::Valid(signals) = input.observation else {
            return false;
        };
        if !signals.is_pinching || signals.is_out_of_view {
            return false;
        }
        if self.in_cooldown(now) {
            trace!("pinch ignored during cooldown");
            return false;
        }
        if let Some(hand) = input.hand {
            self.grab(hand, &signals, input, events);
        }
        false
    }

    fn anchor_world(&self, hand: &LandmarkSet, camera: &CameraModel) -> Vec3 {
        let anchor = self.tuning.interaction.grab.anchor();
        camera.landmark_to_world(&hand.joint(anchor), &self.tuning.depth)
    }

    fn grab(
        &mut self,
        hand: &LandmarkSet,
        signals: &GestureSignals,
        input: &FrameInput<'_>,
        events: &mut Vec<InteractionEvent>,
    ) {
        let anchor = self.anchor_world(hand, input.camera);
        let Some(obj) = self.object.as_ref() else {
            return;
        };
        self.grab_offset = match self.tuning.interaction.grab {
            GrabModel::Offset { .. } => obj.transform.position - anchor,
            GrabModel::Fingertip { .. } => Vec3::ZERO,
        };
        self.state = InteractionState::Grabbed;
        self.flight = None;
        self.easing = false;
        self.hand_velocity = Vec3::ZERO;
        self.last_hand_sample = None;
        self.last_interaction_ms = Some(input.tick.now_ms);
        self.follow(anchor, signals, input.camera, input.tick.now_ms);

        info!("grab started at ({:.2}, {:.2}, {:.2})", anchor.x, anchor.y, anchor.z);
        events.push(InteractionEvent::GrabStarted { anchor });
    }

    fn follow(&mut self, anchor: Vec3, signals: &GestureSignals, camera: &CameraModel, now_ms: f64) {
        // measured over the time between observed samples, not the frame delta
        if let Some((last, sampled_ms)) = self.last_hand_sample {
            let elapsed_s = ((now_ms - sampled_ms) / 1000.0) as f32;
            if elapsed_s > 0.0 {
                self.hand_velocity = (anchor - last) / elapsed_s;
            }
        }
        self.last_hand_sample = Some((anchor, now_ms));

        let cfg = &self.tuning.interaction;
        let Some(obj) = self.object.as_mut() else {
            return;
        };
        match cfg.grab {
            GrabModel::Offset { .. } => {
                obj.transform.position = anchor + self.grab_offset;
            }
            GrabModel::Fingertip { scale, .. } => {
                let clamp = (cfg.scale_min, cfg.scale_max);
                let hand_distance = camera.depth_of(anchor).max(cfg.min_hand_distance);
                let s = match scale {
                    FingertipScale::DistanceCompensated => {
                        let rest_distance = camera.depth_of(obj.rest.position);
                        if rest_distance > f32::EPSILON {
                            (obj.rest.scale / (rest_distance / hand_distance)).clamp(clamp.0, clamp.1)
                        } else {
                            obj.rest.scale
                        }
                    }
                    FingertipScale::HandSized => geometry::scale_for_hand_size(
                        signals.hand_size,
                        hand_distance,
                        camera,
                        &obj.bounds,
                        obj.rest.scale,
                        clamp,
                    ),
                };
                obj.transform.scale = s;
                obj.transform.position = anchor - Vec3::Y * obj.bounds.head_offset(s);
            }
        }
    }

    fn release(&mut self, reason: ReleaseReason, input: &FrameInput<'_>, events: &mut Vec<InteractionEvent>) {
        let now = input.tick.now_ms;
        self.last_pinch_end_ms = Some(now);
        self.last_interaction_ms = Some(now);
        self.easing = false;
        events.push(InteractionEvent::Released { reason });

        if reason == ReleaseReason::PinchOpened {
            // measured while still pinched; opening the fingers moves the anchor
            let throw = &self.tuning.throw;
            let velocity = self.hand_velocity * throw.velocity_scale;
            self.last_hand_sample = None;

            if throw.enabled && velocity.length() > throw.velocity_threshold {
                info!(
                    "thrown at {:.2} u/s ({:.2}, {:.2}, {:.2})",
                    velocity.length(),
                    velocity.x,
                    velocity.y,
                    velocity.z
                );
                self.state = InteractionState::Thrown;
                self.flight = Some(Ballistic::new(velocity));
                events.push(InteractionEvent::Thrown { velocity });
            } else {
                info!(
                    "released; returning to rest in {:.1}s",
                    self.tuning.interaction.return_delay_ms / 1000.0
                );
                self.state = InteractionState::Returning;
            }
            return;
        }

        self.last_hand_sample = None;
        if self.tuning.interaction.snap_on_forced_release {
            if let Some(obj) = self.object.as_mut() {
                obj.transform = obj.rest;
            }
            self.state = InteractionState::Idle;
        } else {
            self.state = InteractionState::Returning;
        }
        info!("released ({reason:?}), now {}", self.state.as_str());
    }

    /// Motion not driven by the hand: flight, or easing back to rest.
    fn step_free(&mut self, tick: &FrameTick, events: &mut Vec<InteractionEvent>) {
        if self.state == InteractionState::Thrown {
            self.step_flight(tick, events);
            return;
        }

        let Some(last) = self.last_interaction_ms else {
            return;
        };
        let delay = self.tuning.interaction.return_delay_ms;
        let elapsed = tick.now_ms - last;
        if elapsed <= delay {
            return;
        }
        let Some(obj) = self.object.as_mut() else {
            return;
        };
        if self.state == InteractionState::Idle {
            if obj.transform == obj.rest {
                return;
            }
            self.state = InteractionState::Returning;
        }
        if !self.easing {
            self.easing = true;
            debug!("easing back to rest");
            events.push(InteractionEvent::ReturnStarted);
        }

        let rate = self.tuning.returning.curve.rate(elapsed - delay);
        obj.transform = integrator::ease_toward(&obj.transform, &obj.rest, rate);

        if obj.transform.distance_to(&obj.rest) < self.tuning.returning.epsilon {
            obj.transform = obj.rest;
            self.state = InteractionState::Idle;
            self.easing = false;
            self.last_interaction_ms = Some(tick.now_ms);
            info!("back at rest");
            events.push(InteractionEvent::Settled);
        }
    }

    fn step_flight(&mut self, tick: &FrameTick, events: &mut Vec<InteractionEvent>) {
        let (Some(obj), Some(flight)) = (self.object.as_mut(), self.flight.as_mut()) else {
            self.state = InteractionState::Idle;
            return;
        };
        match flight.step(&mut obj.transform, tick.dt, &self.tuning.throw) {
            ThrowStep::Flying => {}
            ThrowStep::Bounced => events.push(InteractionEvent::Bounced),
            ThrowStep::Stopped(reason) => {
                info!("throw ended: {reason:?}");
                self.flight = None;
                self.state = InteractionState::Idle;
                self.last_interaction_ms = Some(tick.now_ms);
                events.push(InteractionEvent::ThrowStopped { reason });
            }
        }
    }
}
