//! One viewer session: the per-frame loop tying the landmark source, the
//! classifier, the interaction controller and the animation deck to a
//! render sink.

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::animation::{AnimationDeck, MarkerEvent, ModelAnimation, Preset};
use crate::clock::{Clock, FrameClock};
use crate::config::Profile;
use crate::geometry::{self, CameraModel, LayoutConfig, ModelBounds, ObjectTransform, Viewport};
use crate::gestures::{GestureClassifier, HandObservation};
use crate::interaction::{FrameInput, InteractionController, InteractionEvent, InteractionState};
use crate::landmarks::{HandFrame, LandmarkSource};

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub timestamp_ms: f64,
    pub state: InteractionState,
    pub transform: Option<ObjectTransform>,
    pub indicator_visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<InteractionEvent>,
    pub animations: Vec<ModelAnimation>,
}

pub trait RenderSink {
    fn present(&mut self, frame: &RenderFrame) -> anyhow::Result<()>;
}

/// Sink that drops every frame.
pub struct NullSink;

impl RenderSink for NullSink {
    fn present(&mut self, _frame: &RenderFrame) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct Session<C: Clock> {
    frames: FrameClock<C>,
    source: Option<Box<dyn LandmarkSource>>,
    classifier: GestureClassifier,
    controller: InteractionController,
    camera: CameraModel,
    layout: LayoutConfig,
    bounds: ModelBounds,
    deck: AnimationDeck,
    sink: Box<dyn RenderSink>,
}

impl<C: Clock> Session<C> {
    /// Sets up the scene at its rest pose. No hand source is attached yet.
    pub fn new(profile: &Profile, clock: C, sink: Box<dyn RenderSink>) -> Self {
        let frames = FrameClock::new(clock);
        let now = frames.clock().now_ms();

        let camera = CameraModel::new(profile.camera.fov_y_deg, profile.camera.viewport);
        let bounds = profile.scene.bounds();
        let layout = profile.layout.clone();
        let rest = geometry::layout_rest_pose(&camera, &bounds, &layout);

        let mut controller = InteractionController::new(profile.to_tuning());
        controller.attach(bounds, rest, now);

        info!(
            "session ready with profile '{}' (rest z={:.2}, scale={:.2})",
            profile.display_name(),
            rest.position.z,
            rest.scale
        );

        Self {
            frames,
            source: None,
            classifier: GestureClassifier::new(profile.gesture.thresholds.clone()),
            controller,
            camera,
            layout,
            bounds,
            deck: AnimationDeck::load(profile.animation.clone(), &profile.scene.clip_lists()),
            sink,
        }
    }

    /// Attaches hand tracking. A failed initialization leaves the session
    /// running without interaction.
    pub fn attach_source<E: std::fmt::Display>(&mut self, source: Result<Box<dyn LandmarkSource>, E>) {
        match source {
            Ok(s) => self.source = Some(s),
            Err(e) => {
                warn!("hand tracking unavailable, continuing without interaction: {e}");
                self.source = None;
            }
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn deck(&self) -> &AnimationDeck {
        &self.deck
    }

    pub fn clock(&self) -> &C {
        self.frames.clock()
    }

    pub fn tick(&mut self) -> anyhow::Result<RenderFrame> {
        let tick = self.frames.tick();
        self.deck.advance(tick.dt);

        let mut events = Vec::new();
        let mut skip_interaction = false;
        let mut detected: Option<HandFrame> = None;

        match self.source.as_mut() {
            Some(source) if source.frame_ready() => match source.detect(tick.now_ms) {
                Ok(frame) => detected = Some(frame),
                Err(e) => debug!("hand detection failed: {e}"),
            },
            Some(_) => {
                trace!("camera frame not ready at {:.0}ms", tick.now_ms);
                skip_interaction = true;
            }
            None => {}
        }

        if !skip_interaction {
            let hand = detected.as_ref().and_then(|f| f.primary());
            let observation = match self.source {
                Some(_) => self.classifier.classify(hand),
                None => HandObservation::Absent,
            };
            let out = self.controller.update(FrameInput {
                tick,
                observation,
                hand,
                camera: &self.camera,
            });
            events = out.events;
        }

        let frame = RenderFrame {
            timestamp_ms: tick.now_ms,
            state: self.controller.state(),
            transform: self.controller.transform(),
            indicator_visible: self.controller.indicator_visible(),
            events,
            animations: self.deck.snapshot(),
        };
        self.sink.present(&frame)?;
        Ok(frame)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.camera.set_viewport(viewport);
        self.relayout();
        debug!("resized to {}x{}", viewport.width, viewport.height);
    }

    fn relayout(&mut self) {
        let rest = geometry::layout_rest_pose(&self.camera, &self.bounds, &self.layout);
        let now = self.frames.clock().now_ms();
        self.controller.set_rest_pose(rest, now);
    }

    /// Swaps in a reloaded profile. The current viewport and a held
    /// object are kept.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.classifier.set_thresholds(profile.gesture.thresholds.clone());
        self.controller.set_tuning(profile.to_tuning());
        self.camera.fov_y_deg = profile.camera.fov_y_deg;
        self.layout = profile.layout.clone();
        self.bounds = profile.scene.bounds();
        self.controller.set_bounds(self.bounds);
        self.deck = AnimationDeck::load(profile.animation.clone(), &profile.scene.clip_lists());
        self.relayout();
        info!("applied profile '{}'", profile.display_name());
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        self.deck.apply_preset(preset);
    }

    pub fn on_marker(&mut self, event: MarkerEvent) {
        info!("marker {event:?}");
        self.deck.on_marker(event);
    }

    pub fn place(&mut self, transform: ObjectTransform) {
        let now = self.frames.clock().now_ms();
        self.controller.place(transform, now);
    }
}
