use glam::Vec3;
use pinchgrab::clock::ManualClock;
use pinchgrab::config::parse_profile;
use pinchgrab::geometry::ObjectTransform;
use pinchgrab::interaction::{InteractionEvent, InteractionState, ReleaseReason};
use pinchgrab::landmarks::{DetectError, HandFrame, Joint, LANDMARK_COUNT, Landmark, LandmarkSet, LandmarkSource};
use pinchgrab::replay::FrameQueue;
use pinchgrab::session::{NullSink, RenderFrame, Session};

// ── Builders ──

/// Hand centered at `x`, `size` wrist-to-knuckle, thumb and index `pinch` apart.
fn hand(pinch: f32, size: f32, x: f32) -> LandmarkSet {
    let mut pts = [Landmark::new(x, 0.5, 0.0); LANDMARK_COUNT];
    pts[Joint::Wrist.index()] = Landmark::new(x, 0.5 + size, 0.0);
    pts[Joint::ThumbTip.index()] = Landmark::new(x - pinch / 2.0, 0.45, 0.0);
    pts[Joint::IndexTip.index()] = Landmark::new(x + pinch / 2.0, 0.45, 0.0);
    LandmarkSet::new(pts)
}

fn pinch_at(pinch: f32) -> LandmarkSet {
    hand(pinch, 0.15, 0.5)
}

struct Viewer {
    session: Session<ManualClock>,
    clock: ManualClock,
    queue: FrameQueue,
}

impl Viewer {
    fn new(extra: &str) -> Self {
        let text = format!("[meta]\nname = \"scenario\"\n{extra}\n");
        let profile = parse_profile(&text, "scenario").unwrap();
        let clock = ManualClock::new(1000.0);
        let mut session = Session::new(&profile, clock.clone(), Box::new(NullSink));
        let queue = FrameQueue::default();
        let source: Box<dyn LandmarkSource> = Box::new(queue.source());
        session.attach_source::<DetectError>(Ok(source));
        Self {
            session,
            clock,
            queue,
        }
    }

    fn step(&mut self, hand: Option<LandmarkSet>) -> RenderFrame {
        self.clock.advance(16.0);
        self.queue.push_frame(HandFrame {
            timestamp_ms: 0.0,
            hands: hand.into_iter().collect(),
        });
        self.session.tick().unwrap()
    }

    fn rest(&self) -> ObjectTransform {
        self.session.controller().rest_pose().unwrap()
    }
}

fn releases(frame: &RenderFrame) -> usize {
    frame
        .events
        .iter()
        .filter(|e| matches!(e, InteractionEvent::Released { .. }))
        .count()
}

// ── Scenarios ──

#[test]
fn test_pinch_sequence_grabs_and_releases() {
    let mut v = Viewer::new("");
    let states: Vec<_> = [0.15, 0.15, 0.05, 0.05, 0.05, 0.15]
        .into_iter()
        .map(|p| v.step(Some(pinch_at(p))).state)
        .collect();
    assert_eq!(
        states,
        vec![
            InteractionState::Idle,
            InteractionState::Idle,
            InteractionState::Grabbed,
            InteractionState::Grabbed,
            InteractionState::Grabbed,
            InteractionState::Returning,
        ]
    );
}

#[test]
fn test_leaving_the_view_forces_release() {
    let mut v = Viewer::new("");
    assert_eq!(v.step(Some(pinch_at(0.05))).state, InteractionState::Grabbed);

    let mut pts = *pinch_at(0.05).points();
    pts[Joint::PinkyTip.index()] = Landmark::new(0.995, 0.5, 0.0);
    let f = v.step(Some(LandmarkSet::new(pts)));

    assert!(f.events.contains(&InteractionEvent::Released {
        reason: ReleaseReason::OutOfView
    }));
    assert!(!f.indicator_visible);
    assert_eq!(f.state, InteractionState::Idle);
    assert_eq!(f.transform, Some(v.rest()));
}

#[test]
fn test_fast_release_flies_under_gravity() {
    let mut v = Viewer::new("[throw]\nenabled = true\ngravity = -3.0");
    v.step(Some(hand(0.05, 0.15, 0.5)));
    // ~0.5 units/s sideways at 16 ms per frame
    v.step(Some(hand(0.05, 0.15, 0.504)));
    let f = v.step(Some(hand(0.15, 0.15, 0.504)));
    assert_eq!(f.state, InteractionState::Thrown);

    let velocity = f
        .events
        .iter()
        .find_map(|e| match e {
            InteractionEvent::Thrown { velocity } => Some(*velocity),
            _ => None,
        })
        .unwrap();
    assert!(velocity.length() > 0.3 && velocity.length() < 1.0);

    let p0 = f.transform.unwrap().position;
    let p1 = v.step(None).transform.unwrap().position;
    let p2 = v.step(None).transform.unwrap().position;
    let dt = 0.016;
    // position moves with the pre-gravity velocity, then vy drops by g*dt
    assert!(((p1.y - p0.y) / dt - velocity.y).abs() < 1e-3);
    let dvy = (p2.y - p1.y) / dt - (p1.y - p0.y) / dt;
    assert!((dvy - (-3.0 * dt)).abs() < 1e-3);
    assert!(p2.x > p1.x && p1.x > p0.x);
}

#[test]
fn test_idle_displacement_returns_after_delay() {
    let mut v = Viewer::new("");
    v.step(None);
    let rest = v.rest();
    let displaced = ObjectTransform::new(rest.position + Vec3::X, rest.scale);
    v.session.place(displaced);

    v.clock.advance(1900.0);
    let f = v.step(None);
    assert_eq!(f.state, InteractionState::Idle);
    assert_eq!(f.transform, Some(displaced));

    v.clock.advance(85.0);
    let f = v.step(None);
    assert_eq!(f.state, InteractionState::Returning);
    assert!(f.events.contains(&InteractionEvent::ReturnStarted));
    assert!(f.transform.unwrap().distance_to(&rest) < 1.0);
}

// ── Properties ──

#[test]
fn test_implausible_hand_sizes_never_grab() {
    for size in [0.0, 0.02, 0.045, 0.41, 0.45] {
        let mut v = Viewer::new("");
        for _ in 0..20 {
            let f = v.step(Some(hand(0.01, size, 0.5)));
            assert_eq!(f.state, InteractionState::Idle, "size {size}");
        }
    }
}

#[test]
fn test_no_regrab_inside_cooldown() {
    let mut v = Viewer::new("");
    v.step(Some(pinch_at(0.05)));
    v.step(Some(pinch_at(0.15)));
    // 60 frames of 16 ms stay inside the 1000 ms window
    for i in 0..60 {
        let p = if i % 2 == 0 { 0.05 } else { 0.15 };
        assert_ne!(v.step(Some(pinch_at(p))).state, InteractionState::Grabbed);
    }
    v.clock.advance(100.0);
    assert_eq!(v.step(Some(pinch_at(0.05))).state, InteractionState::Grabbed);
}

#[test]
fn test_lost_hand_releases_exactly_once() {
    let mut v = Viewer::new("");
    v.step(Some(pinch_at(0.05)));
    let total: usize = (0..40).map(|_| releases(&v.step(None))).sum();
    assert_eq!(total, 1);
}

#[test]
fn test_return_converges_monotonically_to_rest() {
    let mut v = Viewer::new("");
    v.step(Some(pinch_at(0.05)));
    v.step(Some(hand(0.05, 0.15, 0.7)));
    v.step(Some(hand(0.15, 0.15, 0.7)));
    let rest = v.rest();

    v.clock.advance(2000.0);
    let mut last = f32::INFINITY;
    for _ in 0..300 {
        let f = v.step(None);
        let t = f.transform.unwrap();
        let d = t.distance_to(&rest);
        assert!(d <= last);
        last = d;
        if f.state == InteractionState::Idle {
            assert_eq!(t, rest);
            return;
        }
    }
    panic!("never settled; last distance {last}");
}
