use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::{RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use crate::clock::{Clock, SystemClock};
use crate::config::ProfileStore;
use crate::landmarks::{DetectError, HandFrame, LandmarkSource};
use crate::replay::{self, FrameQueue, JsonLinesSink, ReplayLine};
use crate::session::Session;

enum LiveMsg {
    Line(String),
    InputClosed,
    Reload,
    Shutdown,
}

/// Idle ticks keep animations moving while no frame arrives.
const IDLE_TICK: Duration = Duration::from_millis(33);

/// Input silence longer than this counts as no hand in view.
const STALE_INPUT_MS: f64 = 250.0;

/// Queues an empty frame once the producer has been quiet for too long, so
/// a held object is released and a free one keeps moving. Shorter gaps stay
/// "not ready" and leave a grab alone.
fn feed_silence(queue: &FrameQueue, now_ms: f64, last_frame_ms: f64) {
    if queue.is_empty() && now_ms - last_frame_ms > STALE_INPUT_MS {
        queue.push_frame(HandFrame::empty(now_ms));
    }
}

pub fn run_live(mut store: ProfileStore, profile: Option<String>, watch: bool) -> Result<()> {
    let name = profile.unwrap_or_else(|| store.active_name.clone());
    let mut current = store.load_named(&name)?;
    info!("live: profile '{name}'");

    let (tx, rx) = mpsc::channel::<LiveMsg>();
    spawn_stdin_reader(tx.clone());
    spawn_signal_listener(tx.clone())?;
    let _watcher = if watch {
        Some(watch_profile(store.profile_path(&name), tx.clone())?)
    } else {
        None
    };
    drop(tx);

    let queue = FrameQueue::default();
    let sink = JsonLinesSink::new(io::stdout());
    let mut session = Session::new(&current, SystemClock::new(), Box::new(sink));
    let source: Box<dyn LandmarkSource> = Box::new(queue.source());
    session.attach_source::<DetectError>(Ok(source));
    let mut last_frame_ms = session.clock().now_ms();

    loop {
        let ticks = match rx.recv_timeout(IDLE_TICK) {
            Ok(LiveMsg::Line(line)) => match replay::parse_line(line.trim()) {
                Ok(ReplayLine::Frame(frame)) => {
                    queue.push_frame(frame);
                    last_frame_ms = session.clock().now_ms();
                    true
                }
                Ok(ReplayLine::Command(cmd)) => replay::apply_command(&mut session, &queue, cmd),
                Err(e) => {
                    warn!("skipping malformed input line: {e}");
                    false
                }
            },
            Ok(LiveMsg::Reload) => {
                match store.load_named(&name) {
                    Ok(p) => {
                        current = p;
                        session.apply_profile(&current);
                        info!("profile reloaded");
                    }
                    Err(e) => error!("reload failed, keeping last good profile: {e:#}"),
                }
                false
            }
            Ok(LiveMsg::InputClosed) => {
                info!("input closed");
                return Ok(());
            }
            Ok(LiveMsg::Shutdown) => {
                info!("shutting down");
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {
                feed_silence(&queue, session.clock().now_ms(), last_frame_ms);
                true
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        if ticks {
            session.tick()?;
        }
    }
}

fn spawn_stdin_reader(tx: Sender<LiveMsg>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) if l.trim().is_empty() => continue,
                Ok(l) => {
                    if tx.send(LiveMsg::Line(l)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("stdin read failed: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(LiveMsg::InputClosed);
    });
}

fn spawn_signal_listener(tx: Sender<LiveMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            debug!("received signal {sig}");
            let _ = tx.send(LiveMsg::Shutdown);
        }
    });
    Ok(())
}

/// Watches the profile's directory and filters events by file name.
fn watch_profile(path: PathBuf, tx: Sender<LiveMsg>) -> Result<notify::RecommendedWatcher> {
    let dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .context("profile path has no parent directory")?;
    let file_name = path.file_name().map(|f| f.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(ev) => ev,
            Err(e) => {
                warn!("watch error: {e}");
                return;
            }
        };
        if !(event.kind.is_modify() || event.kind.is_create()) {
            return;
        }
        let touches_profile = event
            .paths
            .iter()
            .any(|p| p.file_name().map(|f| f.to_os_string()) == file_name);
        if touches_profile {
            let _ = tx.send(LiveMsg::Reload);
        }
    })?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    info!("watching {} for changes", path.display());
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::parse_profile;
    use crate::interaction::{InteractionEvent, InteractionState, ReleaseReason};
    use crate::landmarks::{Joint, Landmark, LandmarkSet, LANDMARK_COUNT};

    // The library's `landmarks::tests` fixtures are `cfg(test)`-gated and not
    // visible from the binary crate's tests, so mirror them here.
    fn open_hand() -> LandmarkSet {
        let mut pts = [Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
        pts[Joint::Wrist.index()] = Landmark::new(0.5, 0.65, 0.0);
        pts[Joint::MiddleMcp.index()] = Landmark::new(0.5, 0.5, 0.0);
        pts[Joint::ThumbTip.index()] = Landmark::new(0.4, 0.45, 0.0);
        pts[Joint::IndexTip.index()] = Landmark::new(0.6, 0.45, 0.0);
        LandmarkSet::new(pts)
    }

    fn hand_with_pinch(pinch: f32) -> LandmarkSet {
        let mut pts = *open_hand().points();
        pts[Joint::ThumbTip.index()] = Landmark::new(0.5 - pinch / 2.0, 0.45, 0.0);
        pts[Joint::IndexTip.index()] = Landmark::new(0.5 + pinch / 2.0, 0.45, 0.0);
        LandmarkSet::new(pts)
    }
    use crate::session::NullSink;

    struct Live {
        session: Session<ManualClock>,
        clock: ManualClock,
        queue: FrameQueue,
        last_frame_ms: f64,
    }

    impl Live {
        fn new() -> Self {
            let profile = parse_profile("[meta]\nname = \"live\"\n", "live").unwrap();
            let clock = ManualClock::new(0.0);
            let mut session = Session::new(&profile, clock.clone(), Box::new(NullSink));
            let queue = FrameQueue::default();
            let source: Box<dyn LandmarkSource> = Box::new(queue.source());
            session.attach_source::<DetectError>(Ok(source));
            Self {
                session,
                clock,
                queue,
                last_frame_ms: 0.0,
            }
        }

        fn frame(&mut self, pinch: f32) -> InteractionState {
            self.clock.advance(16.0);
            self.queue.push_frame(HandFrame {
                timestamp_ms: 0.0,
                hands: vec![hand_with_pinch(pinch)],
            });
            self.last_frame_ms = self.clock.now_ms();
            self.session.tick().unwrap().state
        }

        fn idle(&mut self) -> crate::session::RenderFrame {
            self.clock.advance(IDLE_TICK.as_millis() as f64);
            feed_silence(&self.queue, self.clock.now_ms(), self.last_frame_ms);
            self.session.tick().unwrap()
        }
    }

    #[test]
    fn short_silence_keeps_the_grab() {
        let mut live = Live::new();
        assert_eq!(live.frame(0.02), InteractionState::Grabbed);
        for _ in 0..7 {
            assert_eq!(live.idle().state, InteractionState::Grabbed);
        }
        assert_eq!(live.frame(0.02), InteractionState::Grabbed);
    }

    #[test]
    fn long_silence_releases_the_hand() {
        let mut live = Live::new();
        live.frame(0.02);
        let mut releases = Vec::new();
        for _ in 0..12 {
            releases.extend(live.idle().events);
        }
        assert_eq!(
            releases,
            vec![InteractionEvent::Released {
                reason: ReleaseReason::HandLost
            }]
        );
        assert_eq!(live.session.controller().state(), InteractionState::Idle);
    }

    #[test]
    fn released_object_returns_while_input_is_quiet() {
        let mut live = Live::new();
        live.frame(0.02);
        assert_eq!(live.frame(0.2), InteractionState::Returning);

        let mut started = false;
        for _ in 0..200 {
            let f = live.idle();
            started |= f.events.contains(&InteractionEvent::ReturnStarted);
            if f.events.contains(&InteractionEvent::Settled) {
                assert!(started);
                assert_eq!(f.transform, live.session.controller().rest_pose());
                return;
            }
        }
        panic!("object froze while input was quiet");
    }
}
