//! Recorded landmark streams: JSON lines in, JSON lines out.
//!
//! Each input line is either a [`HandFrame`] or a command object carrying a
//! `"cmd"` field (preset, marker, resize, place, not_ready, detect_error).

use glam::Vec3;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{BufRead, Write},
    rc::Rc,
};
use thiserror::Error;

use crate::animation::{MarkerEvent, Preset};
use crate::clock::ManualClock;
use crate::geometry::{ObjectTransform, Viewport};
use crate::interaction::InteractionEvent;
use crate::landmarks::{DetectError, HandFrame, LandmarkSource};
use crate::session::{RenderFrame, RenderSink, Session};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame {frame}: {source}")]
    Present {
        frame: usize,
        #[source]
        source: anyhow::Error,
    },
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ReplayCommand {
    Preset { name: Preset },
    Marker { event: MarkerEvent },
    Resize { width: f32, height: f32 },
    Place {
        position: Vec3,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    /// A tick where the camera had no new frame.
    NotReady,
    /// A tick where the detector failed.
    DetectError { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayLine {
    Frame(HandFrame),
    Command(ReplayCommand),
}

pub fn parse_line(line: &str) -> Result<ReplayLine, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("cmd").is_some() {
        serde_json::from_value(value).map(ReplayLine::Command)
    } else {
        serde_json::from_value(value).map(ReplayLine::Frame)
    }
}

/// Hand frames waiting to be picked up by the session, shared with a
/// [`QueueSource`].
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    inner: Rc<RefCell<VecDeque<Result<HandFrame, DetectError>>>>,
}

impl FrameQueue {
    pub fn push_frame(&self, frame: HandFrame) {
        self.inner.borrow_mut().push_back(Ok(frame));
    }

    pub fn push_error(&self, err: DetectError) {
        self.inner.borrow_mut().push_back(Err(err));
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn source(&self) -> QueueSource {
        QueueSource {
            queue: self.clone(),
        }
    }
}

pub struct QueueSource {
    queue: FrameQueue,
}

impl LandmarkSource for QueueSource {
    fn frame_ready(&self) -> bool {
        !self.queue.is_empty()
    }

    fn detect(&mut self, _timestamp_ms: f64) -> Result<HandFrame, DetectError> {
        self.queue
            .inner
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(DetectError::NotReady))
    }
}

/// Writes one JSON object per presented frame.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> RenderSink for JsonLinesSink<W> {
    fn present(&mut self, frame: &RenderFrame) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Clock follows each frame's `timestamp_ms`.
    Timestamps,
    /// Clock advances by a fixed step per tick.
    Fixed { frame_ms: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub lines: usize,
    pub frames: usize,
    pub grabs: usize,
    pub releases: usize,
    pub throws: usize,
    pub settled: usize,
    pub final_state: Option<&'static str>,
}

impl ReplaySummary {
    fn record(&mut self, frame: &RenderFrame) {
        self.frames += 1;
        for e in &frame.events {
            match e {
                InteractionEvent::GrabStarted { .. } => self.grabs += 1,
                InteractionEvent::Released { .. } => self.releases += 1,
                InteractionEvent::Thrown { .. } => self.throws += 1,
                InteractionEvent::Settled => self.settled += 1,
                _ => {}
            }
        }
        self.final_state = Some(frame.state.as_str());
    }
}

/// Applies side effects of a command; returns true if it also ticks.
pub fn apply_command<C: crate::clock::Clock>(
    session: &mut Session<C>,
    queue: &FrameQueue,
    cmd: ReplayCommand,
) -> bool {
    match cmd {
        ReplayCommand::Preset { name } => {
            session.apply_preset(name);
            false
        }
        ReplayCommand::Marker { event } => {
            session.on_marker(event);
            false
        }
        ReplayCommand::Resize { width, height } => {
            session.resize(Viewport { width, height });
            false
        }
        ReplayCommand::Place { position, scale } => {
            session.place(ObjectTransform::new(position, scale));
            false
        }
        ReplayCommand::NotReady => true,
        ReplayCommand::DetectError { message } => {
            queue.push_error(DetectError::Failed(message));
            true
        }
    }
}

/// Drives `session` through a recorded stream. The session's source must
/// be `queue.source()`.
pub fn run_replay<R: BufRead>(
    reader: R,
    session: &mut Session<ManualClock>,
    queue: &FrameQueue,
    pacing: Pacing,
) -> Result<ReplaySummary, ReplayError> {
    let mut summary = ReplaySummary::default();
    let mut step_ms = match pacing {
        Pacing::Fixed { frame_ms } => frame_ms,
        Pacing::Timestamps => 1000.0 / 30.0,
    };
    let mut last_ts: Option<f64> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        summary.lines += 1;

        let parsed = parse_line(trimmed).map_err(|source| ReplayError::Parse {
            line: idx + 1,
            source,
        })?;

        let ticks = match parsed {
            ReplayLine::Frame(frame) => {
                let clock = session.clock();
                match pacing {
                    Pacing::Timestamps => {
                        if let Some(prev) = last_ts {
                            if frame.timestamp_ms > prev {
                                step_ms = frame.timestamp_ms - prev;
                            }
                        }
                        last_ts = Some(frame.timestamp_ms);
                        clock.set(frame.timestamp_ms);
                    }
                    Pacing::Fixed { frame_ms } => clock.advance(frame_ms),
                }
                queue.push_frame(frame);
                true
            }
            ReplayLine::Command(cmd) => {
                debug!("line {}: {cmd:?}", idx + 1);
                let ticks = apply_command(session, queue, cmd);
                if ticks {
                    session.clock().advance(step_ms);
                    if let Some(ts) = last_ts.as_mut() {
                        *ts += step_ms;
                    }
                }
                ticks
            }
        };

        if ticks {
            let frame = session.tick().map_err(|source| ReplayError::Present {
                frame: summary.frames,
                source,
            })?;
            summary.record(&frame);
        }
    }

    info!(
        "replay done: {} frames, {} grabs, {} releases, {} throws",
        summary.frames, summary.grabs, summary.releases, summary.throws
    );
    Ok(summary)
}
