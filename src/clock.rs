//! Frame timing. The delta is taken once per frame and shared by every
//! consumer of that frame.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait Clock {
    fn now_ms(&self) -> f64;
}

#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock advanced by hand; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub now_ms: f64,
    /// Seconds since the previous tick; zero on the first one.
    pub dt: f32,
}

#[derive(Debug)]
pub struct FrameClock<C: Clock> {
    clock: C,
    last_ms: Option<f64>,
    max_dt: f32,
}

impl<C: Clock> FrameClock<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_ms: None,
            max_dt: 0.1,
        }
    }

    /// Upper bound on the per-frame delta, in seconds.
    pub fn with_max_dt(mut self, max_dt: f32) -> Self {
        self.max_dt = max_dt;
        self
    }

    pub fn tick(&mut self) -> FrameTick {
        let now_ms = self.clock.now_ms();
        let dt = match self.last_ms {
            Some(last) => (((now_ms - last) / 1000.0) as f32).clamp(0.0, self.max_dt),
            None => 0.0,
        };
        self.last_ms = Some(now_ms);
        FrameTick { now_ms, dt }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_no_delta() {
        let clock = ManualClock::new(500.0);
        let mut frames = FrameClock::new(clock.clone());
        assert_eq!(frames.tick(), FrameTick { now_ms: 500.0, dt: 0.0 });
        clock.advance(16.0);
        let t = frames.tick();
        assert_eq!(t.now_ms, 516.0);
        assert!((t.dt - 0.016).abs() < 1e-6);
    }

    #[test]
    fn delta_is_capped_and_never_negative() {
        let clock = ManualClock::new(0.0);
        let mut frames = FrameClock::new(clock.clone()).with_max_dt(0.05);
        frames.tick();
        clock.advance(1000.0);
        assert_eq!(frames.tick().dt, 0.05);
        clock.set(900.0);
        assert_eq!(frames.tick().dt, 0.0);
    }
}
