use std::time::{Duration, Instant};

/// How a [`FrameClock`] produces frame deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockMode {
    /// Wall-clock deltas between ticks.
    Realtime,
    /// A constant step regardless of wall time (offline rendering, tests).
    Fixed { step: f32 },
}

/// Produces the `dt` handed to [`crate::Renderer::render`].
#[derive(Debug, Clone)]
pub struct FrameClock {
    mode: ClockMode,
    last: Option<Instant>,
    max_delta: f32,
}

/// Upper bound on realtime deltas so a stalled frame does not fling the camera.
const DEFAULT_MAX_DELTA: f32 = 0.25;

/// Longest wait between paced frames, however low the requested rate.
const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(60);

impl FrameClock {
    pub fn realtime() -> Self {
        Self {
            mode: ClockMode::Realtime,
            last: None,
            max_delta: DEFAULT_MAX_DELTA,
        }
    }

    /// Fixed-step clock at `fps` frames per second (falls back to 60 when invalid).
    pub fn fixed(fps: f32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
        Self {
            mode: ClockMode::Fixed { step: 1.0 / fps },
            last: None,
            max_delta: DEFAULT_MAX_DELTA,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Seconds since the previous tick; the first realtime tick yields zero.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        match self.mode {
            ClockMode::Fixed { step } => step,
            ClockMode::Realtime => {
                let delta = self
                    .last
                    .map(|last| now.saturating_duration_since(last).as_secs_f32())
                    .unwrap_or(0.0);
                self.last = Some(now);
                delta.min(self.max_delta)
            }
        }
    }

    /// Time until the next frame is due at `fps`, given the previous frame start.
    pub fn frame_budget(fps: f32, frame_start: Instant, now: Instant) -> Option<Duration> {
        if !(fps.is_finite() && fps > 0.0) {
            return None;
        }
        let interval = Duration::try_from_secs_f32(1.0 / fps)
            .map_or(MAX_FRAME_INTERVAL, |interval| interval.min(MAX_FRAME_INTERVAL));
        let elapsed = now.saturating_duration_since(frame_start);
        interval.checked_sub(elapsed)
    }
}
