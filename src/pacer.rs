//! Frame pacing.
//!
//! Each frame's deadline is its own start time plus one frame duration. There
//! is no catch-up: a frame that overruns simply starts the next one late.

use crate::error::PlaybackError;
use std::thread;
use std::time::{Duration, Instant};

/// Number of overruns logged at `warn` before going quiet.
const LOGGED_OVERRUNS: u64 = 5;

/// Target frames per second, validated to be positive, finite, and slow
/// enough at the low end that one frame still fits in a [`Duration`].
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct FrameRate {
    fps: f64,
    frame_duration: Duration,
}

impl FrameRate {
    pub fn new(fps: f64) -> Result<Self, PlaybackError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PlaybackError::InvalidFrameRate(fps));
        }
        let frame_duration = Duration::try_from_secs_f64(1.0 / fps)
            .map_err(|_| PlaybackError::InvalidFrameRate(fps))?;
        Ok(Self {
            fps,
            frame_duration,
        })
    }

    pub fn fps(self) -> f64 {
        self.fps
    }

    /// Time budget for one frame, `1 / fps`.
    pub fn frame_duration(self) -> Duration {
        self.frame_duration
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            fps: 30.0,
            frame_duration: Duration::from_secs_f64(1.0 / 30.0),
        }
    }
}

impl TryFrom<f64> for FrameRate {
    type Error = PlaybackError;

    fn try_from(fps: f64) -> Result<Self, Self::Error> {
        Self::new(fps)
    }
}

/// What a pacer wait ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaceOutcome {
    /// Slept for the residual frame time.
    Waited(Duration),
    /// Rendering already used up the budget, by this much. Returned without
    /// sleeping.
    Overrun(Duration),
}

/// Time left in a frame budget, or how far past it we are.
pub fn residual(elapsed: Duration, frame_duration: Duration) -> PaceOutcome {
    match frame_duration.checked_sub(elapsed) {
        Some(remaining) if !remaining.is_zero() => PaceOutcome::Waited(remaining),
        _ => PaceOutcome::Overrun(elapsed.saturating_sub(frame_duration)),
    }
}

/// Something that blocks until the next frame boundary.
pub trait Pacer {
    fn wait_for_next_frame(&mut self, frame_started_at: Instant, frame_duration: Duration)
    -> PaceOutcome;
}

/// Pacer that sleeps the calling thread.
#[derive(Debug, Default)]
pub struct SleepPacer {
    overruns: u64,
}

impl SleepPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames that missed their deadline so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

impl Pacer for SleepPacer {
    fn wait_for_next_frame(
        &mut self,
        frame_started_at: Instant,
        frame_duration: Duration,
    ) -> PaceOutcome {
        let outcome = residual(frame_started_at.elapsed(), frame_duration);
        match outcome {
            PaceOutcome::Waited(remaining) => thread::sleep(remaining),
            PaceOutcome::Overrun(by) => {
                self.overruns += 1;
                if self.overruns <= LOGGED_OVERRUNS {
                    tracing::warn!(
                        "Frame overran its {}ms budget by {}µs",
                        frame_duration.as_millis(),
                        by.as_micros()
                    );
                } else if self.overruns == LOGGED_OVERRUNS + 1 {
                    tracing::warn!("Further frame overruns will not be logged");
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0)]
    #[case(-30.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(1e-20)]
    #[case(f64::MIN_POSITIVE)]
    fn frame_rate_rejects_non_positive(#[case] fps: f64) {
        assert!(matches!(
            FrameRate::new(fps),
            Err(PlaybackError::InvalidFrameRate(_))
        ));
    }

    #[rstest]
    #[case(30.0, Duration::from_secs_f64(1.0 / 30.0))]
    #[case(1.0, Duration::from_secs(1))]
    #[case(0.5, Duration::from_secs(2))]
    fn frame_duration_is_inverse_rate(#[case] fps: f64, #[case] expected: Duration) {
        assert_eq!(FrameRate::new(fps).unwrap().frame_duration(), expected);
    }

    #[test]
    fn residual_waits_for_remaining_time() {
        let outcome = residual(Duration::from_millis(10), Duration::from_millis(33));
        assert_eq!(outcome, PaceOutcome::Waited(Duration::from_millis(23)));
    }

    #[test]
    fn residual_never_goes_negative() {
        let outcome = residual(Duration::from_millis(50), Duration::from_millis(33));
        assert_eq!(outcome, PaceOutcome::Overrun(Duration::from_millis(17)));
    }

    #[test]
    fn residual_on_exact_budget_is_zero_overrun() {
        let outcome = residual(Duration::from_millis(33), Duration::from_millis(33));
        assert_eq!(outcome, PaceOutcome::Overrun(Duration::ZERO));
    }

    #[test]
    fn sleep_pacer_returns_immediately_on_overrun() {
        let mut pacer = SleepPacer::new();
        let started = Instant::now() - Duration::from_millis(100);

        let before = Instant::now();
        let outcome = pacer.wait_for_next_frame(started, Duration::from_millis(10));

        assert!(matches!(outcome, PaceOutcome::Overrun(_)));
        assert!(before.elapsed() < Duration::from_millis(50));
        assert_eq!(pacer.overruns(), 1);
    }

    #[test]
    fn sleep_pacer_sleeps_until_deadline() {
        let mut pacer = SleepPacer::new();
        let started = Instant::now();

        pacer.wait_for_next_frame(started, Duration::from_millis(20));

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(pacer.overruns(), 0);
    }
}
