//! Playback engine: renders patterns onto the frame buffer at a fixed rate.
//!
//! One engine drives one device. Per frame it maps every logical pixel to its
//! strip index, shapes its brightness, writes the cell, commits the whole
//! buffer once, then waits out the rest of the frame budget. A playlist loops
//! forever, blanking the display before each pattern, until the
//! [`CancelToken`] is set. The token is checked once per frame boundary,
//! right after the pacer wait.

use crate::brightness::{MaxBrightness, brightness};
use crate::error::PlaybackError;
use crate::layout::SerpentineLayout;
use crate::pacer::{FrameRate, Pacer};
use crate::pattern::Pattern;
use crate::sink::{DeviceSink, FrameBuffer};
use crate::{CancelToken, DisplayGeometry, Pixel};
use serde::Serialize;
use std::time::Instant;

/// Validated playback settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackConfig {
    pub layout: SerpentineLayout,
    pub max_brightness: MaxBrightness,
    pub frame_rate: FrameRate,
}

impl PlaybackConfig {
    pub fn geometry(&self) -> DisplayGeometry {
        self.layout.geometry()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Where playback currently is. Reset every time playback starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackSession {
    pub pattern_index: usize,
    pub frame_index: usize,
    pub frame_started_at: Instant,
}

impl PlaybackSession {
    fn new() -> Self {
        Self {
            pattern_index: 0,
            frame_index: 0,
            frame_started_at: Instant::now(),
        }
    }
}

/// Totals for one call to [`PlaybackEngine::start`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub frames_rendered: u64,
    pub patterns_played: u64,
    pub loops: u64,
}

/// How a single pattern render ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    Cancelled,
}

pub struct PlaybackEngine<S, P> {
    config: PlaybackConfig,
    buffer: FrameBuffer<S>,
    pacer: P,
    state: PlaybackState,
    session: Option<PlaybackSession>,
}

impl<S: DeviceSink, P: Pacer> PlaybackEngine<S, P> {
    /// Allocate the frame buffer for the configured geometry and bind it to `sink`.
    pub fn new(config: PlaybackConfig, sink: S, pacer: P) -> Self {
        let len = config.geometry().pixel_count();
        tracing::debug!(
            "Playback engine on {} sink: {} LEDs, {:?}",
            sink.name(),
            len,
            config.layout.parity()
        );
        Self {
            config,
            buffer: FrameBuffer::new(len, sink),
            pacer,
            state: PlaybackState::Idle,
            session: None,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The most recent session, if playback has ever started.
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn buffer(&self) -> &FrameBuffer<S> {
        &self.buffer
    }

    pub fn sink(&self) -> &S {
        self.buffer.sink()
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn set_max_brightness(&mut self, max_brightness: MaxBrightness) {
        self.config.max_brightness = max_brightness;
    }

    pub fn set_frame_rate(&mut self, frame_rate: FrameRate) {
        self.config.frame_rate = frame_rate;
    }

    /// Fill the display with one colour and commit it.
    pub fn fill(&mut self, pixel: Pixel) -> Result<(), PlaybackError> {
        self.buffer.fill(pixel);
        self.buffer.commit()
    }

    /// Turn every LED off.
    pub fn clear(&mut self) -> Result<(), PlaybackError> {
        self.fill(Pixel::BLACK)
    }

    /// Loop over `patterns` until `cancel` is set.
    pub fn start(
        &mut self,
        patterns: &[Pattern],
        cancel: &CancelToken,
    ) -> Result<PlaybackSummary, PlaybackError> {
        self.start_observed(patterns, cancel, |_| {})
    }

    /// Like [`Self::start`], calling `observer` after every committed frame.
    pub fn start_observed<F>(
        &mut self,
        patterns: &[Pattern],
        cancel: &CancelToken,
        mut observer: F,
    ) -> Result<PlaybackSummary, PlaybackError>
    where
        F: FnMut(&PlaybackSession),
    {
        if patterns.is_empty() {
            return Err(PlaybackError::EmptyPlaylist);
        }
        for pattern in patterns {
            self.check_geometry(pattern)?;
        }

        tracing::info!(
            "Starting playback: {} patterns at {} fps, max brightness {}",
            patterns.len(),
            self.config.frame_rate.fps(),
            self.config.max_brightness.get()
        );

        self.state = PlaybackState::Playing;
        self.session = Some(PlaybackSession::new());
        let result = self.run_playlist(patterns, cancel, &mut observer);
        self.state = PlaybackState::Idle;

        match &result {
            Ok(summary) => tracing::info!(
                "Playback stopped after {} frames ({} full loops)",
                summary.frames_rendered,
                summary.loops
            ),
            Err(e) => tracing::error!("Playback failed: {}", e),
        }
        result
    }

    fn run_playlist(
        &mut self,
        patterns: &[Pattern],
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&PlaybackSession),
    ) -> Result<PlaybackSummary, PlaybackError> {
        let frame_rate = self.config.frame_rate;
        let mut summary = PlaybackSummary::default();

        loop {
            for (pattern_index, pattern) in patterns.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Ok(summary);
                }

                self.clear()?;
                if let Some(session) = self.session.as_mut() {
                    session.pattern_index = pattern_index;
                }
                tracing::debug!("Pattern {} ({} frames)", pattern_index, pattern.len());

                let outcome =
                    self.render_frames(pattern, frame_rate, cancel, observer, &mut summary)?;
                if outcome == RenderOutcome::Cancelled {
                    return Ok(summary);
                }
                summary.patterns_played += 1;
            }
            summary.loops += 1;
        }
    }

    /// Render every frame of `pattern` once at `frame_rate`.
    pub fn render_pattern(
        &mut self,
        pattern: &Pattern,
        frame_rate: FrameRate,
    ) -> Result<(), PlaybackError> {
        self.check_geometry(pattern)?;
        let mut summary = PlaybackSummary::default();
        self.render_frames(
            pattern,
            frame_rate,
            &CancelToken::new(),
            &mut |_: &PlaybackSession| {},
            &mut summary,
        )?;
        Ok(())
    }

    fn render_frames(
        &mut self,
        pattern: &Pattern,
        frame_rate: FrameRate,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&PlaybackSession),
        summary: &mut PlaybackSummary,
    ) -> Result<RenderOutcome, PlaybackError> {
        let frame_duration = frame_rate.frame_duration();
        let layout = self.config.layout;
        let max_brightness = self.config.max_brightness;

        for (frame_index, frame) in pattern.frames().iter().enumerate() {
            let started = Instant::now();

            for (x, y, pixel) in frame.enumerate_pixels() {
                let index = layout.map(x, y)?;
                self.buffer.set(index, pixel, brightness(pixel, max_brightness))?;
            }
            self.buffer.commit()?;
            summary.frames_rendered += 1;

            let session = self.session.get_or_insert_with(PlaybackSession::new);
            session.frame_index = frame_index;
            session.frame_started_at = started;
            observer(&*session);

            self.pacer.wait_for_next_frame(started, frame_duration);
            if cancel.is_cancelled() {
                return Ok(RenderOutcome::Cancelled);
            }
        }

        Ok(RenderOutcome::Completed)
    }

    fn check_geometry(&self, pattern: &Pattern) -> Result<(), PlaybackError> {
        let expected = self.config.geometry();
        let actual = pattern.geometry();
        if actual != expected {
            return Err(PlaybackError::GeometryMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn into_sink(self) -> S {
        self.buffer.into_sink()
    }
}
