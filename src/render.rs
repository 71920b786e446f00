//! Render thread: owns the playback engine and processes commands via a channel.
//!
//! The device sink is created on this thread and never leaves it, so sinks
//! that wrap thread-unsafe C libraries are fine. The HTTP server talks to the
//! thread by sending [`RenderCommand`]s through an `mpsc` channel and reads
//! back a shared [`DisplayStatus`].
//!
//! While a playlist runs, the engine's per-frame observer polls the channel
//! with `try_recv()`. A new command is parked in `pending_cmd` and the
//! engine's cancel token is set, so playback stops at the next frame
//! boundary and the main loop handles the parked command instead of blocking
//! on `recv()`.

use crate::brightness::MaxBrightness;
use crate::engine::{PlaybackConfig, PlaybackEngine, PlaybackState};
use crate::error::SinkError;
use crate::pacer::{FrameRate, SleepPacer};
use crate::pattern::Pattern;
use crate::sink::DeviceSink;
use crate::{CancelToken, DisplayGeometry};
use serde::Serialize;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent from the HTTP server to the render thread.
pub enum RenderCommand {
    /// Replace whatever is playing with this playlist.
    Play {
        label: String,
        patterns: Arc<[Pattern]>,
        max_brightness: MaxBrightness,
        frame_rate: FrameRate,
    },
    /// Stop playback and leave the last frame on the display.
    Stop,
    /// Stop playback and turn every LED off.
    Clear,
}

// ── Status ───────────────────────────────────────────────────────────

/// Shared status that the HTTP server reads to report current state.
#[derive(Clone, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    /// Whether a playlist is running
    pub state: PlaybackState,
    /// Path of the current playlist, relative to the media dir
    pub playlist: Option<String>,
    /// Number of patterns in the current playlist
    pub pattern_count: Option<usize>,
    /// Index of the pattern being shown
    pub pattern_index: Option<usize>,
    /// Index of the frame being shown within that pattern
    pub frame_index: Option<usize>,
    /// Frames committed since the playlist started
    pub frames_rendered: u64,
    /// Brightness ceiling in use, in (0, 1]
    pub max_brightness: f64,
    /// Target frames per second
    pub frame_rate: f64,
    /// Display size
    pub geometry: DisplayGeometry,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            state: PlaybackState::Idle,
            playlist: None,
            pattern_count: None,
            pattern_index: None,
            frame_index: None,
            frames_rendered: 0,
            max_brightness: config.max_brightness.get(),
            frame_rate: config.frame_rate.fps(),
            geometry: config.geometry(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = PlaybackState::Idle;
        self.playlist = None;
        self.pattern_count = None;
        self.pattern_index = None;
        self.frame_index = None;
    }
}

/// Lock the shared status. A panic while holding the lock leaves the status
/// usable, so poisoning is ignored.
pub fn lock(status: &Mutex<DisplayStatus>) -> std::sync::MutexGuard<'_, DisplayStatus> {
    status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Render loop ──────────────────────────────────────────────────────

/// Main render loop. Runs on a dedicated thread and owns the engine.
///
/// Returns when the channel is closed (sender dropped) or the sink can't be
/// created.
pub fn render_loop<S, F>(
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    config: PlaybackConfig,
    make_sink: F,
) where
    S: DeviceSink,
    F: FnOnce() -> Result<S, SinkError>,
{
    let sink = match make_sink() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize LED device: {}", e);
            return;
        }
    };

    let mut engine = PlaybackEngine::new(config, sink, SleepPacer::new());
    let cancel = CancelToken::new();
    let mut pending_cmd: Option<RenderCommand> = None;

    tracing::info!("Render thread started, waiting for commands...");

    loop {
        let cmd = if let Some(cmd) = pending_cmd.take() {
            cmd
        } else {
            match rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => {
                    tracing::info!("Render thread: channel closed, shutting down.");
                    break;
                }
            }
        };

        match cmd {
            RenderCommand::Stop => {
                lock(&status).set_idle();
            }

            RenderCommand::Clear => {
                if let Err(e) = engine.clear() {
                    tracing::error!("Failed to clear display: {}", e);
                }
                lock(&status).set_idle();
            }

            RenderCommand::Play {
                label,
                patterns,
                max_brightness,
                frame_rate,
            } => {
                engine.set_max_brightness(max_brightness);
                engine.set_frame_rate(frame_rate);
                {
                    let mut s = lock(&status);
                    s.state = PlaybackState::Playing;
                    s.playlist = Some(label.clone());
                    s.pattern_count = Some(patterns.len());
                    s.pattern_index = Some(0);
                    s.frame_index = Some(0);
                    s.frames_rendered = 0;
                    s.max_brightness = max_brightness.get();
                    s.frame_rate = frame_rate.fps();
                }

                tracing::info!("Playing {} ({} patterns)", label, patterns.len());
                cancel.reset();

                let result = engine.start_observed(&patterns, &cancel, |session| {
                    {
                        let mut s = lock(&status);
                        s.pattern_index = Some(session.pattern_index);
                        s.frame_index = Some(session.frame_index);
                        s.frames_rendered += 1;
                    }

                    if pending_cmd.is_none() {
                        match rx.try_recv() {
                            Ok(new_cmd) => {
                                pending_cmd = Some(new_cmd);
                                cancel.cancel();
                            }
                            // Nobody can send Stop any more; end so the owner can join.
                            Err(TryRecvError::Disconnected) => cancel.cancel(),
                            Err(TryRecvError::Empty) => {}
                        }
                    }
                });

                if let Err(e) = result {
                    tracing::error!("Playback of {} stopped: {}", label, e);
                }
                lock(&status).set_idle();
            }
        }
    }
}
