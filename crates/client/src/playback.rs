//! Media player state machine.
//!
//! The player is driven through a single entry point, [`Playback::dispatch`],
//! which applies an [`Event`] and returns the [`Effect`]s the host must carry
//! out against its decoder and UI. Invalid transitions are rejected without
//! changing state.

use thiserror::Error;
use tracing::{debug, info, warn};

/// Player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing loaded yet.
    Idle,
    /// The decoder is preparing the source.
    Preparing,
    /// Playing.
    Playing,
    /// Paused by the user or the host.
    Paused,
    /// Waiting for a seek to finish; `resume` restarts playback afterwards.
    Seeking { resume: bool },
    /// Reached the end of the media.
    Completed,
    /// The decoder failed.
    Error { reason: String },
    /// Resources released; terminal.
    Released,
}

impl State {
    /// Short state name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Preparing => "preparing",
            State::Playing => "playing",
            State::Paused => "paused",
            State::Seeking { .. } => "seeking",
            State::Completed => "completed",
            State::Error { .. } => "error",
            State::Released => "released",
        }
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start preparing the source.
    Prepare,
    /// The decoder finished preparing.
    Prepared { duration_ms: u64 },
    /// User pressed play.
    Play,
    /// User pressed pause.
    Pause,
    /// User pressed the play/pause toggle.
    TogglePlay,
    /// User moved the seek bar.
    SeekTo { position_ms: u64 },
    /// The decoder finished seeking.
    SeekComplete,
    /// Playback reached the end.
    Completed,
    /// The decoder reported an error.
    Failed { reason: String },
    /// The host is going to the background.
    HostPaused,
    /// The host came back to the foreground.
    HostResumed,
    /// Tear down the player.
    Release,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Prepare => "prepare",
            Event::Prepared { .. } => "prepared",
            Event::Play => "play",
            Event::Pause => "pause",
            Event::TogglePlay => "toggle_play",
            Event::SeekTo { .. } => "seek_to",
            Event::SeekComplete => "seek_complete",
            Event::Completed => "completed",
            Event::Failed { .. } => "failed",
            Event::HostPaused => "host_paused",
            Event::HostResumed => "host_resumed",
            Event::Release => "release",
        }
    }
}

/// Action the host must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the source and start preparing the decoder.
    BeginPrepare,
    /// Show the total duration.
    ShowDuration { duration_ms: u64, label: String },
    /// Start or resume decoding.
    Start,
    /// Pause decoding.
    Pause,
    /// Seek the decoder.
    Seek { position_ms: u64 },
    /// Show end-of-media controls.
    ShowCompleted,
    /// Report an error to the user.
    ReportError { reason: String },
    /// Release the decoder and the source.
    ReleaseResources,
}

/// Errors from [`Playback::dispatch`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The event is not valid in the current state.
    #[error("cannot handle {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

/// Player state machine.
#[derive(Debug)]
pub struct Playback {
    state: State,
    duration_ms: Option<u64>,
    restart_on_resume: bool,
}

impl Default for Playback {
    fn default() -> Self {
        Self::new()
    }
}

impl Playback {
    /// Create an idle player.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            duration_ms: None,
            restart_on_resume: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Duration reported by the decoder.
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Whether playback restarts when the host resumes.
    pub fn restart_on_resume(&self) -> bool {
        self.restart_on_resume
    }

    /// Apply an event.
    pub fn dispatch(&mut self, event: Event) -> Result<Vec<Effect>, PlaybackError> {
        let (next, effects) = self.transition(&event)?;
        if next != self.state {
            debug!(from = self.state.name(), to = next.name(), event = event.name(), "Playback transition");
        }
        self.state = next;
        Ok(effects)
    }

    fn invalid(&self, event: &Event) -> PlaybackError {
        warn!(state = self.state.name(), event = event.name(), "Rejected playback event");
        PlaybackError::InvalidTransition {
            state: self.state.name(),
            event: event.name(),
        }
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        match self.duration_ms {
            Some(d) => position_ms.min(d),
            None => position_ms,
        }
    }

    fn transition(&mut self, event: &Event) -> Result<(State, Vec<Effect>), PlaybackError> {
        use State::*;

        let current = self.state.clone();
        let result = match (current, event) {
            (Released, _) => return Err(self.invalid(event)),
            (_, Event::Release) => {
                self.restart_on_resume = false;
                info!("Playback released");
                (Released, vec![Effect::ReleaseResources])
            }

            (Idle, Event::Prepare) => (Preparing, vec![Effect::BeginPrepare]),
            (Preparing, Event::Prepared { duration_ms }) => {
                self.duration_ms = Some(*duration_ms);
                (
                    Playing,
                    vec![
                        Effect::ShowDuration {
                            duration_ms: *duration_ms,
                            label: format_duration(*duration_ms),
                        },
                        Effect::Start,
                    ],
                )
            }

            (Paused, Event::Play | Event::TogglePlay) => (Playing, vec![Effect::Start]),
            (Completed, Event::Play | Event::TogglePlay) => {
                (Playing, vec![Effect::Seek { position_ms: 0 }, Effect::Start])
            }
            (Playing, Event::Pause | Event::TogglePlay) => (Paused, vec![Effect::Pause]),

            (Playing, Event::SeekTo { position_ms }) => (
                Seeking { resume: true },
                vec![Effect::Seek {
                    position_ms: self.clamp(*position_ms),
                }],
            ),
            (Paused | Completed, Event::SeekTo { position_ms }) => (
                Seeking { resume: false },
                vec![Effect::Seek {
                    position_ms: self.clamp(*position_ms),
                }],
            ),
            (Seeking { resume }, Event::SeekTo { position_ms }) => (
                Seeking { resume },
                vec![Effect::Seek {
                    position_ms: self.clamp(*position_ms),
                }],
            ),
            (Seeking { resume: true }, Event::SeekComplete) => (Playing, vec![Effect::Start]),
            (Seeking { resume: false }, Event::SeekComplete) => (Paused, Vec::new()),

            (Playing, Event::Completed) => (Completed, vec![Effect::ShowCompleted]),

            (Preparing | Playing | Paused | Seeking { .. } | Completed, Event::Failed { reason }) => {
                warn!(reason = %reason, "Playback failed");
                self.restart_on_resume = false;
                (
                    Error {
                        reason: reason.clone(),
                    },
                    vec![Effect::ReportError {
                        reason: reason.clone(),
                    }],
                )
            }

            (Playing, Event::HostPaused) => {
                self.restart_on_resume = true;
                (Paused, vec![Effect::Pause])
            }
            (Seeking { resume: true }, Event::HostPaused) => {
                self.restart_on_resume = true;
                (Seeking { resume: false }, Vec::new())
            }
            (state, Event::HostPaused) => {
                self.restart_on_resume = false;
                (state, Vec::new())
            }
            (Paused, Event::HostResumed) if self.restart_on_resume => {
                self.restart_on_resume = false;
                (Playing, vec![Effect::Start])
            }
            (Seeking { resume: false }, Event::HostResumed) if self.restart_on_resume => {
                self.restart_on_resume = false;
                (Seeking { resume: true }, Vec::new())
            }
            (state, Event::HostResumed) => {
                self.restart_on_resume = false;
                (state, Vec::new())
            }

            _ => return Err(self.invalid(event)),
        };
        Ok(result)
    }
}

/// Render a duration as `mm:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(duration_ms: u64) -> String {
    let total = duration_ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
