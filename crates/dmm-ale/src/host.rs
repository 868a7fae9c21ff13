//! Host Collaborator
//!
//! The engine never touches audio directly. Decoding, output routing and the
//! actual gain stages belong to the host, reached through [`AudioHost`].

use crate::combat::CombatPhase;
use crate::session::NowPlaying;
use crate::{AleError, AleResult};
use serde::Serialize;
use std::collections::HashMap;

/// Opaque playback handle issued by the host
pub type HostHandle = u64;

/// Options for starting a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOptions {
    /// Whether the source loops
    pub looping: bool,
    /// Volume at start (0.0 - 1.0)
    pub initial_volume: f32,
}

impl StartOptions {
    /// Looping layer at the given volume
    pub fn looping(initial_volume: f32) -> Self {
        Self {
            looping: true,
            initial_volume,
        }
    }

    /// One-shot (bridge) at the given volume
    pub fn one_shot(initial_volume: f32) -> Self {
        Self {
            looping: false,
            initial_volume,
        }
    }
}

/// Fire-and-forget observer notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    /// A planned mix was applied
    MixChanged { song: String, audible: usize },
    /// A new loop cycle began
    SongLooped { song: String, cycle: u64 },
    /// The current song or its layer gains changed
    NowPlayingChanged { now_playing: Option<NowPlaying> },
    /// Intensity level changed
    IntensityChanged { level: u8 },
    /// Combat mode phase changed
    CombatPhaseChanged { phase: CombatPhase },
}

impl Notification {
    /// Event name as seen by observers
    pub fn name(&self) -> &'static str {
        match self {
            Notification::MixChanged { .. } => "mix-changed",
            Notification::SongLooped { .. } => "song-looped",
            Notification::NowPlayingChanged { .. } => "now-playing-changed",
            Notification::IntensityChanged { .. } => "intensity-changed",
            Notification::CombatPhaseChanged { .. } => "combat-phase-changed",
        }
    }
}

/// Audio/playlist platform consumed by the engine
pub trait AudioHost {
    /// Begin playback of a single source
    fn start_layer(&mut self, path: &str, options: StartOptions) -> AleResult<HostHandle>;

    /// Set volume immediately
    fn set_volume(&mut self, handle: HostHandle, value: f32);

    /// Linear volume ramp. Hosts without a ramp primitive return
    /// [`AleError::HostCapabilityUnavailable`].
    fn ramp_volume(
        &mut self,
        handle: HostHandle,
        from: f32,
        to: f32,
        duration_ms: u64,
    ) -> AleResult<()>;

    /// Stop playback of a handle
    fn stop_layer(&mut self, handle: HostHandle);

    /// Warm up a source so a later start has no load latency
    fn preload(&mut self, _path: &str) {}

    /// Observer notification
    fn notify(&mut self, notification: Notification);
}

/// Call recorded by [`MemoryHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Start {
        handle: HostHandle,
        path: String,
        options: StartOptions,
    },
    SetVolume {
        handle: HostHandle,
        value: f32,
    },
    Ramp {
        handle: HostHandle,
        from: f32,
        to: f32,
        duration_ms: u64,
    },
    Stop {
        handle: HostHandle,
    },
    Preload {
        path: String,
    },
}

/// Playback state of a source inside [`MemoryHost`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryVoice {
    pub path: String,
    pub looping: bool,
    pub volume: f32,
}

/// In-memory host that records every call
///
/// Ramps are applied instantly to the stored volume. Handles are never reused.
#[derive(Debug)]
pub struct MemoryHost {
    next_handle: HostHandle,
    /// Whether `ramp_volume` is available
    pub supports_ramp: bool,
    /// Paths whose start fails
    pub failing_paths: Vec<String>,
    /// Currently playing sources
    pub voices: HashMap<HostHandle, MemoryVoice>,
    /// Every call in order
    pub calls: Vec<HostCall>,
    /// Every notification in order
    pub notifications: Vec<Notification>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            supports_ramp: true,
            failing_paths: Vec::new(),
            voices: HashMap::new(),
            calls: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Host without a ramp primitive
    pub fn without_ramp() -> Self {
        Self {
            supports_ramp: false,
            ..Self::new()
        }
    }

    /// Number of playing sources
    pub fn playing_count(&self) -> usize {
        self.voices.len()
    }

    /// Paths of playing sources, sorted
    pub fn playing_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.voices.values().map(|v| v.path.clone()).collect();
        paths.sort();
        paths
    }

    /// Whether a handle is still playing
    pub fn is_playing(&self, handle: HostHandle) -> bool {
        self.voices.contains_key(&handle)
    }

    /// Current volume of a playing handle
    pub fn volume(&self, handle: HostHandle) -> Option<f32> {
        self.voices.get(&handle).map(|v| v.volume)
    }

    /// Count notifications with the given event name
    pub fn notification_count(&self, name: &str) -> usize {
        self.notifications.iter().filter(|n| n.name() == name).count()
    }

    /// Number of starts for a path
    pub fn start_count(&self, path: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, HostCall::Start { path: p, .. } if p == path))
            .count()
    }
}

impl AudioHost for MemoryHost {
    fn start_layer(&mut self, path: &str, options: StartOptions) -> AleResult<HostHandle> {
        if self.failing_paths.iter().any(|p| p == path) {
            return Err(AleError::Host(format!("cannot open '{}'", path)));
        }

        let handle = self.next_handle;
        self.next_handle += 1;

        self.voices.insert(
            handle,
            MemoryVoice {
                path: path.to_string(),
                looping: options.looping,
                volume: options.initial_volume,
            },
        );
        self.calls.push(HostCall::Start {
            handle,
            path: path.to_string(),
            options,
        });
        Ok(handle)
    }

    fn set_volume(&mut self, handle: HostHandle, value: f32) {
        if let Some(voice) = self.voices.get_mut(&handle) {
            voice.volume = value;
        }
        self.calls.push(HostCall::SetVolume { handle, value });
    }

    fn ramp_volume(
        &mut self,
        handle: HostHandle,
        from: f32,
        to: f32,
        duration_ms: u64,
    ) -> AleResult<()> {
        if !self.supports_ramp {
            return Err(AleError::HostCapabilityUnavailable(
                "volume ramp".to_string(),
            ));
        }
        if let Some(voice) = self.voices.get_mut(&handle) {
            voice.volume = to;
        }
        self.calls.push(HostCall::Ramp {
            handle,
            from,
            to,
            duration_ms,
        });
        Ok(())
    }

    fn stop_layer(&mut self, handle: HostHandle) {
        self.voices.remove(&handle);
        self.calls.push(HostCall::Stop { handle });
    }

    fn preload(&mut self, path: &str) {
        self.calls.push(HostCall::Preload {
            path: path.to_string(),
        });
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}
