//! Playback Session
//!
//! The single live playback: one song, one track handle per started layer,
//! the timers armed on its behalf and the plan for the next mix change.

use crate::catalog::Song;
use crate::host::HostHandle;
use crate::mixer::MixPlan;
use crate::timer::TimerId;
use serde::Serialize;
use std::sync::Arc;

/// Session identifier; timer tasks carry it to detect stale callbacks
pub type SessionId = u64;

/// Position of a session inside its loop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Waiting for the next timer
    #[default]
    Steady,
    /// Choosing the next mix
    Planning,
    /// Applying the planned mix
    Executing,
}

/// Runtime state of one started layer
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHandle {
    /// Index of the layer inside the song
    pub layer: usize,
    /// Display name of the layer
    pub name: String,
    /// Host playback handle
    pub handle: HostHandle,
    /// Whether the layer is part of the current mix
    pub audible: bool,
    /// Gain reached by the last completed fade
    pub gain: f32,
}

impl TrackHandle {
    /// Gain as a whole percentage
    pub fn gain_percent(&self) -> u8 {
        (self.gain.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// The currently active playback
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub song: Arc<Song>,
    pub tracks: Vec<TrackHandle>,
    /// Pending timers owned by this session
    pub timers: Vec<TimerId>,
    /// Plan for the next mix change
    pub next_mix: Option<MixPlan>,
    /// Virtual time at which the session started (ms)
    pub started_at_ms: u64,
    pub phase: CyclePhase,
    /// Completed loop cycles
    pub cycle: u64,
}

impl PlaybackSession {
    pub fn new(
        id: SessionId,
        song: Arc<Song>,
        tracks: Vec<TrackHandle>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id,
            song,
            tracks,
            timers: Vec::new(),
            next_mix: None,
            started_at_ms,
            phase: CyclePhase::Steady,
            cycle: 0,
        }
    }

    /// Indices of layers currently in the mix
    pub fn audible_layers(&self) -> Vec<usize> {
        self.tracks
            .iter()
            .filter(|t| t.audible)
            .map(|t| t.layer)
            .collect()
    }

    /// Number of audible layers
    pub fn audible_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.audible).count()
    }

    /// Track playing a host handle
    pub fn track_by_handle_mut(&mut self, handle: HostHandle) -> Option<&mut TrackHandle> {
        self.tracks.iter_mut().find(|t| t.handle == handle)
    }

    /// Whether a host handle belongs to this session
    pub fn owns(&self, handle: HostHandle) -> bool {
        self.tracks.iter().any(|t| t.handle == handle)
    }

    /// Forget a timer that fired or was cancelled
    pub fn forget_timer(&mut self, timer: TimerId) {
        self.timers.retain(|t| *t != timer);
    }

    /// Read-only snapshot for observers
    pub fn snapshot(&self) -> NowPlaying {
        NowPlaying {
            song_name: self.song.name.clone(),
            layers: self
                .tracks
                .iter()
                .map(|t| LayerSnapshot {
                    name: t.name.clone(),
                    gain_percent: t.gain_percent(),
                    audible: t.audible,
                })
                .collect(),
        }
    }
}

/// One layer of a [`NowPlaying`] snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSnapshot {
    pub name: String,
    pub gain_percent: u8,
    pub audible: bool,
}

/// Observer view of the current playback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub song_name: String,
    pub layers: Vec<LayerSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Layer;

    fn session() -> PlaybackSession {
        let song = Arc::new(
            Song::new("Sylvan Stillness", 78000)
                .with_layer(Layer::new("audio/Sylvan Stillness/Harp.ogg"))
                .with_layer(Layer::new("audio/Sylvan Stillness/Pad.ogg")),
        );
        let tracks = song
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| TrackHandle {
                layer: i,
                name: l.name().to_string(),
                handle: 10 + i as u64,
                audible: i == 0,
                gain: if i == 0 { 0.456 } else { 0.0 },
            })
            .collect();
        PlaybackSession::new(1, song, tracks, 0)
    }

    #[test]
    fn test_snapshot() {
        let snapshot = session().snapshot();
        assert_eq!(snapshot.song_name, "Sylvan Stillness");
        assert_eq!(snapshot.layers.len(), 2);
        assert_eq!(snapshot.layers[0].name, "Harp");
        assert_eq!(snapshot.layers[0].gain_percent, 46);
        assert_eq!(snapshot.layers[1].gain_percent, 0);
        assert!(!snapshot.layers[1].audible);
    }

    #[test]
    fn test_audible_layers() {
        let mut session = session();
        assert_eq!(session.audible_layers(), vec![0]);
        session.track_by_handle_mut(11).unwrap().audible = true;
        assert_eq!(session.audible_count(), 2);
        assert!(session.owns(10));
        assert!(!session.owns(99));
    }

    #[test]
    fn test_forget_timer() {
        let mut session = session();
        session.timers = vec![1, 2, 3];
        session.forget_timer(2);
        assert_eq!(session.timers, vec![1, 3]);
    }
}
