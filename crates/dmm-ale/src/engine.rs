//! ALE Engine
//!
//! Public facade that owns the catalog, the host, the timer queue and the one
//! live [`PlaybackSession`], and routes every fired timer back to the
//! component that armed it.

use crate::catalog::{Catalog, Song};
use crate::combat::{BridgeTransition, CombatConfig, CombatSignalAdapter, CombatState, TransitionId};
use crate::fade::{FadeCompletion, FadeEngine, FadeRequest, FadeThen};
use crate::host::{AudioHost, HostHandle, Notification, StartOptions};
use crate::mixer::{self, GainRange};
use crate::session::{NowPlaying, PlaybackSession, SessionId, TrackHandle};
use crate::timer::{TimerId, TimerQueue};
use crate::{AleError, AleResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Deferred work held in the timer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Mid-loop: choose the next mix
    PlanMix { session: SessionId },
    /// Near loop end: apply the planned mix
    ExecuteMix { session: SessionId },
    /// Loop boundary: arm the next cycle
    RestartCycle { session: SessionId },
    /// A fade reached its end level
    FadeComplete { handle: HostHandle },
    /// Bridge finished: hard cut into the destination song
    BridgeCut { transition: TransitionId },
    /// Transition guard window elapsed
    ReleaseGuard { transition: TransitionId },
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Crossfade length of mix changes and intensity changes (ms)
    #[serde(default = "default_fade_duration")]
    pub fade_duration_ms: u64,
    /// Fade applied by `stop()` before layers are stopped (0 = immediate)
    #[serde(default)]
    pub stop_fade_ms: u64,
    /// Starting gain of every layer of an untiered song
    #[serde(default = "default_initial_gain")]
    pub initial_gain: f32,
    /// Highest intensity level
    #[serde(default = "default_max_intensity")]
    pub max_intensity: u8,
    /// Gain a bridge fades in to
    #[serde(default = "default_bridge_gain")]
    pub bridge_gain: f32,
}

fn default_fade_duration() -> u64 {
    crate::DEFAULT_FADE_DURATION_MS
}
fn default_initial_gain() -> f32 {
    1.0
}
fn default_max_intensity() -> u8 {
    crate::DEFAULT_MAX_INTENSITY
}
fn default_bridge_gain() -> f32 {
    0.8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_duration_ms: crate::DEFAULT_FADE_DURATION_MS,
            stop_fade_ms: 0,
            initial_gain: 1.0,
            max_intensity: crate::DEFAULT_MAX_INTENSITY,
            bridge_gain: 0.8,
        }
    }
}

/// Adaptive music engine
pub struct MusicEngine<H: AudioHost, R: Rng> {
    pub(crate) catalog: Catalog,
    pub(crate) config: EngineConfig,
    pub(crate) combat_config: CombatConfig,
    pub(crate) host: H,
    pub(crate) rng: R,
    pub(crate) timers: TimerQueue<Task>,
    pub(crate) fades: FadeEngine,
    pub(crate) session: Option<PlaybackSession>,
    pub(crate) combat: CombatState,
    pub(crate) transition: Option<BridgeTransition>,
    pub(crate) signals: CombatSignalAdapter,
    /// Ambient song to restore when combat ends
    pub(crate) return_to: Option<String>,
    next_session_id: SessionId,
    pub(crate) next_transition_id: TransitionId,
}

impl<H: AudioHost, R: Rng> MusicEngine<H, R> {
    /// Create an engine with default configuration
    pub fn new(catalog: Catalog, host: H, rng: R) -> Self {
        Self {
            catalog,
            config: EngineConfig::default(),
            combat_config: CombatConfig::default(),
            host,
            rng,
            timers: TimerQueue::new(),
            fades: FadeEngine::new(),
            session: None,
            combat: CombatState::default(),
            transition: None,
            signals: CombatSignalAdapter::default(),
            return_to: None,
            next_session_id: 1,
            next_transition_id: 1,
        }
    }

    /// Builder: engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: combat configuration
    pub fn with_combat_config(mut self, config: CombatConfig) -> Self {
        self.combat_config = config;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PUBLIC OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Play a song by name, replacing whatever is playing.
    ///
    /// Unknown names leave the current playback untouched.
    pub fn play(&mut self, song_name: &str) -> AleResult<()> {
        let song = self
            .catalog
            .find_song(song_name)
            .ok_or_else(|| AleError::SongNotFound(song_name.to_string()))?;

        if self.abort_transition() {
            log::info!("Manual play of '{}' cancelled the running transition", song.name);
            self.set_phase(crate::combat::CombatPhase::Idle);
        }
        self.play_song(song)
    }

    /// Play a randomly chosen ambient (untiered) song; returns its name
    pub fn play_random(&mut self) -> AleResult<String> {
        let song = self
            .catalog
            .random_ambient(&mut self.rng)
            .ok_or_else(|| AleError::SongNotFound("<any ambient song>".to_string()))?;
        let name = song.name.clone();
        self.play(&name)?;
        Ok(name)
    }

    /// Stop playback. Calling it with nothing playing is a no-op.
    ///
    /// Also leaves combat: a later combat end does not restart ambient music.
    pub fn stop(&mut self) {
        let aborted = self.abort_transition();
        self.return_to = None;
        self.set_phase(crate::combat::CombatPhase::Idle);

        match self.teardown_session(self.config.stop_fade_ms) {
            Some(song) => {
                log::info!("Stopped '{}'", song.name);
                self.notify_now_playing();
            }
            None if aborted => self.notify_now_playing(),
            None => log::debug!("Stop requested with nothing playing"),
        }
    }

    /// Set the intensity level (clamped to 1..=max) and re-gate a playing
    /// tiered song right away.
    pub fn set_intensity(&mut self, level: u8) {
        let clamped = level.clamp(1, self.max_intensity());
        if clamped != level {
            log::debug!("Intensity {} clamped to {}", level, clamped);
        }
        if clamped == self.combat.intensity {
            return;
        }

        log::info!("Intensity {} -> {}", self.combat.intensity, clamped);
        self.combat.intensity = clamped;
        self.host
            .notify(Notification::IntensityChanged { level: clamped });

        let tiered = self
            .session
            .as_ref()
            .is_some_and(|s| s.song.is_tiered());
        if tiered {
            self.sync_tiered_layers();
            self.replan_if_pending();
            self.notify_now_playing();
        }
    }

    /// Snapshot of the current song and layer gains
    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.session.as_ref().map(PlaybackSession::snapshot)
    }

    /// Advance virtual time, firing every timer that falls due
    pub fn advance(&mut self, delta_ms: u64) {
        let until = self.timers.now_ms().saturating_add(delta_ms);

        while let Some((timer, task)) = self.timers.pop_due(until) {
            if let Err(e) = self.dispatch(timer, task) {
                log::error!("Timer task {:?} failed: {}", task, e);
            }
        }

        self.timers.advance_to(until);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn combat_config(&self) -> &CombatConfig {
        &self.combat_config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Live session, if any
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// Check if a song is playing
    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Current combat state
    pub fn combat_state(&self) -> &CombatState {
        &self.combat
    }

    /// Current intensity level
    pub fn intensity(&self) -> u8 {
        self.combat.intensity
    }

    /// Highest accepted intensity level
    pub fn max_intensity(&self) -> u8 {
        self.config.max_intensity.max(1)
    }

    /// Current virtual time (ms)
    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    /// Number of pending timers of any kind
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Number of pending timers owned by the live session
    pub fn session_timers(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.timers.iter().filter(|t| self.timers.is_pending(**t)).count())
            .unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SESSION LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the live session with a fresh one for `song`
    pub(crate) fn play_song(&mut self, song: Arc<Song>) -> AleResult<()> {
        self.teardown_session(0);

        let tiered = song.is_tiered();
        let initial = if tiered { 0.0 } else { self.config.initial_gain };

        let mut tracks: Vec<TrackHandle> = Vec::with_capacity(song.layers.len());
        for (index, layer) in song.layers.iter().enumerate() {
            match self
                .host
                .start_layer(&layer.path, StartOptions::looping(initial))
            {
                Ok(handle) => tracks.push(TrackHandle {
                    layer: index,
                    name: layer.name().to_string(),
                    handle,
                    audible: !tiered,
                    gain: initial,
                }),
                Err(e) => {
                    log::error!("Failed to start layer '{}' of '{}': {}", layer.path, song.name, e);
                    for track in &tracks {
                        self.host.stop_layer(track.handle);
                    }
                    self.notify_now_playing();
                    return Err(e);
                }
            }
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        log::info!(
            "Playing '{}' ({} layers, {}, loop {} ms)",
            song.name,
            tracks.len(),
            if tiered { "tiered" } else { "ambient" },
            song.duration_ms
        );

        self.session = Some(PlaybackSession::new(
            id,
            song,
            tracks,
            self.timers.now_ms(),
        ));

        if tiered {
            self.sync_tiered_layers();
        }
        self.start_cycle(id);
        self.notify_now_playing();
        Ok(())
    }

    /// Cancel the live session's timers and release its layers.
    ///
    /// Each layer fades to silence and stops when its fade completes;
    /// `fade_ms == 0` silences and stops every layer inline.
    pub(crate) fn teardown_session(&mut self, fade_ms: u64) -> Option<Arc<Song>> {
        let session = self.session.take()?;

        let cancelled = self.timers.cancel_all(session.timers.iter().copied());
        log::debug!(
            "Tearing down session {} ('{}'): {} timers cancelled",
            session.id,
            session.song.name,
            cancelled
        );

        for track in &session.tracks {
            self.run_fade(FadeRequest::release(track.handle, track.gain, fade_ms));
        }

        Some(session.song)
    }

    /// Fade every layer of a tiered session to match the intensity level
    pub(crate) fn sync_tiered_layers(&mut self) {
        let fade_ms = self.config.fade_duration_ms;
        let intensity = self.combat.intensity;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.song.is_tiered() {
            return;
        }

        let eligible = mixer::eligible_layers(&session.song, intensity);
        let gains = GainRange::for_song(&session.song);

        let mut requests = Vec::new();
        for track in session.tracks.iter_mut() {
            let should_sound = eligible.contains(&track.layer);
            match (should_sound, track.audible) {
                (true, false) => {
                    let to = gains.sample(&mut self.rng);
                    log::debug!("Fading in '{}' for intensity {}", track.name, intensity);
                    requests.push(FadeRequest::new(track.handle, 0.0, to, fade_ms));
                    track.audible = true;
                }
                (true, true) => {
                    let to = gains.sample(&mut self.rng);
                    requests.push(FadeRequest::new(track.handle, track.gain, to, fade_ms));
                }
                (false, true) => {
                    log::debug!("Fading out '{}' for intensity {}", track.name, intensity);
                    requests.push(FadeRequest::new(track.handle, track.gain, 0.0, fade_ms));
                    track.audible = false;
                }
                (false, false) => {}
            }
        }

        for request in requests {
            self.run_fade(request);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FADES
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn run_fade(&mut self, request: FadeRequest) {
        let done = self.fades.fade(
            &mut self.host,
            &mut self.timers,
            request,
            |handle| Task::FadeComplete { handle },
        );
        if let Some(done) = done {
            self.finish_fade(done);
        }
    }

    fn finish_fade(&mut self, done: FadeCompletion) {
        if let Some(track) = self
            .session
            .as_mut()
            .and_then(|s| s.track_by_handle_mut(done.handle))
        {
            track.gain = done.level;
        }

        if done.then == FadeThen::Stop {
            self.host.stop_layer(done.handle);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DISPATCH
    // ═══════════════════════════════════════════════════════════════════════

    fn dispatch(&mut self, timer: TimerId, task: Task) -> AleResult<()> {
        match task {
            Task::PlanMix { session } => self.plan_mix(session, timer),
            Task::ExecuteMix { session } => self.execute_mix(session, timer),
            Task::RestartCycle { session } => self.restart_cycle(session, timer),
            Task::FadeComplete { handle } => {
                if let Some(done) = self.fades.complete(handle, timer) {
                    self.finish_fade(done);
                }
                Ok(())
            }
            Task::BridgeCut { transition } => self.cut_to_destination(transition, timer),
            Task::ReleaseGuard { transition } => {
                self.release_guard(transition);
                Ok(())
            }
        }
    }

    pub(crate) fn notify_now_playing(&mut self) {
        let now_playing = self.now_playing();
        self.host
            .notify(Notification::NowPlayingChanged { now_playing });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Layer;
    use crate::host::MemoryHost;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn engine() -> MusicEngine<MemoryHost, StdRng> {
        let catalog = Catalog::from_parts(
            vec![
                Song::new("Pad", 8000).with_layer(Layer::new("pad.ogg")),
                Song::new("Drums", 8000).with_layer(Layer::tiered("kick.ogg", 1)),
            ],
            Vec::new(),
        );
        MusicEngine::new(catalog, MemoryHost::new(), StdRng::seed_from_u64(1))
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"stop_fade_ms": 500}"#).unwrap();
        assert_eq!(config.stop_fade_ms, 500);
        assert_eq!(config.fade_duration_ms, 2000);
        assert_eq!(config.max_intensity, 4);
        assert_eq!(config.initial_gain, 1.0);
    }

    #[test]
    fn test_play_random_picks_ambient() {
        let mut engine = engine();
        for _ in 0..10 {
            assert_eq!(engine.play_random().unwrap(), "Pad");
        }
    }

    #[test]
    fn test_stop_with_fade_releases_layers() {
        let mut engine = engine().with_config(EngineConfig {
            stop_fade_ms: 1000,
            ..EngineConfig::default()
        });
        engine.play("Pad").unwrap();
        engine.stop();

        assert!(engine.now_playing().is_none());
        assert_eq!(engine.host().playing_count(), 1);
        assert_eq!(engine.pending_timers(), 1);

        engine.advance(1000);
        assert_eq!(engine.host().playing_count(), 0);
        assert_eq!(engine.pending_timers(), 0);
    }

    #[test]
    fn test_intensity_without_session() {
        let mut engine = engine();
        engine.set_intensity(3);
        assert_eq!(engine.intensity(), 3);
        assert_eq!(engine.host().notification_count("intensity-changed"), 1);
        assert_eq!(engine.host().notification_count("now-playing-changed"), 0);
    }
}
