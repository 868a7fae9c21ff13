//! Mode Transitioner
//!
//! Ambient ↔ combat switching:
//! - Entering combat fades the ambient song out while a bridge track fades
//!   in, then hard-cuts into the combat song once the bridge has played
//! - Leaving combat hard-cuts straight back to the ambient song
//! - A guard flag swallows duplicate start signals for the length of the
//!   bridge plus a buffer

use crate::catalog::{Bridge, Song};
use crate::engine::{MusicEngine, Task};
use crate::fade::FadeRequest;
use crate::host::{AudioHost, HostHandle, Notification, StartOptions};
use crate::timer::TimerId;
use crate::{AleError, AleResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transition identifier; guard and cut timers carry it
pub type TransitionId = u64;

/// Phase of the ambient/combat state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombatPhase {
    #[default]
    Idle,
    TransitioningIn,
    Combat,
    TransitioningOut,
}

/// Mode state owned by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct CombatState {
    pub phase: CombatPhase,
    /// Intensity level, 1..=max
    pub intensity: u8,
    /// Set while a start transition's guard window is open
    pub transition_in_flight: bool,
    /// Transition that owns the guard
    pub guard_owner: Option<TransitionId>,
}

impl Default for CombatState {
    fn default() -> Self {
        Self {
            phase: CombatPhase::Idle,
            intensity: 1,
            transition_in_flight: false,
            guard_owner: None,
        }
    }
}

/// Combat mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Song played while in combat
    #[serde(default = "default_combat_song")]
    pub combat_song: String,
    /// Ambient song to return to when nothing else was playing
    #[serde(default = "default_ambient_song")]
    pub ambient_song: String,
    /// Bridge fade-in length (ms)
    #[serde(default = "default_fade")]
    pub fade_in_ms: u64,
    /// Ambient fade-out length (ms)
    #[serde(default = "default_fade")]
    pub fade_out_ms: u64,
    /// Extra time the guard stays up after the bridge (ms)
    #[serde(default = "default_guard_buffer")]
    pub guard_buffer_ms: u64,
}

fn default_combat_song() -> String {
    "The First Battle".to_string()
}
fn default_ambient_song() -> String {
    "Sylvan Stillness".to_string()
}
fn default_fade() -> u64 {
    2000
}
fn default_guard_buffer() -> u64 {
    1000
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            combat_song: default_combat_song(),
            ambient_song: default_ambient_song(),
            fade_in_ms: default_fade(),
            fade_out_ms: default_fade(),
            guard_buffer_ms: default_guard_buffer(),
        }
    }
}

/// Why a mode signal was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A start transition is already running
    DuplicateTransition,
    /// Combat music is already playing
    AlreadyInCombat,
    /// End signal while not in combat
    NotInCombat,
    /// Host event carried no mode change
    NoChange,
}

/// Result of a mode signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Start transition began, with the bridge that plays (if any)
    Bridging { bridge: Option<String> },
    /// Combat ended and the named song is playing again
    Returned { song: String },
    Ignored(IgnoreReason),
}

/// Raw combat events from the host game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    CombatStarted,
    CombatEnded,
    /// Round counter update; `None` once the encounter is gone
    CombatUpdated { round: Option<u32> },
}

/// Internal mode signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSignal {
    Start,
    End,
}

/// Maps host combat events to mode signals.
///
/// A round counter that drops from a positive value to zero or disappears
/// is treated as the end of combat. Explicit start/end events reset the
/// tracked round, so an inferred end and an explicit end never both fire
/// for the same encounter.
#[derive(Debug, Clone, Default)]
pub struct CombatSignalAdapter {
    last_round: Option<u32>,
}

impl CombatSignalAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: HostEvent) -> Option<ModeSignal> {
        match event {
            HostEvent::CombatStarted => {
                self.last_round = None;
                Some(ModeSignal::Start)
            }
            HostEvent::CombatEnded => {
                self.last_round = None;
                Some(ModeSignal::End)
            }
            HostEvent::CombatUpdated { round } => {
                let previous = std::mem::replace(&mut self.last_round, round);
                let was_running = previous.is_some_and(|r| r > 0);
                let still_running = round.is_some_and(|r| r > 0);
                if was_running && !still_running {
                    self.last_round = None;
                    Some(ModeSignal::End)
                } else {
                    None
                }
            }
        }
    }
}

/// A start transition between its trigger and the cut into combat
#[derive(Debug, Clone)]
pub struct BridgeTransition {
    pub id: TransitionId,
    pub destination: Arc<Song>,
    pub bridge: Option<Arc<Bridge>>,
    /// Host handle of the playing bridge
    pub bridge_handle: Option<HostHandle>,
    /// Timer that performs the cut
    pub cut_timer: TimerId,
}

impl<H: AudioHost, R: Rng> MusicEngine<H, R> {
    /// Route a raw host event through the signal adapter
    pub fn handle_event(&mut self, event: HostEvent) -> AleResult<TransitionOutcome> {
        match self.signals.translate(event) {
            Some(ModeSignal::Start) => self.combat_started(),
            Some(ModeSignal::End) => self.combat_ended(),
            None => Ok(TransitionOutcome::Ignored(IgnoreReason::NoChange)),
        }
    }

    /// Begin the transition into combat music
    pub fn combat_started(&mut self) -> AleResult<TransitionOutcome> {
        if self.combat.transition_in_flight {
            log::debug!("Combat start ignored: transition already in flight");
            return Ok(TransitionOutcome::Ignored(IgnoreReason::DuplicateTransition));
        }
        if self.combat.phase != CombatPhase::Idle {
            log::debug!("Combat start ignored: phase is {:?}", self.combat.phase);
            return Ok(TransitionOutcome::Ignored(IgnoreReason::AlreadyInCombat));
        }

        let combat_name = self.combat_config.combat_song.clone();
        let destination = self
            .catalog
            .find_song(&combat_name)
            .ok_or(AleError::SongNotFound(combat_name))?;

        let source = self.session.as_ref().map(|s| Arc::clone(&s.song));
        let bridge = self.catalog.bridge_between(source.as_deref(), &destination);

        let id = self.next_transition_id;
        self.next_transition_id += 1;

        let fade_in_ms = self.combat_config.fade_in_ms;
        let fade_out_ms = self.combat_config.fade_out_ms;
        let hold_ms = bridge.as_ref().map_or(fade_out_ms, |b| b.duration_ms);

        self.combat.transition_in_flight = true;
        self.combat.guard_owner = Some(id);
        self.timers.schedule_after(
            hold_ms.saturating_add(self.combat_config.guard_buffer_ms),
            Task::ReleaseGuard { transition: id },
        );
        self.set_phase(CombatPhase::TransitioningIn);

        self.return_to = source
            .as_ref()
            .filter(|s| !s.is_tiered())
            .map(|s| s.name.clone());
        if let Some(song) = self.teardown_session(fade_out_ms) {
            log::info!("Fading out '{}' over {} ms", song.name, fade_out_ms);
        }

        let bridge_handle = match bridge.as_ref() {
            Some(b) => match self.host.start_layer(&b.path, StartOptions::one_shot(0.0)) {
                Ok(handle) => {
                    log::info!(
                        "Bridge '{}' into '{}' ({} ms)",
                        b.name,
                        destination.name,
                        b.duration_ms
                    );
                    let gain = self.config.bridge_gain;
                    self.run_fade(FadeRequest::new(handle, 0.0, gain, fade_in_ms));
                    Some(handle)
                }
                Err(e) => {
                    log::error!("Failed to start bridge '{}': {}", b.name, e);
                    None
                }
            },
            None => {
                log::warn!("No bridge into '{}', cutting after {} ms", destination.name, hold_ms);
                None
            }
        };

        for layer in &destination.layers {
            self.host.preload(&layer.path);
        }

        let cut_timer = self
            .timers
            .schedule_after(hold_ms, Task::BridgeCut { transition: id });

        let bridge_name = bridge.as_ref().map(|b| b.name.clone());
        self.transition = Some(BridgeTransition {
            id,
            destination,
            bridge,
            bridge_handle,
            cut_timer,
        });

        Ok(TransitionOutcome::Bridging {
            bridge: bridge_name,
        })
    }

    /// Hard-cut back to ambient music
    pub fn combat_ended(&mut self) -> AleResult<TransitionOutcome> {
        if self.combat.phase == CombatPhase::Idle && self.transition.is_none() {
            log::debug!("Combat end ignored: not in combat");
            return Ok(TransitionOutcome::Ignored(IgnoreReason::NotInCombat));
        }

        self.set_phase(CombatPhase::TransitioningOut);
        self.abort_transition();

        for handle in self.fades.take_releasing(&mut self.timers) {
            self.host.stop_layer(handle);
        }
        self.teardown_session(0);

        let target = self
            .return_to
            .take()
            .unwrap_or_else(|| self.combat_config.ambient_song.clone());
        log::info!("Combat over, returning to '{}'", target);

        let result = self
            .catalog
            .find_song(&target)
            .ok_or_else(|| AleError::SongNotFound(target.clone()))
            .and_then(|song| self.play_song(song));

        self.set_phase(CombatPhase::Idle);
        result.map(|_| TransitionOutcome::Returned { song: target })
    }

    /// Bridge finished: stop it and start the destination song
    pub(crate) fn cut_to_destination(&mut self, id: TransitionId, timer: TimerId) -> AleResult<()> {
        let Some(transition) = self.transition.take_if(|t| t.id == id && t.cut_timer == timer)
        else {
            log::debug!("Dropping cut for stale transition {}", id);
            return Ok(());
        };

        if let Some(handle) = transition.bridge_handle {
            self.fades.cancel(&mut self.timers, handle);
            self.host.stop_layer(handle);
        }

        match self.play_song(Arc::clone(&transition.destination)) {
            Ok(()) => {
                self.set_phase(CombatPhase::Combat);
                Ok(())
            }
            Err(e) => {
                self.set_phase(CombatPhase::Idle);
                Err(e)
            }
        }
    }

    /// Close the guard window opened by transition `id`
    pub(crate) fn release_guard(&mut self, id: TransitionId) {
        if self.combat.guard_owner == Some(id) {
            self.combat.transition_in_flight = false;
            self.combat.guard_owner = None;
            log::debug!("Transition guard {} released", id);
        }
    }

    /// Cancel a running start transition and silence its bridge.
    /// Returns whether one was running.
    pub(crate) fn abort_transition(&mut self) -> bool {
        let Some(transition) = self.transition.take() else {
            return false;
        };

        self.timers.cancel(transition.cut_timer);
        if let Some(handle) = transition.bridge_handle {
            self.fades.cancel(&mut self.timers, handle);
            self.host.stop_layer(handle);
        }
        log::debug!("Transition {} aborted", transition.id);
        true
    }

    pub(crate) fn set_phase(&mut self, phase: CombatPhase) {
        if self.combat.phase == phase {
            return;
        }
        log::info!("Combat phase {:?} -> {:?}", self.combat.phase, phase);
        self.combat.phase = phase;
        self.host.notify(Notification::CombatPhaseChanged { phase });
    }
}
