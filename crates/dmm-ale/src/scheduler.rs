//! Layer Scheduler
//!
//! Per-session loop cadence. Each cycle of a song of length L:
//!
//! ```text
//!  0 ────────── L/2 ─────────────── L−fade ─────────── L
//!               plan next mix       execute (fades)    restart cycle
//! ```
//!
//! When the fade is longer than half the loop, execution is pulled back to
//! L/2 so it never precedes planning; the cycle length stays L either way.

use crate::engine::{MusicEngine, Task};
use crate::fade::FadeRequest;
use crate::host::{AudioHost, Notification};
use crate::mixer::{self, GainRange};
use crate::session::{CyclePhase, SessionId};
use crate::timer::TimerId;
use crate::AleResult;
use rand::Rng;

/// Offsets of one loop cycle, relative to the cycle start (ms)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub plan_at_ms: u64,
    pub execute_at_ms: u64,
    /// Delay between execution and the next cycle start
    pub restart_after_ms: u64,
}

impl CycleTiming {
    pub fn for_loop(duration_ms: u64, fade_ms: u64) -> Self {
        let duration = duration_ms.max(1);
        let plan_at_ms = duration / 2;
        let execute_at_ms = duration.saturating_sub(fade_ms).max(plan_at_ms);
        Self {
            plan_at_ms,
            execute_at_ms,
            restart_after_ms: duration - execute_at_ms,
        }
    }

    /// Full cycle length
    pub fn cycle_ms(&self) -> u64 {
        self.execute_at_ms + self.restart_after_ms
    }
}

impl<H: AudioHost, R: Rng> MusicEngine<H, R> {
    /// Arm the plan and execute timers for a new cycle of session `id`
    pub(crate) fn start_cycle(&mut self, id: SessionId) {
        let fade_ms = self.config.fade_duration_ms;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            return;
        };

        let timing = CycleTiming::for_loop(session.song.duration_ms, fade_ms);
        let plan = self
            .timers
            .schedule_after(timing.plan_at_ms, Task::PlanMix { session: id });
        let execute = self
            .timers
            .schedule_after(timing.execute_at_ms, Task::ExecuteMix { session: id });

        session.timers.extend([plan, execute]);
        session.phase = CyclePhase::Steady;

        log::trace!(
            "Cycle {} of '{}': plan at +{} ms, execute at +{} ms",
            session.cycle,
            session.song.name,
            timing.plan_at_ms,
            timing.execute_at_ms
        );
    }

    /// Choose the mix for the upcoming loop boundary
    pub(crate) fn plan_mix(&mut self, id: SessionId, timer: TimerId) -> AleResult<()> {
        let intensity = self.combat.intensity;
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            log::debug!("Dropping plan for stale session {}", id);
            return Ok(());
        };

        session.forget_timer(timer);
        session.phase = CyclePhase::Planning;

        let eligible = mixer::eligible_layers(&session.song, intensity);
        let plan = mixer::pick_mix(
            &eligible,
            &session.audible_layers(),
            GainRange::for_song(&session.song),
            &mut self.rng,
        );

        log::debug!(
            "Planned mix for '{}': {} of {} eligible layers (+{} -{})",
            session.song.name,
            plan.audible_count(),
            eligible.len(),
            plan.entering.len(),
            plan.leaving.len()
        );

        session.next_mix = Some(plan);
        session.phase = CyclePhase::Steady;
        Ok(())
    }

    /// Re-pick a pending plan after eligibility changed
    pub(crate) fn replan_if_pending(&mut self) {
        let intensity = self.combat.intensity;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.next_mix.is_none() {
            return;
        }

        let eligible = mixer::eligible_layers(&session.song, intensity);
        session.next_mix = Some(mixer::pick_mix(
            &eligible,
            &session.audible_layers(),
            GainRange::for_song(&session.song),
            &mut self.rng,
        ));
    }

    /// Apply the planned mix and arm the next cycle
    pub(crate) fn execute_mix(&mut self, id: SessionId, timer: TimerId) -> AleResult<()> {
        let intensity = self.combat.intensity;
        let fade_ms = self.config.fade_duration_ms;

        let mut requests = Vec::new();
        let (song_name, audible, timing, applied) = {
            let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
                log::debug!("Dropping mix change for stale session {}", id);
                return Ok(());
            };

            session.forget_timer(timer);
            session.phase = CyclePhase::Executing;

            let applied = match session.next_mix.take() {
                Some(mut plan) => {
                    if session.song.is_tiered() {
                        plan.retain_eligible(&mixer::eligible_layers(&session.song, intensity));
                    }

                    for track in session.tracks.iter_mut() {
                        let from = if track.audible { track.gain } else { 0.0 };
                        let to = match (plan.gain_of(track.layer), track.audible) {
                            (Some(gain), _) => gain,
                            (None, true) => 0.0,
                            (None, false) => continue,
                        };
                        requests.push(FadeRequest::new(track.handle, from, to, fade_ms));
                        track.audible = to > 0.0;
                    }
                    true
                }
                None => {
                    log::warn!(
                        "No planned mix for '{}', keeping current layers",
                        session.song.name
                    );
                    false
                }
            };

            (
                session.song.name.clone(),
                session.audible_count(),
                CycleTiming::for_loop(session.song.duration_ms, fade_ms),
                applied,
            )
        };

        for request in requests {
            self.run_fade(request);
        }

        if applied {
            log::info!("Mix change on '{}': {} layers audible", song_name, audible);
            self.host.notify(Notification::MixChanged {
                song: song_name,
                audible,
            });
        }

        let restart = self
            .timers
            .schedule_after(timing.restart_after_ms, Task::RestartCycle { session: id });
        if let Some(session) = self.session.as_mut().filter(|s| s.id == id) {
            session.timers.push(restart);
            session.phase = CyclePhase::Steady;
        } else {
            self.timers.cancel(restart);
        }
        Ok(())
    }

    /// Loop boundary: count the cycle and arm the next one
    pub(crate) fn restart_cycle(&mut self, id: SessionId, timer: TimerId) -> AleResult<()> {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            log::debug!("Dropping restart for stale session {}", id);
            return Ok(());
        };

        session.forget_timer(timer);
        session.cycle += 1;
        let notification = Notification::SongLooped {
            song: session.song.name.clone(),
            cycle: session.cycle,
        };

        self.host.notify(notification);
        self.start_cycle(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Layer, Song};
    use crate::host::MemoryHost;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn engine() -> MusicEngine<MemoryHost, StdRng> {
        let catalog = Catalog::from_parts(
            vec![
                Song::new("Ambient", 20000)
                    .with_layer(Layer::new("a.ogg"))
                    .with_layer(Layer::new("b.ogg"))
                    .with_layer(Layer::new("c.ogg")),
                Song::new("Short", 1000).with_layer(Layer::new("s.ogg")),
            ],
            Vec::new(),
        );
        MusicEngine::new(catalog, MemoryHost::new(), StdRng::seed_from_u64(5))
    }

    #[test]
    fn test_cycle_timing() {
        let timing = CycleTiming::for_loop(20000, 2000);
        assert_eq!(timing.plan_at_ms, 10000);
        assert_eq!(timing.execute_at_ms, 18000);
        assert_eq!(timing.restart_after_ms, 2000);
        assert_eq!(timing.cycle_ms(), 20000);
    }

    #[test]
    fn test_cycle_timing_long_fade() {
        let timing = CycleTiming::for_loop(1000, 2000);
        assert_eq!(timing.plan_at_ms, 500);
        assert_eq!(timing.execute_at_ms, 500);
        assert_eq!(timing.cycle_ms(), 1000);

        let degenerate = CycleTiming::for_loop(0, 0);
        assert_eq!(degenerate.cycle_ms(), 1);
    }

    #[test]
    fn test_plan_then_execute() {
        let mut engine = engine();
        engine.play("Ambient").unwrap();
        assert_eq!(engine.session_timers(), 2);

        engine.advance(10000);
        assert!(engine.session().unwrap().next_mix.is_some());
        assert_eq!(engine.host().notification_count("mix-changed"), 0);

        engine.advance(8000);
        assert!(engine.session().unwrap().next_mix.is_none());
        assert_eq!(engine.host().notification_count("mix-changed"), 1);
        assert!(engine.session().unwrap().audible_count() >= 2);
    }

    #[test]
    fn test_restart_counts_cycles() {
        let mut engine = engine();
        engine.play("Short").unwrap();

        engine.advance(3000);
        assert_eq!(engine.session().unwrap().cycle, 3);
        assert_eq!(engine.host().notification_count("song-looped"), 3);
        assert_eq!(engine.host().notification_count("mix-changed"), 3);
        assert_eq!(engine.session_timers(), 2);
    }
}
