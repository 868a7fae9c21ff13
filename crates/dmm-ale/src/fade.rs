//! Fade Engine
//!
//! Linear volume ramps on host handles:
//! - A new fade on a handle supersedes the previous one (ramps never stack)
//!   and starts from the level the superseded ramp had reached
//! - Completion always fires after the requested duration, even when the host
//!   has no ramp primitive and the end level had to be set immediately
//! - A zero-length fade completes synchronously

use crate::host::{AudioHost, HostHandle};
use crate::timer::{TimerId, TimerQueue};
use std::collections::HashMap;

/// What to do with a handle once its fade completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeThen {
    /// Leave the handle playing
    #[default]
    Hold,
    /// Stop the handle
    Stop,
}

/// Parameters of a single ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRequest {
    pub handle: HostHandle,
    pub from: f32,
    pub to: f32,
    pub duration_ms: u64,
    pub then: FadeThen,
}

impl FadeRequest {
    /// Ramp that leaves the handle playing
    pub fn new(handle: HostHandle, from: f32, to: f32, duration_ms: u64) -> Self {
        Self {
            handle,
            from,
            to,
            duration_ms,
            then: FadeThen::Hold,
        }
    }

    /// Ramp to silence, then stop the handle
    pub fn release(handle: HostHandle, from: f32, duration_ms: u64) -> Self {
        Self {
            handle,
            from,
            to: 0.0,
            duration_ms,
            then: FadeThen::Stop,
        }
    }
}

/// A fade that reached its end level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeCompletion {
    pub handle: HostHandle,
    /// Level the handle now sits at
    pub level: f32,
    pub then: FadeThen,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFade {
    timer: TimerId,
    started_ms: u64,
    duration_ms: u64,
    from_level: f32,
    to_level: f32,
    then: FadeThen,
}

impl ActiveFade {
    fn level_at(&self, now_ms: u64) -> f32 {
        let elapsed = now_ms.saturating_sub(self.started_ms);
        if self.duration_ms == 0 || elapsed >= self.duration_ms {
            return self.to_level;
        }
        let t = elapsed as f32 / self.duration_ms as f32;
        self.from_level + (self.to_level - self.from_level) * t
    }
}

/// Tracks in-flight fades and their completion timers
#[derive(Debug, Default)]
pub struct FadeEngine {
    active: HashMap<HostHandle, ActiveFade>,
}

impl FadeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the ramp described by `request`.
    ///
    /// When the handle is already fading, the ramp starts from the level the
    /// running fade has reached instead of `request.from`.
    /// The completion task produced by `on_complete` is scheduled on `timers`.
    /// Returns the completion immediately when the duration is zero.
    pub fn fade<H, T, F>(
        &mut self,
        host: &mut H,
        timers: &mut TimerQueue<T>,
        request: FadeRequest,
        on_complete: F,
    ) -> Option<FadeCompletion>
    where
        H: AudioHost,
        F: FnOnce(HostHandle) -> T,
    {
        let FadeRequest {
            handle,
            duration_ms,
            then,
            ..
        } = request;
        let now_ms = timers.now_ms();
        let from = self
            .current_level(handle, now_ms)
            .unwrap_or(request.from)
            .clamp(0.0, 1.0);
        let to = request.to.clamp(0.0, 1.0);

        self.cancel(timers, handle);

        if duration_ms == 0 {
            host.set_volume(handle, to);
            return Some(FadeCompletion {
                handle,
                level: to,
                then,
            });
        }

        let from_level = match host.ramp_volume(handle, from, to, duration_ms) {
            Ok(()) => from,
            Err(e) => {
                log::warn!(
                    "Fade on handle {} fell back to immediate level {:.2}: {}",
                    handle,
                    to,
                    e
                );
                host.set_volume(handle, to);
                to
            }
        };

        let timer = timers.schedule_after(duration_ms, on_complete(handle));
        self.active.insert(
            handle,
            ActiveFade {
                timer,
                started_ms: now_ms,
                duration_ms,
                from_level,
                to_level: to,
                then,
            },
        );
        None
    }

    /// Resolve the completion timer of `handle`.
    ///
    /// Returns `None` when `timer` is not the live fade of the handle, which
    /// happens when a later fade superseded it.
    pub fn complete(&mut self, handle: HostHandle, timer: TimerId) -> Option<FadeCompletion> {
        match self.active.get(&handle) {
            Some(fade) if fade.timer == timer => {
                let fade = self.active.remove(&handle)?;
                Some(FadeCompletion {
                    handle,
                    level: fade.to_level,
                    then: fade.then,
                })
            }
            _ => None,
        }
    }

    /// Drop the in-flight fade of `handle` without completing it
    pub fn cancel<T>(&mut self, timers: &mut TimerQueue<T>, handle: HostHandle) -> bool {
        match self.active.remove(&handle) {
            Some(fade) => {
                timers.cancel(fade.timer);
                true
            }
            None => false,
        }
    }

    /// Cancel every fade that would stop its handle and return those handles
    pub fn take_releasing<T>(&mut self, timers: &mut TimerQueue<T>) -> Vec<HostHandle> {
        let handles: Vec<HostHandle> = self
            .active
            .iter()
            .filter(|(_, f)| f.then == FadeThen::Stop)
            .map(|(h, _)| *h)
            .collect();

        for handle in &handles {
            self.cancel(timers, *handle);
        }
        handles
    }

    /// Whether a handle has a fade in flight
    pub fn is_fading(&self, handle: HostHandle) -> bool {
        self.active.contains_key(&handle)
    }

    /// Level an in-flight fade has reached at `now_ms`, by linear interpolation
    pub fn current_level(&self, handle: HostHandle, now_ms: u64) -> Option<f32> {
        self.active.get(&handle).map(|f| f.level_at(now_ms))
    }

    /// Target level of the in-flight fade on a handle
    pub fn target(&self, handle: HostHandle) -> Option<f32> {
        self.active.get(&handle).map(|f| f.to_level)
    }

    /// Number of fades in flight
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, MemoryHost, StartOptions};

    fn setup() -> (MemoryHost, TimerQueue<HostHandle>, HostHandle) {
        let mut host = MemoryHost::new();
        let handle = host
            .start_layer("audio/pad.ogg", StartOptions::looping(0.0))
            .unwrap();
        (host, TimerQueue::new(), handle)
    }

    #[test]
    fn test_fade_completes_after_duration() {
        let (mut host, mut timers, handle) = setup();
        let mut fades = FadeEngine::new();

        let request = FadeRequest::new(handle, 0.0, 0.8, 2000);
        let done = fades.fade(&mut host, &mut timers, request, |h| h);
        assert!(done.is_none());
        assert!(fades.is_fading(handle));
        assert!(timers.pop_due(1999).is_none());

        let (timer, h) = timers.pop_due(2000).unwrap();
        let completion = fades.complete(h, timer).unwrap();
        assert_eq!(completion.handle, handle);
        assert!((completion.level - 0.8).abs() < f32::EPSILON);
        assert!(!fades.is_fading(handle));
    }

    #[test]
    fn test_new_fade_supersedes_previous() {
        let (mut host, mut timers, handle) = setup();
        let mut fades = FadeEngine::new();

        let fade_in = FadeRequest::new(handle, 0.0, 1.0, 2000);
        fades.fade(&mut host, &mut timers, fade_in, |h| h);
        let release = FadeRequest::release(handle, 1.0, 2000);
        fades.fade(&mut host, &mut timers, release, |h| h);

        // Only the second completion remains scheduled
        assert_eq!(timers.len(), 1);
        assert_eq!(fades.target(handle), Some(0.0));

        let (timer, h) = timers.pop_due(u64::MAX).unwrap();
        let completion = fades.complete(h, timer).unwrap();
        assert_eq!(completion.then, FadeThen::Stop);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (mut host, mut timers, handle) = setup();
        let mut fades = FadeEngine::new();

        let request = FadeRequest::new(handle, 0.0, 1.0, 1000);
        fades.fade(&mut host, &mut timers, request, |h| h);
        assert!(fades.complete(handle, 9999).is_none());
        assert!(fades.is_fading(handle));
    }

    #[test]
    fn test_fallback_without_ramp() {
        let mut host = MemoryHost::without_ramp();
        let handle = host
            .start_layer("audio/pad.ogg", StartOptions::looping(1.0))
            .unwrap();
        let mut timers = TimerQueue::new();
        let mut fades = FadeEngine::new();

        let request = FadeRequest::new(handle, 1.0, 0.25, 500);
        fades.fade(&mut host, &mut timers, request, |h| h);

        // End level applied immediately, completion still pending
        assert_eq!(host.volume(handle), Some(0.25));
        assert!(host.calls.iter().any(|c| matches!(
            c,
            HostCall::SetVolume { value, .. } if (*value - 0.25).abs() < 1e-6
        )));
        assert_eq!(fades.current_level(handle, 0), Some(0.25));
        assert_eq!(timers.len(), 1);
        assert!(timers.pop_due(500).is_some());
    }

    #[test]
    fn test_zero_duration_completes_inline() {
        let (mut host, mut timers, handle) = setup();
        let mut fades = FadeEngine::new();

        let request = FadeRequest::release(handle, 0.5, 0);
        let done = fades.fade(&mut host, &mut timers, request, |h| h).unwrap();
        assert_eq!(done.then, FadeThen::Stop);
        assert!(timers.is_empty());
        assert_eq!(fades.active_count(), 0);
    }

    #[test]
    fn test_take_releasing() {
        let mut host = MemoryHost::new();
        let a = host.start_layer("a.ogg", StartOptions::looping(1.0)).unwrap();
        let b = host.start_layer("b.ogg", StartOptions::looping(1.0)).unwrap();
        let mut timers = TimerQueue::new();
        let mut fades = FadeEngine::new();

        let release = FadeRequest::release(a, 1.0, 1000);
        fades.fade(&mut host, &mut timers, release, |h| h);
        let duck = FadeRequest::new(b, 1.0, 0.5, 1000);
        fades.fade(&mut host, &mut timers, duck, |h| h);

        let released = fades.take_releasing(&mut timers);
        assert_eq!(released, vec![a]);
        assert!(fades.is_fading(b));
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_superseding_fade_starts_from_live_level() {
        let (mut host, mut timers, handle) = setup();
        let mut fades = FadeEngine::new();

        let fade_in = FadeRequest::new(handle, 0.0, 0.8, 2000);
        fades.fade(&mut host, &mut timers, fade_in, |h| h);
        timers.advance_to(1000);
        assert_eq!(fades.current_level(handle, 1000), Some(0.4));

        // Caller only knows the last settled gain
        let fade_out = FadeRequest::new(handle, 0.0, 0.0, 2000);
        fades.fade(&mut host, &mut timers, fade_out, |h| h);

        let from = host.calls.iter().rev().find_map(|c| match c {
            HostCall::Ramp { from, .. } => Some(*from),
            _ => None,
        });
        assert!((from.unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(fades.current_level(handle, 2000), Some(0.2));
    }
}
