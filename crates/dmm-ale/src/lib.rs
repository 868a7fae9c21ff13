//! # Adaptive Layer Engine (ALE)
//!
//! Adaptive mixing of pre-recorded multi-layer loops for a live session.
//!
//! ## Architecture
//!
//! - **Catalog**: Songs (layered loops), optional intensity tiers, bridge tracks
//! - **Mixer**: Eligible-layer filtering and random mix selection
//! - **Scheduler**: Per-session plan/execute cycle on the loop cadence
//! - **Combat**: Ambient ↔ combat mode changes through bridge tracks
//! - **Fades**: Non-stacking volume ramps with guaranteed completion
//! - **Engine**: Public play/stop/intensity/query facade
//!
//! ## Timing Model
//!
//! Everything runs on one logical queue. Deferred work is a [`Task`] held in a
//! virtual-clock [`TimerQueue`]; the host drives time with
//! [`MusicEngine::advance`]. Each timer callback runs to completion before the
//! next one fires, and every callback re-checks the identity of the session or
//! transition it was armed for before acting.

pub mod catalog;
pub mod combat;
pub mod engine;
pub mod fade;
pub mod host;
pub mod mixer;
pub mod profile;
pub mod scheduler;
pub mod session;
pub mod theory;
pub mod timer;

pub use catalog::*;
pub use combat::*;
pub use engine::*;
pub use fade::*;
pub use host::*;
pub use mixer::*;
pub use profile::*;
pub use scheduler::*;
pub use session::*;
pub use timer::*;

use thiserror::Error;

/// ALE error types
#[derive(Debug, Error)]
pub enum AleError {
    #[error("Song not found: {0}")]
    SongNotFound(String),

    #[error("Bridge not found: {0}")]
    BridgeNotFound(String),

    #[error("Host capability unavailable: {0}")]
    HostCapabilityUnavailable(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Profile error: {0}")]
    ProfileError(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AleResult<T> = Result<T, AleError>;

/// Default crossfade length used by the loop cadence (ms)
pub const DEFAULT_FADE_DURATION_MS: u64 = 2000;

/// Default number of intensity tiers
pub const DEFAULT_MAX_INTENSITY: u8 = 4;

/// Gain range for layers of non-tiered songs
pub const AMBIENT_GAIN_RANGE: GainRange = GainRange::new(0.33, 1.0);

/// Gain range for layers of tiered songs (always reads as "present")
pub const TIERED_GAIN_RANGE: GainRange = GainRange::new(0.66, 1.0);
