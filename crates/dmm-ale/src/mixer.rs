//! Intensity Mixer
//!
//! Decides which layers may sound and picks the next random mix:
//! - Untiered songs: every layer is eligible
//! - Tiered songs: a layer is eligible iff its tier ≤ the intensity level
//! - A mix keeps between max(1, ⌈n/2⌉) and n of the n eligible layers
//!
//! Randomness always comes from the caller so a seeded generator reproduces
//! the same sequence of mixes.

use crate::catalog::Song;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Inclusive gain bounds for randomly chosen layer levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainRange {
    pub min: f32,
    pub max: f32,
}

impl GainRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range appropriate for a song's material
    pub fn for_song(song: &Song) -> Self {
        if song.is_tiered() {
            crate::TIERED_GAIN_RANGE
        } else {
            crate::AMBIENT_GAIN_RANGE
        }
    }

    /// Draw a gain inside the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    /// Check if a gain lies inside the range
    pub fn contains(&self, gain: f32) -> bool {
        gain >= self.min && gain <= self.max
    }
}

/// Indices of the layers allowed to sound at `intensity`
pub fn eligible_layers(song: &Song, intensity: u8) -> Vec<usize> {
    song.layers
        .iter()
        .enumerate()
        .filter(|(_, layer)| match layer.tier {
            Some(tier) => tier <= intensity,
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Inclusive bounds on the audible-set size for `eligible` layers
pub fn mix_size_bounds(eligible: usize) -> (usize, usize) {
    if eligible == 0 {
        return (0, 0);
    }
    (eligible.div_ceil(2).max(1), eligible)
}

/// Planned layer membership for the next mix change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixPlan {
    /// (layer index, target gain) for every layer that should sound
    pub levels: Vec<(usize, f32)>,
    /// Layers turning on relative to the previous audible set
    pub entering: Vec<usize>,
    /// Layers turning off relative to the previous audible set
    pub leaving: Vec<usize>,
}

impl MixPlan {
    /// Number of audible layers
    pub fn audible_count(&self) -> usize {
        self.levels.len()
    }

    /// Whether a layer is part of the mix
    pub fn is_audible(&self, index: usize) -> bool {
        self.levels.iter().any(|(i, _)| *i == index)
    }

    /// Planned gain of a layer, if audible
    pub fn gain_of(&self, index: usize) -> Option<f32> {
        self.levels.iter().find(|(i, _)| *i == index).map(|(_, g)| *g)
    }

    /// Audible layer indices in ascending order
    pub fn audible(&self) -> Vec<usize> {
        let mut audible: Vec<usize> = self.levels.iter().map(|(i, _)| *i).collect();
        audible.sort_unstable();
        audible
    }

    /// Drop layers that are no longer eligible
    pub fn retain_eligible(&mut self, eligible: &[usize]) {
        self.levels.retain(|(i, _)| eligible.contains(i));
        self.entering.retain(|i| eligible.contains(i));
    }
}

/// Choose a random subset of `eligible` and a gain for each chosen layer.
///
/// `previous_audible` is the currently sounding set; it only feeds the
/// `entering`/`leaving` bookkeeping of the plan.
pub fn pick_mix<R: Rng + ?Sized>(
    eligible: &[usize],
    previous_audible: &[usize],
    gains: GainRange,
    rng: &mut R,
) -> MixPlan {
    let (min, max) = mix_size_bounds(eligible.len());
    if max == 0 {
        return MixPlan {
            levels: Vec::new(),
            entering: Vec::new(),
            leaving: previous_audible.to_vec(),
        };
    }

    let count = rng.random_range(min..=max);

    let mut pool = eligible.to_vec();
    pool.shuffle(rng);
    pool.truncate(count);

    let levels: Vec<(usize, f32)> = pool.iter().map(|&i| (i, gains.sample(rng))).collect();
    let entering = pool
        .iter()
        .copied()
        .filter(|i| !previous_audible.contains(i))
        .collect();
    let leaving = previous_audible
        .iter()
        .copied()
        .filter(|i| !pool.contains(i))
        .collect();

    MixPlan {
        levels,
        entering,
        leaving,
    }
}
