//! Profile System
//!
//! Load and save music profiles (song library plus engine settings) from/to
//! JSON.

use crate::catalog::{Bridge, Catalog, Song};
use crate::combat::CombatConfig;
use crate::engine::{EngineConfig, MusicEngine};
use crate::host::AudioHost;
use crate::{AleError, AleResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Profile format version
pub const PROFILE_VERSION: &str = "1.0";

/// Complete music profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicProfile {
    /// Profile format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Format identifier
    #[serde(default = "default_format")]
    pub format: String,
    /// Author name
    #[serde(default)]
    pub author: String,
    /// Song library
    #[serde(default)]
    pub songs: Vec<Song>,
    /// Bridge tracks
    #[serde(default)]
    pub bridges: Vec<Bridge>,
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Combat mode settings
    #[serde(default)]
    pub combat: CombatConfig,
}

fn default_version() -> String {
    PROFILE_VERSION.to_string()
}

fn default_format() -> String {
    "dmm_profile".to_string()
}

impl Default for MusicProfile {
    fn default() -> Self {
        Self {
            version: PROFILE_VERSION.to_string(),
            format: default_format(),
            author: String::new(),
            songs: Vec::new(),
            bridges: Vec::new(),
            engine: EngineConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl MusicProfile {
    /// Create a new empty profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Load profile from JSON string
    pub fn from_json(json: &str) -> AleResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)?;

        let version = raw["version"].as_str().unwrap_or(PROFILE_VERSION);
        if version != PROFILE_VERSION {
            return Err(AleError::ProfileError(format!(
                "Unknown profile version: {}",
                version
            )));
        }

        let mut profile: Self = serde_json::from_value(raw)?;
        profile.version = PROFILE_VERSION.to_string();
        Ok(profile)
    }

    /// Load profile from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> AleResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save profile to JSON string
    pub fn to_json(&self) -> AleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate profile
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut names = HashSet::new();
        for song in &self.songs {
            if let Err(e) = song.validate() {
                errors.push(format!("Song '{}': {}", song.name, e));
            }
            if !names.insert(song.name.as_str()) {
                errors.push(format!("Duplicate song name '{}'", song.name));
            }
            let top_tier = song.layers.iter().filter_map(|l| l.tier).max().unwrap_or(0);
            if top_tier > self.engine.max_intensity {
                errors.push(format!(
                    "Song '{}' has tier {} above max intensity {}",
                    song.name, top_tier, self.engine.max_intensity
                ));
            }
        }

        let mut bridge_names = HashSet::new();
        for bridge in &self.bridges {
            if bridge.path.is_empty() {
                errors.push(format!("Bridge '{}' has no source", bridge.name));
            }
            if bridge.duration_ms == 0 {
                errors.push(format!("Bridge '{}' has zero duration", bridge.name));
            }
            if !bridge_names.insert(bridge.name.as_str()) {
                errors.push(format!("Duplicate bridge name '{}'", bridge.name));
            }
        }

        match self.songs.iter().find(|s| s.name == self.combat.combat_song) {
            Some(song) if !song.is_tiered() => errors.push(format!(
                "Combat song '{}' has no intensity tiers",
                song.name
            )),
            Some(_) => {}
            None => errors.push(format!(
                "Combat song '{}' not found",
                self.combat.combat_song
            )),
        }
        if !names.contains(self.combat.ambient_song.as_str()) {
            errors.push(format!(
                "Ambient song '{}' not found",
                self.combat.ambient_song
            ));
        }

        if self.engine.max_intensity == 0 {
            errors.push("Max intensity must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.engine.initial_gain) {
            errors.push(format!("Initial gain {} out of range", self.engine.initial_gain));
        }
        if !(0.0..=1.0).contains(&self.engine.bridge_gain) {
            errors.push(format!("Bridge gain {} out of range", self.engine.bridge_gain));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Build the song/bridge catalog
    pub fn to_catalog(&self) -> Catalog {
        Catalog::from_parts(self.songs.clone(), self.bridges.clone())
    }

    /// Build an engine configured from this profile
    pub fn build_engine<H: AudioHost, R: Rng>(&self, host: H, rng: R) -> MusicEngine<H, R> {
        MusicEngine::new(self.to_catalog(), host, rng)
            .with_config(self.engine.clone())
            .with_combat_config(self.combat.clone())
    }

    /// Get song count
    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    /// Get bridge count
    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Layer;

    fn sample_profile() -> MusicProfile {
        let mut profile = MusicProfile::new();
        profile.author = "Test Author".to_string();
        profile.songs.push(
            Song::new("Sylvan Stillness", 78000)
                .with_layer(Layer::new("audio/Sylvan Stillness/Harp.ogg"))
                .with_layer(Layer::new("audio/Sylvan Stillness/Pad.ogg")),
        );
        profile.songs.push(
            Song::new("The First Battle", 153600)
                .with_layer(Layer::tiered("audio/The First Battle/Bass.ogg", 1))
                .with_layer(Layer::tiered("audio/The First Battle/Horns.ogg", 3)),
        );
        profile.bridges.push(
            Bridge::new("C to Amin", "audio/bridges/c-to-amin.ogg", 8000, "C").ending_in("a"),
        );
        profile
    }

    #[test]
    fn test_profile_serialization() {
        let profile = sample_profile();
        let json = profile.to_json().unwrap();
        assert!(json.contains("Test Author"));
        assert!(json.contains("dmm_profile"));

        let loaded = MusicProfile::from_json(&json).unwrap();
        assert_eq!(loaded.song_count(), 2);
        assert_eq!(loaded.bridge_count(), 1);
        assert_eq!(loaded.songs[1].layers[1].tier, Some(3));
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "version": "1.0",
            "songs": [
                { "name": "Pad", "duration_ms": 4000, "layers": [ { "path": "pad.ogg" } ] }
            ]
        }"#;
        let profile = MusicProfile::from_json(json).unwrap();
        assert_eq!(profile.format, "dmm_profile");
        assert_eq!(profile.engine.fade_duration_ms, 2000);
        assert_eq!(profile.engine.stop_fade_ms, 0);
        assert_eq!(profile.combat.guard_buffer_ms, 1000);
        assert!(!profile.songs[0].is_tiered());
    }

    #[test]
    fn test_bridge_end_fields_default_to_start() {
        let json = r#"{
            "version": "1.0",
            "bridges": [
                { "name": "Loop", "path": "b.ogg", "duration_ms": 3000,
                  "start_key": "C", "start_meter": "4/4", "start_tempo": 90.0,
                  "start_tags": ["calm"] }
            ]
        }"#;
        let profile = MusicProfile::from_json(json).unwrap();
        let bridge = &profile.bridges[0];
        assert_eq!(bridge.end_key(), "C");
        assert_eq!(bridge.end_meter(), "4/4");
        assert_eq!(bridge.end_tempo(), 90.0);
        assert_eq!(bridge.end_tags(), ["calm".to_string()]);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let result = MusicProfile::from_json(r#"{"version": "9.9"}"#);
        assert!(matches!(result, Err(AleError::ProfileError(_))));
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_profile().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut profile = sample_profile();
        profile.combat.combat_song = "Sylvan Stillness".to_string();
        profile.combat.ambient_song = "Nowhere".to_string();
        profile.songs.push(Song::new("Empty", 1000));
        profile.bridges[0].duration_ms = 0;

        let errors = profile.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("no intensity tiers")));
        assert!(errors.iter().any(|e| e.contains("Ambient song 'Nowhere'")));
        assert!(errors.iter().any(|e| e.starts_with("Song 'Empty'")));
        assert!(errors.iter().any(|e| e.contains("zero duration")));
    }

    #[test]
    fn test_validate_tier_above_max() {
        let mut profile = sample_profile();
        profile.engine.max_intensity = 2;
        let errors = profile.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("tier 3 above max intensity 2")));
    }

    #[test]
    fn test_to_catalog() {
        let catalog = sample_profile().to_catalog();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.find_song("The First Battle").unwrap().is_tiered());
        assert!(catalog.find_bridge("C to Amin").is_some());
    }
}
