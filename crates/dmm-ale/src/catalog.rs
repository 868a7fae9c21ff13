//! Catalog
//!
//! Immutable description of the music available to a session:
//! - Songs: layered loops with a fixed cycle length
//! - Layers: one stem each, optionally gated by an intensity tier
//! - Bridges: one-shot tracks connecting two moods/keys
//!
//! A song is tiered when its layers carry intensity tiers. Tiered material
//! drives combat; everything else is ambient.

use crate::theory;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Intensity tier (1..=K)
pub type Tier = u8;

/// One audio stem of a song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Source reference (file path or URI)
    pub path: String,
    /// Intensity tier, only for tiered songs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl Layer {
    /// Untiered layer
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            tier: None,
        }
    }

    /// Layer gated by an intensity tier
    pub fn tiered(path: &str, tier: Tier) -> Self {
        Self {
            path: path.to_string(),
            tier: Some(tier),
        }
    }

    /// Display name: file stem of the source path
    pub fn name(&self) -> &str {
        let file = self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path);
        match file.rfind('.') {
            Some(dot) if dot > 0 => &file[..dot],
            _ => file,
        }
    }

    /// Effective tier (untiered layers are always eligible)
    #[inline]
    pub fn effective_tier(&self) -> Tier {
        self.tier.unwrap_or(0)
    }
}

/// A layered loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    /// Unique name
    pub name: String,
    /// Layers in playback order
    pub layers: Vec<Layer>,
    /// Genre/mood/location tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Loop length (ms)
    pub duration_ms: u64,
    /// Musical key (e.g. "D", "a")
    #[serde(default)]
    pub key: String,
    /// Time signature (e.g. "4/4")
    #[serde(default)]
    pub meter: String,
    /// Tempo in BPM
    #[serde(default)]
    pub tempo: f32,
}

impl Song {
    /// Create a song with no layers
    pub fn new(name: &str, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            layers: Vec::new(),
            tags: Vec::new(),
            duration_ms,
            key: String::new(),
            meter: String::new(),
            tempo: 0.0,
        }
    }

    /// Builder: add a layer
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Builder: set tags
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Builder: set musical metadata
    pub fn with_character(mut self, key: &str, meter: &str, tempo: f32) -> Self {
        self.key = key.to_string();
        self.meter = meter.to_string();
        self.tempo = tempo;
        self
    }

    /// Whether layers are gated by intensity tiers
    pub fn is_tiered(&self) -> bool {
        self.layers.iter().any(|l| l.tier.is_some())
    }

    /// Highest tier among the layers (0 for untiered songs)
    pub fn max_tier(&self) -> Tier {
        self.layers
            .iter()
            .map(Layer::effective_tier)
            .max()
            .unwrap_or(0)
    }

    /// Case-insensitive tag check
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Validate song definition
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Song name cannot be empty".to_string());
        }
        if self.layers.is_empty() {
            return Err("Song must have at least one layer".to_string());
        }
        if self.duration_ms == 0 {
            return Err("Song duration must be positive".to_string());
        }

        let tiered = self.layers.iter().filter(|l| l.tier.is_some()).count();
        if tiered != 0 && tiered != self.layers.len() {
            return Err("Either every layer or no layer must carry a tier".to_string());
        }
        if self.layers.iter().any(|l| l.tier == Some(0)) {
            return Err("Intensity tiers start at 1".to_string());
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.path.as_str()) {
                return Err(format!("Duplicate layer path: {}", layer.path));
            }
        }

        Ok(())
    }
}

/// One-shot track bridging two moods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    /// Unique name
    pub name: String,
    /// Source reference
    pub path: String,
    /// Length (ms); authoritative for the hard cut into the destination
    pub duration_ms: u64,
    #[serde(default)]
    pub start_tags: Vec<String>,
    #[serde(default)]
    pub end_tags: Option<Vec<String>>,
    #[serde(default)]
    pub start_key: String,
    #[serde(default)]
    pub end_key: Option<String>,
    #[serde(default)]
    pub start_meter: String,
    #[serde(default)]
    pub end_meter: Option<String>,
    #[serde(default)]
    pub start_tempo: f32,
    #[serde(default)]
    pub end_tempo: Option<f32>,
}

impl Bridge {
    /// Bridge with the same start/end character
    pub fn new(name: &str, path: &str, duration_ms: u64, key: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            duration_ms,
            start_tags: Vec::new(),
            end_tags: None,
            start_key: key.to_string(),
            end_key: None,
            start_meter: String::new(),
            end_meter: None,
            start_tempo: 0.0,
            end_tempo: None,
        }
    }

    /// Builder: set the key the bridge lands in
    pub fn ending_in(mut self, key: &str) -> Self {
        self.end_key = Some(key.to_string());
        self
    }

    /// Tags at the end (defaults to the start tags)
    pub fn end_tags(&self) -> &[String] {
        self.end_tags.as_deref().unwrap_or(&self.start_tags)
    }

    /// Key at the end (defaults to the start key)
    pub fn end_key(&self) -> &str {
        self.end_key.as_deref().unwrap_or(&self.start_key)
    }

    /// Meter at the end (defaults to the start meter)
    pub fn end_meter(&self) -> &str {
        self.end_meter.as_deref().unwrap_or(&self.start_meter)
    }

    /// Tempo at the end (defaults to the start tempo)
    pub fn end_tempo(&self) -> f32 {
        self.end_tempo.unwrap_or(self.start_tempo)
    }
}

/// Song and bridge lookup
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: Vec<Arc<Song>>,
    bridges: Vec<Arc<Bridge>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from definitions; later duplicates of a name are dropped
    pub fn from_parts(songs: Vec<Song>, bridges: Vec<Bridge>) -> Self {
        let mut catalog = Self::new();
        for song in songs {
            catalog.add_song(song);
        }
        for bridge in bridges {
            catalog.add_bridge(bridge);
        }
        catalog
    }

    /// Register a song. Returns false if the name is taken.
    pub fn add_song(&mut self, song: Song) -> bool {
        if self.find_song(&song.name).is_some() {
            log::warn!("Duplicate song '{}' ignored", song.name);
            return false;
        }
        self.songs.push(Arc::new(song));
        true
    }

    /// Register a bridge. Returns false if the name is taken.
    pub fn add_bridge(&mut self, bridge: Bridge) -> bool {
        if self.find_bridge(&bridge.name).is_some() {
            log::warn!("Duplicate bridge '{}' ignored", bridge.name);
            return false;
        }
        self.bridges.push(Arc::new(bridge));
        true
    }

    /// Get a song by name
    pub fn find_song(&self, name: &str) -> Option<Arc<Song>> {
        self.songs.iter().find(|s| s.name == name).cloned()
    }

    /// Get a bridge by name
    pub fn find_bridge(&self, name: &str) -> Option<Arc<Bridge>> {
        self.bridges.iter().find(|b| b.name == name).cloned()
    }

    /// All songs in definition order
    pub fn all_songs(&self) -> &[Arc<Song>] {
        &self.songs
    }

    /// All bridges in definition order
    pub fn all_bridges(&self) -> &[Arc<Bridge>] {
        &self.bridges
    }

    /// Songs carrying a tag
    pub fn songs_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Arc<Song>> + 'a {
        self.songs.iter().filter(move |s| s.has_tag(tag))
    }

    /// Untiered songs
    pub fn ambient_songs(&self) -> impl Iterator<Item = &Arc<Song>> {
        self.songs.iter().filter(|s| !s.is_tiered())
    }

    /// Tiered songs
    pub fn combat_songs(&self) -> impl Iterator<Item = &Arc<Song>> {
        self.songs.iter().filter(|s| s.is_tiered())
    }

    /// Random untiered song
    pub fn random_ambient<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Arc<Song>> {
        let ambient: Vec<&Arc<Song>> = self.ambient_songs().collect();
        ambient.choose(rng).map(|s| Arc::clone(s))
    }

    /// Highest tier across all songs
    pub fn max_tier(&self) -> Tier {
        self.songs.iter().map(|s| s.max_tier()).max().unwrap_or(0)
    }

    /// Pick the bridge that best connects `from` to `to`.
    ///
    /// Preference order:
    /// 1. start key matches `from` and end key matches `to`
    /// 2. end key matches `to`, start key closely related to `from`
    /// 3. end key matches `to`
    pub fn bridge_between(&self, from: Option<&Song>, to: &Song) -> Option<Arc<Bridge>> {
        let landing: Vec<&Arc<Bridge>> = self
            .bridges
            .iter()
            .filter(|b| theory::same_key(b.end_key(), &to.key))
            .collect();

        if let Some(from) = from {
            if let Some(exact) = landing
                .iter()
                .find(|b| theory::same_key(&b.start_key, &from.key))
            {
                return Some(Arc::clone(exact));
            }
            if let Some(related) = landing
                .iter()
                .find(|b| theory::is_related_key(&from.key, &b.start_key))
            {
                return Some(Arc::clone(related));
            }
        }

        landing.first().map(|b| Arc::clone(b))
    }

    /// Number of songs
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Check if the catalog has no songs
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ambient() -> Song {
        Song::new("Gnomish Playground", 19200)
            .with_layer(Layer::new("audio/Gnomish Playground/Cello.ogg"))
            .with_layer(Layer::new("audio/Gnomish Playground/Flute.ogg"))
            .with_tags(&["playful", "peaceful"])
            .with_character("C", "4/4", 100.0)
    }

    fn combat() -> Song {
        Song::new("The First Battle", 153600)
            .with_layer(Layer::tiered("audio/The First Battle/Double Bass.ogg", 1))
            .with_layer(Layer::tiered("audio/The First Battle/Timpani.ogg", 2))
            .with_layer(Layer::tiered("audio/The First Battle/Gong.ogg", 4))
            .with_tags(&["combat"])
            .with_character("a", "4/4", 100.0)
    }

    #[test]
    fn test_layer_name() {
        assert_eq!(Layer::new("audio/Sylvan Stillness/Vio. Solo.ogg").name(), "Vio. Solo");
        assert_eq!(Layer::new("Pad").name(), "Pad");
        assert_eq!(Layer::new("C:\\music\\Harp.ogg").name(), "Harp");
    }

    #[test]
    fn test_tiered_predicate() {
        assert!(!ambient().is_tiered());
        assert!(combat().is_tiered());
        assert_eq!(combat().max_tier(), 4);
        assert_eq!(ambient().max_tier(), 0);
    }

    #[test]
    fn test_lookup() {
        let catalog = Catalog::from_parts(vec![ambient(), combat()], Vec::new());
        assert!(catalog.find_song("The First Battle").is_some());
        assert!(catalog.find_song("Nope").is_none());
        assert!(catalog.find_bridge("Nope").is_none());
        assert_eq!(catalog.all_songs().len(), 2);
        assert_eq!(catalog.combat_songs().count(), 1);
        assert_eq!(catalog.songs_tagged("PEACEFUL").count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut catalog = Catalog::new();
        assert!(catalog.add_song(ambient()));
        assert!(!catalog.add_song(ambient()));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_song_validation() {
        assert!(ambient().validate().is_ok());
        assert!(Song::new("Empty", 1000).validate().is_err());
        assert!(Song::new("Zero", 0)
            .with_layer(Layer::new("a.ogg"))
            .validate()
            .is_err());

        let mixed = Song::new("Mixed", 1000)
            .with_layer(Layer::new("a.ogg"))
            .with_layer(Layer::tiered("b.ogg", 1));
        assert!(mixed.validate().is_err());
    }

    #[test]
    fn test_bridge_defaults() {
        let bridge =
            Bridge::new("C to Amin", "audio/Transitions/c-a.ogg", 9600, "C").ending_in("a");
        assert_eq!(bridge.end_key(), "a");
        assert_eq!(bridge.end_meter(), "");
        assert!(bridge.end_tags().is_empty());

        let flat = Bridge::new("Flat", "flat.ogg", 1000, "D");
        assert_eq!(flat.end_key(), "D");
    }

    #[test]
    fn test_bridge_between_prefers_exact_keys() {
        let catalog = Catalog::from_parts(
            vec![ambient(), combat()],
            vec![
                Bridge::new("G to a", "g-a.ogg", 4000, "G").ending_in("a"),
                Bridge::new("C to a", "c-a.ogg", 9600, "C").ending_in("A minor"),
                Bridge::new("C to D", "c-d.ogg", 4000, "C").ending_in("D"),
            ],
        );
        let from = catalog.find_song("Gnomish Playground").unwrap();
        let to = catalog.find_song("The First Battle").unwrap();

        let bridge = catalog.bridge_between(Some(&from), &to).unwrap();
        assert_eq!(bridge.name, "C to a");

        // Without a source, any bridge landing in the right key will do
        let bridge = catalog.bridge_between(None, &to).unwrap();
        assert_eq!(bridge.name, "G to a");
    }

    #[test]
    fn test_bridge_between_related_key() {
        let catalog = Catalog::from_parts(
            vec![ambient(), combat()],
            vec![
                Bridge::new("Eb to a", "eb-a.ogg", 4000, "Eb").ending_in("a"),
                Bridge::new("G to a", "g-a.ogg", 4000, "G").ending_in("a"),
            ],
        );
        let from = ambient();
        let bridge = catalog.bridge_between(Some(&from), &combat()).unwrap();
        assert_eq!(bridge.name, "G to a");
    }

    #[test]
    fn test_random_ambient_never_tiered() {
        let catalog = Catalog::from_parts(vec![ambient(), combat()], Vec::new());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let song = catalog.random_ambient(&mut rng).unwrap();
            assert!(!song.is_tiered());
        }
    }
}
