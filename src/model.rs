use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
}

impl Identity {
    /// Display name, falling back to the account id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// A playlist owned or followed by the identity.
///
/// `track_ids` is `None` until the track list has been fetched, then holds
/// identifiers in playlist order (duplicates included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub total_tracks: u32,
    pub track_ids: Option<Vec<String>>,
}

/// Per-track feature vector as delivered by the service.
///
/// Values stay as raw JSON so a non-numeric entry is representable and can be
/// reported at projection time rather than rejected on fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioFeatures(BTreeMap<String, Value>);

impl AudioFeatures {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for AudioFeatures {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub duration_ms: u64,
    pub audio_features: Option<AudioFeatures>,
}

impl Track {
    /// Artists joined for display.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Single in-memory source of truth for one session.
///
/// Tracks are stored once and referenced from playlists by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedModel {
    pub identity: Option<Identity>,
    pub playlists: HashMap<String, Playlist>,
    pub tracks: HashMap<String, Track>,
}

impl UnifiedModel {
    /// Tracks of a playlist in playlist order. Empty if the list is unknown.
    pub fn playlist_tracks(&self, playlist_id: &str) -> Vec<&Track> {
        self.playlists
            .get(playlist_id)
            .and_then(|p| p.track_ids.as_ref())
            .map(|ids| ids.iter().filter_map(|id| self.tracks.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ids of tracks with no feature vector attached, sorted.
    pub fn tracks_missing_features(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tracks
            .values()
            .filter(|t| t.audio_features.is_none())
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every id referenced by a fetched playlist exists in `tracks`.
    pub fn is_consistent(&self) -> bool {
        self.playlists
            .values()
            .filter_map(|p| p.track_ids.as_ref())
            .flatten()
            .all(|id| self.tracks.contains_key(id))
    }

    /// Find a playlist by id, or by case-insensitive name.
    pub fn find_playlist(&self, needle: &str) -> Option<&Playlist> {
        if let Some(p) = self.playlists.get(needle) {
            return Some(p);
        }
        let lower = needle.to_lowercase();
        let mut matches: Vec<&Playlist> = self
            .playlists
            .values()
            .filter(|p| p.name.to_lowercase() == lower)
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.into_iter().next()
    }
}
