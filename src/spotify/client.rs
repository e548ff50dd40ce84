use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ApiError, AudioFeaturesById, Credential, SpotifyApi};
use crate::model::{AudioFeatures, Identity, Playlist, Track};

pub const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";

/// Page size for `/users/{id}/playlists` (service maximum).
const PLAYLIST_PAGE_SIZE: usize = 50;

/// Page size for `/playlists/{id}/tracks` (service maximum).
const TRACK_PAGE_SIZE: usize = 100;

/// Max ids per `/audio-features` call.
const AUDIO_FEATURES_BATCH: usize = 100;

/// Generic paging envelope. We follow `next` until it is null.
#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    display_name: Option<String>,
    country: Option<String>,
    product: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
    owner: Option<OwnerObject>,
    tracks: Option<TracksRef>,
}

#[derive(Debug, Deserialize)]
struct OwnerObject {
    id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracksRef {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    /// Null for local files
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    is_local: bool,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

impl From<UserObject> for Identity {
    fn from(u: UserObject) -> Self {
        Identity {
            id: u.id,
            display_name: u.display_name,
            country: u.country,
            product: u.product,
        }
    }
}

impl From<PlaylistObject> for Playlist {
    fn from(p: PlaylistObject) -> Self {
        Playlist {
            id: p.id,
            name: p.name,
            owner: p.owner.map(|o| o.display_name.unwrap_or(o.id)),
            total_tracks: p.tracks.map(|t| t.total).unwrap_or(0),
            track_ids: None,
        }
    }
}

impl TrackObject {
    fn into_track(self) -> Option<Track> {
        if self.is_local {
            return None;
        }
        Some(Track {
            id: self.id?,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            duration_ms: self.duration_ms,
            audio_features: None,
        })
    }
}

/// Spotify Web API client over a blocking `ureq` agent.
///
/// Each request runs on tokio's blocking pool so the calling task only
/// suspends its own continuation.
#[derive(Clone)]
pub struct HttpSpotifyClient {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpSpotifyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T>(&self, credential: &Credential, url: String) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if credential.is_expired() {
            return Err(ApiError::Auth("access token has expired".to_string()));
        }
        let agent = self.agent.clone();
        let auth = format!("Bearer {}", credential.access_token());
        tokio::task::spawn_blocking(move || fetch_json(&agent, &url, &auth))
            .await
            .map_err(|e| ApiError::Network(format!("request task failed: {e}")))?
    }

    async fn get_all_pages<T>(&self, credential: &Credential, first: String) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        collect_pages(first, |url| self.get_json::<Paging<T>>(credential, url)).await
    }
}

/// Fetch `first`, then each `next` link in turn, concatenating items in order.
async fn collect_pages<T, F, Fut>(first: String, mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Paging<T>, ApiError>>,
{
    let mut all = Vec::new();
    let mut next = Some(first);
    while let Some(url) = next {
        let page = fetch(url).await?;
        all.extend(page.items);
        next = page.next;
    }
    Ok(all)
}

/// One `/audio-features` URL per batch of at most [`AUDIO_FEATURES_BATCH`] ids.
fn audio_feature_urls(base_url: &str, track_ids: &[String]) -> Vec<String> {
    track_ids
        .chunks(AUDIO_FEATURES_BATCH)
        .map(|batch| format!("{base_url}/audio-features?ids={}", batch.join(",")))
        .collect()
}

impl SpotifyApi for HttpSpotifyClient {
    async fn resolve_identity(&self, credential: &Credential) -> Result<Identity, ApiError> {
        let url = format!("{}/me", self.base_url);
        let user: UserObject = self.get_json(credential, url).await?;
        Ok(user.into())
    }

    async fn list_all_playlists(
        &self,
        credential: &Credential,
        identity: &Identity,
    ) -> Result<Vec<Playlist>, ApiError> {
        let url = format!(
            "{}/users/{}/playlists?limit={PLAYLIST_PAGE_SIZE}",
            self.base_url,
            encode_path_segment(&identity.id)
        );
        let items: Vec<PlaylistObject> = self.get_all_pages(credential, url).await?;
        log::debug!("Fetched {} playlists for {}", items.len(), identity.id);
        Ok(items.into_iter().map(Playlist::from).collect())
    }

    async fn list_all_tracks(
        &self,
        credential: &Credential,
        playlist: &Playlist,
    ) -> Result<Vec<Track>, ApiError> {
        let url = format!(
            "{}/playlists/{}/tracks?limit={TRACK_PAGE_SIZE}",
            self.base_url,
            encode_path_segment(&playlist.id)
        );
        let items: Vec<PlaylistItem> = self.get_all_pages(credential, url).await?;
        let total = items.len();
        let tracks: Vec<Track> = items
            .into_iter()
            .filter_map(|i| i.track)
            .filter_map(TrackObject::into_track)
            .collect();
        if tracks.len() < total {
            log::info!(
                "Skipped {} local or unavailable items in playlist {}",
                total - tracks.len(),
                playlist.name
            );
        }
        Ok(tracks)
    }

    async fn fetch_audio_features(
        &self,
        credential: &Credential,
        track_ids: &[String],
    ) -> Result<AudioFeaturesById, ApiError> {
        let mut by_id = AudioFeaturesById::new();
        for url in audio_feature_urls(&self.base_url, track_ids) {
            let response: AudioFeaturesResponse = self.get_json(credential, url).await?;
            for features in response.audio_features.into_iter().flatten() {
                match features.get("id").and_then(|v| v.as_str()) {
                    Some(id) => {
                        by_id.insert(id.to_string(), features);
                    }
                    None => log::warn!("Audio features entry without an id, ignoring"),
                }
            }
        }
        log::debug!("Got audio features for {}/{} tracks", by_id.len(), track_ids.len());
        Ok(by_id)
    }
}

fn fetch_json<T: DeserializeOwned>(agent: &ureq::Agent, url: &str, auth: &str) -> Result<T, ApiError> {
    log::debug!("Fetching {url}");
    let mut response = agent
        .get(url)
        .header("Authorization", auth)
        .call()
        .map_err(|e| classify_error(url, e))?;
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|e| ApiError::Network(format!("invalid response body from {url}: {e}")))
}

fn classify_error(url: &str, err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::StatusCode(code @ (401 | 403)) => {
            ApiError::Auth(format!("{url} returned HTTP {code}"))
        }
        ureq::Error::StatusCode(code) => ApiError::Network(format!("{url} returned HTTP {code}")),
        other => ApiError::Network(format!("request to {url} failed: {other}")),
    }
}

/// Percent-encode everything outside the URL unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
