//! Sync state machine for the unified model.
//!
//! `SyncEngine` is pure: user actions and fetch completions go in, fetch
//! intents come out. Each intent carries a [`Ticket`] recording the account
//! generation and credential epoch it was issued under; a completion whose
//! ticket no longer matches is discarded instead of merged.

pub mod session;

use std::collections::HashSet;
use std::collections::hash_map::Entry;

use thiserror::Error;

use crate::model::{Identity, Playlist, Track, UnifiedModel};
use crate::spotify::{ApiError, AudioFeaturesById, Credential};

pub use session::{SyncReport, SyncSession};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("unknown playlist: {0}")]
    UnknownPlaylist(String),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Api(e) => e.is_auth(),
            Self::NotAuthenticated => true,
            Self::UnknownPlaylist(_) => false,
        }
    }
}

/// State snapshot an intent was issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    /// Bumped whenever account-scoped data is discarded.
    generation: u64,
    /// Bumped whenever the credential is set or cleared.
    epoch: u64,
}

/// A remote fetch the caller should perform.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchIntent {
    ResolveIdentity {
        ticket: Ticket,
        credential: Credential,
    },
    ListPlaylists {
        ticket: Ticket,
        credential: Credential,
        identity: Identity,
    },
    ListTracks {
        ticket: Ticket,
        credential: Credential,
        playlist: Playlist,
    },
    AudioFeatures {
        ticket: Ticket,
        credential: Credential,
        track_ids: Vec<String>,
    },
}

/// Result of a [`FetchIntent`], fed back through [`SyncEngine::complete`].
#[derive(Debug, Clone)]
pub enum Completion {
    Identity {
        ticket: Ticket,
        result: Result<Identity, ApiError>,
    },
    Playlists {
        ticket: Ticket,
        result: Result<Vec<Playlist>, ApiError>,
    },
    Tracks {
        ticket: Ticket,
        playlist_id: String,
        result: Result<Vec<Track>, ApiError>,
    },
    AudioFeatures {
        ticket: Ticket,
        track_ids: Vec<String>,
        result: Result<AudioFeaturesById, ApiError>,
    },
}

/// What happened to a completion.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Merged; these follow-up fetches are now due.
    Applied(Vec<FetchIntent>),
    /// Issued against superseded state and dropped.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    IdentityPending,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistState {
    /// Track list not fetched.
    Unknown,
    /// Track ids known but some track objects are not in the store.
    Listed,
    /// Some tracks still wait on audio features.
    FeaturesPending,
    Complete,
}

#[derive(Debug, Default)]
pub struct SyncEngine {
    model: UnifiedModel,
    credential: Option<Credential>,
    generation: u64,
    epoch: u64,
    identity_pending: bool,
    playlists_in_flight: bool,
    tracks_in_flight: HashSet<String>,
    features_in_flight: HashSet<String>,
    /// Requested ids the service returned no vector for.
    features_unavailable: HashSet<String>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> &UnifiedModel {
        &self.model
    }

    /// A lookup for a newly set credential reports `IdentityPending` even
    /// while the previous identity is still held.
    pub fn state(&self) -> SessionState {
        if self.identity_pending {
            SessionState::IdentityPending
        } else if self.model.identity.is_some() {
            SessionState::Ready
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn playlist_state(&self, playlist_id: &str) -> Option<PlaylistState> {
        let playlist = self.model.playlists.get(playlist_id)?;
        let Some(ids) = &playlist.track_ids else {
            return Some(PlaylistState::Unknown);
        };
        let mut waiting = false;
        for id in ids {
            match self.model.tracks.get(id) {
                None => return Some(PlaylistState::Listed),
                Some(t) if t.audio_features.is_none() && !self.features_unavailable.contains(id) => {
                    waiting = true;
                }
                Some(_) => {}
            }
        }
        Some(if waiting {
            PlaylistState::FeaturesPending
        } else {
            PlaylistState::Complete
        })
    }

    /// Ids the service reported as having no audio features.
    pub fn features_unavailable(&self) -> &HashSet<String> {
        &self.features_unavailable
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            epoch: self.epoch,
        }
    }

    fn authenticated(&self) -> Result<(Credential, Identity), SyncError> {
        match (&self.credential, &self.model.identity) {
            (Some(c), Some(i)) => Ok((c.clone(), i.clone())),
            _ => Err(SyncError::NotAuthenticated),
        }
    }

    /// Drop all account-scoped data and start a new generation.
    fn reset_account(&mut self, identity: Option<Identity>) {
        self.generation += 1;
        self.model.identity = identity;
        self.model.playlists.clear();
        self.model.tracks.clear();
        self.playlists_in_flight = false;
        self.tracks_in_flight.clear();
        self.features_in_flight.clear();
        self.features_unavailable.clear();
    }

    /// Set or clear the credential. Setting one always re-resolves the identity.
    pub fn set_credential(&mut self, credential: Option<Credential>) -> Vec<FetchIntent> {
        self.epoch += 1;
        match credential {
            None => {
                self.credential = None;
                self.identity_pending = false;
                if let Some(prev) = &self.model.identity {
                    log::info!("Signed out {}", prev.label());
                }
                self.reset_account(None);
                Vec::new()
            }
            Some(credential) => {
                if credential.is_expired() {
                    log::warn!("Credential is already expired; identity lookup will fail");
                }
                self.credential = Some(credential.clone());
                self.identity_pending = true;
                vec![FetchIntent::ResolveIdentity {
                    ticket: self.ticket(),
                    credential,
                }]
            }
        }
    }

    /// Ask for the full playlist collection. `None` if a listing is already in flight.
    pub fn request_playlists_refresh(&mut self) -> Result<Option<FetchIntent>, SyncError> {
        let (credential, identity) = self.authenticated()?;
        if self.playlists_in_flight {
            log::debug!("Playlist listing already in flight");
            return Ok(None);
        }
        self.playlists_in_flight = true;
        Ok(Some(FetchIntent::ListPlaylists {
            ticket: self.ticket(),
            credential,
            identity,
        }))
    }

    /// Ask for one playlist's tracks. `None` if that playlist is already in flight.
    pub fn request_playlist_refresh(
        &mut self,
        playlist_id: &str,
    ) -> Result<Option<FetchIntent>, SyncError> {
        let (credential, _) = self.authenticated()?;
        let playlist = self
            .model
            .playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPlaylist(playlist_id.to_string()))?;
        if !self.tracks_in_flight.insert(playlist.id.clone()) {
            log::debug!("Tracks for {} already in flight", playlist.name);
            return Ok(None);
        }
        Ok(Some(FetchIntent::ListTracks {
            ticket: self.ticket(),
            credential,
            playlist,
        }))
    }

    /// Recompute outstanding audio-feature work from current model state.
    ///
    /// Skips ids already in flight and ids the service has no vector for.
    pub fn reconcile(&mut self) -> Vec<FetchIntent> {
        let Ok((credential, _)) = self.authenticated() else {
            return Vec::new();
        };
        let missing: Vec<String> = self
            .model
            .tracks_missing_features()
            .into_iter()
            .filter(|id| !self.features_in_flight.contains(id) && !self.features_unavailable.contains(id))
            .collect();
        if missing.is_empty() {
            return Vec::new();
        }
        log::debug!("Requesting audio features for {} tracks", missing.len());
        self.features_in_flight.extend(missing.iter().cloned());
        vec![FetchIntent::AudioFeatures {
            ticket: self.ticket(),
            credential,
            track_ids: missing,
        }]
    }

    /// Merge a fetch result. Failures leave the model untouched.
    pub fn complete(&mut self, completion: Completion) -> Result<Step, SyncError> {
        match completion {
            Completion::Identity { ticket, result } => self.on_identity(ticket, result),
            Completion::Playlists { ticket, result } => self.on_playlists(ticket, result),
            Completion::Tracks {
                ticket,
                playlist_id,
                result,
            } => self.on_tracks(ticket, &playlist_id, result),
            Completion::AudioFeatures {
                ticket,
                track_ids,
                result,
            } => self.on_audio_features(ticket, &track_ids, result),
        }
    }

    fn on_identity(
        &mut self,
        ticket: Ticket,
        result: Result<Identity, ApiError>,
    ) -> Result<Step, SyncError> {
        if ticket.epoch != self.epoch {
            log::debug!("Discarding identity lookup for a replaced credential");
            return Ok(Step::Stale);
        }
        self.identity_pending = false;
        let identity = result?;

        match &self.model.identity {
            Some(prev) if prev.id == identity.id => {
                log::debug!("Credential refreshed for {}", identity.label());
                self.model.identity = Some(identity);
                Ok(Step::Applied(Vec::new()))
            }
            prev => {
                match prev {
                    Some(prev) => log::info!(
                        "Account changed from {} to {}, clearing cached data",
                        prev.label(),
                        identity.label()
                    ),
                    None => log::info!("Signed in as {}", identity.label()),
                }
                self.reset_account(Some(identity));
                Ok(Step::Applied(self.request_playlists_refresh()?.into_iter().collect()))
            }
        }
    }

    fn on_playlists(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Playlist>, ApiError>,
    ) -> Result<Step, SyncError> {
        if ticket.generation != self.generation {
            log::debug!("Discarding playlist listing from a previous account");
            return Ok(Step::Stale);
        }
        self.playlists_in_flight = false;
        let playlists = result?;
        log::info!("Loaded {} playlists", playlists.len());
        self.model.playlists = playlists.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(Step::Applied(Vec::new()))
    }

    fn on_tracks(
        &mut self,
        ticket: Ticket,
        playlist_id: &str,
        result: Result<Vec<Track>, ApiError>,
    ) -> Result<Step, SyncError> {
        if ticket.generation != self.generation {
            log::debug!("Discarding tracks for {playlist_id} from a previous account");
            return Ok(Step::Stale);
        }
        self.tracks_in_flight.remove(playlist_id);
        let tracks = result?;
        if !self.model.playlists.contains_key(playlist_id) {
            log::debug!("Playlist {playlist_id} no longer listed, discarding its tracks");
            return Ok(Step::Stale);
        }

        let order: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        for incoming in tracks {
            match self.model.tracks.entry(incoming.id.clone()) {
                Entry::Occupied(mut e) => {
                    // Metadata may change; features are write-once
                    let existing = e.get_mut();
                    existing.name = incoming.name;
                    existing.artists = incoming.artists;
                    existing.duration_ms = incoming.duration_ms;
                }
                Entry::Vacant(e) => {
                    e.insert(Track {
                        audio_features: None,
                        ..incoming
                    });
                }
            }
        }
        if let Some(playlist) = self.model.playlists.get_mut(playlist_id) {
            log::info!("Loaded {} tracks for {}", order.len(), playlist.name);
            playlist.track_ids = Some(order);
        }

        Ok(Step::Applied(self.reconcile()))
    }

    fn on_audio_features(
        &mut self,
        ticket: Ticket,
        track_ids: &[String],
        result: Result<AudioFeaturesById, ApiError>,
    ) -> Result<Step, SyncError> {
        if ticket.generation != self.generation {
            log::debug!("Discarding audio features from a previous account");
            return Ok(Step::Stale);
        }
        for id in track_ids {
            self.features_in_flight.remove(id);
        }
        let mut by_id = result?;

        let mut attached = 0usize;
        for id in track_ids {
            match by_id.remove(id) {
                Some(features) => {
                    if let Some(track) = self.model.tracks.get_mut(id) {
                        if track.audio_features.is_none() {
                            track.audio_features = Some(features);
                            attached += 1;
                        }
                    }
                }
                None => {
                    self.features_unavailable.insert(id.clone());
                }
            }
        }
        if !by_id.is_empty() {
            log::debug!("Ignoring {} unrequested audio feature entries", by_id.len());
        }
        log::info!("Attached audio features to {attached} tracks");

        Ok(Step::Applied(self.reconcile()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AudioFeatures;
    use serde_json::json;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            display_name: Some(format!("User {id}")),
            country: None,
            product: None,
        }
    }

    fn playlist(id: &str) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: format!("List {id}"),
            owner: None,
            total_tracks: 0,
            track_ids: None,
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artists: vec!["Artist".to_string()],
            duration_ms: 180_000,
            audio_features: None,
        }
    }

    fn features(energy: f64) -> AudioFeatures {
        serde_json::from_value(json!({"energy": energy, "valence": 0.5})).unwrap()
    }

    fn ticket_of(intent: &FetchIntent) -> Ticket {
        match intent {
            FetchIntent::ResolveIdentity { ticket, .. }
            | FetchIntent::ListPlaylists { ticket, .. }
            | FetchIntent::ListTracks { ticket, .. }
            | FetchIntent::AudioFeatures { ticket, .. } => *ticket,
        }
    }

    fn applied(step: Result<Step, SyncError>) -> Vec<FetchIntent> {
        match step {
            Ok(Step::Applied(intents)) => intents,
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    /// Sign in as `user` and load playlists `ids`.
    fn signed_in(user: &str, ids: &[&str]) -> SyncEngine {
        let mut engine = SyncEngine::new();
        let intents = engine.set_credential(Some(Credential::new("token")));
        let ticket = ticket_of(&intents[0]);
        let intents = applied(engine.complete(Completion::Identity {
            ticket,
            result: Ok(identity(user)),
        }));
        assert!(matches!(intents[0], FetchIntent::ListPlaylists { .. }));
        applied(engine.complete(Completion::Playlists {
            ticket: ticket_of(&intents[0]),
            result: Ok(ids.iter().map(|id| playlist(id)).collect()),
        }));
        engine
    }

    fn load_tracks(engine: &mut SyncEngine, playlist_id: &str, ids: &[&str]) -> Vec<FetchIntent> {
        let intent = engine.request_playlist_refresh(playlist_id).unwrap().unwrap();
        applied(engine.complete(Completion::Tracks {
            ticket: ticket_of(&intent),
            playlist_id: playlist_id.to_string(),
            result: Ok(ids.iter().map(|id| track(id)).collect()),
        }))
    }

    #[test]
    fn test_state_progression() {
        let mut engine = SyncEngine::new();
        assert_eq!(engine.state(), SessionState::Unauthenticated);
        let intents = engine.set_credential(Some(Credential::new("t")));
        assert_eq!(engine.state(), SessionState::IdentityPending);
        applied(engine.complete(Completion::Identity {
            ticket: ticket_of(&intents[0]),
            result: Ok(identity("a")),
        }));
        assert_eq!(engine.state(), SessionState::Ready);
    }

    #[test]
    fn test_new_credential_is_pending_until_resolved() {
        let mut engine = signed_in("a", &["p1"]);
        assert_eq!(engine.state(), SessionState::Ready);
        let intents = engine.set_credential(Some(Credential::new("token-b")));
        assert_eq!(engine.state(), SessionState::IdentityPending);
        assert_eq!(engine.model().identity.as_ref().unwrap().id, "a");
        applied(engine.complete(Completion::Identity {
            ticket: ticket_of(&intents[0]),
            result: Ok(identity("b")),
        }));
        assert_eq!(engine.state(), SessionState::Ready);
    }

    #[test]
    fn test_identity_failure_leaves_model_unchanged() {
        let mut engine = SyncEngine::new();
        let intents = engine.set_credential(Some(Credential::new("bad")));
        let err = engine
            .complete(Completion::Identity {
                ticket: ticket_of(&intents[0]),
                result: Err(ApiError::Auth("401".to_string())),
            })
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(engine.state(), SessionState::Unauthenticated);
        assert_eq!(engine.model(), &UnifiedModel::default());
    }

    #[test]
    fn test_playlists_replaced_wholesale() {
        let mut engine = signed_in("a", &["p1", "p2"]);
        assert_eq!(engine.model().playlists.len(), 2);
        let intent = engine.request_playlists_refresh().unwrap().unwrap();
        applied(engine.complete(Completion::Playlists {
            ticket: ticket_of(&intent),
            result: Ok(vec![playlist("p3")]),
        }));
        let keys: Vec<&String> = engine.model().playlists.keys().collect();
        assert_eq!(keys, vec!["p3"]);
    }

    #[test]
    fn test_track_merge_preserves_order_and_requests_features() {
        let mut engine = signed_in("a", &["p1"]);
        assert_eq!(engine.playlist_state("p1"), Some(PlaylistState::Unknown));
        let intents = load_tracks(&mut engine, "p1", &["t2", "t1", "t3"]);

        let playlist = &engine.model().playlists["p1"];
        assert_eq!(playlist.track_ids.as_deref().unwrap(), ["t2", "t1", "t3"]);
        assert!(engine.model().is_consistent());
        assert_eq!(engine.playlist_state("p1"), Some(PlaylistState::FeaturesPending));

        match &intents[..] {
            [FetchIntent::AudioFeatures { track_ids, .. }] => {
                assert_eq!(track_ids, &["t1", "t2", "t3"]);
            }
            other => panic!("unexpected intents {other:?}"),
        }
    }

    #[test]
    fn test_track_merge_is_idempotent() {
        let mut engine = signed_in("a", &["p1"]);
        load_tracks(&mut engine, "p1", &["t1", "t2"]);
        let before = engine.model().clone();

        // Features for t1/t2 are already in flight, so nothing new is due
        let intents = load_tracks(&mut engine, "p1", &["t1", "t2"]);
        assert!(intents.is_empty());
        assert_eq!(engine.model(), &before);
    }

    #[test]
    fn test_features_never_refetched_or_overwritten() {
        let mut engine = signed_in("a", &["p1", "p2"]);
        let intents = load_tracks(&mut engine, "p1", &["t1", "t2"]);
        applied(engine.complete(Completion::AudioFeatures {
            ticket: ticket_of(&intents[0]),
            track_ids: vec!["t1".to_string(), "t2".to_string()],
            result: Ok([("t1".to_string(), features(0.1)), ("t2".to_string(), features(0.2))]
                .into_iter()
                .collect()),
        }));
        assert_eq!(engine.playlist_state("p1"), Some(PlaylistState::Complete));

        // p2 shares t2; only t3 is new
        let intents = load_tracks(&mut engine, "p2", &["t2", "t3"]);
        let FetchIntent::AudioFeatures { ticket, track_ids, .. } = &intents[0] else {
            panic!("expected feature request");
        };
        assert_eq!(track_ids, &["t3"]);
        assert_eq!(engine.model().tracks["t2"].audio_features, Some(features(0.2)));

        // A response that also carries t2 must not overwrite it
        applied(engine.complete(Completion::AudioFeatures {
            ticket: *ticket,
            track_ids: vec!["t2".to_string(), "t3".to_string()],
            result: Ok([("t2".to_string(), features(0.9)), ("t3".to_string(), features(0.3))]
                .into_iter()
                .collect()),
        }));
        assert_eq!(engine.model().tracks["t2"].audio_features, Some(features(0.2)));
        assert_eq!(engine.model().tracks["t3"].audio_features, Some(features(0.3)));
    }

    #[test]
    fn test_features_response_only_touches_returned_track() {
        let mut engine = signed_in("a", &["p1"]);
        let intents = load_tracks(&mut engine, "p1", &["t1", "t2"]);
        let before_t2 = engine.model().tracks["t2"].clone();
        applied(engine.complete(Completion::AudioFeatures {
            ticket: ticket_of(&intents[0]),
            track_ids: vec!["t1".to_string()],
            result: Ok([("t1".to_string(), features(0.7))].into_iter().collect()),
        }));
        assert_eq!(engine.model().tracks["t1"].audio_features, Some(features(0.7)));
        assert_eq!(engine.model().tracks["t2"], before_t2);
    }

    #[test]
    fn test_tracks_without_features_are_not_requested_again() {
        let mut engine = signed_in("a", &["p1"]);
        let intents = load_tracks(&mut engine, "p1", &["t1", "t2"]);
        let next = applied(engine.complete(Completion::AudioFeatures {
            ticket: ticket_of(&intents[0]),
            track_ids: vec!["t1".to_string(), "t2".to_string()],
            result: Ok([("t1".to_string(), features(0.4))].into_iter().collect()),
        }));
        assert!(next.is_empty());
        assert!(engine.features_unavailable().contains("t2"));
        assert!(engine.reconcile().is_empty());
        assert_eq!(engine.playlist_state("p1"), Some(PlaylistState::Complete));
    }

    #[test]
    fn test_failed_feature_fetch_can_be_retried() {
        let mut engine = signed_in("a", &["p1"]);
        let intents = load_tracks(&mut engine, "p1", &["t1"]);
        let before = engine.model().clone();
        let err = engine
            .complete(Completion::AudioFeatures {
                ticket: ticket_of(&intents[0]),
                track_ids: vec!["t1".to_string()],
                result: Err(ApiError::Network("timeout".to_string())),
            })
            .unwrap_err();
        assert!(!err.is_auth());
        assert_eq!(engine.model(), &before);
        assert_eq!(engine.reconcile().len(), 1);
    }

    #[test]
    fn test_duplicate_requests_suppressed_while_in_flight() {
        let mut engine = signed_in("a", &["p1"]);
        assert!(engine.request_playlist_refresh("p1").unwrap().is_some());
        assert!(engine.request_playlist_refresh("p1").unwrap().is_none());
        assert!(engine.request_playlists_refresh().unwrap().is_some());
        assert!(engine.request_playlists_refresh().unwrap().is_none());
        assert_eq!(
            engine.request_playlist_refresh("nope"),
            Err(SyncError::UnknownPlaylist("nope".to_string()))
        );
    }

    #[test]
    fn test_requests_need_identity() {
        let mut engine = SyncEngine::new();
        assert_eq!(engine.request_playlists_refresh(), Err(SyncError::NotAuthenticated));
        engine.set_credential(Some(Credential::new("t")));
        assert_eq!(engine.request_playlist_refresh("p1"), Err(SyncError::NotAuthenticated));
        assert!(engine.reconcile().is_empty());
    }

    #[test]
    fn test_account_switch_discards_stale_tracks() {
        let mut engine = signed_in("a", &["p1", "p2"]);
        load_tracks(&mut engine, "p1", &["t1", "t2"]);

        // p1 refresh is in flight when the account changes
        let inflight = engine.request_playlist_refresh("p1").unwrap().unwrap();
        let intents = engine.set_credential(Some(Credential::new("token-b")));
        let next = applied(engine.complete(Completion::Identity {
            ticket: ticket_of(&intents[0]),
            result: Ok(identity("b")),
        }));
        assert!(engine.model().playlists.is_empty());
        assert!(engine.model().tracks.is_empty());
        assert_eq!(engine.model().identity.as_ref().unwrap().id, "b");
        assert!(matches!(&next[..], [FetchIntent::ListPlaylists { identity, .. }] if identity.id == "b"));

        let step = engine
            .complete(Completion::Tracks {
                ticket: ticket_of(&inflight),
                playlist_id: "p1".to_string(),
                result: Ok(vec![track("t1"), track("t2")]),
            })
            .unwrap();
        assert_eq!(step, Step::Stale);
        assert!(engine.model().tracks.is_empty());
        assert!(engine.model().playlists.is_empty());
    }

    #[test]
    fn test_same_identity_token_refresh_keeps_data() {
        let mut engine = signed_in("a", &["p1"]);
        let intents = load_tracks(&mut engine, "p1", &["t1"]);
        let features_ticket = ticket_of(&intents[0]);

        let intents = engine.set_credential(Some(Credential::new("token-2")));
        let next = applied(engine.complete(Completion::Identity {
            ticket: ticket_of(&intents[0]),
            result: Ok(identity("a")),
        }));
        assert!(next.is_empty());
        assert_eq!(engine.model().playlists.len(), 1);
        assert_eq!(engine.model().tracks.len(), 1);

        // Requests issued under the old token still merge
        applied(engine.complete(Completion::AudioFeatures {
            ticket: features_ticket,
            track_ids: vec!["t1".to_string()],
            result: Ok([("t1".to_string(), features(0.6))].into_iter().collect()),
        }));
        assert!(engine.model().tracks["t1"].audio_features.is_some());
    }

    #[test]
    fn test_superseded_identity_lookup_is_stale() {
        let mut engine = SyncEngine::new();
        let first = engine.set_credential(Some(Credential::new("one")));
        let second = engine.set_credential(Some(Credential::new("two")));
        let step = engine
            .complete(Completion::Identity {
                ticket: ticket_of(&first[0]),
                result: Ok(identity("a")),
            })
            .unwrap();
        assert_eq!(step, Step::Stale);
        assert!(engine.model().identity.is_none());
        applied(engine.complete(Completion::Identity {
            ticket: ticket_of(&second[0]),
            result: Ok(identity("b")),
        }));
        assert_eq!(engine.model().identity.as_ref().unwrap().id, "b");
    }

    #[test]
    fn test_sign_out_clears_everything() {
        let mut engine = signed_in("a", &["p1"]);
        let inflight = load_tracks(&mut engine, "p1", &["t1"]);
        assert!(engine.set_credential(None).is_empty());
        assert_eq!(engine.state(), SessionState::Unauthenticated);
        assert_eq!(engine.model(), &UnifiedModel::default());

        let step = engine
            .complete(Completion::AudioFeatures {
                ticket: ticket_of(&inflight[0]),
                track_ids: vec!["t1".to_string()],
                result: Ok([("t1".to_string(), features(0.6))].into_iter().collect()),
            })
            .unwrap();
        assert_eq!(step, Step::Stale);
    }

    #[test]
    fn test_tracks_for_unlisted_playlist_dropped() {
        let mut engine = signed_in("a", &["p1"]);
        let tracks_intent = engine.request_playlist_refresh("p1").unwrap().unwrap();
        let list_intent = engine.request_playlists_refresh().unwrap().unwrap();
        applied(engine.complete(Completion::Playlists {
            ticket: ticket_of(&list_intent),
            result: Ok(vec![playlist("p2")]),
        }));
        let step = engine
            .complete(Completion::Tracks {
                ticket: ticket_of(&tracks_intent),
                playlist_id: "p1".to_string(),
                result: Ok(vec![track("t1")]),
            })
            .unwrap();
        assert_eq!(step, Step::Stale);
        assert!(engine.model().tracks.is_empty());
    }
}
