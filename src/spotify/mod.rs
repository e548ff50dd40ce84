//! Remote API collaborator: the four operations the sync core needs.

pub mod client;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::{AudioFeatures, Identity, Playlist, Track};

pub use client::HttpSpotifyClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Credential rejected or expired. Needs re-authentication, never retried.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Transient transport or service failure. Callers may re-issue the request.
    #[error("network error: {0}")]
    Network(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Bearer token for the Web API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// Token that expires `expires_in_secs` from now.
    pub fn expiring_in(access_token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in_secs)),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Feature vectors keyed by track id. Ids the service has no vector for are absent.
pub type AudioFeaturesById = HashMap<String, AudioFeatures>;

/// Operations consumed from the streaming service.
///
/// List operations page through the full result set before returning.
pub trait SpotifyApi {
    fn resolve_identity(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Identity, ApiError>>;

    fn list_all_playlists(
        &self,
        credential: &Credential,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<Playlist>, ApiError>>;

    /// Tracks in playlist order, with `audio_features` unset.
    fn list_all_tracks(
        &self,
        credential: &Credential,
        playlist: &Playlist,
    ) -> impl Future<Output = Result<Vec<Track>, ApiError>>;

    fn fetch_audio_features(
        &self,
        credential: &Credential,
        track_ids: &[String],
    ) -> impl Future<Output = Result<AudioFeaturesById, ApiError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_expiry() {
        let c = Credential::new("abc");
        assert!(!c.is_expired());

        let c = Credential::expiring_in("abc", 3600);
        assert!(!c.is_expired());
        assert!(c.is_expired_at(Utc::now() + Duration::seconds(3601)));

        assert!(Credential::expiring_in("abc", -1).is_expired());
    }

    #[test]
    fn test_credential_debug_hides_token() {
        let shown = format!("{:?}", Credential::new("very-secret"));
        assert!(!shown.contains("very-secret"));
    }
}
