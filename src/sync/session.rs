use std::collections::VecDeque;

use super::{Completion, FetchIntent, Step, SyncEngine, SyncError};
use crate::geometry::Gradient;
use crate::model::UnifiedModel;
use crate::render::{self, AxisSelection, PlotSeries};
use crate::spotify::{Credential, SpotifyApi};

/// Outcome of driving a batch of fetches to quiescence.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub applied: usize,
    pub stale: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// First auth failure, if any. These need the user to sign in again.
    pub fn auth_error(&self) -> Option<&SyncError> {
        self.errors.iter().find(|e| e.is_auth())
    }
}

/// Runs a [`SyncEngine`] against a live [`SpotifyApi`].
///
/// Every follow-up intent the engine emits is executed until none remain.
///
/// Intents run one at a time and every entry point takes `&mut self`, so
/// refreshes never overlap here. The engine's in-flight guards and stale
/// ticket checks only come into play for callers that drive [`SyncEngine`]
/// directly and complete requests out of order.
pub struct SyncSession<A> {
    api: A,
    engine: SyncEngine,
}

impl<A: SpotifyApi> SyncSession<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            engine: SyncEngine::new(),
        }
    }

    pub fn model(&self) -> &UnifiedModel {
        self.engine.model()
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub async fn set_credential(&mut self, credential: Option<Credential>) -> SyncReport {
        let intents = self.engine.set_credential(credential);
        self.run(intents).await
    }

    pub async fn refresh_playlists(&mut self) -> Result<SyncReport, SyncError> {
        let intent = self.engine.request_playlists_refresh()?;
        Ok(self.run(intent.into_iter().collect()).await)
    }

    pub async fn refresh_playlist(&mut self, playlist_id: &str) -> Result<SyncReport, SyncError> {
        let intent = self.engine.request_playlist_refresh(playlist_id)?;
        Ok(self.run(intent.into_iter().collect()).await)
    }

    /// Fetch features for any track still lacking them (e.g. after a failed batch).
    pub async fn sync_features(&mut self) -> SyncReport {
        let intents = self.engine.reconcile();
        self.run(intents).await
    }

    /// Plot series for one playlist on the selected axes.
    pub fn series(
        &self,
        playlist_id: &str,
        axes: &AxisSelection,
        gradient: &Gradient,
    ) -> Result<PlotSeries, SyncError> {
        if !self.model().playlists.contains_key(playlist_id) {
            return Err(SyncError::UnknownPlaylist(playlist_id.to_string()));
        }
        Ok(render::playlist_series(self.model(), playlist_id, axes, gradient))
    }

    async fn run(&mut self, intents: Vec<FetchIntent>) -> SyncReport {
        let mut queue: VecDeque<FetchIntent> = intents.into();
        let mut report = SyncReport::default();

        while let Some(intent) = queue.pop_front() {
            let completion = self.execute(intent).await;
            match self.engine.complete(completion) {
                Ok(Step::Applied(more)) => {
                    report.applied += 1;
                    queue.extend(more);
                }
                Ok(Step::Stale) => report.stale += 1,
                Err(e) => {
                    if e.is_auth() {
                        log::error!("{e}; sign in again to continue");
                    } else {
                        log::warn!("{e}");
                    }
                    report.errors.push(e);
                }
            }
        }

        report
    }

    async fn execute(&self, intent: FetchIntent) -> Completion {
        match intent {
            FetchIntent::ResolveIdentity { ticket, credential } => Completion::Identity {
                ticket,
                result: self.api.resolve_identity(&credential).await,
            },
            FetchIntent::ListPlaylists {
                ticket,
                credential,
                identity,
            } => Completion::Playlists {
                ticket,
                result: self.api.list_all_playlists(&credential, &identity).await,
            },
            FetchIntent::ListTracks {
                ticket,
                credential,
                playlist,
            } => Completion::Tracks {
                ticket,
                result: self.api.list_all_tracks(&credential, &playlist).await,
                playlist_id: playlist.id,
            },
            FetchIntent::AudioFeatures {
                ticket,
                credential,
                track_ids,
            } => Completion::AudioFeatures {
                ticket,
                result: self.api.fetch_audio_features(&credential, &track_ids).await,
                track_ids,
            },
        }
    }
}
