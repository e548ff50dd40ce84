use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::geometry::Point;
use crate::model::Track;

/// Well-known numeric audio features that make sense as plot axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    Acousticness,
    Danceability,
    Energy,
    Instrumentalness,
    Liveness,
    Loudness,
    Speechiness,
    Tempo,
    Valence,
    DurationMs,
    Key,
    Mode,
    TimeSignature,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 13] = [
        Self::Acousticness,
        Self::Danceability,
        Self::Energy,
        Self::Instrumentalness,
        Self::Liveness,
        Self::Loudness,
        Self::Speechiness,
        Self::Tempo,
        Self::Valence,
        Self::DurationMs,
        Self::Key,
        Self::Mode,
        Self::TimeSignature,
    ];

    /// Field name in the audio-features payload.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Acousticness => "acousticness",
            Self::Danceability => "danceability",
            Self::Energy => "energy",
            Self::Instrumentalness => "instrumentalness",
            Self::Liveness => "liveness",
            Self::Loudness => "loudness",
            Self::Speechiness => "speechiness",
            Self::Tempo => "tempo",
            Self::Valence => "valence",
            Self::DurationMs => "duration_ms",
            Self::Key => "key",
            Self::Mode => "mode",
            Self::TimeSignature => "time_signature",
        }
    }

    /// Human-readable axis label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Acousticness => "Acousticness",
            Self::Danceability => "Danceability",
            Self::Energy => "Energy",
            Self::Instrumentalness => "Instrumentalness",
            Self::Liveness => "Liveness",
            Self::Loudness => "Loudness (dB)",
            Self::Speechiness => "Speechiness",
            Self::Tempo => "Tempo (BPM)",
            Self::Valence => "Valence",
            Self::DurationMs => "Duration (ms)",
            Self::Key => "Key",
            Self::Mode => "Mode",
            Self::TimeSignature => "Time Signature",
        }
    }
}

impl FromStr for FeatureKey {
    type Err = DataShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| DataShapeError::UnknownFeature {
                track_id: None,
                feature: s.to_string(),
            })
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature value that cannot be placed on an axis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataShapeError {
    #[error("unknown audio feature {feature:?}{}", fmt_track(.track_id))]
    UnknownFeature {
        track_id: Option<String>,
        feature: String,
    },
    #[error("audio feature {feature:?} is not numeric for track {track_id}")]
    NotNumeric { track_id: String, feature: String },
}

fn fmt_track(track_id: &Option<String>) -> String {
    track_id
        .as_ref()
        .map(|id| format!(" for track {id}"))
        .unwrap_or_default()
}

/// Why a track was pinned to the origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Features not fetched yet; expected right after a playlist loads.
    FeaturesPending { track_id: String },
    Shape(DataShapeError),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeaturesPending { track_id } => {
                write!(f, "audio features not yet available for track {track_id}")
            }
            Self::Shape(e) => write!(f, "{e}"),
        }
    }
}

/// Display fields derived from a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
    pub track: TrackSummary,
}

impl TrackPoint {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Default)]
pub struct Projection {
    pub points: Vec<TrackPoint>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Map each track onto the `(x, y)` feature plane, preserving input order.
///
/// Tracks without features, or with a missing/non-numeric value for either
/// axis, land on `(0, 0)` and produce a diagnostic.
pub fn project<'a, I>(tracks: I, x: &str, y: &str) -> Projection
where
    I: IntoIterator<Item = &'a Track>,
{
    let mut projection = Projection::default();

    for t in tracks {
        let summary = TrackSummary {
            id: t.id.clone(),
            title: t.name.clone(),
            artist: t.artist_line(),
            duration_ms: t.duration_ms,
        };

        let (px, py) = match feature_pair(t, x, y) {
            Ok(xy) => xy,
            Err(diag) => {
                match &diag {
                    Diagnostic::FeaturesPending { track_id } => {
                        log::debug!("No audio features yet for {track_id}");
                    }
                    Diagnostic::Shape(e) => log::warn!("{e}"),
                }
                projection.diagnostics.push(diag);
                (0.0, 0.0)
            }
        };

        projection.points.push(TrackPoint {
            x: px,
            y: py,
            track: summary,
        });
    }

    projection
}

fn feature_pair(track: &Track, x: &str, y: &str) -> Result<(f64, f64), Diagnostic> {
    let features = track
        .audio_features
        .as_ref()
        .ok_or_else(|| Diagnostic::FeaturesPending {
            track_id: track.id.clone(),
        })?;

    let value = |name: &str| -> Result<f64, Diagnostic> {
        let v = features.get(name).ok_or_else(|| {
            Diagnostic::Shape(DataShapeError::UnknownFeature {
                track_id: Some(track.id.clone()),
                feature: name.to_string(),
            })
        })?;
        v.as_f64().ok_or_else(|| {
            Diagnostic::Shape(DataShapeError::NotNumeric {
                track_id: track.id.clone(),
                feature: name.to_string(),
            })
        })
    };

    Ok((value(x)?, value(y)?))
}
