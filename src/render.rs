//! Projected points to a plotly-style scatter trace.

use serde::Serialize;
use serde_json::{Value, json};

use crate::geometry::{Gradient, Point};
use crate::model::UnifiedModel;
use crate::projector::{self, Diagnostic, FeatureKey, TrackPoint};

/// Marker size in px.
const MARKER_SIZE: u32 = 10;

/// Connecting line between adjacent tracks in playlist order.
const LINE_COLOR: &str = "#2c3033";

/// The two features to plot, with axis labels.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSelection {
    pub x: String,
    pub y: String,
    pub x_label: String,
    pub y_label: String,
}

impl AxisSelection {
    /// Labels come from [`FeatureKey`] when the name is a known feature.
    pub fn new(x: &str, y: &str) -> Self {
        Self {
            x: x.to_string(),
            y: y.to_string(),
            x_label: axis_label(x),
            y_label: axis_label(y),
        }
    }

    pub fn from_keys(x: FeatureKey, y: FeatureKey) -> Self {
        Self::new(x.name(), y.name())
    }
}

fn axis_label(name: &str) -> String {
    name.parse::<FeatureKey>()
        .map(|k| k.label().to_string())
        .unwrap_or_else(|_| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub size: u32,
    pub color: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub color: String,
    pub width: u32,
}

/// Parallel arrays, one entry per track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub text: Vec<String>,
    pub hoverinfo: &'static str,
    pub mode: &'static str,
    pub marker: Marker,
    pub line: Line,
}

#[derive(Debug, Clone)]
pub struct PlotSeries {
    pub trace: Trace,
    pub points: Vec<TrackPoint>,
    pub diagnostics: Vec<Diagnostic>,
    pub axes: AxisSelection,
}

impl PlotSeries {
    /// Full plotly figure: `{"data": [trace], "layout": {...}}`.
    pub fn to_plotly_json(&self) -> Value {
        json!({
            "data": [self.trace],
            "layout": {
                "hovermode": "closest",
                "xaxis": {"title": {"text": self.axes.x_label}},
                "yaxis": {"title": {"text": self.axes.y_label}},
                "plot_bgcolor": "transparent",
                "paper_bgcolor": "transparent",
            }
        })
    }
}

fn hover_text(p: &TrackPoint, axes: &AxisSelection) -> String {
    format!(
        "{} by {}<br>{}: {}<br>{}: {}",
        p.track.title, p.track.artist, axes.x_label, p.x, axes.y_label, p.y
    )
}

/// Build the trace for already-projected points.
pub fn build_trace(points: &[TrackPoint], axes: &AxisSelection, gradient: &Gradient) -> Trace {
    let coords: Vec<Point> = points.iter().map(TrackPoint::point).collect();
    let colors = gradient
        .colors(&coords)
        .into_iter()
        .map(|c| format!("#{c}"))
        .collect();

    Trace {
        x: points.iter().map(|p| p.x).collect(),
        y: points.iter().map(|p| p.y).collect(),
        text: points.iter().map(|p| hover_text(p, axes)).collect(),
        hoverinfo: "text",
        mode: "lines+markers",
        marker: Marker {
            size: MARKER_SIZE,
            color: colors,
        },
        line: Line {
            color: LINE_COLOR.to_string(),
            width: 1,
        },
    }
}

/// Project a playlist's tracks (in playlist order) and build its trace.
pub fn playlist_series(
    model: &UnifiedModel,
    playlist_id: &str,
    axes: &AxisSelection,
    gradient: &Gradient,
) -> PlotSeries {
    let tracks = model.playlist_tracks(playlist_id);
    let projection = projector::project(tracks, &axes.x, &axes.y);
    PlotSeries {
        trace: build_trace(&projection.points, axes, gradient),
        points: projection.points,
        diagnostics: projection.diagnostics,
        axes: axes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Playlist, Track};

    fn model() -> UnifiedModel {
        let mut m = UnifiedModel::default();
        let tracks = [
            ("t1", "Low", Some((0.0, 0.0))),
            ("t2", "High", Some((1.0, 1.0))),
            ("t3", "Waiting", None),
        ];
        for (id, name, xy) in tracks {
            m.tracks.insert(
                id.to_string(),
                Track {
                    id: id.to_string(),
                    name: name.to_string(),
                    artists: vec!["X".to_string(), "Y".to_string()],
                    duration_ms: 10,
                    audio_features: xy.map(|(e, v)| {
                        serde_json::from_value(json!({"energy": e, "valence": v})).unwrap()
                    }),
                },
            );
        }
        m.playlists.insert(
            "p".to_string(),
            Playlist {
                id: "p".to_string(),
                name: "P".to_string(),
                owner: None,
                total_tracks: 3,
                track_ids: Some(vec!["t2".to_string(), "t1".to_string(), "t3".to_string()]),
            },
        );
        m
    }

    #[test]
    fn test_playlist_series_shape() {
        let axes = AxisSelection::from_keys(FeatureKey::Energy, FeatureKey::Valence);
        let s = playlist_series(&model(), "p", &axes, &Gradient::default());

        assert_eq!(s.trace.x, vec![1.0, 0.0, 0.0]);
        assert_eq!(s.trace.y, vec![1.0, 0.0, 0.0]);
        assert_eq!(s.trace.marker.color, vec!["#eb121b", "#00529d", "#00529d"]);
        assert_eq!(s.trace.text[0], "High by X, Y<br>Energy: 1<br>Valence: 1");
        assert_eq!(s.trace.mode, "lines+markers");
        assert_eq!(s.diagnostics.len(), 1);
    }

    #[test]
    fn test_unknown_axis_label_falls_back_to_name() {
        let axes = AxisSelection::new("bounciness", "tempo");
        assert_eq!(axes.x_label, "bounciness");
        assert_eq!(axes.y_label, "Tempo (BPM)");
    }

    #[test]
    fn test_plotly_json() {
        let axes = AxisSelection::new("energy", "valence");
        let s = playlist_series(&model(), "p", &axes, &Gradient::default());
        let v = s.to_plotly_json();
        assert_eq!(v["data"][0]["hoverinfo"], "text");
        assert_eq!(v["data"][0]["marker"]["size"], 10);
        assert_eq!(v["data"][0]["line"]["color"], "#2c3033");
        assert_eq!(v["layout"]["xaxis"]["title"]["text"], "Energy");
    }

    #[test]
    fn test_empty_playlist_gives_empty_trace() {
        let s = playlist_series(
            &UnifiedModel::default(),
            "none",
            &AxisSelection::new("energy", "valence"),
            &Gradient::default(),
        );
        assert!(s.trace.x.is_empty());
        assert!(s.trace.marker.color.is_empty());
    }
}
