//! Segment projection and linear color interpolation.
//!
//! A track's color comes from where it falls along the diagonal between the
//! dataset's minimum and maximum points: `t = clamp(dot(p - a, b - a) / |b - a|², 0, 1)`,
//! then each RGB channel is `ceil(high * t + low * (1 - t))`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ColorError {
    #[error("color must be 6 hex digits, got {0:?}")]
    Length(String),
    #[error("invalid hex digit in color {0:?}")]
    Digit(String),
}

/// A point in feature space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How far along `start -> end` the perpendicular projection of `point` lands,
/// clamped to `[0, 1]`.
///
/// A zero-length segment has no direction, so every point maps to 0.
pub fn closest_point_fraction(start: Point, end: Point, point: Point) -> f64 {
    let ab = Point::new(end.x - start.x, end.y - start.y);
    let ap = Point::new(point.x - start.x, point.y - start.y);
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 || !len_sq.is_finite() {
        return 0.0;
    }
    let dot = ap.x * ab.x + ap.y * ab.y;
    let t = dot / len_sq;
    if t.is_nan() {
        return 0.0;
    }
    t.clamp(0.0, 1.0)
}

/// 24-bit color, parsed from and printed as `rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Blend toward `end` by `t`, rounding each channel up.
    pub fn lerp(self, end: Rgb, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        Rgb {
            r: blend_channel(self.r, end.r, t),
            g: blend_channel(self.g, end.g, t),
            b: blend_channel(self.b, end.b, t),
        }
    }
}

fn blend_channel(start: u8, end: u8, t: f64) -> u8 {
    let v = (end as f64 * t + start as f64 * (1.0 - t)).ceil();
    // Float error at the top of the range can push ceil() to 256
    v.clamp(0.0, 255.0) as u8
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ColorError::Length(s.to_string()));
        }
        // from_str_radix alone would accept a leading '+'
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorError::Digit(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorError::Digit(s.to_string()))
        };
        Ok(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Interpolate between two `rrggbb` colors; returns `rrggbb` (lowercase, no `#`).
pub fn interpolate_color(start_hex: &str, end_hex: &str, t: f64) -> Result<String, ColorError> {
    let start: Rgb = start_hex.parse()?;
    let end: Rgb = end_hex.parse()?;
    Ok(start.lerp(end, t).to_string())
}

/// Low/high gradient anchored on the bounding diagonal of a point set.
#[derive(Debug, Clone, Copy)]
pub struct Gradient {
    pub low: Rgb,
    pub high: Rgb,
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            low: Rgb::new(0x00, 0x52, 0x9d),
            high: Rgb::new(0xeb, 0x12, 0x1b),
        }
    }
}

impl Gradient {
    /// One color per point, in input order.
    ///
    /// The anchors are `(min_x, min_y)` and `(max_x, max_y)` over `points`, so the
    /// color tracks joint position on both axes rather than either one alone.
    pub fn colors(&self, points: &[Point]) -> Vec<Rgb> {
        let Some((min, max)) = bounds(points) else {
            return Vec::new();
        };
        points
            .iter()
            .map(|&p| self.low.lerp(self.high, closest_point_fraction(min, max, p)))
            .collect()
    }
}

/// `(min, max)` corner points of the bounding box, or `None` when empty.
pub fn bounds(points: &[Point]) -> Option<(Point, Point)> {
    let first = points.first()?;
    let mut min = *first;
    let mut max = *first;
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Point = Point { x: 1.0, y: 2.0 };
    const B: Point = Point { x: 5.0, y: 6.0 };

    #[test]
    fn test_fraction_endpoints() {
        assert_eq!(closest_point_fraction(A, B, A), 0.0);
        assert_eq!(closest_point_fraction(A, B, B), 1.0);
    }

    #[test]
    fn test_fraction_midpoint_and_perpendicular_offset() {
        assert!((closest_point_fraction(A, B, Point::new(3.0, 4.0)) - 0.5).abs() < 1e-12);
        // (5, 2) is off the line; its projection is still the midpoint
        assert!((closest_point_fraction(A, B, Point::new(5.0, 2.0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_clamped_outside_segment() {
        assert_eq!(closest_point_fraction(A, B, Point::new(-10.0, -10.0)), 0.0);
        assert_eq!(closest_point_fraction(A, B, Point::new(100.0, 50.0)), 1.0);
    }

    #[test]
    fn test_fraction_degenerate_segment() {
        assert_eq!(closest_point_fraction(A, A, B), 0.0);
    }

    #[test]
    fn test_interpolate_endpoints() {
        assert_eq!(interpolate_color("000000", "ffffff", 0.0).unwrap(), "000000");
        assert_eq!(interpolate_color("000000", "ffffff", 1.0).unwrap(), "ffffff");
    }

    #[test]
    fn test_interpolate_rounds_up() {
        // r: 235 * 0.5 = 117.5 -> 118, g: 9 + 41 = 50, b: 13.5 + 78.5 = 92
        assert_eq!(interpolate_color("00529d", "eb121b", 0.5).unwrap(), "76325c");
        // 255 * 0.4985 = 127.1... -> 128
        assert_eq!(interpolate_color("000000", "ff0000", 0.4985).unwrap(), "800000");
    }

    #[test]
    fn test_interpolate_same_color_never_overflows() {
        for i in 0..=100 {
            let t = i as f64 / 100.0;
            assert_eq!(interpolate_color("ffffff", "ffffff", t).unwrap(), "ffffff");
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!("#00529D".parse::<Rgb>().unwrap(), Rgb::new(0, 0x52, 0x9d));
        assert!(matches!("0052".parse::<Rgb>(), Err(ColorError::Length(_))));
        assert!(matches!("zz529d".parse::<Rgb>(), Err(ColorError::Digit(_))));
        assert!(matches!("+1+2+3".parse::<Rgb>(), Err(ColorError::Digit(_))));
        assert!(matches!("#-1ffff".parse::<Rgb>(), Err(ColorError::Digit(_))));
        assert!(interpolate_color("nope", "ffffff", 0.5).is_err());
    }

    #[test]
    fn test_gradient_colors() {
        let g = Gradient::default();
        let points = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(0.5, 0.5)];
        let colors = g.colors(&points);
        assert_eq!(colors[0].to_string(), "00529d");
        assert_eq!(colors[1].to_string(), "eb121b");
        assert_eq!(colors[2].to_string(), "76325c");
    }

    #[test]
    fn test_gradient_single_point_is_low_color() {
        let g = Gradient::default();
        let colors = g.colors(&[Point::new(0.3, 0.7)]);
        assert_eq!(colors, vec![g.low]);
        assert!(g.colors(&[]).is_empty());
    }
}
