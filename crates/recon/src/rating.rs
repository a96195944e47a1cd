//! Rating conversion between the media server's 1–10 scale and the
//! log site's 0.5–5.0 half-star scale.
//!
//! `target = clamp(round_half_up(raw / 2) to 0.5, 0.5, 5.0)`. Since
//! `raw / 2` rounded to a half is `raw` rounded to an integer (counted in
//! half-stars), the arithmetic runs on `raw` directly. A target landing
//! exactly on a `.25` boundary (raw `x.5`) always rounds up.

use std::fmt;

use serde::{Serialize, Serializer};

pub const MIN_HALF_STARS: u8 = 1;
pub const MAX_HALF_STARS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Rating {
    /// Unrated. Rendered as an empty cell, never as `0`.
    #[default]
    Blank,
    /// Target scale, counted in half-stars (`7` = 3.5 stars).
    HalfStars(u8),
    /// Source value passed through because conversion is disabled.
    Raw(f64),
}

/// Convert a raw source rating.
///
/// Absent, zero, negative and non-finite inputs are unrated. With
/// conversion disabled the raw value is returned unchanged.
pub fn convert(raw: Option<f64>, enabled: bool) -> Rating {
    let Some(raw) = raw else {
        return Rating::Blank;
    };
    if !enabled {
        return Rating::Raw(raw);
    }
    if !raw.is_finite() || raw <= 0.0 {
        return Rating::Blank;
    }
    let half_stars = (raw + 0.5).floor();
    Rating::HalfStars(half_stars.clamp(MIN_HALF_STARS as f64, MAX_HALF_STARS as f64) as u8)
}

impl Rating {
    /// Parse a rating already on the target scale (`"3.5"`, `"4"`, `""`).
    /// Returns `None` for text that is not a number.
    pub fn parse_stars(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Some(Self::Blank);
        }
        let stars: f64 = s.parse().ok()?;
        if !stars.is_finite() || stars <= 0.0 {
            return Some(Self::Blank);
        }
        let half = (stars * 2.0).round();
        Some(Self::HalfStars(
            half.clamp(MIN_HALF_STARS as f64, MAX_HALF_STARS as f64) as u8,
        ))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Star value on the target scale, if converted.
    pub fn stars(&self) -> Option<f64> {
        match self {
            Self::HalfStars(h) => Some(f64::from(*h) / 2.0),
            _ => None,
        }
    }

    /// The value written to the export's `Rating` column: only converted,
    /// non-zero ratings are emitted.
    pub fn export_cell(&self) -> String {
        match self {
            Self::HalfStars(_) => self.to_string(),
            Self::Blank | Self::Raw(_) => String::new(),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => Ok(()),
            Self::HalfStars(h) if h % 2 == 0 => write!(f, "{}", h / 2),
            Self::HalfStars(h) => write!(f, "{}.5", h / 2),
            Self::Raw(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_examples() {
        assert_eq!(convert(Some(7.0), true), Rating::HalfStars(7));
        assert_eq!(convert(Some(7.0), true).to_string(), "3.5");
        assert_eq!(convert(Some(10.0), true).stars(), Some(5.0));
        assert_eq!(convert(Some(0.0), true), Rating::Blank);
        assert_eq!(convert(None, true), Rating::Blank);
    }

    #[test]
    fn quarter_boundary_rounds_half_up() {
        // 7.5 / 2 = 3.75 -> 4.0, 2.5 / 2 = 1.25 -> 1.5, 9.5 / 2 = 4.75 -> 5.0
        assert_eq!(convert(Some(7.5), true).stars(), Some(4.0));
        assert_eq!(convert(Some(2.5), true).stars(), Some(1.5));
        assert_eq!(convert(Some(9.5), true).stars(), Some(5.0));
        // just below the boundary rounds down
        assert_eq!(convert(Some(7.49), true).stars(), Some(3.5));
    }

    #[test]
    fn clamps_to_target_bounds() {
        assert_eq!(convert(Some(0.2), true), Rating::HalfStars(1));
        assert_eq!(convert(Some(14.0), true), Rating::HalfStars(10));
    }

    #[test]
    fn negative_and_nan_are_blank() {
        assert_eq!(convert(Some(-3.0), true), Rating::Blank);
        assert_eq!(convert(Some(f64::NAN), true), Rating::Blank);
    }

    #[test]
    fn disabled_passes_raw_through() {
        assert_eq!(convert(Some(7.0), false), Rating::Raw(7.0));
        assert_eq!(convert(Some(7.5), false).to_string(), "7.5");
        assert_eq!(convert(None, false), Rating::Blank);
        assert_eq!(convert(Some(7.0), false).export_cell(), "");
    }

    #[test]
    fn whole_stars_render_without_fraction() {
        assert_eq!(Rating::HalfStars(10).to_string(), "5");
        assert_eq!(Rating::HalfStars(1).to_string(), "0.5");
        assert_eq!(Rating::Blank.to_string(), "");
    }

    #[test]
    fn parse_target_scale() {
        assert_eq!(Rating::parse_stars("3.5"), Some(Rating::HalfStars(7)));
        assert_eq!(Rating::parse_stars("5"), Some(Rating::HalfStars(10)));
        assert_eq!(Rating::parse_stars(""), Some(Rating::Blank));
        assert_eq!(Rating::parse_stars("0"), Some(Rating::Blank));
        assert_eq!(Rating::parse_stars("great"), None);
    }
}
