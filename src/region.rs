//! Region-of-interest derivation from directional keyphrases
//!
//! A keyphrase such as `"left 1/2 bottom 1/3"` narrows an image down to the
//! part where a needle is expected. Tokens come in `(direction, fraction)`
//! pairs and apply in order. Every extent is taken from the original image
//! size, so `right`, `bottom` and `center` anchor against the image itself
//! while the untouched axis is carried over from the previous step.

use crate::geometry::{Rect, Size, to_i32};
use std::str::FromStr;

/// Phrase that selects the whole image
pub const DEFAULT_KEYPHRASE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
    Center,
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "center" => Ok(Self::Center),
            _ => Err(()),
        }
    }
}

impl Direction {
    /// Apply one token to the current rectangle
    fn apply(self, roi: Rect, fraction: f64, image: Size) -> Rect {
        let width = to_i32(image.width);
        let height = to_i32(image.height);
        let part_w = (f64::from(width) * fraction) as i32;
        let part_h = (f64::from(height) * fraction) as i32;

        match self {
            Self::Right => Rect::new(width - part_w, roi.y, part_w, roi.height),
            Self::Left => Rect::new(roi.x, roi.y, part_w, roi.height),
            Self::Bottom => Rect::new(roi.x, height - part_h, roi.width, part_h),
            Self::Top => Rect::new(roi.x, roi.y, roi.width, part_h),
            Self::Center => Rect::new(
                (width - part_w) / 2,
                (height - part_h) / 2,
                part_w,
                part_h,
            ),
        }
    }
}

/// Parse a fraction token, either `num/den` or a plain decimal.
///
/// Only finite values in `(0, 1]` are accepted.
pub fn parse_fraction(token: &str) -> Option<f64> {
    let value = match token.split_once('/') {
        Some((num, den)) => num.trim().parse::<f64>().ok()? / den.trim().parse::<f64>().ok()?,
        None => token.parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0 && value <= 1.0).then_some(value)
}

/// Derive a rectangle of an image of `image_size` from a keyphrase.
///
/// Unknown directions and malformed fractions degrade to the full image.
/// A trailing token without a fraction is ignored.
pub fn roi_from_keyphrase(phrase: &str, image_size: Size) -> Rect {
    let full = Rect::full(image_size);
    let phrase = phrase.trim();
    if phrase.is_empty() || phrase == DEFAULT_KEYPHRASE {
        return full;
    }

    let tokens: Vec<&str> = phrase.split_whitespace().collect();
    let mut roi = full;
    for pair in tokens.chunks_exact(2) {
        let (direction, fraction) = (pair[0], pair[1]);

        let Ok(direction_kind) = direction.parse::<Direction>() else {
            log::error!("❌ Invalid direction '{direction}' in keyphrase '{phrase}'");
            return full;
        };
        let Some(fraction) = parse_fraction(fraction) else {
            log::warn!("⚠️ Malformed fraction '{fraction}' in keyphrase '{phrase}', using full image");
            return full;
        };

        roi = direction_kind.apply(roi, fraction, image_size);
    }
    if tokens.len() % 2 == 1 {
        log::debug!("Ignoring trailing token in keyphrase '{phrase}'");
    }

    clamp_roi(roi, image_size)
}

fn clamp_roi(roi: Rect, image_size: Size) -> Rect {
    let x = roi.x.max(0);
    let y = roi.y.max(0);
    Rect::new(
        x,
        y,
        roi.width.min(to_i32(image_size.width) - x),
        roi.height.min(to_i32(image_size.height) - y),
    )
}
