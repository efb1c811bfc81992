//! Template correlation search
//!
//! Translation-only, single best match. Both images may be downscaled first
//! to bound the cost of the exhaustive search.

use super::error::{LocateError, LocateResult, validate_scale};
use crate::geometry::{Rect, Size};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use serde::{Deserialize, Serialize};

/// Window energy below this is treated as a flat (zero-variance) window
const FLAT_ENERGY: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    /// Normalized cross-correlation of raw intensities
    CrossCorrelationNormalized,
    /// Normalized cross-correlation of mean-subtracted intensities
    #[default]
    CoefficientNormalized,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationMatch {
    /// Located rectangle in original haystack coordinates
    pub rect: Rect,
    /// Peak correlation score, at most 1.0
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationMatcher {
    method: CorrelationMethod,
}

impl CorrelationMatcher {
    pub fn new(method: CorrelationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> CorrelationMethod {
        self.method
    }

    /// Find the offset where `needle` correlates best with `haystack`.
    ///
    /// `scale` must lie in `(0, 1]`. The returned rectangle is in original
    /// haystack coordinates and always lies inside the haystack.
    ///
    /// Colour and coefficient searches are exhaustive, costing haystack area
    /// times needle area per channel. On full-HD screenshots pass a `scale`
    /// of 0.5 or lower.
    pub fn find(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        scale: f64,
        grayscale: bool,
    ) -> LocateResult<Rect> {
        self.find_scored(haystack, needle, scale, grayscale)
            .map(|found| found.rect)
    }

    /// Like [`find`](Self::find), also reporting the peak score.
    pub fn find_scored(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        scale: f64,
        grayscale: bool,
    ) -> LocateResult<CorrelationMatch> {
        validate_scale(scale)?;
        let haystack_size = Size::of(haystack);
        check_not_empty(haystack_size, "haystack")?;
        check_not_empty(Size::of(needle), "needle")?;

        let (offset, scaled_needle, score) = if grayscale {
            let hay = working_gray(haystack, scale);
            let ndl = working_gray(needle, scale);
            check_fits(Size::new(ndl.width(), ndl.height()), Size::new(hay.width(), hay.height()))?;

            let (offset, score) = match self.method {
                CorrelationMethod::CrossCorrelationNormalized => {
                    let surface =
                        match_template(&hay, &ndl, MatchTemplateMethod::CrossCorrelationNormalized);
                    let extremes = find_extremes(&surface);
                    (extremes.max_value_location, extremes.max_value)
                }
                CorrelationMethod::CoefficientNormalized => {
                    best_offset(&Planes::from_gray(&hay), &Planes::from_gray(&ndl), self.method)
                }
            };
            (offset, Size::new(ndl.width(), ndl.height()), score)
        } else {
            let hay = working_rgb(haystack, scale);
            let ndl = working_rgb(needle, scale);
            check_fits(Size::new(ndl.width(), ndl.height()), Size::new(hay.width(), hay.height()))?;

            let (offset, score) =
                best_offset(&Planes::from_rgb(&hay), &Planes::from_rgb(&ndl), self.method);
            (offset, Size::new(ndl.width(), ndl.height()), score)
        };

        let scaled_rect = Rect::new(
            offset.0 as i32,
            offset.1 as i32,
            scaled_needle.width as i32,
            scaled_needle.height as i32,
        );
        let rect = shift_inside(scaled_rect.unscale(scale), haystack_size);
        log::debug!(
            "🎯 Correlation peak {:.4} at {} (scaled {}, scale {})",
            score,
            rect,
            scaled_rect,
            scale
        );

        Ok(CorrelationMatch { rect, score })
    }
}

fn check_not_empty(size: Size, role: &'static str) -> LocateResult<()> {
    if size.is_empty() {
        return Err(LocateError::EmptyImage { role, size });
    }
    Ok(())
}

fn check_fits(needle: Size, haystack: Size) -> LocateResult<()> {
    if needle.width > haystack.width || needle.height > haystack.height {
        return Err(LocateError::NeedleLargerThanHaystack { needle, haystack });
    }
    Ok(())
}

/// Dimension after scaling, never below one pixel
pub(crate) fn scaled_dimension(dimension: u32, scale: f64) -> u32 {
    ((f64::from(dimension) * scale).round() as u32).max(1)
}

/// Private copy of `image` resized by `scale`
pub(crate) fn resized(image: &DynamicImage, scale: f64) -> DynamicImage {
    if scale == 1.0 {
        return image.clone();
    }
    image.resize_exact(
        scaled_dimension(image.width(), scale),
        scaled_dimension(image.height(), scale),
        FilterType::Triangle,
    )
}

fn working_gray(image: &DynamicImage, scale: f64) -> GrayImage {
    let gray = image.to_luma8();
    if scale == 1.0 {
        return gray;
    }
    imageops::resize(
        &gray,
        scaled_dimension(gray.width(), scale),
        scaled_dimension(gray.height(), scale),
        FilterType::Triangle,
    )
}

fn working_rgb(image: &DynamicImage, scale: f64) -> RgbImage {
    let rgb = image.to_rgb8();
    if scale == 1.0 {
        return rgb;
    }
    imageops::resize(
        &rgb,
        scaled_dimension(rgb.width(), scale),
        scaled_dimension(rgb.height(), scale),
        FilterType::Triangle,
    )
}

/// Move a rectangle inside `bounds` by shifting it, then clamp whatever
/// still overflows.
fn shift_inside(rect: Rect, bounds: Size) -> Rect {
    let (bw, bh) = (bounds.width as i32, bounds.height as i32);
    let mut shifted = rect;
    if shifted.x < 0 {
        shifted.x = 0;
    }
    if shifted.right() > bw {
        shifted.x = bw - shifted.width;
    }
    if shifted.y < 0 {
        shifted.y = 0;
    }
    if shifted.bottom() > bh {
        shifted.y = bh - shifted.height;
    }
    shifted.clamp_to(bounds)
}

/// Interleaved pixel samples as f64
struct Planes {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f64>,
}

impl Planes {
    fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            channels: 1,
            data: image.as_raw().iter().map(|&v| f64::from(v)).collect(),
        }
    }

    fn from_rgb(image: &RgbImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            channels: 3,
            data: image.as_raw().iter().map(|&v| f64::from(v)).collect(),
        }
    }
}

/// Per-channel summed-area tables of values and squared values
struct Integral {
    stride: usize,
    channels: usize,
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl Integral {
    fn new(planes: &Planes) -> Self {
        let stride = planes.width + 1;
        let channels = planes.channels;
        let len = stride * (planes.height + 1) * channels;
        let mut sums = vec![0.0; len];
        let mut squares = vec![0.0; len];

        for y in 0..planes.height {
            for ch in 0..channels {
                let mut row_sum = 0.0;
                let mut row_sq = 0.0;
                for x in 0..planes.width {
                    let v = planes.data[(y * planes.width + x) * channels + ch];
                    row_sum += v;
                    row_sq += v * v;
                    let above = (y * stride + x + 1) * channels + ch;
                    let here = ((y + 1) * stride + x + 1) * channels + ch;
                    sums[here] = sums[above] + row_sum;
                    squares[here] = squares[above] + row_sq;
                }
            }
        }

        Self {
            stride,
            channels,
            sums,
            squares,
        }
    }

    /// (sum, sum of squares) over a window for one channel
    fn window(&self, x: usize, y: usize, w: usize, h: usize, ch: usize) -> (f64, f64) {
        let at = |xx: usize, yy: usize| (yy * self.stride + xx) * self.channels + ch;
        let (a, b, c, d) = (at(x, y), at(x + w, y), at(x, y + h), at(x + w, y + h));
        (
            self.sums[d] - self.sums[b] - self.sums[c] + self.sums[a],
            self.squares[d] - self.squares[b] - self.squares[c] + self.squares[a],
        )
    }
}

/// Exhaustive search for the best-scoring offset, first in row-major order on ties.
fn best_offset(haystack: &Planes, needle: &Planes, method: CorrelationMethod) -> ((u32, u32), f32) {
    let (nw, nh, channels) = (needle.width, needle.height, needle.channels);
    let count = (nw * nh) as f64;

    let template: Vec<f64> = match method {
        CorrelationMethod::CrossCorrelationNormalized => needle.data.clone(),
        CorrelationMethod::CoefficientNormalized => {
            let mut means = vec![0.0; channels];
            for (i, v) in needle.data.iter().enumerate() {
                means[i % channels] += v;
            }
            means.iter_mut().for_each(|m| *m /= count);
            needle
                .data
                .iter()
                .enumerate()
                .map(|(i, v)| v - means[i % channels])
                .collect()
        }
    };
    let template_energy: f64 = template.iter().map(|v| v * v).sum();
    let integral = Integral::new(haystack);
    let row_len = nw * channels;

    let mut best = ((0, 0), f64::NEG_INFINITY);
    for y in 0..=(haystack.height - nh) {
        for x in 0..=(haystack.width - nw) {
            let mut cross = 0.0;
            for ty in 0..nh {
                let start = ((y + ty) * haystack.width + x) * channels;
                let window_row = &haystack.data[start..start + row_len];
                let template_row = &template[ty * row_len..(ty + 1) * row_len];
                cross += window_row
                    .iter()
                    .zip(template_row)
                    .map(|(a, b)| a * b)
                    .sum::<f64>();
            }

            let window_energy: f64 = (0..channels)
                .map(|ch| {
                    let (sum, sq) = integral.window(x, y, nw, nh, ch);
                    match method {
                        CorrelationMethod::CrossCorrelationNormalized => sq,
                        CorrelationMethod::CoefficientNormalized => sq - sum * sum / count,
                    }
                })
                .sum();

            let score = if window_energy < FLAT_ENERGY || template_energy < FLAT_ENERGY {
                0.0
            } else {
                cross / (template_energy * window_energy).sqrt()
            };
            if score > best.1 {
                best = ((x as u32, y as u32), score);
            }
        }
    }

    (best.0, best.1 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::fixtures::{textured_gray, textured_rgb};

    fn crop(image: &DynamicImage, rect: Rect) -> DynamicImage {
        image.crop_imm(
            rect.x as u32,
            rect.y as u32,
            rect.width as u32,
            rect.height as u32,
        )
    }

    #[test]
    fn test_exact_copy_found_at_offset() {
        let haystack = DynamicImage::ImageRgb8(textured_rgb(120, 90, 11));
        let expected = Rect::new(37, 21, 36, 26);
        let needle = crop(&haystack, expected);

        for method in [
            CorrelationMethod::CoefficientNormalized,
            CorrelationMethod::CrossCorrelationNormalized,
        ] {
            let matcher = CorrelationMatcher::new(method);
            for grayscale in [false, true] {
                let found = matcher.find_scored(&haystack, &needle, 1.0, grayscale).unwrap();
                assert_eq!(found.rect, expected, "{method:?} grayscale={grayscale}");
                assert!(found.score > 0.999, "score {} too low", found.score);
            }
        }
    }

    #[test]
    fn test_needle_at_corner() {
        let haystack = DynamicImage::ImageLuma8(textured_gray(80, 60, 3));
        let expected = Rect::new(55, 42, 25, 18);
        let needle = crop(&haystack, expected);

        let rect = CorrelationMatcher::default()
            .find(&haystack, &needle, 1.0, true)
            .unwrap();
        assert_eq!(rect, expected);
    }

    #[test]
    fn test_downscaled_result_stays_inside_haystack() {
        let haystack = DynamicImage::ImageRgb8(textured_rgb(121, 87, 5));
        let bounds = Size::of(&haystack);
        let matcher = CorrelationMatcher::default();

        for placed in [Rect::new(0, 0, 31, 23), Rect::new(90, 64, 31, 23), Rect::new(47, 30, 33, 21)] {
            let needle = crop(&haystack, placed);
            for scale in [0.1, 0.25, 1.0 / 3.0, 0.5, 0.75, 1.0] {
                let rect = matcher.find(&haystack, &needle, scale, false).unwrap();
                assert!(
                    rect.is_inside(bounds),
                    "rect {rect} escapes {bounds} at scale {scale}"
                );
            }

            let rect = matcher.find(&haystack, &needle, 0.5, false).unwrap();
            assert!((rect.x - placed.x).abs() <= 3, "x {} vs {}", rect.x, placed.x);
            assert!((rect.y - placed.y).abs() <= 3, "y {} vs {}", rect.y, placed.y);
        }
    }

    #[test]
    fn test_invalid_scale_is_hard_failure() {
        let haystack = DynamicImage::ImageLuma8(textured_gray(40, 40, 1));
        let needle = crop(&haystack, Rect::new(5, 5, 10, 10));
        let matcher = CorrelationMatcher::default();

        for scale in [0.0, -0.5, 1.0001, 2.0, f64::NAN] {
            let err = matcher.find(&haystack, &needle, scale, true).unwrap_err();
            assert!(matches!(err, LocateError::InvalidScale { .. }), "scale {scale}");
        }
    }

    #[test]
    fn test_oversized_needle_rejected() {
        let haystack = DynamicImage::ImageLuma8(textured_gray(40, 30, 1));
        let needle = DynamicImage::ImageLuma8(textured_gray(41, 10, 2));

        let err = CorrelationMatcher::default()
            .find(&haystack, &needle, 1.0, false)
            .unwrap_err();
        assert!(matches!(err, LocateError::NeedleLargerThanHaystack { .. }));
    }

    #[test]
    fn test_flat_images_score_zero() {
        let haystack = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, image::Luma([90])));
        let needle = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, image::Luma([90])));

        let found = CorrelationMatcher::default()
            .find_scored(&haystack, &needle, 1.0, true)
            .unwrap();
        assert_eq!(found.score, 0.0);
        assert_eq!(found.rect, Rect::new(0, 0, 5, 5));
    }

    #[test]
    fn test_shift_inside_moves_rather_than_shrinks() {
        let bounds = Size::new(100, 50);
        assert_eq!(shift_inside(Rect::new(90, 45, 20, 10), bounds), Rect::new(80, 40, 20, 10));
        assert_eq!(shift_inside(Rect::new(-3, -1, 20, 10), bounds), Rect::new(0, 0, 20, 10));
        assert_eq!(shift_inside(Rect::new(0, 0, 102, 10), bounds), Rect::new(0, 0, 100, 10));
    }
}
