//! Oriented FAST keypoints with rotated binary descriptors
//!
//! Keypoints are detected with FAST-9 on an image pyramid, ranked by Harris
//! response and given an orientation from the intensity centroid of their
//! patch. Each descriptor is 256 intensity comparisons on a smoothed copy of
//! the level, with the comparison pattern rotated to the keypoint angle.

use super::config::LocatorConfig;
use crate::geometry::Size;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::corners::{Corner, corners_fast9};
use imageproc::definitions::Image;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::LazyLock;

pub const DESCRIPTOR_BYTES: usize = 32;
pub const DESCRIPTOR_BITS: u32 = (DESCRIPTOR_BYTES * 8) as u32;

/// 256-bit binary descriptor
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

const HARRIS_BLOCK_RADIUS: i32 = 3;
const HARRIS_K: f32 = 0.04;
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;
/// Test points lie within this distance of the keypoint on each axis
const PATTERN_EXTENT: i32 = 13;
const PATTERN_SEED: u64 = 0x0B1F_5EED;

/// Point pairs `(x1, y1, x2, y2)` compared for each descriptor bit
static TEST_PATTERN: LazyLock<Vec<[i32; 4]>> = LazyLock::new(|| {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    (0..DESCRIPTOR_BITS)
        .map(|_| {
            let mut pair = [0; 4];
            for coord in pair.iter_mut() {
                *coord = rng.random_range(-PATTERN_EXTENT..=PATTERN_EXTENT);
            }
            pair
        })
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Position in full-resolution image coordinates
    pub x: f32,
    pub y: f32,
    /// Patch diameter at the detection level
    pub size: f32,
    /// Orientation in degrees, `[0, 360)`
    pub angle: f32,
    /// Harris corner response
    pub response: f32,
    /// Pyramid level the keypoint was detected on
    pub octave: u8,
}

/// Keypoints and their descriptors, index-aligned.
///
/// Extract once for an unchanging haystack and reuse across queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbParams {
    pub min_keypoints: usize,
    pub keypoint_density: f64,
    pub levels: usize,
    pub scale_factor: f64,
    pub fast_threshold: u8,
    pub edge_threshold: u32,
    pub patch_size: u32,
}

impl From<&LocatorConfig> for OrbParams {
    fn from(config: &LocatorConfig) -> Self {
        Self {
            min_keypoints: config.min_keypoints,
            keypoint_density: config.keypoint_density,
            levels: config.pyramid_levels,
            scale_factor: config.pyramid_scale,
            fast_threshold: config.fast_threshold,
            edge_threshold: config.edge_threshold,
            patch_size: config.patch_size,
        }
    }
}

impl Default for OrbParams {
    fn default() -> Self {
        Self::from(&LocatorConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrbExtractor {
    params: OrbParams,
}

impl OrbExtractor {
    pub fn new(params: OrbParams) -> Self {
        Self { params }
    }

    pub fn from_config(config: &LocatorConfig) -> Self {
        Self::new(OrbParams::from(config))
    }

    pub fn params(&self) -> &OrbParams {
        &self.params
    }

    /// Number of keypoints requested for an image: proportional to its
    /// area, but never below the configured minimum.
    pub fn keypoint_budget(&self, size: Size) -> usize {
        let area = f64::from(size.width) * f64::from(size.height);
        ((self.params.keypoint_density * area) as usize).max(self.params.min_keypoints)
    }

    /// Detect keypoints and compute their descriptors.
    ///
    /// Images without enough texture, or smaller than the detection
    /// border, produce empty features.
    pub fn extract(&self, image: &DynamicImage) -> Features {
        let gray = image.to_luma8();
        let budget = self.keypoint_budget(Size::new(gray.width(), gray.height()));
        let pyramid = self.build_pyramid(gray);
        let quotas = level_quotas(budget, pyramid.len(), self.params.scale_factor);

        let mut features = Features::default();
        for (level, level_image) in pyramid.iter().enumerate() {
            let level_scale = self.params.scale_factor.powi(level as i32) as f32;
            let quota = quotas.get(level).copied().unwrap_or(0);
            let detected = self.detect_level(level_image, quota);
            if detected.is_empty() {
                continue;
            }

            let smoothed = gaussian_blur_f32(level_image, DESCRIPTOR_BLUR_SIGMA);
            for (x, y, response) in detected {
                let angle = self.orientation(level_image, x, y);
                features.keypoints.push(KeyPoint {
                    x: x as f32 * level_scale,
                    y: y as f32 * level_scale,
                    size: self.params.patch_size as f32 * level_scale,
                    angle,
                    response,
                    octave: level as u8,
                });
                features.descriptors.push(describe(&smoothed, x, y, angle));
            }
        }

        log::debug!(
            "🔑 Extracted {} keypoints (budget {}) over {} pyramid levels",
            features.len(),
            budget,
            pyramid.len()
        );
        features
    }

    fn build_pyramid(&self, base: GrayImage) -> Vec<GrayImage> {
        let min_side = 2 * self.params.edge_threshold + 1;
        let (width, height) = (base.width(), base.height());
        if width < min_side || height < min_side {
            return Vec::new();
        }

        // The base level is always searched, even when zero levels are configured
        let mut pyramid = vec![base];
        for level in 1..self.params.levels {
            let factor = self.params.scale_factor.powi(level as i32);
            let w = (f64::from(width) / factor).round() as u32;
            let h = (f64::from(height) / factor).round() as u32;
            if w < min_side || h < min_side {
                break;
            }
            pyramid.push(imageops::resize(&pyramid[0], w, h, FilterType::Triangle));
        }
        pyramid
    }

    /// Strongest corners on one level as `(x, y, harris_response)`
    fn detect_level(&self, image: &GrayImage, quota: usize) -> Vec<(u32, u32, f32)> {
        if quota == 0 {
            return Vec::new();
        }
        let border = self.params.edge_threshold;
        let (width, height) = image.dimensions();
        let corners: Vec<Corner> = corners_fast9(image, self.params.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= border && c.y >= border && c.x < width - border && c.y < height - border
            })
            .collect();
        let corners = suppress_non_maxima(corners, width, height);

        let gx = horizontal_sobel(image);
        let gy = vertical_sobel(image);
        let mut ranked: Vec<(u32, u32, f32)> = corners
            .iter()
            .map(|c| (c.x, c.y, harris_response(&gx, &gy, c.x, c.y)))
            .collect();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));
        ranked.truncate(quota);
        ranked
    }

    /// Intensity centroid angle in degrees over a circular patch
    fn orientation(&self, image: &GrayImage, x: u32, y: u32) -> f32 {
        let radius = (self.params.patch_size / 2) as i32;
        let (cx, cy) = (x as i32, y as i32);
        let (mut m10, mut m01) = (0.0f64, 0.0f64);

        for v in -radius..=radius {
            let u_max = f64::from(radius * radius - v * v).sqrt() as i32;
            for u in -u_max..=u_max {
                let intensity = f64::from(sample(image, cx + u, cy + v));
                m10 += f64::from(u) * intensity;
                m01 += f64::from(v) * intensity;
            }
        }

        let angle = m01.atan2(m10).to_degrees().rem_euclid(360.0) as f32;
        // rounding to f32 can land exactly on 360
        if angle >= 360.0 { 0.0 } else { angle }
    }
}

/// Split the keypoint budget across pyramid levels, geometrically
/// decreasing with the level's area.
fn level_quotas(total: usize, levels: usize, scale_factor: f64) -> Vec<usize> {
    if levels == 0 {
        return Vec::new();
    }
    let factor = 1.0 / scale_factor;
    let mut per_level = total as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));

    let mut quotas = Vec::with_capacity(levels);
    let mut assigned = 0;
    for _ in 0..levels - 1 {
        let quota = per_level.round() as usize;
        quotas.push(quota);
        assigned += quota;
        per_level *= factor;
    }
    quotas.push(total.saturating_sub(assigned));
    quotas
}

/// Keep corners whose FAST score is not beaten by any 8-neighbour.
/// Equal neighbours are resolved in favour of the first in raster order.
fn suppress_non_maxima(corners: Vec<Corner>, width: u32, height: u32) -> Vec<Corner> {
    let mut scores = vec![f32::NEG_INFINITY; (width * height) as usize];
    for c in &corners {
        scores[(c.y * width + c.x) as usize] = c.score;
    }

    corners
        .into_iter()
        .filter(|c| {
            let own = (c.y * width + c.x) as usize;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (c.x as i32 + dx, c.y as i32 + dy);
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    let neighbour = (ny as u32 * width + nx as u32) as usize;
                    let other = scores[neighbour];
                    if other > c.score || (other == c.score && neighbour < own) {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

fn harris_response(gx: &Image<Luma<i16>>, gy: &Image<Luma<i16>>, x: u32, y: u32) -> f32 {
    let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
    let (width, height) = gx.dimensions();
    for dy in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
        for dx in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
            let px = (x as i32 + dx).clamp(0, width as i32 - 1) as u32;
            let py = (y as i32 + dy).clamp(0, height as i32 - 1) as u32;
            let ix = f32::from(gx.get_pixel(px, py)[0]);
            let iy = f32::from(gy.get_pixel(px, py)[0]);
            a += ix * ix;
            b += iy * iy;
            c += ix * iy;
        }
    }
    a * b - c * c - HARRIS_K * (a + b) * (a + b)
}

/// Pixel value with coordinates clamped to the image
fn sample(image: &GrayImage, x: i32, y: i32) -> u8 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0, width as i32 - 1) as u32;
    let y = y.clamp(0, height as i32 - 1) as u32;
    image.get_pixel(x, y)[0]
}

fn describe(smoothed: &GrayImage, x: u32, y: u32, angle_degrees: f32) -> Descriptor {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let (cx, cy) = (x as i32, y as i32);
    let rotated = |px: i32, py: i32| {
        let (fx, fy) = (px as f32, py as f32);
        (
            cx + (fx * cos - fy * sin).round() as i32,
            cy + (fx * sin + fy * cos).round() as i32,
        )
    };

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (bit, [x1, y1, x2, y2]) in TEST_PATTERN.iter().enumerate() {
        let (ax, ay) = rotated(*x1, *y1);
        let (bx, by) = rotated(*x2, *y2);
        if sample(smoothed, ax, ay) < sample(smoothed, bx, by) {
            descriptor[bit / 8] |= 1 << (bit % 8);
        }
    }
    descriptor
}
