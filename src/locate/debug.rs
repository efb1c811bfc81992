//! Visual debugging of keypoints and matches
//!
//! Renderings are only written when a debug directory is configured, and a
//! failed write is logged and otherwise ignored.

use super::feature_match::DescriptorMatch;
use super::features::{Features, KeyPoint};
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use std::path::Path;

const KEYPOINT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const MATCH_COLOR: Rgba<u8> = Rgba([255, 64, 0, 255]);

fn draw_keypoint(canvas: &mut RgbaImage, kp: &KeyPoint, dx: f32, color: Rgba<u8>) {
    let (x, y) = (kp.x + dx, kp.y);
    let radius = (kp.size / 2.0).max(2.0);
    draw_hollow_circle_mut(canvas, (x.round() as i32, y.round() as i32), radius.round() as i32, color);

    let (sin, cos) = kp.angle.to_radians().sin_cos();
    draw_line_segment_mut(canvas, (x, y), (x + radius * cos, y + radius * sin), color);
}

/// Keypoints drawn as oriented circles over the image
pub fn render_keypoints(image: &DynamicImage, features: &Features) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for kp in &features.keypoints {
        draw_keypoint(&mut canvas, kp, 0.0, KEYPOINT_COLOR);
    }
    canvas
}

/// Needle and haystack side by side with a line per match
pub fn render_matches(
    needle: &DynamicImage,
    needle_features: &Features,
    haystack: &DynamicImage,
    haystack_features: &Features,
    matches: &[DescriptorMatch],
) -> RgbaImage {
    let width = needle.width() + haystack.width();
    let height = needle.height().max(haystack.height());
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    imageops::overlay(&mut canvas, &needle.to_rgba8(), 0, 0);
    imageops::overlay(&mut canvas, &haystack.to_rgba8(), i64::from(needle.width()), 0);

    let dx = needle.width() as f32;
    for m in matches {
        let from = &needle_features.keypoints[m.query_idx];
        let to = &haystack_features.keypoints[m.train_idx];
        draw_keypoint(&mut canvas, from, 0.0, KEYPOINT_COLOR);
        draw_keypoint(&mut canvas, to, dx, KEYPOINT_COLOR);
        draw_line_segment_mut(&mut canvas, (from.x, from.y), (to.x + dx, to.y), MATCH_COLOR);
    }
    canvas
}

fn save(dir: &Path, name: &str, image: &RgbaImage) {
    let path = dir.join(name);
    if let Err(e) = std::fs::create_dir_all(dir) {
        log::warn!("⚠️ Cannot create debug directory {}: {e}", dir.display());
        return;
    }
    match image.save(&path) {
        Ok(()) => log::debug!("🖼️ Wrote {}", path.display()),
        Err(e) => log::warn!("⚠️ Failed to write {}: {e}", path.display()),
    }
}

pub(crate) fn report_keypoints(
    dir: Option<&Path>,
    role: &str,
    image: &DynamicImage,
    features: &Features,
) {
    log::debug!(
        "🔑 {role}: {} keypoints on {}x{}",
        features.len(),
        image.width(),
        image.height()
    );
    for kp in &features.keypoints {
        log::trace!(
            "   ({:.1}, {:.1}) angle {:.1} octave {} response {:.1}",
            kp.x,
            kp.y,
            kp.angle,
            kp.octave,
            kp.response
        );
    }
    if let Some(dir) = dir {
        save(dir, &format!("keypoints_{role}.png"), &render_keypoints(image, features));
    }
}

pub(crate) fn report_matches(
    dir: Option<&Path>,
    needle: &DynamicImage,
    needle_features: &Features,
    haystack: &DynamicImage,
    haystack_features: &Features,
    matches: &[DescriptorMatch],
) {
    for m in matches {
        log::debug!(
            "   needle #{} -> haystack #{} distance {}",
            m.query_idx,
            m.train_idx,
            m.distance
        );
    }
    if let Some(dir) = dir {
        let rendering =
            render_matches(needle, needle_features, haystack, haystack_features, matches);
        save(dir, "matches.png", &rendering);
    }
}
