//! Locate a needle in a synthetic screenshot, both as an exact copy and after rotation
//! Usage: cargo run --release --example locate-demo [OUTPUT_DIR]
//!
//! With OUTPUT_DIR set, the screenshot, the needle and the debug renderings are written there.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect as DrawRect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use screen_locate::geometry::{RotateDirection, rotate_image};
use screen_locate::locate::{Detection, Locator, LocatorConfig};
use screen_locate::{Rect, Size};
use std::path::PathBuf;
use std::time::Instant;

/// Busy "desktop" made of random panels and dots
fn synthetic_screen(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_pixel(width, height, Rgb([30, 34, 40]));

    for _ in 0..120 {
        let x = rng.random_range(0..width as i32);
        let y = rng.random_range(0..height as i32);
        let w = rng.random_range(8..80);
        let h = rng.random_range(8..60);
        let color = Rgb([rng.random(), rng.random(), rng.random()]);
        draw_filled_rect_mut(&mut img, DrawRect::at(x, y).of_size(w, h), color);
    }
    for _ in 0..200 {
        let center = (rng.random_range(0..width as i32), rng.random_range(0..height as i32));
        let color = Rgb([rng.random(), rng.random(), rng.random()]);
        draw_filled_circle_mut(&mut img, center, rng.random_range(2..10), color);
    }
    DynamicImage::ImageRgb8(img)
}

fn report(label: &str, expected: Rect, detection: &Detection, elapsed_ms: u128) {
    match detection {
        Detection::Found(rect) => {
            let dx = rect.x - expected.x;
            let dy = rect.y - expected.y;
            println!("   ✅ {label}: {rect} (offset {dx},{dy}) in {elapsed_ms}ms");
        }
        Detection::NotFound(reason) => {
            println!("   ❌ {label}: not found ({reason}) in {elapsed_ms}ms");
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let output_dir = std::env::args().nth(1).map(PathBuf::from);
    let config = LocatorConfig {
        debug_dir: output_dir.clone(),
        ..LocatorConfig::default()
    };
    let locator = Locator::new(config);

    let screen = synthetic_screen(800, 600, 7);
    let expected = Rect::new(420, 260, 220, 160);
    let needle = screen.crop_imm(
        expected.x as u32,
        expected.y as u32,
        expected.width as u32,
        expected.height as u32,
    );
    println!("🖥️ Screen {}, needle {} at {expected}", Size::of(&screen), Size::of(&needle));

    println!("📐 Correlation search");
    for (scale, grayscale) in [(1.0, false), (0.5, false), (0.5, true)] {
        let start = Instant::now();
        match locator.find_scored(&screen, &needle, scale, grayscale) {
            Ok(found) => println!(
                "   ✅ scale {scale} gray {grayscale}: {} score {:.4} in {}ms",
                found.rect,
                found.score,
                start.elapsed().as_millis()
            ),
            Err(e) => println!("   ❌ scale {scale}: {e}"),
        }
    }

    println!("🔑 Feature search");
    let start = Instant::now();
    match locator.try_locate(&screen, &needle, 64, 1.0, output_dir.is_some()) {
        Ok(detection) => report("exact copy", expected, &detection, start.elapsed().as_millis()),
        Err(e) => println!("   ❌ {e}"),
    }

    // Turn the whole screen so the needle only survives as a rotated patch
    let rotated_screen = rotate_image(&screen, RotateDirection::Right, 12.0);
    let start = Instant::now();
    match locator.try_locate(&rotated_screen, &needle, 64, 1.0, false) {
        Ok(Detection::Found(rect)) => println!(
            "   ✅ rotated screen: bounding box {rect} in {}ms",
            start.elapsed().as_millis()
        ),
        Ok(Detection::NotFound(reason)) => println!("   ❌ rotated screen: {reason}"),
        Err(e) => println!("   ❌ {e}"),
    }

    // Cache the screen features once and reuse them for several needles
    let screen_features = locator.extract_features(&screen);
    println!("🗂️ Cached {} screen keypoints", screen_features.len());
    for rect in [Rect::new(40, 40, 160, 120), Rect::new(600, 420, 180, 160)] {
        let patch = screen.crop_imm(rect.x as u32, rect.y as u32, rect.width as u32, rect.height as u32);
        let patch_features = locator.extract_features(&patch);
        let start = Instant::now();
        let detection =
            locator.try_locate_precomputed(&screen, &patch, &screen_features, &patch_features, 64, false);
        report("cached patch", rect, &detection, start.elapsed().as_millis());
    }

    if let Some(dir) = output_dir {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            println!("❌ Cannot create {}: {e}", dir.display());
            return;
        }
        for (name, image) in [("screen.png", &screen), ("needle.png", &needle), ("rotated.png", &rotated_screen)] {
            let path = dir.join(name);
            if let Err(e) = image.save(&path) {
                println!("⚠️ Failed to write {}: {e}", path.display());
            }
        }
        println!("💾 Wrote images to {}", dir.display());
    }
}
