//! Synthetic, seeded test images

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect as DrawRect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn blocks(rng: &mut StdRng, width: u32, height: u32) -> Vec<DrawRect> {
    let count = 12 + (width * height / 600) as usize;
    (0..count)
        .map(|_| {
            let bw = rng.random_range(4..=(width / 4).max(5));
            let bh = rng.random_range(4..=(height / 4).max(5));
            let x = rng.random_range(-(bw as i32) / 2..width as i32);
            let y = rng.random_range(-(bh as i32) / 2..height as i32);
            DrawRect::at(x, y).of_size(bw, bh)
        })
        .collect()
}

/// Mildly noisy background covered with overlapping blocks of random intensity
pub fn textured_gray(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = GrayImage::from_fn(width, height, |_, _| Luma([rng.random_range(120..=136)]));
    for block in blocks(&mut rng, width, height) {
        let value = rng.random_range(0..=255u8);
        draw_filled_rect_mut(&mut image, block, Luma([value]));
    }
    image
}

pub fn textured_rgb(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = RgbImage::from_fn(width, height, |_, _| {
        let v = rng.random_range(120..=136);
        Rgb([v, v, v])
    });
    for block in blocks(&mut rng, width, height) {
        let color = Rgb([
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
        ]);
        draw_filled_rect_mut(&mut image, block, color);
    }
    image
}
