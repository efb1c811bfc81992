//! Rectangles, sizes and the small geometric helpers shared by the matchers

use image::{DynamicImage, Luma, LumaA, Rgb, Rgba};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use nalgebra::Point2;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Points closer than this to an integer coordinate are treated as lying on it
const SNAP_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in image coordinates.
///
/// The all-zero rectangle is the "not found" sentinel returned by the matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const NOT_FOUND: Rect = Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image of the given size
    pub fn full(size: Size) -> Self {
        Self::new(0, 0, to_i32(size.width), to_i32(size.height))
    }

    pub fn is_found(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// True when the rectangle is non-empty and lies fully inside `bounds`
    pub fn is_inside(&self, bounds: Size) -> bool {
        self.is_found()
            && self.x >= 0
            && self.y >= 0
            && i64::from(self.right()) <= i64::from(bounds.width)
            && i64::from(self.bottom()) <= i64::from(bounds.height)
    }

    /// Clamp the origin to be non-negative and shrink the size so the
    /// rectangle stays within `bounds`. Never yields a negative size.
    pub fn clamp_to(&self, bounds: Size) -> Self {
        let bw = to_i32(bounds.width);
        let bh = to_i32(bounds.height);
        let x = self.x.max(0);
        let y = self.y.max(0);
        let width = self.width.min(bw - x.min(bw)).max(0);
        let height = self.height.min(bh - y.min(bh)).max(0);
        Self::new(x, y, width, height)
    }

    /// Map a rectangle found in an image resized by `scale` back to the
    /// original image, truncating toward zero.
    pub fn unscale(&self, scale: f64) -> Self {
        if scale == 1.0 {
            return *self;
        }
        Self::new(
            (f64::from(self.x) / scale) as i32,
            (f64::from(self.y) / scale) as i32,
            (f64::from(self.width) / scale) as i32,
            (f64::from(self.height) / scale) as i32,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Saturating conversion of an image dimension
pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// True if the rectangle's width/height ratio, or its height/width ratio,
/// is within `tolerance` of the reference aspect ratio.
///
/// The inverted comparison accepts matches rotated by 90 degrees.
pub fn aspect_ratio_close(rect: &Rect, reference: Size, tolerance: f64) -> bool {
    if !rect.is_found() || reference.is_empty() {
        return false;
    }
    let w = f64::from(rect.width);
    let h = f64::from(rect.height);
    let expected = f64::from(reference.width) / f64::from(reference.height);

    (w / h - expected).abs() <= tolerance || (h / w - expected).abs() <= tolerance
}

/// Smallest integer rectangle enclosing all points.
///
/// Returns [`Rect::NOT_FOUND`] for an empty or non-finite point set.
pub fn bounding_rect(points: &[Point2<f64>]) -> Rect {
    if points.is_empty() || points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Rect::NOT_FOUND;
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        let (x, y) = (snap(p.x), snap(p.y));
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let x = min_x.floor() as i32;
    let y = min_y.floor() as i32;
    Rect::new(
        x,
        y,
        (max_x.ceil() as i32).saturating_sub(x),
        (max_y.ceil() as i32).saturating_sub(y),
    )
}

fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        value
    }
}

/// Copy the region of interest out of `image`.
///
/// An empty region, or one not fully inside the image, yields `None`.
pub fn crop_region(image: &DynamicImage, roi: Rect) -> Option<DynamicImage> {
    if !roi.is_inside(Size::of(image)) {
        log::error!(
            "❌ Invalid region of interest {} for image {}",
            roi,
            Size::of(image)
        );
        return None;
    }
    Some(image.crop_imm(
        roi.x as u32,
        roi.y as u32,
        roi.width as u32,
        roi.height as u32,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateDirection {
    Left,
    Right,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid rotation direction '{0}', expected 'left' or 'right'")]
pub struct InvalidDirection(pub String);

impl FromStr for RotateDirection {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(InvalidDirection(other.to_string())),
        }
    }
}

/// Rotate about the image centre, keeping the canvas size.
///
/// `right` turns counter-clockwise by `angle_degrees` and `left` negates the
/// angle. Any other direction is logged and the image comes back unchanged.
pub fn rotate(image: &DynamicImage, direction: &str, angle_degrees: f64) -> DynamicImage {
    match direction.parse::<RotateDirection>() {
        Ok(direction) => rotate_image(image, direction, angle_degrees),
        Err(e) => {
            log::error!("❌ {e}");
            image.clone()
        }
    }
}

/// Typed form of [`rotate`]. Uncovered pixels are zero.
pub fn rotate_image(
    image: &DynamicImage,
    direction: RotateDirection,
    angle_degrees: f64,
) -> DynamicImage {
    let counter_clockwise = match direction {
        RotateDirection::Right => angle_degrees,
        RotateDirection::Left => -angle_degrees,
    };
    // imageproc rotates clockwise for positive theta
    let theta = (-counter_clockwise).to_radians() as f32;
    let interpolation = Interpolation::Bilinear;

    match image {
        DynamicImage::ImageLuma8(img) => {
            DynamicImage::ImageLuma8(rotate_about_center(img, theta, interpolation, Luma([0])))
        }
        DynamicImage::ImageLumaA8(img) => DynamicImage::ImageLumaA8(rotate_about_center(
            img,
            theta,
            interpolation,
            LumaA([0, 0]),
        )),
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(rotate_about_center(
            img,
            theta,
            interpolation,
            Rgb([0, 0, 0]),
        )),
        other => DynamicImage::ImageRgba8(rotate_about_center(
            &other.to_rgba8(),
            theta,
            interpolation,
            Rgba([0, 0, 0, 0]),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_clamp_shrinks_to_bounds() {
        let rect = Rect::new(-10, 5, 50, 200).clamp_to(Size::new(30, 100));
        assert_eq!(rect, Rect::new(0, 5, 30, 95));
    }

    #[test]
    fn test_clamp_never_negative() {
        let rect = Rect::new(150, 150, 20, 20).clamp_to(Size::new(100, 100));
        assert_eq!(rect.width, 0);
        assert_eq!(rect.height, 0);
        assert!(!rect.is_found());
    }

    #[test]
    fn test_aspect_ratio_symmetric_under_swap() {
        let reference = Size::new(200, 100);
        for (w, h) in [(40, 20), (20, 40), (45, 20), (30, 31), (10, 90)] {
            let a = aspect_ratio_close(&Rect::new(0, 0, w, h), reference, 0.2);
            let b = aspect_ratio_close(&Rect::new(0, 0, h, w), reference, 0.2);
            assert_eq!(a, b, "asymmetric result for {w}x{h}");
        }
    }

    #[test]
    fn test_aspect_ratio_rejects_implausible() {
        let reference = Size::new(100, 100);
        assert!(aspect_ratio_close(&Rect::new(3, 4, 110, 100), reference, 0.2));
        assert!(!aspect_ratio_close(&Rect::new(3, 4, 300, 100), reference, 0.2));
        assert!(!aspect_ratio_close(&Rect::NOT_FOUND, reference, 0.2));
    }

    #[test]
    fn test_bounding_rect_of_exact_corners() {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(64.0, 0.0),
            Point2::new(64.0, 48.0),
            Point2::new(0.0, 48.0),
        ];
        assert_eq!(bounding_rect(&corners), Rect::new(0, 0, 64, 48));

        let jittered = [
            Point2::new(9.9999999, 20.0000004),
            Point2::new(74.0000002, 19.9999996),
            Point2::new(74.0, 68.0),
            Point2::new(10.0, 68.0000001),
        ];
        assert_eq!(bounding_rect(&jittered), Rect::new(10, 20, 64, 48));
    }

    #[test]
    fn test_bounding_rect_rejects_non_finite() {
        let points = [Point2::new(0.0, 0.0), Point2::new(f64::INFINITY, 3.0)];
        assert_eq!(bounding_rect(&points), Rect::NOT_FOUND);
        assert_eq!(bounding_rect(&[]), Rect::NOT_FOUND);
    }

    #[test]
    fn test_huge_dimensions_saturate() {
        assert_eq!(to_i32(u32::MAX), i32::MAX);
        assert_eq!(Rect::full(Size::new(u32::MAX, 10)), Rect::new(0, 0, i32::MAX, 10));
    }

    #[test]
    fn test_unscale_truncates() {
        let rect = Rect::new(25, 13, 51, 33).unscale(0.5);
        assert_eq!(rect, Rect::new(50, 26, 102, 66));
        let rect = Rect::new(10, 10, 10, 10).unscale(0.3);
        assert_eq!(rect, Rect::new(33, 33, 33, 33));
    }

    #[test]
    fn test_crop_region_validates_roi() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(40, 30, |x, y| {
            Luma([(x + y) as u8])
        }));

        let crop = crop_region(&image, Rect::new(10, 5, 20, 10)).unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 10));
        assert_eq!(crop.to_luma8().get_pixel(0, 0)[0], 15);

        assert!(crop_region(&image, Rect::new(30, 0, 20, 10)).is_none());
        assert!(crop_region(&image, Rect::new(-1, 0, 5, 5)).is_none());
        assert!(crop_region(&image, Rect::NOT_FOUND).is_none());
    }

    #[test]
    fn test_rotate_invalid_direction_returns_unchanged() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 9, |x, y| {
            Rgb([x as u8 * 10, y as u8 * 20, 7])
        }));
        let rotated = rotate(&image, "up", 45.0);
        assert_eq!(rotated.as_bytes(), image.as_bytes());
        assert_eq!((rotated.width(), rotated.height()), (16, 9));
    }

    #[test]
    fn test_rotate_keeps_canvas_size() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 10, Luma([200])));
        let rotated = rotate(&image, "left", 30.0);
        assert_eq!((rotated.width(), rotated.height()), (20, 10));
        // Corners fall outside the rotated content
        assert_eq!(rotated.to_luma8().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_rotate_right_is_counter_clockwise() {
        // Single bright pixel right of centre
        let mut img = GrayImage::new(20, 20);
        img.put_pixel(18, 10, Luma([255]));
        let image = DynamicImage::ImageLuma8(img);

        let rotated = rotate(&image, "right", 90.0).to_luma8();
        // Counter-clockwise on screen moves it above the centre
        assert!(rotated.get_pixel(10, 2)[0] > 128);
        assert_eq!(rotated.get_pixel(10, 18)[0], 0);

        let rotated = rotate(&image, "left", 90.0).to_luma8();
        assert!(rotated.get_pixel(10, 18)[0] > 128);
    }

    #[test]
    fn test_direction_parsing_is_case_sensitive() {
        assert_eq!("left".parse(), Ok(RotateDirection::Left));
        assert_eq!("right".parse(), Ok(RotateDirection::Right));
        assert!("Left".parse::<RotateDirection>().is_err());
    }
}
