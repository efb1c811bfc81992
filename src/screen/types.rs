// Core screen types and traits
use super::error::ScreenResult;
use crate::geometry::{Rect, Size};
use image::DynamicImage;
use std::fmt;

/// Opaque handle to a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Trait defining capture and input capabilities (one implementation per platform)
pub trait ScreenBackend {
    fn screen_size(&self) -> Size;

    // Pixels of a screen-space rectangle
    fn capture_region(&self, region: Rect) -> ScreenResult<DynamicImage>;

    fn find_window_by_title(&self, title: &str) -> Option<WindowId>;

    // Screen-space rectangle covered by the window
    fn window_bounds(&self, window: WindowId) -> ScreenResult<Rect>;

    // Default window capture goes through the window's screen rectangle
    fn capture_window(&self, window: WindowId) -> ScreenResult<DynamicImage> {
        let bounds = self.window_bounds(window)?;
        self.capture_region(bounds)
    }

    fn click_at(&mut self, x: i32, y: i32) -> ScreenResult<()>;
}
