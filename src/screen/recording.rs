//! Screenshot-backed screen that records clicks instead of injecting them

use super::error::{ScreenError, ScreenResult};
use super::types::{ScreenBackend, WindowId};
use crate::geometry::{Rect, Size};
use image::DynamicImage;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RecordingScreen {
    screen: DynamicImage,
    windows: Vec<(String, Rect)>,
    clicks: Vec<(i32, i32)>,
}

impl RecordingScreen {
    pub fn new(screen: DynamicImage) -> Self {
        Self {
            screen,
            windows: Vec::new(),
            clicks: Vec::new(),
        }
    }

    /// Load a screenshot from disk
    pub fn open(path: impl AsRef<Path>) -> ScreenResult<Self> {
        let path = path.as_ref();
        let screen = image::open(path).map_err(|source| ScreenError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "📸 Loaded screenshot {} ({}x{})",
            path.display(),
            screen.width(),
            screen.height()
        );
        Ok(Self::new(screen))
    }

    /// Register a window occupying `bounds`, clipped to the screen
    pub fn with_window(mut self, title: impl Into<String>, bounds: Rect) -> Self {
        let clipped = bounds.clamp_to(self.screen_size());
        self.windows.push((title.into(), clipped));
        self
    }

    /// Clicks performed so far, in order
    pub fn clicks(&self) -> &[(i32, i32)] {
        &self.clicks
    }

    pub fn screen(&self) -> &DynamicImage {
        &self.screen
    }
}

impl ScreenBackend for RecordingScreen {
    fn screen_size(&self) -> Size {
        Size::of(&self.screen)
    }

    fn capture_region(&self, region: Rect) -> ScreenResult<DynamicImage> {
        let screen = self.screen_size();
        if !region.is_inside(screen) {
            return Err(ScreenError::RegionOutOfBounds { region, screen });
        }
        Ok(self.screen.crop_imm(
            region.x as u32,
            region.y as u32,
            region.width as u32,
            region.height as u32,
        ))
    }

    fn find_window_by_title(&self, title: &str) -> Option<WindowId> {
        self.windows
            .iter()
            .position(|(name, _)| name == title)
            .map(|idx| WindowId(idx as u64))
    }

    fn window_bounds(&self, window: WindowId) -> ScreenResult<Rect> {
        usize::try_from(window.0)
            .ok()
            .and_then(|idx| self.windows.get(idx))
            .map(|(_, bounds)| *bounds)
            .ok_or(ScreenError::InvalidWindow(window.0))
    }

    fn click_at(&mut self, x: i32, y: i32) -> ScreenResult<()> {
        let screen = self.screen_size();
        if x < 0 || y < 0 || x >= screen.width as i32 || y >= screen.height as i32 {
            return Err(ScreenError::ClickOutOfBounds { x, y });
        }
        log::info!("🖱️ Click at ({x}, {y})");
        self.clicks.push((x, y));
        Ok(())
    }
}
