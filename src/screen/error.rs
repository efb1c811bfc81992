use crate::geometry::{Rect, Size};
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for screen operations.
pub type ScreenResult<T> = Result<T, ScreenError>;

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("Failed to load screenshot {path:?}: {source}")]
    LoadFailed {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("No window titled '{title}'")]
    WindowNotFound { title: String },

    #[error("Unknown window handle {0}")]
    InvalidWindow(u64),

    #[error("Capture region {region} is outside the screen {screen}")]
    RegionOutOfBounds { region: Rect, screen: Size },

    #[error("Click coordinates are out of bounds: x={x}, y={y}")]
    ClickOutOfBounds { x: i32, y: i32 },
}
