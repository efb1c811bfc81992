use crate::geometry::{Rect, Size};
use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for localization calls.
pub type LocateResult<T> = Result<T, LocateError>;

/// Caller mistakes. These are never collapsed into a "not found" result.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Scale must lie in (0, 1], got {scale}")]
    InvalidScale { scale: f64 },

    #[error("Cannot search an empty {role} image ({size})")]
    EmptyImage { role: &'static str, size: Size },

    #[error("Needle {needle} does not fit inside haystack {haystack}")]
    NeedleLargerThanHaystack { needle: Size, haystack: Size },

    #[error("Invalid locator configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },
}

/// Expected, data-dependent reasons a needle was not located.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    #[error("no descriptors extracted from the {role} image")]
    EmptyDescriptors { role: &'static str },

    #[error("{role} features have {keypoints} keypoints but {descriptors} descriptors")]
    MisalignedFeatures {
        role: &'static str,
        keypoints: usize,
        descriptors: usize,
    },

    #[error("no cross-checked descriptor matches")]
    NoMatches,

    #[error("only {found} good matches, need at least {required}")]
    TooFewMatches { found: usize, required: usize },

    #[error("homography estimation failed or is degenerate")]
    DegenerateHomography,

    #[error("projected region {rect} is degenerate")]
    Degenerate { rect: Rect },

    #[error("projected region {rect} lies outside the haystack {bounds}")]
    OutOfBounds { rect: Rect, bounds: Size },

    #[error("projected region {rect} has an implausible aspect ratio for needle {needle}")]
    ImplausibleAspectRatio { rect: Rect, needle: Size },
}

/// Outcome of a localization that did not hard-fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Found(Rect),
    NotFound(NotFound),
}

impl Detection {
    /// Collapse to the sentinel form: the found rectangle or [`Rect::NOT_FOUND`].
    pub fn rect(&self) -> Rect {
        match self {
            Self::Found(rect) => *rect,
            Self::NotFound(_) => Rect::NOT_FOUND,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Log a miss at warn level and return the sentinel form
    pub(crate) fn into_rect_logged(self) -> Rect {
        if let Self::NotFound(reason) = &self {
            log::warn!("⚠️ Needle not located: {reason}");
        }
        self.rect()
    }
}

impl From<NotFound> for Detection {
    fn from(reason: NotFound) -> Self {
        Self::NotFound(reason)
    }
}

/// Reject scales outside `(0, 1]`, NaN included
pub(crate) fn validate_scale(scale: f64) -> LocateResult<()> {
    if scale > 0.0 && scale <= 1.0 {
        Ok(())
    } else {
        Err(LocateError::InvalidScale { scale })
    }
}
