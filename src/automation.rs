//! Locate-and-click flow on top of a [`ScreenBackend`]
//!
//! Capture the target, narrow it down with a keyphrase, locate the needle in
//! that region and translate the result back to screen coordinates.

use crate::geometry::{Rect, Size, crop_region};
use crate::locate::{DEFAULT_MIN_MATCH_SCORE, LocateError, Locator};
use crate::region::roi_from_keyphrase;
use crate::screen::{ScreenBackend, ScreenError};
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Screen(#[from] ScreenError),
}

/// Which matcher runs on the region of interest
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Correlation { scale: f64, grayscale: bool },
    Features { min_match_score: i32, scale: f64 },
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Features {
            min_match_score: DEFAULT_MIN_MATCH_SCORE,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Screen,
    Window(&'a str),
}

/// Locate `needle` in the part of `capture` selected by `keyphrase`.
///
/// Returns the rectangle in `capture` coordinates, or `None` when the
/// region is empty or the needle was not found.
pub fn locate_in_image(
    locator: &Locator,
    capture: &DynamicImage,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<Rect>, LocateError> {
    let roi = roi_from_keyphrase(keyphrase, Size::of(capture));
    let Some(region) = crop_region(capture, roi) else {
        log::warn!("⚠️ Keyphrase '{keyphrase}' selects an empty region");
        return Ok(None);
    };

    let rect = match strategy {
        Strategy::Correlation { scale, grayscale } => {
            locator.find(&region, needle, scale, grayscale)?
        }
        Strategy::Features {
            min_match_score,
            scale,
        } => locator.locate(&region, needle, min_match_score, scale, false)?,
    };

    if !rect.is_found() {
        return Ok(None);
    }
    Ok(Some(rect.offset(roi.x, roi.y)))
}

fn locate_on<S: ScreenBackend>(
    locator: &Locator,
    screen: &S,
    target: Target<'_>,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<Rect>, AutomationError> {
    let (origin, capture) = match target {
        Target::Screen => {
            let bounds = Rect::full(screen.screen_size());
            (bounds, screen.capture_region(bounds)?)
        }
        Target::Window(title) => {
            let window = screen
                .find_window_by_title(title)
                .ok_or_else(|| ScreenError::WindowNotFound {
                    title: title.to_string(),
                })?;
            (screen.window_bounds(window)?, screen.capture_window(window)?)
        }
    };

    let found = locate_in_image(locator, &capture, needle, keyphrase, strategy)?;
    Ok(found.map(|rect| rect.offset(origin.x, origin.y)))
}

fn click_on<S: ScreenBackend>(
    locator: &Locator,
    screen: &mut S,
    target: Target<'_>,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<(i32, i32)>, AutomationError> {
    let Some(rect) = locate_on(locator, screen, target, needle, keyphrase, strategy)? else {
        log::info!("🔍 Needle not found on {target:?}, nothing clicked");
        return Ok(None);
    };

    let (x, y) = rect.center();
    log::info!("🖱️ Clicking ({x}, {y}) inside {rect}");
    screen.click_at(x, y)?;
    Ok(Some((x, y)))
}

/// Locate `needle` inside the window titled `title`, in screen coordinates
pub fn locate_in_window<S: ScreenBackend>(
    locator: &Locator,
    screen: &S,
    title: &str,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<Rect>, AutomationError> {
    locate_on(locator, screen, Target::Window(title), needle, keyphrase, strategy)
}

/// Locate `needle` in the window and click the centre of the match.
///
/// Returns the clicked point, or `None` if nothing was found.
pub fn click_in_window<S: ScreenBackend>(
    locator: &Locator,
    screen: &mut S,
    title: &str,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<(i32, i32)>, AutomationError> {
    click_on(locator, screen, Target::Window(title), needle, keyphrase, strategy)
}

pub fn locate_on_screen<S: ScreenBackend>(
    locator: &Locator,
    screen: &S,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<Rect>, AutomationError> {
    locate_on(locator, screen, Target::Screen, needle, keyphrase, strategy)
}

pub fn click_on_screen<S: ScreenBackend>(
    locator: &Locator,
    screen: &mut S,
    needle: &DynamicImage,
    keyphrase: &str,
    strategy: Strategy,
) -> Result<Option<(i32, i32)>, AutomationError> {
    click_on(locator, screen, Target::Screen, needle, keyphrase, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::fixtures::textured_rgb;
    use crate::screen::RecordingScreen;

    const CORRELATION: Strategy = Strategy::Correlation {
        scale: 1.0,
        grayscale: false,
    };

    fn desktop() -> (RecordingScreen, DynamicImage) {
        let image = DynamicImage::ImageRgb8(textured_rgb(240, 160, 31));
        let needle = image.crop_imm(130, 90, 60, 40);
        let screen = RecordingScreen::new(image).with_window("App", Rect::new(40, 30, 160, 110));
        (screen, needle)
    }

    #[test]
    fn test_click_in_window_region() {
        let (mut screen, needle) = desktop();
        let locator = Locator::default();

        let clicked = click_in_window(
            &locator,
            &mut screen,
            "App",
            &needle,
            "right 1/2 bottom 1/2",
            CORRELATION,
        )
        .unwrap();

        assert_eq!(clicked, Some((160, 110)));
        assert_eq!(screen.clicks(), &[(160, 110)]);
    }

    #[test]
    fn test_locate_on_full_screen() {
        let (screen, needle) = desktop();
        let found = locate_on_screen(
            &Locator::default(),
            &screen,
            &needle,
            "default",
            CORRELATION,
        )
        .unwrap();
        assert_eq!(found, Some(Rect::new(130, 90, 60, 40)));
    }

    #[test]
    fn test_missing_window_is_error() {
        let (mut screen, needle) = desktop();
        let err = click_in_window(
            &Locator::default(),
            &mut screen,
            "Nope",
            &needle,
            "default",
            CORRELATION,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            AutomationError::Screen(ScreenError::WindowNotFound { .. })
        ));
        assert!(screen.clicks().is_empty());
    }

    #[test]
    fn test_needle_larger_than_region_propagates() {
        let (screen, _) = desktop();
        let needle = DynamicImage::ImageRgb8(textured_rgb(100, 100, 2));
        let err = locate_in_window(
            &Locator::default(),
            &screen,
            "App",
            &needle,
            "top 1/2",
            CORRELATION,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AutomationError::Locate(LocateError::NeedleLargerThanHaystack { .. })
        ));
    }

    #[test]
    fn test_unfound_features_do_not_click() {
        let flat = DynamicImage::ImageRgb8(image::RgbImage::new(200, 150));
        let mut screen = RecordingScreen::new(flat);
        let needle = DynamicImage::ImageRgb8(image::RgbImage::new(80, 80));

        let clicked = click_on_screen(
            &Locator::default(),
            &mut screen,
            &needle,
            "default",
            Strategy::default(),
        )
        .unwrap();
        assert_eq!(clicked, None);
        assert!(screen.clicks().is_empty());
    }
}
