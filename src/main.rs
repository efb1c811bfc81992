mod args;

use args::{Args, Mode};
use screen_locate::automation::{self, AutomationError, Strategy};
use screen_locate::geometry::rotate_image;
use screen_locate::locate::{Detection, LocateError, Locator, LocatorConfig, create_default_config};
use screen_locate::region::roi_from_keyphrase;
use screen_locate::screen::{RecordingScreen, ScreenError};
use std::path::Path;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("Cannot open {path}: {source}")]
    Image {
        path: String,
        source: image::ImageError,
    },

    #[error("Cannot write {path}: {source}")]
    Save {
        path: String,
        source: image::ImageError,
    },

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Screen(#[from] ScreenError),

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

fn open_image(path: &Path) -> Result<image::DynamicImage, CliError> {
    image::open(path).map_err(|source| CliError::Image {
        path: path.display().to_string(),
        source,
    })
}

fn build_locator(args: &Args) -> Result<Locator, CliError> {
    let config: LocatorConfig = match &args.config {
        Some(path) => LocatorConfig::load(path)?,
        None => create_default_config(),
    };
    Ok(Locator::new(config))
}

/// Run the selected mode. `Ok(false)` means the needle was not found.
fn run(args: &Args) -> Result<bool, CliError> {
    match &args.mode {
        Mode::Find { haystack, needle } => {
            let locator = build_locator(args)?;
            let haystack = open_image(haystack)?;
            let needle = open_image(needle)?;
            let found = locator.find_scored(&haystack, &needle, args.scale, args.grayscale)?;
            println!("✅ Best match {} (score {:.4})", found.rect, found.score);
            Ok(true)
        }
        Mode::Features { haystack, needle } => {
            let locator = build_locator(args)?;
            let haystack = open_image(haystack)?;
            let needle = open_image(needle)?;
            match locator.try_locate(&haystack, &needle, args.min_score, args.scale, args.debug)? {
                Detection::Found(rect) => {
                    println!("✅ Found at {rect}");
                    Ok(true)
                }
                Detection::NotFound(reason) => {
                    println!("🔍 Not found: {reason}");
                    Ok(false)
                }
            }
        }
        Mode::Roi { size, phrase } => {
            println!("📐 {phrase} on {size} -> {}", roi_from_keyphrase(phrase, *size));
            Ok(true)
        }
        Mode::Rotate {
            image,
            direction,
            angle,
            out,
        } => {
            let rotated = rotate_image(&open_image(image)?, *direction, *angle);
            rotated.save(out).map_err(|source| CliError::Save {
                path: out.display().to_string(),
                source,
            })?;
            println!("✅ Rotated {direction:?} by {angle}° into {}", out.display());
            Ok(true)
        }
        Mode::Click { screenshot, needle } => {
            let locator = build_locator(args)?;
            let mut screen = RecordingScreen::open(screenshot)?;
            let needle = open_image(needle)?;
            let strategy = if args.use_features {
                Strategy::Features {
                    min_match_score: args.min_score,
                    scale: args.scale,
                }
            } else {
                Strategy::Correlation {
                    scale: args.scale,
                    grayscale: args.grayscale,
                }
            };

            match automation::click_on_screen(&locator, &mut screen, &needle, &args.roi, strategy)? {
                Some((x, y)) => {
                    println!("🖱️ Would click at ({x}, {y})");
                    Ok(true)
                }
                None => {
                    println!("🔍 Nothing to click");
                    Ok(false)
                }
            }
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("❌ {msg}");
            eprintln!("   Run with --help for usage");
            return ExitCode::from(2);
        }
    };

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::from(2)
        }
    }
}
