use screen_locate::Size;
use screen_locate::geometry::RotateDirection;
use screen_locate::locate::DEFAULT_MIN_MATCH_SCORE;
use screen_locate::region::DEFAULT_KEYPHRASE;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Find {
        haystack: PathBuf,
        needle: PathBuf,
    },
    Features {
        haystack: PathBuf,
        needle: PathBuf,
    },
    Roi {
        size: Size,
        phrase: String,
    },
    Rotate {
        image: PathBuf,
        direction: RotateDirection,
        angle: f64,
        out: PathBuf,
    },
    Click {
        screenshot: PathBuf,
        needle: PathBuf,
    },
}

#[derive(Debug, PartialEq)]
pub struct Args {
    pub mode: Mode,
    pub config: Option<PathBuf>,
    pub scale: f64,
    pub grayscale: bool,
    pub min_score: i32,
    pub debug: bool,
    pub roi: String,
    pub use_features: bool,
}

impl Args {
    /// Parse the process arguments. `Ok(None)` means help or version was printed.
    pub fn parse() -> Result<Option<Self>, String> {
        let args: Vec<String> = env::args().skip(1).collect();
        Self::parse_from(&args)
    }

    pub fn parse_from(args: &[String]) -> Result<Option<Self>, String> {
        let mut positional: Vec<&str> = Vec::new();
        let mut config: Option<PathBuf> = None;
        let mut scale: f64 = 1.0;
        let mut grayscale: bool = false;
        let mut min_score: i32 = DEFAULT_MIN_MATCH_SCORE;
        let mut debug: bool = false;
        let mut roi: String = DEFAULT_KEYPHRASE.to_string();
        let mut use_features: bool = false;

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return Ok(None);
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "Screen Locate v{} (built {})",
                    env!("APP_VERSION_DISPLAY"),
                    env!("APP_BUILD_YEAR")
                );
                return Ok(None);
            } else if arg == "--debug" {
                debug = true;
            } else if arg == "--gray" {
                grayscale = true;
            } else if arg == "--features" {
                use_features = true;
            } else if let Some(val) = arg.strip_prefix("--config=") {
                config = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--scale=") {
                scale = val
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid scale value: {val}"))?;
            } else if let Some(val) = arg.strip_prefix("--min-score=") {
                min_score = val
                    .parse::<i32>()
                    .map_err(|_| format!("Invalid min-score value: {val}"))?;
            } else if let Some(val) = arg.strip_prefix("--roi=") {
                roi = val.to_string();
            } else if arg.starts_with("--") {
                return Err(format!("Unknown argument: {arg}"));
            } else {
                positional.push(arg);
            }
        }

        let mode = parse_mode(&positional)?;
        Ok(Some(Args {
            mode,
            config,
            scale,
            grayscale,
            min_score,
            debug,
            roi,
            use_features,
        }))
    }
}

fn parse_mode(positional: &[&str]) -> Result<Mode, String> {
    let path = |i: usize, what: &str| -> Result<PathBuf, String> {
        positional
            .get(i)
            .map(|p| PathBuf::from(*p))
            .ok_or_else(|| format!("Missing <{what}> argument"))
    };

    match positional.first().copied() {
        Some("find") => Ok(Mode::Find {
            haystack: path(1, "haystack")?,
            needle: path(2, "needle")?,
        }),
        Some("features") => Ok(Mode::Features {
            haystack: path(1, "haystack")?,
            needle: path(2, "needle")?,
        }),
        Some("roi") => {
            let size = positional
                .get(1)
                .ok_or("Missing <W>x<H> argument")
                .and_then(|s| parse_size(s).ok_or("Expected size as <W>x<H>"))?;
            let phrase = if positional.len() > 2 {
                positional[2..].join(" ")
            } else {
                DEFAULT_KEYPHRASE.to_string()
            };
            Ok(Mode::Roi { size, phrase })
        }
        Some("rotate") => {
            let direction = positional
                .get(2)
                .ok_or_else(|| "Missing <left|right> argument".to_string())?
                .parse::<RotateDirection>()
                .map_err(|e| e.to_string())?;
            let angle = positional
                .get(3)
                .ok_or_else(|| "Missing <angle> argument".to_string())
                .and_then(|a| {
                    a.parse::<f64>()
                        .map_err(|_| format!("Invalid angle value: {a}"))
                })?;
            Ok(Mode::Rotate {
                image: path(1, "image")?,
                direction,
                angle,
                out: path(4, "out")?,
            })
        }
        Some("click") => Ok(Mode::Click {
            screenshot: path(1, "screenshot")?,
            needle: path(2, "needle")?,
        }),
        Some(other) => Err(format!("Unknown mode: {other}")),
        None => Err("No mode given".to_string()),
    }
}

fn parse_size(s: &str) -> Option<Size> {
    let (w, h) = s.split_once('x')?;
    Some(Size::new(w.parse().ok()?, h.parse().ok()?))
}

pub fn print_help() {
    println!("🔎 Screen Locate - find images on screen");
    println!();
    println!("USAGE:");
    println!("    screen-locate <MODE> [ARGS] [FLAGS]");
    println!();
    println!("MODES:");
    println!("    find <haystack> <needle>            Correlation search (exact copies)");
    println!("    features <haystack> <needle>        Keypoint search (rotation/scale tolerant)");
    println!("    roi <W>x<H> <phrase...>             Print the region a keyphrase selects");
    println!("    rotate <image> <left|right> <angle> <out>");
    println!("                                        Rotate an image about its centre");
    println!("    click <screenshot> <needle>         Dry-run click against a screenshot");
    println!();
    println!("FLAGS:");
    println!("    --config=FILE.toml  Load locator configuration");
    println!("    --scale=F           Downscale factor in (0, 1] (default: 1)");
    println!("    --gray              Correlate on grayscale images");
    println!("    --min-score=N       Match distance band for feature search (default: {DEFAULT_MIN_MATCH_SCORE})");
    println!("    --debug             Log keypoints and matches, write renderings to debug_dir");
    println!("    --roi=PHRASE        Keyphrase for click mode (default: {DEFAULT_KEYPHRASE})");
    println!("    --features          Use feature search in click mode");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXIT CODES:");
    println!("    0 found, 1 not found, 2 usage error or failure");
    println!();
    println!("EXAMPLES:");
    println!("    screen-locate find screen.png button.png --scale=0.5 --gray");
    println!("    screen-locate features screen.png logo.png --min-score=64 --debug");
    println!("    screen-locate roi 1920x1080 right 1/2 bottom 1/3");
    println!("    screen-locate click screen.png ok.png --roi=\"bottom 1/4\" --features");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Args>, String> {
        let args: Vec<String> = line.split_whitespace().map(String::from).collect();
        Args::parse_from(&args)
    }

    #[test]
    fn test_find_with_flags() {
        let args = parse("find a.png b.png --scale=0.5 --gray").unwrap().unwrap();
        assert_eq!(
            args.mode,
            Mode::Find {
                haystack: "a.png".into(),
                needle: "b.png".into()
            }
        );
        assert_eq!(args.scale, 0.5);
        assert!(args.grayscale);
        assert_eq!(args.min_score, DEFAULT_MIN_MATCH_SCORE);
    }

    #[test]
    fn test_roi_joins_phrase() {
        let args = parse("roi 640x480 left 1/2 top 1/3").unwrap().unwrap();
        assert_eq!(
            args.mode,
            Mode::Roi {
                size: Size::new(640, 480),
                phrase: "left 1/2 top 1/3".into()
            }
        );
    }

    #[test]
    fn test_rotate_parses_direction() {
        let args = parse("rotate in.png left 30 out.png").unwrap().unwrap();
        assert_eq!(
            args.mode,
            Mode::Rotate {
                image: "in.png".into(),
                direction: RotateDirection::Left,
                angle: 30.0,
                out: "out.png".into()
            }
        );
        assert!(parse("rotate in.png up 30 out.png").is_err());
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse("").is_err());
        assert!(parse("find a.png").is_err());
        assert!(parse("find a.png b.png --scale=big").is_err());
        assert!(parse("roi 640 left 1/2").is_err());
        assert!(parse("find a.png b.png --bogus").is_err());
        assert!(parse("teleport").is_err());
    }
}
