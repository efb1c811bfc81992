// Screen module - capture and input capability used by the automation flow
// The localization core never touches this; it only consumes images.
// Platform backends implement `ScreenBackend`; `RecordingScreen` replays a
// screenshot file and records clicks instead of injecting them.

pub mod error;
pub mod recording;
pub mod types;


pub use error::{ScreenError, ScreenResult};
pub use recording::RecordingScreen;
pub use types::{ScreenBackend, WindowId};
