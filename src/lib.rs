pub mod automation;
pub mod geometry;
pub mod locate;
pub mod region;
pub mod screen;

pub use automation::{AutomationError, Strategy};
pub use geometry::{Rect, Size};
pub use locate::{Locator, LocatorConfig};
pub use screen::{RecordingScreen, ScreenBackend};
