//! Seams to the operating system.
//!
//! The hunter treats capture and input as opaque, blocking primitives. Hosts
//! provide implementations; the hunter calls them from the blocking pool.

use image::RgbaImage;

use crate::error::BackendError;
use crate::keys::KeyChord;
use crate::model::Point;

/// Produces a full-desktop bitmap of the primary screen.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> Result<RgbaImage, BackendError>;
}

/// Simulated mouse and keyboard input.
pub trait InputActuator: Send + Sync {
    /// Left click at a screen position.
    fn click(&self, point: Point) -> Result<(), BackendError>;

    /// Press each chord in order, holding its modifiers.
    fn send_keys(&self, chords: &[KeyChord]) -> Result<(), BackendError>;

    /// Scroll the wheel `ticks` notches.
    fn scroll(&self, up: bool, ticks: u32) -> Result<(), BackendError>;
}
