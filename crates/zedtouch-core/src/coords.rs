//! Coordinate value types shared by the queue and the calibration engine.

use embedded_graphics::prelude::*;
use serde::{Deserialize, Serialize};

/// Position reported by the touch sensor, in sensor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct RawPosition {
    pub x: u16,
    pub y: u16,
}

impl RawPosition {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Pack into a single word, `x` in the high half.
    pub(crate) const fn pack(self) -> u32 {
        ((self.x as u32) << 16) | self.y as u32
    }

    pub(crate) const fn unpack(word: u32) -> Self {
        Self {
            x: (word >> 16) as u16,
            y: word as u16,
        }
    }
}

/// Position in display pixels after calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct CalibratedPosition {
    pub x: u16,
    pub y: u16,
}

impl CalibratedPosition {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Identity mapping used while no calibration matrix is active.
    pub const fn from_raw(raw: RawPosition) -> Self {
        Self { x: raw.x, y: raw.y }
    }

    pub fn to_point(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }
}

/// Size of the display that calibrated positions must fall inside.
///
/// Valid calibrated coordinates are `0..width` and `0..height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub width: u16,
    pub height: u16,
}

impl DisplayBounds {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Largest valid x coordinate
    pub const fn max_x(&self) -> u16 {
        self.width.saturating_sub(1)
    }

    /// Largest valid y coordinate
    pub const fn max_y(&self) -> u16 {
        self.height.saturating_sub(1)
    }

    pub const fn contains(&self, position: CalibratedPosition) -> bool {
        position.x < self.width && position.y < self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl Default for DisplayBounds {
    /// The 800x480 panel of the Zed display kit
    fn default() -> Self {
        Self::new(800, 480)
    }
}
