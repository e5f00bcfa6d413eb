//! Hardware-independent touch input core for the Zed display controller
//!
//! This crate takes raw touch samples from the touch interrupt, queues them
//! for the cooperative main loop, and maps them from sensor coordinates onto
//! the display through a three-point calibration matrix.
//!
//! It is `#![no_std]` without `alloc` so it compiles on embedded targets and
//! on desktop hosts (for the simulator and tests). The touch chip itself sits
//! behind the [`hardware::TouchHardware`] trait; [`ft6336u`] provides one
//! implementation over `embedded-hal` I2C.

#![no_std]

pub mod calibration;
pub mod calibration_run;
pub mod config;
pub mod controller;
pub mod coords;
pub mod error;
pub mod event;
pub mod ft6336u;
pub mod hardware;
pub mod queue;
pub mod shared;

pub use calibration::{CalibrationError, CalibrationMatrix, compute_matrix, translate};
pub use controller::{ControllerState, InterruptOutcome, ProcessedTouch, TouchController};
pub use coords::{CalibratedPosition, DisplayBounds, RawPosition};
pub use error::TouchError;
pub use event::{Gesture, TouchEvent, VendorGesture};
pub use hardware::{RawTouchSample, TouchHardware};
pub use queue::{TOUCH_QUEUE_SIZE, TouchEventQueue};
