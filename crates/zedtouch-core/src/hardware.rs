//! Capabilities the controller needs from the touch chip.
//!
//! Bus access, register layouts, reset timing and sensor tuning are all
//! chip-specific and live behind this trait. The controller is handed an
//! implementation at construction time and never reaches for global state.

use core::fmt::Debug;

use crate::coords::RawPosition;
use crate::event::{Gesture, TouchEvent};

/// One reading from the touch sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawTouchSample {
    pub position: RawPosition,
    pub gesture: Gesture,
    pub finger_count: u8,
}

impl From<RawTouchSample> for TouchEvent {
    fn from(sample: RawTouchSample) -> Self {
        TouchEvent::new(sample.gesture, sample.finger_count, sample.position)
    }
}

/// Touch chip collaborator.
///
/// `read_raw_sample` is called from interrupt context and must not block for
/// longer than a single bus transaction.
pub trait TouchHardware {
    type Error: Debug;

    /// Read the current touch state
    fn read_raw_sample(&mut self) -> Result<RawTouchSample, Self::Error>;

    /// Start raising the touch interrupt
    fn start_interrupts(&mut self) -> Result<(), Self::Error>;

    /// Stop raising the touch interrupt
    fn stop_interrupts(&mut self) -> Result<(), Self::Error>;

    /// Reset the touch chip
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Re-tune the per-crossing sensor IDAC values
    fn recalibrate_sensor_idac(&mut self) -> Result<(), Self::Error>;

    /// Re-capture the sensor baseline. Chips that track their baseline
    /// internally keep the default.
    fn baseline(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
