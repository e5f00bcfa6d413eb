//! Error definition for the controller

use core::fmt::Debug;
use thiserror_no_std::Error;

use crate::calibration::CalibrationError;
use crate::controller::ControllerState;

/// Errors surfaced by [`TouchController`](crate::controller::TouchController).
///
/// `E` is the error type of the touch hardware collaborator. Queue overflow is
/// not an error at this level: the dropped sample is reported through
/// [`InterruptOutcome`](crate::controller::InterruptOutcome).
#[derive(Error, Debug)]
pub enum TouchError<E: Debug> {
    /// The touch chip failed; controller state is unchanged
    #[error("touch hardware fault: {0:?}")]
    Hardware(E),
    /// Calibration could not produce a matrix; the previous one stays active
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    /// The operation is not valid in the controller's current state
    #[error("{operation} is not valid while the controller is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ControllerState,
    },
}

impl<E: Debug> TouchError<E> {
    /// True for collinear calibration points, which the caller can retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Calibration(CalibrationError::Degenerate))
    }
}
