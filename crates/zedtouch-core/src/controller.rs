//! Touch controller: interrupt entry, main-loop drain and calibration lifecycle.
//!
//! The controller owns the touch hardware, the event queue and the active
//! calibration matrix. It moves through
//!
//! ```text
//! Uninitialized -> Disabled <-> Enabled <-> Calibrating
//!                      ^                        |
//!                      +------------------------+
//! ```
//!
//! [`TouchController::on_interrupt`] is the only method meant for interrupt
//! context. It never logs and never panics. Everything else runs on the main
//! loop.

use log::{debug, info, warn};

use crate::calibration::{CalibrationMatrix, translate_within};
use crate::calibration_run::{CalibrationPhase, CalibrationRun};
use crate::config::TouchConfig;
use crate::coords::{CalibratedPosition, RawPosition};
use crate::error::TouchError;
use crate::event::{Gesture, TouchEvent};
use crate::hardware::{RawTouchSample, TouchHardware};
use crate::queue::{TOUCH_QUEUE_SIZE, TouchEventQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed, hardware not yet reset
    Uninitialized,
    /// Interrupts stopped
    Disabled,
    /// Interrupts running, touches delivered to the application
    Enabled,
    /// Interrupts running, touches feed the calibration run
    Calibrating,
}

/// What happened to the sample read by [`TouchController::on_interrupt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    Queued,
    /// The queue was full and the sample was discarded
    Dropped,
}

/// A touch as handed to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedTouch {
    pub raw: RawPosition,
    /// Display position, or the raw position when calibrated mode is off
    pub location: CalibratedPosition,
    pub gesture: Gesture,
    pub finger_count: u8,
    /// Whether `location` went through the calibration matrix
    pub calibrated: bool,
}

impl ProcessedTouch {
    pub const fn is_release(&self) -> bool {
        self.finger_count == 0
    }
}

impl Consumed {
    /// Hand a touch to `deliver`. True when an event was consumed.
    pub(crate) fn deliver<F: FnOnce(&ProcessedTouch)>(self, deliver: F) -> bool {
        match self {
            Self::Nothing => false,
            Self::Calibration => true,
            Self::Touch(touch) => {
                deliver(&touch);
                true
            }
        }
    }
}

pub struct TouchController<H: TouchHardware, const N: usize = TOUCH_QUEUE_SIZE> {
    hw: H,
    queue: TouchEventQueue<N>,
    config: TouchConfig,
    state: ControllerState,
    matrix: Option<CalibrationMatrix>,
    calibrated_mode: bool,
    run: Option<CalibrationRun>,
    dropped: u32,
}

/// What one step of the main loop did with the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Consumed {
    Nothing,
    /// Fed to the calibration run, not for the application
    Calibration,
    Touch(ProcessedTouch),
}

impl<H: TouchHardware, const N: usize> TouchController<H, N> {
    pub fn new(hw: H, config: TouchConfig) -> Self {
        Self {
            hw,
            queue: TouchEventQueue::new(),
            config,
            state: ControllerState::Uninitialized,
            matrix: None,
            calibrated_mode: false,
            run: None,
            dropped: 0,
        }
    }

    /// Start with a previously stored matrix, calibrated mode on.
    pub fn with_matrix(mut self, matrix: CalibrationMatrix) -> Self {
        self.set_calibration_matrix(matrix);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    pub fn queue(&self) -> &TouchEventQueue<N> {
        &self.queue
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Samples discarded because the queue was full
    pub fn dropped_samples(&self) -> u32 {
        self.dropped
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[ControllerState],
    ) -> Result<(), TouchError<H::Error>> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TouchError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Reset the touch chip and enter `Disabled`.
    pub fn initialize(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require(
            "initialize",
            &[ControllerState::Uninitialized, ControllerState::Disabled],
        )?;

        self.hw.reset().map_err(TouchError::Hardware)?;
        if self.config.recalibrate_idac_on_init {
            self.hw
                .recalibrate_sensor_idac()
                .map_err(TouchError::Hardware)?;
        }

        self.flush_events();
        self.state = ControllerState::Disabled;
        info!("Touch controller initialized");
        Ok(())
    }

    /// Start touch interrupts with an empty queue.
    pub fn enable(&mut self) -> Result<(), TouchError<H::Error>> {
        match self.state {
            ControllerState::Enabled | ControllerState::Calibrating => return Ok(()),
            ControllerState::Uninitialized => {
                return Err(TouchError::InvalidState {
                    operation: "enable",
                    state: self.state,
                });
            }
            ControllerState::Disabled => {}
        }

        self.flush_events();
        self.hw.start_interrupts().map_err(TouchError::Hardware)?;
        self.state = ControllerState::Enabled;
        info!("Touch input enabled");
        Ok(())
    }

    pub fn enable_touch(&mut self) -> Result<(), TouchError<H::Error>> {
        self.enable()
    }

    /// Stop touch interrupts and drop pending events.
    ///
    /// An unfinished calibration run is abandoned; the active matrix is kept.
    pub fn disable(&mut self) -> Result<(), TouchError<H::Error>> {
        match self.state {
            ControllerState::Disabled => return Ok(()),
            ControllerState::Uninitialized => {
                return Err(TouchError::InvalidState {
                    operation: "disable",
                    state: self.state,
                });
            }
            ControllerState::Enabled | ControllerState::Calibrating => {}
        }

        self.hw.stop_interrupts().map_err(TouchError::Hardware)?;
        if self.run.take().is_some() {
            info!("Calibration abandoned");
        }
        self.flush_events();
        self.state = ControllerState::Disabled;
        info!("Touch input disabled");
        Ok(())
    }

    pub fn disable_touch(&mut self) -> Result<(), TouchError<H::Error>> {
        self.disable()
    }

    /// Interrupt entry: read one sample and queue it.
    ///
    /// A full queue drops the sample and bumps [`dropped_samples`](Self::dropped_samples).
    pub fn on_interrupt(&mut self) -> Result<InterruptOutcome, TouchError<H::Error>> {
        if !matches!(
            self.state,
            ControllerState::Enabled | ControllerState::Calibrating
        ) {
            return Err(TouchError::InvalidState {
                operation: "on_interrupt",
                state: self.state,
            });
        }

        let sample = self.hw.read_raw_sample().map_err(TouchError::Hardware)?;
        match self.queue.push(sample.into()) {
            Ok(()) => Ok(InterruptOutcome::Queued),
            Err(_) => {
                self.dropped = self.dropped.saturating_add(1);
                Ok(InterruptOutcome::Dropped)
            }
        }
    }

    pub fn handle_touch_event(&mut self) -> Result<InterruptOutcome, TouchError<H::Error>> {
        self.on_interrupt()
    }

    /// Consume one queued event.
    ///
    /// While enabled, the event is translated and handed to `deliver`. While
    /// calibrating it feeds the calibration run instead and `deliver` is not
    /// called. Returns `Ok(false)` when nothing was queued.
    pub fn process_next<F>(&mut self, deliver: F) -> Result<bool, TouchError<H::Error>>
    where
        F: FnOnce(&ProcessedTouch),
    {
        Ok(self.consume()?.deliver(deliver))
    }

    pub(crate) fn consume(&mut self) -> Result<Consumed, TouchError<H::Error>> {
        self.require(
            "process_next",
            &[ControllerState::Enabled, ControllerState::Calibrating],
        )?;

        let Some(event) = self.queue.pop() else {
            return Ok(Consumed::Nothing);
        };

        if self.state == ControllerState::Calibrating {
            self.feed_calibration(&event)?;
            Ok(Consumed::Calibration)
        } else {
            Ok(Consumed::Touch(self.process_event(&event)))
        }
    }

    /// Single-event form of [`process_next`](Self::process_next).
    pub fn process_touch_event(
        &mut self,
    ) -> Result<Option<ProcessedTouch>, TouchError<H::Error>> {
        let mut touch = None;
        self.process_next(|t| touch = Some(*t))?;
        Ok(touch)
    }

    fn process_event(&self, event: &TouchEvent) -> ProcessedTouch {
        let (location, calibrated) = self.locate(event.location);
        ProcessedTouch {
            raw: event.location,
            location,
            gesture: event.gesture,
            finger_count: event.finger_count,
            calibrated,
        }
    }

    fn locate(&self, raw: RawPosition) -> (CalibratedPosition, bool) {
        match (&self.matrix, self.calibrated_mode) {
            (Some(matrix), true) => (translate_within(raw, matrix, self.config.display), true),
            _ => (CalibratedPosition::from_raw(raw), false),
        }
    }

    /// Map a raw position the same way queued touches are mapped
    pub fn translate_location(&self, raw: RawPosition) -> CalibratedPosition {
        self.locate(raw).0
    }

    fn feed_calibration(&mut self, event: &TouchEvent) -> Result<(), TouchError<H::Error>> {
        let Some(run) = self.run.as_mut() else {
            self.state = ControllerState::Enabled;
            return Ok(());
        };

        if run.feed(event) != CalibrationPhase::Computing {
            return Ok(());
        }

        match run.complete() {
            Some(Ok(matrix)) => {
                info!("Calibration complete: {:?}", matrix);
                self.matrix = Some(matrix);
                self.calibrated_mode = true;
                self.run = None;
                self.state = ControllerState::Enabled;
                Ok(())
            }
            Some(Err(e)) => {
                warn!("Calibration failed: {}", e);
                Err(e.into())
            }
            None => Ok(()),
        }
    }

    /// Start collecting three touches at `reference` (display coordinates).
    ///
    /// Restarts an ongoing run. Queued touches from before the call are
    /// discarded.
    pub fn run_calibration(
        &mut self,
        reference: [CalibratedPosition; 3],
    ) -> Result<(), TouchError<H::Error>> {
        self.require(
            "run_calibration",
            &[ControllerState::Enabled, ControllerState::Calibrating],
        )?;

        self.flush_events();
        self.run = Some(CalibrationRun::new(
            reference,
            self.config.calibration_min_samples,
        ));
        self.state = ControllerState::Calibrating;
        info!("Calibration started, targets {:?}", reference);
        Ok(())
    }

    /// Collect the three points again after a failed run
    pub fn retry_calibration(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require("retry_calibration", &[ControllerState::Calibrating])?;
        if let Some(run) = self.run.as_mut() {
            run.restart();
        }
        self.flush_events();
        Ok(())
    }

    /// Leave calibration without touching the active matrix
    pub fn cancel_calibration(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require("cancel_calibration", &[ControllerState::Calibrating])?;
        self.run = None;
        self.flush_events();
        self.state = ControllerState::Enabled;
        info!("Calibration cancelled");
        Ok(())
    }

    pub fn calibration_phase(&self) -> Option<CalibrationPhase> {
        self.run.as_ref().map(CalibrationRun::phase)
    }

    /// Where the calibration UI should draw the next marker
    pub fn calibration_target(&self) -> Option<CalibratedPosition> {
        self.run.as_ref().and_then(CalibrationRun::current_target)
    }

    /// Discard every queued event, returning how many were dropped.
    ///
    /// `&mut self` means no interrupt can be inside `on_interrupt`, so the
    /// queue is cleared immediately.
    pub fn flush_events(&mut self) -> usize {
        let flushed = self.queue.clear();
        if flushed > 0 {
            debug!("Flushed {} touch events", flushed);
        }
        flushed
    }

    pub fn calibration_matrix(&self) -> Option<&CalibrationMatrix> {
        self.matrix.as_ref()
    }

    /// Install a matrix, e.g. one restored from storage
    pub fn set_calibration_matrix(&mut self, matrix: CalibrationMatrix) {
        self.matrix = Some(matrix);
        self.calibrated_mode = true;
    }

    /// Toggle translation through the matrix. Has no effect without a matrix.
    pub fn set_calibrated_mode(&mut self, enabled: bool) {
        self.calibrated_mode = enabled;
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated_mode && self.matrix.is_some()
    }

    /// Poll the sensor directly, bypassing the queue
    pub fn read_touch_data(&mut self) -> Result<RawTouchSample, TouchError<H::Error>> {
        self.require(
            "read_touch_data",
            &[
                ControllerState::Disabled,
                ControllerState::Enabled,
                ControllerState::Calibrating,
            ],
        )?;
        self.hw.read_raw_sample().map_err(TouchError::Hardware)
    }

    /// Re-capture the sensor baseline. Interrupts must be stopped.
    pub fn baseline(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require("baseline", &[ControllerState::Disabled])?;
        self.hw.baseline().map_err(TouchError::Hardware)
    }

    /// Re-tune the sensor IDAC values. Interrupts must be stopped.
    pub fn recalibrate_idac(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require("recalibrate_idac", &[ControllerState::Disabled])?;
        self.hw
            .recalibrate_sensor_idac()
            .map_err(TouchError::Hardware)
    }

    /// Reset the touch chip. Interrupts must be stopped.
    pub fn reset(&mut self) -> Result<(), TouchError<H::Error>> {
        self.require("reset", &[ControllerState::Disabled])?;
        self.hw.reset().map_err(TouchError::Hardware)?;
        self.flush_events();
        Ok(())
    }
}
