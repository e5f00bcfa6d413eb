//! Headless simulator for the zedtouch core.
//!
//! A "finger" thread plays both the touch chip and its interrupt handler: it
//! latches samples into a simulated panel and calls the shared controller's
//! interrupt entry. The main thread is the cooperative main loop. The run
//! goes through:
//!
//! 1. three-point calibration against a skewed, mirrored 12-bit panel
//! 2. paced random taps, checked against where the finger actually pressed
//! 3. an unpaced burst that overflows the queue
//! 4. a storage round trip of the calibration matrix
//!
//! Set `RUST_LOG=debug` to see every delivered touch.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, info, warn};

use zedtouch_core::calibration::{CalibrationMatrix, MAX_ENCODED_MATRIX_LEN};
use zedtouch_core::calibration_run::reference_points;
use zedtouch_core::config::TouchConfig;
use zedtouch_core::controller::{ControllerState, InterruptOutcome, TouchController};
use zedtouch_core::coords::{CalibratedPosition, DisplayBounds, RawPosition};
use zedtouch_core::error::TouchError;
use zedtouch_core::event::Gesture;
use zedtouch_core::hardware::{RawTouchSample, TouchHardware};
use zedtouch_core::shared::SharedTouchController;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DISPLAY: DisplayBounds = DisplayBounds::new(800, 480);

/// Samples reported while a calibration marker is held
const SAMPLES_PER_PRESS: usize = 5;

/// Random taps after calibration
const TAPS: usize = 20;

/// Samples sent back to back to overflow the queue
const BURST: usize = 150;

/// Interval between touch samples while a finger is down
const SAMPLE_PERIOD: Duration = Duration::from_millis(2);

/// Samples the simulated chip has latched but not yet reported over the bus
static PANEL_LATCH: Channel<CriticalSectionRawMutex, RawTouchSample, 4> = Channel::new();

type Touch = SharedTouchController<SimulatedPanel>;

// ---------------------------------------------------------------------------
// Simulated panel
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum PanelError {
    /// An interrupt was taken with nothing latched
    NotLatched,
}

#[derive(Default)]
struct SimulatedPanel;

impl TouchHardware for SimulatedPanel {
    type Error = PanelError;

    fn read_raw_sample(&mut self) -> Result<RawTouchSample, PanelError> {
        PANEL_LATCH.try_receive().map_err(|_| PanelError::NotLatched)
    }

    fn start_interrupts(&mut self) -> Result<(), PanelError> {
        debug!("Panel interrupts on");
        Ok(())
    }

    fn stop_interrupts(&mut self) -> Result<(), PanelError> {
        debug!("Panel interrupts off");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PanelError> {
        while PANEL_LATCH.try_receive().is_ok() {}
        info!("Panel reset");
        Ok(())
    }

    fn recalibrate_sensor_idac(&mut self) -> Result<(), PanelError> {
        info!("Panel IDAC re-tuned");
        Ok(())
    }
}

/// Sensor reading for a display position: x mirrored, both axes scaled and
/// slightly skewed.
fn panel_reading(display: CalibratedPosition) -> RawPosition {
    let x = display.x as i32;
    let y = display.y as i32;
    RawPosition::new(
        (3900 - 4 * x - y / 8).clamp(0, 4095) as u16,
        (200 + 7 * y + x / 16).clamp(0, 4095) as u16,
    )
}

// ---------------------------------------------------------------------------
// Finger
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random source so runs are reproducible.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 8
    }

    fn below(&mut self, bound: u16) -> u16 {
        (self.next() % bound as u32) as u16
    }

    /// Sensor noise of up to two raw units either way
    fn jitter(&mut self) -> i16 {
        (self.next() % 5) as i16 - 2
    }
}

struct Finger {
    touch: Arc<Touch>,
    rng: Lcg,
}

impl Finger {
    fn new(touch: Arc<Touch>) -> Self {
        Self {
            touch,
            rng: Lcg(0x5EED),
        }
    }

    /// Latch a sample on the panel and raise the touch interrupt.
    fn report(&mut self, sample: RawTouchSample) -> bool {
        if PANEL_LATCH.try_send(sample).is_err() {
            return false;
        }
        match self.touch.on_interrupt() {
            Ok(InterruptOutcome::Queued) => true,
            Ok(InterruptOutcome::Dropped) => false,
            Err(e) => {
                warn!("Interrupt failed: {}", e);
                false
            }
        }
    }

    fn press(&mut self, at: CalibratedPosition, samples: usize) {
        let raw = panel_reading(at);
        for _ in 0..samples {
            let position = RawPosition::new(
                raw.x.saturating_add_signed(self.rng.jitter()),
                raw.y.saturating_add_signed(self.rng.jitter()),
            );
            self.report(RawTouchSample {
                position,
                gesture: Gesture::None,
                finger_count: 1,
            });
            thread::sleep(SAMPLE_PERIOD);
        }
        self.report(RawTouchSample {
            position: raw,
            gesture: Gesture::None,
            finger_count: 0,
        });
    }

    fn state(&self) -> (ControllerState, Option<CalibratedPosition>) {
        self.touch
            .with(|c| (c.state(), c.calibration_target()))
            .unwrap_or((ControllerState::Disabled, None))
    }

    fn wait_for_drain(&self) {
        while !self.touch.with(|c| c.queue().is_empty()).unwrap_or(true) {
            thread::sleep(SAMPLE_PERIOD);
        }
    }

    /// Returns the display positions of the paced taps.
    fn run(mut self) -> Vec<CalibratedPosition> {
        let mut last_target = None;
        loop {
            let (state, target) = self.state();
            if state != ControllerState::Calibrating {
                break;
            }
            if let Some(target) = target
                && last_target != Some(target)
            {
                info!("Finger: pressing marker at {:?}", target);
                self.press(target, SAMPLES_PER_PRESS);
                last_target = Some(target);
            }
            thread::sleep(SAMPLE_PERIOD);
        }

        let mut taps = Vec::with_capacity(TAPS);
        for _ in 0..TAPS {
            let at = CalibratedPosition::new(
                self.rng.below(DISPLAY.width),
                self.rng.below(DISPLAY.height),
            );
            self.press(at, 1);
            taps.push(at);
            self.wait_for_drain();
        }

        let center = panel_reading(CalibratedPosition::new(DISPLAY.width / 2, DISPLAY.height / 2));
        let queued = (0..BURST)
            .filter(|_| {
                self.report(RawTouchSample {
                    position: center,
                    gesture: Gesture::MoveLeft,
                    finger_count: 1,
                })
            })
            .count();
        self.report(RawTouchSample::default());
        info!("Finger: burst of {} samples, {} queued", BURST, queued);

        taps
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn setup() -> Result<Touch, TouchError<PanelError>> {
    let config = TouchConfig::default()
        .with_display(DISPLAY)
        .with_calibration_min_samples(3)
        .with_idac_recalibration(true);

    let mut controller = TouchController::new(SimulatedPanel::default(), config);
    controller.initialize()?;
    controller.enable()?;
    controller.run_calibration(reference_points(DISPLAY))?;
    Ok(SharedTouchController::new(controller))
}

fn store_and_restore(matrix: &CalibrationMatrix) {
    let mut buf = [0u8; MAX_ENCODED_MATRIX_LEN];
    match matrix
        .to_slice(&mut buf)
        .and_then(|bytes| CalibrationMatrix::from_bytes(bytes))
    {
        Ok(restored) if restored == *matrix => info!("Matrix survives a storage round trip"),
        Ok(restored) => error!("Matrix changed in storage: {:?}", restored),
        Err(e) => error!("Matrix storage failed: {}", e),
    }
}

fn main() {
    env_logger::init();
    info!("Starting zedtouch simulator");

    let touch = match setup() {
        Ok(touch) => Arc::new(touch),
        Err(e) => {
            error!("Touch setup failed: {}", e);
            return;
        }
    };

    let finger = {
        let touch = Arc::clone(&touch);
        thread::spawn(move || Finger::new(touch).run())
    };

    let mut presses = Vec::new();
    loop {
        let consumed = touch.process_next(|t| {
            debug!("Touch {:?}", t);
            if !t.is_release() {
                presses.push(t.location);
            }
        });
        match consumed {
            Ok(true) => {}
            Ok(false) if finger.is_finished() => break,
            Ok(false) => thread::sleep(SAMPLE_PERIOD),
            Err(e) if e.is_retryable() => {
                warn!("{}, retrying calibration", e);
                if let Some(Err(e)) = touch.with(|c| c.retry_calibration()) {
                    error!("Retry failed: {}", e);
                    break;
                }
            }
            Err(e) => {
                error!("Touch processing failed: {}", e);
                break;
            }
        }
    }

    let taps = match finger.join() {
        Ok(taps) => taps,
        Err(_) => {
            error!("Finger thread panicked");
            return;
        }
    };

    let worst = taps
        .iter()
        .zip(&presses)
        .map(|(expected, got)| expected.x.abs_diff(got.x).max(expected.y.abs_diff(got.y)))
        .max()
        .unwrap_or(0);
    info!(
        "{} taps, {} presses delivered, worst tap error {} px",
        taps.len(),
        presses.len(),
        worst
    );

    touch.with(|c| {
        if let Some(matrix) = c.calibration_matrix() {
            info!("Active matrix: {:?}", matrix);
            store_and_restore(matrix);
        }
        info!("Dropped samples: {}", c.dropped_samples());
        if let Err(e) = c.disable() {
            error!("Disable failed: {}", e);
        }
    });
}
