//! Controller shared between an interrupt handler and the main loop.
//!
//! On targets where the touch ISR cannot be handed a `&mut` to the controller,
//! wrap it in a [`SharedTouchController`] and place that in a `static`. Every
//! access runs inside a critical section, so the ISR and the main loop never
//! observe the controller mid-update. Touches are handed to the application
//! after the critical section ends, so interrupts are not held off while the
//! UI handles them.
//!
//! ```ignore
//! use zedtouch_core::shared::SharedTouchController;
//!
//! static TOUCH: SharedTouchController<Panel> = SharedTouchController::new(controller);
//!
//! // interrupt handler
//! let _ = TOUCH.on_interrupt();
//!
//! // main loop
//! while TOUCH.process_next(|touch| ui.on_touch(touch))? {}
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::controller::{Consumed, InterruptOutcome, ProcessedTouch, TouchController};
use crate::error::TouchError;
use crate::hardware::TouchHardware;
use crate::queue::TOUCH_QUEUE_SIZE;

pub struct SharedTouchController<H: TouchHardware, const N: usize = TOUCH_QUEUE_SIZE> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<TouchController<H, N>>>,
}

impl<H: TouchHardware, const N: usize> SharedTouchController<H, N> {
    pub const fn new(controller: TouchController<H, N>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(controller)),
        }
    }

    /// Run `f` with exclusive access to the controller.
    ///
    /// Returns `None` when called from inside another `with`.
    pub fn with<R>(&self, f: impl FnOnce(&mut TouchController<H, N>) -> R) -> Option<R> {
        self.inner.lock(|cell| {
            let mut controller = cell.try_borrow_mut().ok()?;
            Some(f(&mut *controller))
        })
    }

    /// Interrupt entry. A nested call reports the sample as dropped.
    pub fn on_interrupt(&self) -> Result<InterruptOutcome, TouchError<H::Error>> {
        self.with(|controller| controller.on_interrupt())
            .unwrap_or(Ok(InterruptOutcome::Dropped))
    }

    /// Consume one queued event. `deliver` runs once the critical section
    /// has been left.
    pub fn process_next<F>(&self, deliver: F) -> Result<bool, TouchError<H::Error>>
    where
        F: FnOnce(&ProcessedTouch),
    {
        let consumed = self
            .with(|controller| controller.consume())
            .unwrap_or(Ok(Consumed::Nothing))?;
        Ok(consumed.deliver(deliver))
    }

    pub fn into_inner(self) -> TouchController<H, N> {
        self.inner.into_inner().into_inner()
    }
}
