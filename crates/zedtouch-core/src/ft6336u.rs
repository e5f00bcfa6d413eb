use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::coords::RawPosition;
use crate::event::Gesture;
use crate::hardware::{RawTouchSample, TouchHardware};

// =============================================================================
// I2C Address
// =============================================================================

/// FT6336U I2C address
pub const I2C_ADDR: u8 = 0x38;

/// Expected value of the chip ID register
pub const CHIP_ID: u8 = 0x64;

// =============================================================================
// Register Addresses
// =============================================================================

pub const ADDR_DEVICE_MODE: u8 = 0x00;
pub const ADDR_GESTURE_ID: u8 = 0x01;
pub const ADDR_TD_STATUS: u8 = 0x02;
pub const ADDR_TOUCH1_X: u8 = 0x03;
pub const ADDR_TOUCH1_Y: u8 = 0x05;
pub const ADDR_CHIP_ID: u8 = 0xA3;
pub const ADDR_G_MODE: u8 = 0xA4;
pub const ADDR_FIRMWARE_ID: u8 = 0xA6;

/// Gesture ID, TD_STATUS and the four point 1 coordinate bytes
const SCAN_LEN: usize = 6;

/// Reset pulse width and boot time after release, in milliseconds
const RESET_PULSE_MS: u32 = 5;
const BOOT_TIME_MS: u32 = 300;
/// Time spent in factory mode while the chip re-tunes its sensor
const FACTORY_SETTLE_MS: u32 = 100;

// =============================================================================
// Enums
// =============================================================================

/// Device operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceMode {
    /// Working mode (normal operation)
    Working = 0b000,
    /// Factory mode (calibration/testing)
    Factory = 0b100,
}

impl DeviceMode {
    pub fn from_register(val: u8) -> Option<Self> {
        match (val >> 4) & 0b111 {
            0b000 => Some(Self::Working),
            0b100 => Some(Self::Factory),
            _ => None,
        }
    }

    pub fn to_register(self) -> u8 {
        (self as u8) << 4
    }
}

/// Interrupt trigger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GestureMode {
    /// Polling mode - no interrupts
    Polling = 0,
    /// Trigger mode - generate interrupts on touch events
    Trigger = 1,
}

impl GestureMode {
    pub fn from_register(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::Polling),
            1 => Some(Self::Trigger),
            _ => None,
        }
    }
}

// =============================================================================
// Driver Error Type
// =============================================================================

/// Errors that can occur during FT6336U operations
#[derive(Debug)]
pub enum Error<E> {
    /// I2C communication error
    I2c(E),
    /// The reset pin could not be driven
    ResetPin,
    /// Invalid data received from device
    InvalidData,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::I2c(e)
    }
}

// =============================================================================
// Driver Implementation
// =============================================================================

/// FT6336U capacitive touch controller on a blocking I2C bus.
///
/// Only touch point 1 is reported; the finger count still reflects a second
/// finger on the panel. The INT line is wired by the board to the interrupt
/// that calls [`TouchController::on_interrupt`](crate::controller::TouchController::on_interrupt).
pub struct Ft6336u<I2C, RST, D> {
    i2c: I2C,
    reset_pin: RST,
    delay: D,
}

impl<I2C, RST, D> Ft6336u<I2C, RST, D>
where
    I2C: I2c,
    RST: OutputPin,
    D: DelayNs,
{
    pub fn new(i2c: I2C, reset_pin: RST, delay: D) -> Self {
        Self {
            i2c,
            reset_pin,
            delay,
        }
    }

    /// Give back the bus, reset pin and delay
    pub fn release(self) -> (I2C, RST, D) {
        (self.i2c, self.reset_pin, self.delay)
    }

    fn read_byte(&mut self, addr: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(I2C_ADDR, &[addr], &mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, addr: u8, data: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(I2C_ADDR, &[addr, data])?;
        Ok(())
    }

    pub fn read_device_mode(&mut self) -> Result<Option<DeviceMode>, Error<I2C::Error>> {
        let val = self.read_byte(ADDR_DEVICE_MODE)?;
        Ok(DeviceMode::from_register(val))
    }

    pub fn write_device_mode(&mut self, mode: DeviceMode) -> Result<(), Error<I2C::Error>> {
        self.write_byte(ADDR_DEVICE_MODE, mode.to_register())
    }

    pub fn read_g_mode(&mut self) -> Result<Option<GestureMode>, Error<I2C::Error>> {
        let val = self.read_byte(ADDR_G_MODE)?;
        Ok(GestureMode::from_register(val))
    }

    pub fn write_g_mode(&mut self, mode: GestureMode) -> Result<(), Error<I2C::Error>> {
        self.write_byte(ADDR_G_MODE, mode as u8)
    }

    /// Should read back [`CHIP_ID`]
    pub fn read_chip_id(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_byte(ADDR_CHIP_ID)
    }

    pub fn read_firmware_id(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_byte(ADDR_FIRMWARE_ID)
    }

    /// Read gesture, finger count and point 1 in a single burst.
    pub fn read_touch(&mut self) -> Result<RawTouchSample, Error<I2C::Error>> {
        let mut buf = [0u8; SCAN_LEN];
        self.i2c.write_read(I2C_ADDR, &[ADDR_GESTURE_ID], &mut buf)?;

        let finger_count = buf[1] & 0x0F;
        if finger_count > 2 {
            return Err(Error::InvalidData);
        }

        let x = (((buf[2] & 0x0F) as u16) << 8) | (buf[3] as u16);
        let y = (((buf[4] & 0x0F) as u16) << 8) | (buf[5] as u16);

        Ok(RawTouchSample {
            position: RawPosition::new(x, y),
            gesture: Gesture::from(buf[0]),
            finger_count,
        })
    }
}

impl<I2C, RST, D> TouchHardware for Ft6336u<I2C, RST, D>
where
    I2C: I2c,
    RST: OutputPin,
    D: DelayNs,
{
    type Error = Error<I2C::Error>;

    fn read_raw_sample(&mut self) -> Result<RawTouchSample, Self::Error> {
        self.read_touch()
    }

    fn start_interrupts(&mut self) -> Result<(), Self::Error> {
        self.write_g_mode(GestureMode::Trigger)
    }

    fn stop_interrupts(&mut self) -> Result<(), Self::Error> {
        self.write_g_mode(GestureMode::Polling)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.reset_pin.set_low().map_err(|_| Error::ResetPin)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        self.reset_pin.set_high().map_err(|_| Error::ResetPin)?;
        self.delay.delay_ms(BOOT_TIME_MS);

        let chip_id = self.read_chip_id()?;
        if chip_id != CHIP_ID {
            warn!("FT6336U: unexpected chip id {:#04x}", chip_id);
        }
        let firmware = self.read_firmware_id()?;
        info!("FT6336U: reset done, chip {:#04x}, firmware {:#04x}", chip_id, firmware);
        Ok(())
    }

    fn recalibrate_sensor_idac(&mut self) -> Result<(), Self::Error> {
        self.write_device_mode(DeviceMode::Factory)?;
        self.delay.delay_ms(FACTORY_SETTLE_MS);
        self.write_device_mode(DeviceMode::Working)?;
        debug!("FT6336U: sensor re-tuned");
        Ok(())
    }
}
