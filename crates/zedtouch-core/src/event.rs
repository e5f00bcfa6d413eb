//! Touch event payload carried through the ISR queue.

use crate::coords::RawPosition;

/// Gesture code reported alongside a touch sample.
///
/// The controller does not interpret gestures; codes are passed through to the
/// application. Known values follow the FocalTech gesture ID register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Gesture {
    /// No gesture detected
    #[default]
    None,
    MoveUp,
    MoveRight,
    MoveDown,
    MoveLeft,
    ZoomIn,
    ZoomOut,
    /// Vendor code without a named variant
    Other(VendorGesture),
}

/// A gesture code with no named [`Gesture`] variant.
///
/// Only built by `Gesture::from`, so a named code never ends up wrapped here
/// and every code has exactly one `Gesture` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorGesture(u8);

impl VendorGesture {
    pub const fn code(self) -> u8 {
        self.0
    }
}

impl Gesture {
    /// Raw gesture code as reported by the sensor
    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::MoveUp => 0x10,
            Self::MoveRight => 0x14,
            Self::MoveDown => 0x18,
            Self::MoveLeft => 0x1C,
            Self::ZoomIn => 0x48,
            Self::ZoomOut => 0x49,
            Self::Other(vendor) => vendor.code(),
        }
    }
}

impl From<u8> for Gesture {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::None,
            0x10 => Self::MoveUp,
            0x14 => Self::MoveRight,
            0x18 => Self::MoveDown,
            0x1C => Self::MoveLeft,
            0x48 => Self::ZoomIn,
            0x49 => Self::ZoomOut,
            other => Self::Other(VendorGesture(other)),
        }
    }
}

/// A touch sample as stored in the event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchEvent {
    pub gesture: Gesture,
    /// Number of fingers on the panel, 0 on release
    pub finger_count: u8,
    pub location: RawPosition,
}

impl TouchEvent {
    pub const fn new(gesture: Gesture, finger_count: u8, location: RawPosition) -> Self {
        Self {
            gesture,
            finger_count,
            location,
        }
    }

    /// True when the sample reports the finger leaving the panel
    pub const fn is_release(&self) -> bool {
        self.finger_count == 0
    }

    /// Gesture code in the high byte, finger count in the low byte.
    pub(crate) const fn pack_meta(&self) -> u32 {
        ((self.gesture.code() as u32) << 8) | self.finger_count as u32
    }

    pub(crate) fn unpack(meta: u32, location: u32) -> Self {
        Self {
            gesture: Gesture::from((meta >> 8) as u8),
            finger_count: meta as u8,
            location: RawPosition::unpack(location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_gesture_codes() {
        assert_eq!(Gesture::from(0x1C), Gesture::MoveLeft);
        assert_eq!(Gesture::ZoomOut.code(), 0x49);
        assert_eq!(Gesture::from(0x00), Gesture::None);
    }

    #[test]
    fn test_unknown_gesture_passes_through() {
        let gesture = Gesture::from(0x7F);
        assert!(matches!(gesture, Gesture::Other(vendor) if vendor.code() == 0x7F));
        assert_eq!(gesture.code(), 0x7F);
    }

    #[test]
    fn test_every_code_has_one_gesture() {
        for code in 0..=u8::MAX {
            let gesture = Gesture::from(code);
            assert_eq!(gesture.code(), code);
            assert_eq!(Gesture::from(gesture.code()), gesture);
        }
    }

    #[test]
    fn test_event_packing() {
        let event = TouchEvent::new(Gesture::MoveDown, 2, RawPosition::new(1234, 4000));
        let unpacked = TouchEvent::unpack(event.pack_meta(), event.location.pack());
        assert_eq!(unpacked, event);
        assert!(!unpacked.is_release());
    }
}
