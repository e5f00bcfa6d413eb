use serde::{Deserialize, Serialize};

use crate::coords::DisplayBounds;

/// Runtime settings for the touch controller
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchConfig {
    /// Display that calibrated positions are clamped to
    pub display: DisplayBounds,
    /// Samples a calibration press must produce before its release counts
    pub calibration_min_samples: u16,
    /// Re-tune the sensor IDAC values during `initialize`
    pub recalibrate_idac_on_init: bool,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            display: DisplayBounds::default(),
            calibration_min_samples: 3,
            recalibrate_idac_on_init: false,
        }
    }
}

impl TouchConfig {
    pub fn with_display(mut self, display: DisplayBounds) -> Self {
        self.display = display;
        self
    }

    pub fn with_calibration_min_samples(mut self, samples: u16) -> Self {
        self.calibration_min_samples = samples.max(1);
        self
    }

    pub fn with_idac_recalibration(mut self, enabled: bool) -> Self {
        self.recalibrate_idac_on_init = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = TouchConfig::default()
            .with_display(DisplayBounds::new(320, 240))
            .with_idac_recalibration(true);
        assert_eq!(config.display, DisplayBounds::new(320, 240));
        assert_eq!(config.calibration_min_samples, 3);
        assert!(config.recalibrate_idac_on_init);
    }

    #[test]
    fn test_min_samples_never_zero() {
        let config = TouchConfig::default().with_calibration_min_samples(0);
        assert_eq!(config.calibration_min_samples, 1);
    }

    #[test]
    fn test_config_survives_postcard() {
        let config = TouchConfig::default().with_calibration_min_samples(8);
        let mut buf = [0u8; 32];
        let bytes = postcard::to_slice(&config, &mut buf).unwrap();
        assert_eq!(postcard::from_bytes::<TouchConfig>(bytes).unwrap(), config);
    }
}
