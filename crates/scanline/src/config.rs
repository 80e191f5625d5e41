// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scan head configuration and its validation limits.

use crate::error::{Error, Result};

/// Bounds accepted by the scan head hardware. All ranges inclusive.
pub mod limits {
    pub const MIN_CAMERA_EXPOSURE_US: u32 = 15;
    pub const MAX_CAMERA_EXPOSURE_US: u32 = 2_000_000;
    pub const MIN_LASER_ON_TIME_US: u32 = 15;
    pub const MAX_LASER_ON_TIME_US: u32 = 650_000;
    pub const MAX_LASER_DETECTION_THRESHOLD: u32 = 1_023;
    pub const MAX_SATURATION_THRESHOLD: u32 = 1_023;
    pub const MAX_SATURATION_PERCENTAGE: u32 = 100;
    pub const MAX_AVERAGE_INTENSITY: u32 = 255;
}

/// Exposure, thresholds, and phase offset for one scan head.
///
/// The min/def/max triplets clamp the autoexposure loops; setting all
/// three of a triplet equal disables the loop for that stage. A laser
/// triplet of all zeros turns the laser off entirely (used for image
/// capture with ambient light).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHeadConfiguration {
    /// Phase offset of this head within the scan period, microseconds.
    pub scan_offset_us: u32,

    pub camera_exposure_time_min_us: u32,
    pub camera_exposure_time_def_us: u32,
    pub camera_exposure_time_max_us: u32,

    pub laser_on_time_min_us: u32,
    pub laser_on_time_def_us: u32,
    pub laser_on_time_max_us: u32,

    /// Minimum brightness for a pixel to register as the laser peak.
    pub laser_detection_threshold: u32,
    /// Brightness at which a pixel counts as saturated.
    pub saturation_threshold: u32,
    /// Target percentage of saturated pixels for scan autoexposure.
    pub saturation_percentage: u32,
    /// Average brightness target for image-mode autoexposure.
    pub average_image_intensity: u32,
}

impl Default for ScanHeadConfiguration {
    fn default() -> Self {
        Self {
            scan_offset_us: 0,
            camera_exposure_time_min_us: 10_000,
            camera_exposure_time_def_us: 500_000,
            camera_exposure_time_max_us: 1_000_000,
            laser_on_time_min_us: 100,
            laser_on_time_def_us: 500,
            laser_on_time_max_us: 1_000,
            laser_detection_threshold: 120,
            saturation_threshold: 800,
            saturation_percentage: 30,
            average_image_intensity: 50,
        }
    }
}

impl ScanHeadConfiguration {
    /// Check every field against the hardware limits and ordering rules.
    pub fn validate(&self) -> Result<()> {
        if self.camera_exposure_time_max_us > limits::MAX_CAMERA_EXPOSURE_US
            || self.camera_exposure_time_min_us < limits::MIN_CAMERA_EXPOSURE_US
            || self.camera_exposure_time_max_us < self.camera_exposure_time_def_us
            || self.camera_exposure_time_max_us < self.camera_exposure_time_min_us
            || self.camera_exposure_time_def_us < self.camera_exposure_time_min_us
        {
            return Err(Error::InvalidArgument(
                "camera exposure time out of range".into(),
            ));
        }

        // Laser on time of zero everywhere means laser off; a nonzero
        // minimum must still clear the hardware floor.
        if self.laser_on_time_max_us > limits::MAX_LASER_ON_TIME_US
            || (self.laser_on_time_min_us != 0
                && self.laser_on_time_min_us < limits::MIN_LASER_ON_TIME_US)
            || self.laser_on_time_max_us < self.laser_on_time_def_us
            || self.laser_on_time_max_us < self.laser_on_time_min_us
            || self.laser_on_time_def_us < self.laser_on_time_min_us
        {
            return Err(Error::InvalidArgument("laser on time out of range".into()));
        }

        if self.laser_detection_threshold > limits::MAX_LASER_DETECTION_THRESHOLD {
            return Err(Error::InvalidArgument(
                "laser detection threshold out of range".into(),
            ));
        }

        if self.saturation_threshold > limits::MAX_SATURATION_THRESHOLD {
            return Err(Error::InvalidArgument(
                "saturation threshold out of range".into(),
            ));
        }

        if self.saturation_percentage < 1
            || self.saturation_percentage > limits::MAX_SATURATION_PERCENTAGE
        {
            return Err(Error::InvalidArgument(
                "saturation percentage out of range".into(),
            ));
        }

        if self.average_image_intensity > limits::MAX_AVERAGE_INTENSITY {
            return Err(Error::InvalidArgument(
                "average image intensity out of range".into(),
            ));
        }

        Ok(())
    }

    /// Copy with the laser triplet clamped to the camera exposure triplet.
    /// The scan server assumes laser on time never exceeds exposure.
    pub fn with_laser_clamped_to_exposure(&self) -> Self {
        let mut config = *self;
        config.laser_on_time_max_us = config
            .laser_on_time_max_us
            .min(config.camera_exposure_time_max_us);
        config.laser_on_time_def_us = config
            .laser_on_time_def_us
            .min(config.camera_exposure_time_def_us);
        config.laser_on_time_min_us = config
            .laser_on_time_min_us
            .min(config.camera_exposure_time_min_us);
        config
    }

    /// Copy with the laser turned off.
    pub fn with_laser_disabled(&self) -> Self {
        let mut config = *self;
        config.laser_on_time_min_us = 0;
        config.laser_on_time_def_us = 0;
        config.laser_on_time_max_us = 0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ScanHeadConfiguration::default().validate().is_ok());
    }

    #[test]
    fn ordering_rules_enforced() {
        let mut config = ScanHeadConfiguration::default();
        config.camera_exposure_time_def_us = config.camera_exposure_time_max_us + 1;
        assert!(config.validate().is_err());

        let mut config = ScanHeadConfiguration::default();
        config.laser_on_time_min_us = config.laser_on_time_def_us + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn laser_off_is_valid() {
        let config = ScanHeadConfiguration::default().with_laser_disabled();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nonzero_laser_min_must_clear_floor() {
        let mut config = ScanHeadConfiguration::default();
        config.laser_on_time_min_us = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_ranges() {
        let mut config = ScanHeadConfiguration::default();
        config.laser_detection_threshold = 1_024;
        assert!(config.validate().is_err());

        let mut config = ScanHeadConfiguration::default();
        config.saturation_threshold = 1_023;
        assert!(config.validate().is_ok());
        config.saturation_threshold = 1_024;
        assert!(config.validate().is_err());

        let mut config = ScanHeadConfiguration::default();
        config.saturation_percentage = 0;
        assert!(config.validate().is_err());
        config.saturation_percentage = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn laser_clamp_never_exceeds_exposure() {
        let mut config = ScanHeadConfiguration::default();
        config.laser_on_time_max_us = 2_000_000;
        config.camera_exposure_time_max_us = 1_000_000;
        let clamped = config.with_laser_clamped_to_exposure();
        assert_eq!(clamped.laser_on_time_max_us, 1_000_000);
        assert_eq!(clamped.laser_on_time_min_us, config.laser_on_time_min_us);
    }
}
