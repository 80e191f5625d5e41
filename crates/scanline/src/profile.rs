// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Completed and in-flight profile records.

use crate::format::Camera;
use crate::protocol::{DataPacket, DataType};

/// Number of point slots in a profile; one per camera column.
pub const PROFILE_DATA_LEN: usize = 1_456;
/// Camera frame width in pixels.
pub const IMAGE_WIDTH: usize = 1_456;
/// Camera frame height in pixels.
pub const IMAGE_HEIGHT: usize = 1_088;
/// Sentinel for a column with no valid geometry.
pub const INVALID_XY: i32 = -32_768;
/// Sentinel for a column with no valid brightness.
pub const INVALID_BRIGHTNESS: i32 = 0;

/// One measured column: geometry in mils, brightness in counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilePoint {
    pub x: i32,
    pub y: i32,
    pub brightness: i32,
}

impl Default for ProfilePoint {
    fn default() -> Self {
        Self {
            x: INVALID_XY,
            y: INVALID_XY,
            brightness: INVALID_BRIGHTNESS,
        }
    }
}

/// One scan line from a single (camera, laser) pair at a single timestamp.
///
/// Immutable once handed to the consumer. `points` always has
/// `PROFILE_DATA_LEN` entries when geometry was requested; columns that
/// never received a valid measurement keep the sentinel values. Image-mode
/// profiles carry the frame in `image` instead.
#[derive(Debug, Clone)]
pub struct Profile {
    pub scan_head_id: u8,
    pub camera: Camera,
    pub laser: u8,
    /// Head-side timestamp in nanoseconds.
    pub timestamp_ns: u64,
    pub encoders: Vec<i64>,
    pub exposure_time_us: u32,
    pub laser_on_time_us: u32,
    pub data_type: DataType,
    pub packets_received: u32,
    pub packets_expected: u32,

    points: Vec<ProfilePoint>,
    num_valid_brightness: u32,
    num_valid_geometry: u32,
    image: Vec<u8>,
}

impl Profile {
    /// Allocate an in-flight profile from the first fragment of a new
    /// (source, timestamp) pair.
    pub(crate) fn from_packet(packet: &DataPacket<'_>) -> Self {
        let mask = packet.data_type;

        let points = if mask.contains(DataType::BRIGHTNESS) || mask.contains(DataType::XY_DATA) {
            vec![ProfilePoint::default(); PROFILE_DATA_LEN]
        } else {
            Vec::new()
        };

        let image = if mask.contains(DataType::IMAGE) {
            vec![0u8; IMAGE_WIDTH * IMAGE_HEIGHT]
        } else {
            Vec::new()
        };

        Self {
            scan_head_id: packet.scan_head_id,
            camera: Camera::from_id(packet.camera_id),
            laser: packet.laser_id,
            timestamp_ns: packet.timestamp_ns,
            encoders: packet.encoders().to_vec(),
            exposure_time_us: u32::from(packet.exposure_time_us),
            laser_on_time_us: u32::from(packet.laser_on_time_us),
            data_type: mask,
            packets_received: 0,
            packets_expected: packet.number_datagrams,
            points,
            num_valid_brightness: 0,
            num_valid_geometry: 0,
            image,
        }
    }

    /// Composite source key: bits 31..16 scan head, 15..8 camera, 7..0 laser.
    pub fn source_id(&self) -> u32 {
        (u32::from(self.scan_head_id) << 16)
            | ((self.camera as u32) << 8)
            | u32::from(self.laser)
    }

    pub fn points(&self) -> &[ProfilePoint] {
        &self.points
    }

    pub fn num_valid_brightness(&self) -> u32 {
        self.num_valid_brightness
    }

    pub fn num_valid_geometry(&self) -> u32 {
        self.num_valid_geometry
    }

    /// Greyscale frame for image-mode profiles, row major,
    /// `IMAGE_WIDTH x IMAGE_HEIGHT`. Empty otherwise.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub(crate) fn insert_point(&mut self, idx: usize, x: i32, y: i32) {
        if let Some(slot) = self.points.get_mut(idx) {
            slot.x = x;
            slot.y = y;
            self.num_valid_geometry += 1;
        }
    }

    pub(crate) fn insert_point_and_brightness(&mut self, idx: usize, x: i32, y: i32, brightness: u8) {
        if let Some(slot) = self.points.get_mut(idx) {
            slot.x = x;
            slot.y = y;
            slot.brightness = i32::from(brightness);
            self.num_valid_geometry += 1;
            self.num_valid_brightness += 1;
        }
    }

    pub(crate) fn insert_image_slice(&mut self, offset: usize, data: &[u8]) {
        if let Some(dst) = self
            .image
            .get_mut(offset..offset.saturating_add(data.len()))
        {
            dst.copy_from_slice(data);
        }
    }

    pub(crate) fn set_exposure_time(&mut self, exposure_us: u32) {
        self.exposure_time_us = exposure_us;
    }

    pub(crate) fn set_packet_info(&mut self, received: u32, expected: u32) {
        self.packets_received = received;
        self.packets_expected = expected;
    }

    /// Bare profile for unit tests that only care about queue mechanics.
    #[cfg(test)]
    pub(crate) fn stub(timestamp_ns: u64) -> Self {
        Self {
            scan_head_id: 0,
            camera: Camera::A,
            laser: 0,
            timestamp_ns,
            encoders: Vec::new(),
            exposure_time_us: 0,
            laser_on_time_us: 0,
            data_type: DataType::XY_DATA,
            packets_received: 1,
            packets_expected: 1,
            points: Vec::new(),
            num_valid_brightness: 0,
            num_valid_geometry: 0,
            image: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_point_is_the_invalid_sentinel() {
        let p = ProfilePoint::default();
        assert_eq!(p.x, INVALID_XY);
        assert_eq!(p.y, INVALID_XY);
        assert_eq!(p.brightness, INVALID_BRIGHTNESS);
    }

    #[test]
    fn out_of_range_inserts_are_ignored() {
        // Build a minimal profile by hand rather than over the wire.
        let mut profile = Profile {
            scan_head_id: 0,
            camera: Camera::A,
            laser: 0,
            timestamp_ns: 0,
            encoders: vec![],
            exposure_time_us: 0,
            laser_on_time_us: 0,
            data_type: DataType::XY_DATA,
            packets_received: 0,
            packets_expected: 1,
            points: vec![ProfilePoint::default(); PROFILE_DATA_LEN],
            num_valid_brightness: 0,
            num_valid_geometry: 0,
            image: Vec::new(),
        };

        profile.insert_point(PROFILE_DATA_LEN, 1, 1);
        assert_eq!(profile.num_valid_geometry(), 0);

        profile.insert_point_and_brightness(10, 5, -5, 200);
        assert_eq!(profile.num_valid_geometry(), 1);
        assert_eq!(profile.num_valid_brightness(), 1);
        assert_eq!(profile.points()[10].brightness, 200);
    }
}
