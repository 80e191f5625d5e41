// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scan-request command.
//!
//! One scan request per head starts (or, re-sent periodically, keeps
//! alive) continuous scanning. The request carries the full exposure and
//! threshold configuration so the head needs no other state from the
//! client. Serialized length is 74 bytes plus one `u16` step per set bit
//! of the data-type mask.

use super::cursor::{Cursor, CursorMut};
use super::{DataType, MessageType, ParseError, COMMAND_MAGIC};
use crate::config::ScanHeadConfiguration;
use crate::format::DataFormat;

/// Fixed portion of the serialized request.
const FIXED_SIZE: usize = 74;

/// First and last camera column with data; the sensor is 1456 columns.
const START_COLUMN: u16 = 0;
const END_COLUMN: u16 = 1455;

/// Scan request, one per scan head per start-scanning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub client_ip: u32,
    pub client_port: u16,
    pub request_sequence: u8,
    pub scan_head_id: u8,
    pub camera_id: u8,
    pub laser_id: u8,
    pub flags: u8,

    pub laser_exposure_min_us: u32,
    pub laser_exposure_def_us: u32,
    pub laser_exposure_max_us: u32,

    pub camera_exposure_min_us: u32,
    pub camera_exposure_def_us: u32,
    pub camera_exposure_max_us: u32,

    /// Minimum brightness for the FPGA to register a pixel as laser peak.
    pub laser_detection_threshold: u32,
    /// Brightness at which a pixel counts as fully saturated.
    pub saturation_threshold: u32,
    /// Target percentage of saturated in-window pixels for autoexposure.
    pub saturation_percentage: u32,
    /// Average brightness target for image-mode autoexposure.
    pub average_intensity: u32,

    pub scan_interval_us: u32,
    pub scan_offset_us: u32,
    pub number_of_scans: u32,

    pub data_types: DataType,
    pub start_column: u16,
    pub end_column: u16,
    /// One step per set data-type bit, ascending by bit value.
    pub steps: Vec<u16>,
}

impl ScanRequest {
    /// Build a continuous-scan request from a head's configuration.
    pub fn new(
        format: DataFormat,
        client_ip: u32,
        client_port: u16,
        scan_head_id: u8,
        scan_interval_us: u32,
        scan_count: u32,
        config: &ScanHeadConfiguration,
    ) -> Self {
        Self {
            client_ip,
            client_port,
            request_sequence: 0,
            scan_head_id,
            camera_id: 0,
            laser_id: 0,
            flags: 0,
            laser_exposure_min_us: config.laser_on_time_min_us,
            laser_exposure_def_us: config.laser_on_time_def_us,
            laser_exposure_max_us: config.laser_on_time_max_us,
            camera_exposure_min_us: config.camera_exposure_time_min_us,
            camera_exposure_def_us: config.camera_exposure_time_def_us,
            camera_exposure_max_us: config.camera_exposure_time_max_us,
            laser_detection_threshold: config.laser_detection_threshold,
            saturation_threshold: config.saturation_threshold,
            saturation_percentage: config.saturation_percentage,
            average_intensity: config.average_image_intensity,
            scan_interval_us,
            scan_offset_us: config.scan_offset_us,
            // A zero count would scan for a very long time by accident;
            // cap the implicit case at one million scans.
            number_of_scans: if scan_count == 0 { 1_000_000 } else { scan_count },
            data_types: format.data_type(),
            start_column: START_COLUMN,
            end_column: END_COLUMN,
            steps: format.steps(),
        }
    }

    /// Build a one-shot image capture request: image data only, one scan
    /// per camera so every camera produces a frame.
    pub fn new_image_capture(
        client_ip: u32,
        client_port: u16,
        scan_head_id: u8,
        scan_interval_us: u32,
        num_cameras: u32,
        config: &ScanHeadConfiguration,
    ) -> Self {
        let mut request = Self::new(
            DataFormat::CameraImageFull,
            client_ip,
            client_port,
            scan_head_id,
            scan_interval_us,
            num_cameras,
            config,
        );
        request.number_of_scans = num_cameras;
        request
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        FIXED_SIZE + self.steps.len() * 2
    }

    pub fn serialize(&self, request_sequence: u8) -> Vec<u8> {
        let mut w = CursorMut::with_capacity(self.len());
        w.put_u16(COMMAND_MAGIC);
        w.put_u8(self.len() as u8);
        w.put_u8(MessageType::StartScanning as u8);

        w.put_u32(self.client_ip);
        w.put_u16(self.client_port);
        w.put_u8(request_sequence);
        w.put_u8(self.scan_head_id);
        w.put_u8(self.camera_id);
        w.put_u8(self.laser_id);
        w.put_u8(0); // deprecated exposure mode
        w.put_u8(self.flags);

        w.put_u32(self.laser_exposure_min_us);
        w.put_u32(self.laser_exposure_def_us);
        w.put_u32(self.laser_exposure_max_us);

        w.put_u32(self.camera_exposure_min_us);
        w.put_u32(self.camera_exposure_def_us);
        w.put_u32(self.camera_exposure_max_us);

        w.put_u32(self.laser_detection_threshold);
        w.put_u32(self.saturation_threshold);
        w.put_u32(self.saturation_percentage);
        w.put_u32(self.average_intensity);

        w.put_u32(self.scan_interval_us);
        w.put_u32(self.scan_offset_us);
        w.put_u32(self.number_of_scans);

        w.put_u16(self.data_types.bits());
        w.put_u16(self.start_column);
        w.put_u16(self.end_column);

        for step in &self.steps {
            w.put_u16(*step);
        }

        w.into_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut r = Cursor::new(bytes);
        if r.get_u16()? != COMMAND_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let size = r.get_u8()?;
        if r.get_u8()? != MessageType::StartScanning as u8 {
            return Err(ParseError::BadType);
        }

        let client_ip = r.get_u32()?;
        let client_port = r.get_u16()?;
        let request_sequence = r.get_u8()?;
        let scan_head_id = r.get_u8()?;
        let camera_id = r.get_u8()?;
        let laser_id = r.get_u8()?;
        let _deprecated = r.get_u8()?;
        let flags = r.get_u8()?;

        let laser_exposure_min_us = r.get_u32()?;
        let laser_exposure_def_us = r.get_u32()?;
        let laser_exposure_max_us = r.get_u32()?;

        let camera_exposure_min_us = r.get_u32()?;
        let camera_exposure_def_us = r.get_u32()?;
        let camera_exposure_max_us = r.get_u32()?;

        let laser_detection_threshold = r.get_u32()?;
        let saturation_threshold = r.get_u32()?;
        let saturation_percentage = r.get_u32()?;
        let average_intensity = r.get_u32()?;

        let scan_interval_us = r.get_u32()?;
        let scan_offset_us = r.get_u32()?;
        let number_of_scans = r.get_u32()?;

        let data_types = DataType(r.get_u16()?);
        let start_column = r.get_u16()?;
        let end_column = r.get_u16()?;

        let mut steps = Vec::with_capacity(data_types.count() as usize);
        for _ in data_types.iter() {
            steps.push(r.get_u16()?);
        }

        let request = Self {
            client_ip,
            client_port,
            request_sequence,
            scan_head_id,
            camera_id,
            laser_id,
            flags,
            laser_exposure_min_us,
            laser_exposure_def_us,
            laser_exposure_max_us,
            camera_exposure_min_us,
            camera_exposure_def_us,
            camera_exposure_max_us,
            laser_detection_threshold,
            saturation_threshold,
            saturation_percentage,
            average_intensity,
            scan_interval_us,
            scan_offset_us,
            number_of_scans,
            data_types,
            start_column,
            end_column,
            steps,
        };

        if size as usize != request.len() {
            return Err(ParseError::SizeMismatch);
        }

        Ok(request)
    }
}
