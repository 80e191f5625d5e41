// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status message from the scan head.
//!
//! Sent periodically while a head is idle and in response to a broadcast
//! connect. The leading `VersionInformation` block has a frozen layout so
//! that a client can always detect a major-version mismatch, whatever else
//! changed. Everything after the reserved words is variable length,
//! governed by the `valid_encoders` and `valid_cameras` counts.

use super::cursor::{Cursor, CursorMut};
use super::{MessageType, ParseError, RESPONSE_MAGIC};
use crate::version::VersionInformation;

/// Most encoders a scan head can report.
pub const MAX_ENCODERS: usize = 3;
/// Most cameras a scan head can carry.
pub const MAX_CAMERAS: usize = 2;

/// InfoHeader plus the frozen version block.
const MIN_STATUS_SIZE: usize = 4 + 20;
/// Everything present: full static block plus maximal variable data.
const MAX_STATUS_SIZE: usize = MIN_STATUS_SIZE + 38 + 32 + MAX_ENCODERS * 8 + MAX_CAMERAS * 8;

/// Parsed status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMessage {
    pub version: VersionInformation,
    pub serial_number: u32,
    /// Max scan rate in hertz given the currently applied window.
    pub max_scan_rate: u32,
    pub scan_head_ip: u32,
    pub client_ip: u32,
    pub client_port: u16,
    pub scan_sync_id: u16,
    /// FPGA time in nanoseconds; zero until the head has synchronized.
    pub global_time: u64,
    pub num_packets_sent: u32,
    pub num_profiles_sent: u32,
    encoders: Vec<i64>,
    pixels_in_window: Vec<i32>,
    camera_temp: Vec<i32>,
}

impl StatusMessage {
    pub fn encoders(&self) -> &[i64] {
        &self.encoders
    }

    pub fn set_encoders(&mut self, encoders: Vec<i64>) {
        if encoders.len() <= MAX_ENCODERS {
            self.encoders = encoders;
        }
    }

    pub fn valid_cameras(&self) -> u8 {
        self.pixels_in_window.len() as u8
    }

    pub fn set_valid_cameras(&mut self, count: u8) {
        let count = usize::from(count).min(MAX_CAMERAS);
        self.pixels_in_window.resize(count, 0);
        self.camera_temp.resize(count, 0);
    }

    pub fn pixels_in_window(&self, camera: usize) -> Option<i32> {
        self.pixels_in_window.get(camera).copied()
    }

    pub fn set_pixels_in_window(&mut self, camera: usize, pixels: i32) {
        if let Some(slot) = self.pixels_in_window.get_mut(camera) {
            *slot = pixels;
        }
    }

    pub fn camera_temperature(&self, camera: usize) -> Option<i32> {
        self.camera_temp.get(camera).copied()
    }

    pub fn set_camera_temperature(&mut self, camera: usize, temp: i32) {
        if let Some(slot) = self.camera_temp.get_mut(camera) {
            *slot = temp;
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut w = CursorMut::with_capacity(MAX_STATUS_SIZE);
        w.put_u16(RESPONSE_MAGIC);
        w.put_u8(0); // size, patched below
        w.put_u8(MessageType::Status as u8);

        w.put_u32(self.version.major);
        w.put_u32(self.version.minor);
        w.put_u32(self.version.patch);
        w.put_u32(self.version.commit);
        w.put_u16(self.version.product);
        w.put_u16(self.version.flags);

        w.put_u32(self.serial_number);
        w.put_u32(self.max_scan_rate);
        w.put_u32(self.scan_head_ip);
        w.put_u32(self.client_ip);
        w.put_u16(self.client_port);
        w.put_u16(self.scan_sync_id);
        w.put_u64(self.global_time);
        w.put_u32(self.num_packets_sent);
        w.put_u32(self.num_profiles_sent);
        w.put_u8(self.encoders.len() as u8);
        w.put_u8(self.pixels_in_window.len() as u8);

        for _ in 0..8 {
            w.put_u32(0xFFFF_FFFF);
        }

        for encoder in &self.encoders {
            w.put_u64(*encoder as u64);
        }
        for pixels in &self.pixels_in_window {
            w.put_i32(*pixels);
        }
        for temp in &self.camera_temp {
            w.put_i32(*temp);
        }

        let size = w.len();
        w.patch_u8(2, size as u8);
        w.into_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < MIN_STATUS_SIZE || bytes.len() > MAX_STATUS_SIZE {
            return Err(ParseError::SizeMismatch);
        }

        let mut r = Cursor::new(bytes);
        if r.get_u16()? != RESPONSE_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let size = r.get_u8()?;
        if (size as usize) < MIN_STATUS_SIZE || (size as usize) > MAX_STATUS_SIZE {
            return Err(ParseError::SizeMismatch);
        }
        if r.get_u8()? != MessageType::Status as u8 {
            return Err(ParseError::BadType);
        }

        let version = VersionInformation {
            major: r.get_u32()?,
            minor: r.get_u32()?,
            patch: r.get_u32()?,
            commit: r.get_u32()?,
            product: r.get_u16()?,
            flags: r.get_u16()?,
        };

        let serial_number = r.get_u32()?;
        let max_scan_rate = r.get_u32()?;
        let scan_head_ip = r.get_u32()?;
        let client_ip = r.get_u32()?;
        let client_port = r.get_u16()?;
        let scan_sync_id = r.get_u16()?;
        let global_time = r.get_u64()?;
        let num_packets_sent = r.get_u32()?;
        let num_profiles_sent = r.get_u32()?;
        let valid_encoders = r.get_u8()?;
        let valid_cameras = r.get_u8()?;

        if usize::from(valid_encoders) > MAX_ENCODERS {
            return Err(ParseError::BadCount);
        }
        if usize::from(valid_cameras) > MAX_CAMERAS {
            return Err(ParseError::BadCount);
        }

        r.skip(8 * 4)?; // reserved words

        let mut encoders = Vec::with_capacity(usize::from(valid_encoders));
        for _ in 0..valid_encoders {
            encoders.push(r.get_u64()? as i64);
        }

        let mut pixels_in_window = Vec::with_capacity(usize::from(valid_cameras));
        for _ in 0..valid_cameras {
            pixels_in_window.push(r.get_i32()?);
        }

        let mut camera_temp = Vec::with_capacity(usize::from(valid_cameras));
        for _ in 0..valid_cameras {
            camera_temp.push(r.get_i32()?);
        }

        if r.offset() != usize::from(size) {
            return Err(ParseError::SizeMismatch);
        }

        Ok(Self {
            version,
            serial_number,
            max_scan_rate,
            scan_head_ip,
            client_ip,
            client_port,
            scan_sync_id,
            global_time,
            num_packets_sent,
            num_profiles_sent,
            encoders,
            pixels_in_window,
            camera_temp,
        })
    }
}
