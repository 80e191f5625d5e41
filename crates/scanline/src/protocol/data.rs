// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Profile/image data packet.
//!
//! Data packets are the hot path: one profile is fanned out over
//! `number_datagrams` fragments so that each fits a single ethernet
//! frame. Processed data types are interleaved across fragments (losing a
//! fragment costs resolution, not a contiguous hole); image data is sent
//! as sequential raster rows. The 36-byte header is fixed layout and all
//! multi-byte fields are network byte order.

use super::cursor::Cursor;
use super::{DataType, ParseError, DATA_MAGIC};

/// Serialized header length.
pub const DATAGRAM_HEADER_SIZE: usize = 36;

/// Where one data type's values live within one fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentLayout {
    /// Column stride between consecutive samples of this type.
    pub step: u32,
    /// Number of values this fragment carries.
    pub num_vals: u32,
    /// Byte offset of the first value within the datagram.
    pub offset: usize,
    /// Total bytes of this type in this fragment.
    pub payload_size: usize,
}

/// A parsed view over one received datagram.
///
/// Borrows the receive buffer; nothing is copied until the assembler
/// writes accepted values into the profile.
#[derive(Debug)]
pub struct DataPacket<'a> {
    pub magic: u16,
    pub exposure_time_us: u16,
    pub scan_head_id: u8,
    pub camera_id: u8,
    pub laser_id: u8,
    pub flags: u8,
    pub timestamp_ns: u64,
    pub laser_on_time_us: u16,
    pub data_type: DataType,
    pub data_length: u16,
    pub number_encoders: u8,
    pub datagram_position: u32,
    pub number_datagrams: u32,
    pub start_column: u16,
    pub end_column: u16,

    encoders: Vec<i64>,
    layouts: Vec<(DataType, FragmentLayout)>,
    raw: &'a [u8],
}

impl<'a> DataPacket<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let mut r = Cursor::new(bytes);

        let magic = r.get_u16()?;
        if magic != DATA_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let exposure_time_us = r.get_u16()?;
        let scan_head_id = r.get_u8()?;
        let camera_id = r.get_u8()?;
        let laser_id = r.get_u8()?;
        let flags = r.get_u8()?;
        let timestamp_ns = r.get_u64()?;
        let laser_on_time_us = r.get_u16()?;
        let data_type = DataType(r.get_u16()?);
        let data_length = r.get_u16()?;
        let number_encoders = r.get_u8()?;
        let _deprecated = r.get_u8()?;
        let datagram_position = r.get_u32()?;
        let number_datagrams = r.get_u32()?;
        let start_column = r.get_u16()?;
        let end_column = r.get_u16()?;

        if number_datagrams == 0 || datagram_position >= number_datagrams {
            return Err(ParseError::BadCount);
        }
        if end_column < start_column {
            return Err(ParseError::BadCount);
        }

        // One step value per set data-type bit, ascending bit order.
        let mut steps = Vec::with_capacity(data_type.count() as usize);
        for _ in data_type.iter() {
            steps.push(r.get_u16()?);
        }

        let mut encoders = Vec::with_capacity(usize::from(number_encoders));
        for _ in 0..number_encoders {
            encoders.push(r.get_i64()?);
        }

        // Lay out each data type's section of the payload in wire order.
        let num_cols = u32::from(end_column - start_column) + 1;
        let mut data_offset = r.offset();
        let mut layouts = Vec::with_capacity(steps.len());
        for (bit, step) in data_type.iter().zip(steps) {
            let step = u32::from(step);
            if step == 0 {
                return Err(ParseError::BadCount);
            }

            let layout = if bit == DataType::IMAGE {
                // Image data arrives as blobs of sequential bytes, four
                // full camera rows per datagram.
                FragmentLayout {
                    step,
                    num_vals: u32::from(data_length),
                    offset: data_offset,
                    payload_size: usize::from(data_length),
                }
            } else {
                let mut num_vals = num_cols / (number_datagrams * step);
                // When the columns do not divide evenly, fragments at the
                // front each carry one extra value.
                if ((num_cols / step) % number_datagrams) > datagram_position {
                    num_vals += 1;
                }
                FragmentLayout {
                    step,
                    num_vals,
                    offset: data_offset,
                    payload_size: bit.value_size() * num_vals as usize,
                }
            };

            data_offset += layout.payload_size;
            layouts.push((bit, layout));
        }

        if data_offset > bytes.len() {
            return Err(ParseError::Truncated);
        }

        Ok(Self {
            magic,
            exposure_time_us,
            scan_head_id,
            camera_id,
            laser_id,
            flags,
            timestamp_ns,
            laser_on_time_us,
            data_type,
            data_length,
            number_encoders,
            datagram_position,
            number_datagrams,
            start_column,
            end_column,
            encoders,
            layouts,
            raw: bytes,
        })
    }

    /// Composite key grouping fragments into profiles: bits 31..16 scan
    /// head, 15..8 camera, 7..0 laser.
    pub fn source_id(&self) -> u32 {
        (u32::from(self.scan_head_id) << 16)
            | (u32::from(self.camera_id) << 8)
            | u32::from(self.laser_id)
    }

    pub fn encoders(&self) -> &[i64] {
        &self.encoders
    }

    pub fn layout(&self, data_type: DataType) -> Option<FragmentLayout> {
        self.layouts
            .iter()
            .find(|(bit, _)| *bit == data_type)
            .map(|(_, layout)| *layout)
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cursor::CursorMut;

    fn encode_header(
        data_type: DataType,
        steps: &[u16],
        position: u32,
        total: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut w = CursorMut::with_capacity(DATAGRAM_HEADER_SIZE + payload.len());
        w.put_u16(DATA_MAGIC);
        w.put_u16(900); // exposure
        w.put_u8(2); // scan head
        w.put_u8(0); // camera
        w.put_u8(0); // laser
        w.put_u8(0); // flags
        w.put_u64(123_456_789); // timestamp
        w.put_u16(25); // laser on
        w.put_u16(data_type.bits());
        w.put_u16(payload.len() as u16);
        w.put_u8(1); // encoders
        w.put_u8(0); // deprecated
        w.put_u32(position);
        w.put_u32(total);
        w.put_u16(0); // start column
        w.put_u16(1455); // end column
        for step in steps {
            w.put_u16(*step);
        }
        w.put_i64(-5); // encoder value
        let mut bytes = w.into_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn parses_header_fields() {
        let payload = vec![0u8; 364 * 5];
        let bytes = encode_header(
            DataType::BRIGHTNESS | DataType::XY_DATA,
            &[1, 1],
            2,
            4,
            &payload,
        );
        let packet = DataPacket::parse(&bytes).unwrap();

        assert_eq!(packet.scan_head_id, 2);
        assert_eq!(packet.timestamp_ns, 123_456_789);
        assert_eq!(packet.datagram_position, 2);
        assert_eq!(packet.number_datagrams, 4);
        assert_eq!(packet.encoders(), &[-5]);
        assert_eq!(packet.source_id(), 2 << 16);
    }

    #[test]
    fn fragment_carries_364_values_at_position_2_of_4() {
        // 1456 columns, step 1, 4 datagrams: evenly divisible, every
        // fragment carries 364 of each type.
        let payload = vec![0u8; 364 + 364 * 4];
        let bytes = encode_header(
            DataType::BRIGHTNESS | DataType::XY_DATA,
            &[1, 1],
            2,
            4,
            &payload,
        );
        let packet = DataPacket::parse(&bytes).unwrap();

        let b = packet.layout(DataType::BRIGHTNESS).unwrap();
        let xy = packet.layout(DataType::XY_DATA).unwrap();
        assert_eq!(b.num_vals, 364);
        assert_eq!(xy.num_vals, 364);
        assert_eq!(b.payload_size, 364);
        assert_eq!(xy.payload_size, 364 * 4);
        // Brightness section precedes XY (ascending bit order).
        assert_eq!(xy.offset, b.offset + b.payload_size);
    }

    #[test]
    fn stride_totals_cover_all_columns() {
        // Invariant: summing per-fragment num_vals over all positions
        // equals num_cols / step, for a grid of shapes.
        for (num_cols, step, total) in [
            (1456u32, 1u32, 4u32),
            (1456, 2, 4),
            (1456, 4, 4),
            (1456, 1, 3),
            (1456, 2, 5),
            (1455, 1, 4),
            (1000, 4, 7),
            (7, 2, 3),
            (1, 1, 1),
        ] {
            let mut sum = 0;
            for position in 0..total {
                let mut num_vals = num_cols / (total * step);
                if ((num_cols / step) % total) > position {
                    num_vals += 1;
                }
                sum += num_vals;
            }
            assert_eq!(
                sum,
                num_cols / step,
                "cols={} step={} total={}",
                num_cols,
                step,
                total
            );
        }
    }

    #[test]
    fn image_layout_is_sequential() {
        let payload = vec![0u8; 4 * 1456];
        let bytes = encode_header(DataType::IMAGE, &[1], 5, 273, &payload);
        let packet = DataPacket::parse(&bytes).unwrap();
        let layout = packet.layout(DataType::IMAGE).unwrap();
        assert_eq!(layout.num_vals, 4 * 1456);
        assert_eq!(layout.payload_size, 4 * 1456);
    }

    #[test]
    fn rejects_truncated_payload() {
        let payload = vec![0u8; 10];
        let bytes = encode_header(DataType::XY_DATA, &[1], 0, 1, &payload);
        assert_eq!(DataPacket::parse(&bytes).unwrap_err(), ParseError::Truncated);
    }

    #[test]
    fn rejects_bad_position() {
        let payload = vec![0u8; 364];
        let bytes = encode_header(DataType::BRIGHTNESS, &[1], 4, 4, &payload);
        assert_eq!(DataPacket::parse(&bytes).unwrap_err(), ParseError::BadCount);
    }
}
