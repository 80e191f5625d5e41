// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembly of data-packet fragments into profiles.
//!
//! Fragments of one profile share a (source id, timestamp) pair. At most
//! one profile is in flight per receiver; the head interleaves fragments
//! of consecutive profiles only across, never within, a timestamp, so a
//! fragment for a new pair means the old profile is done receiving. There
//! is no retransmission: a partial profile is delivered anyway with its
//! received/expected counts so the consumer can judge the loss.
//!
//! Fragments may arrive out of order. No explicit reordering happens; the
//! column stride formula places each value at its absolute column from
//! `datagram_position` alone.

use crate::format::CAMERA_MAX;
use crate::geometry::AlignmentParams;
use crate::profile::{Profile, INVALID_XY};
use crate::protocol::{DataPacket, DataType};
use crate::queue::ProfileQueue;

/// Bytes of image payload per data packet: four raster rows.
const IMAGE_SLICE_SIZE: usize = 4 * crate::profile::IMAGE_WIDTH;

/// Per-receiver fragment-to-profile assembler.
pub(crate) struct Assembler {
    in_flight: Option<Profile>,
    source: u32,
    timestamp_ns: u64,
    packets_for_profile: u32,
    complete_profiles: u64,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            in_flight: None,
            source: 0,
            timestamp_ns: 0,
            packets_for_profile: 0,
            complete_profiles: 0,
        }
    }

    /// Drop all in-flight state; called when a receiver (re)starts.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.source = 0;
        self.timestamp_ns = 0;
        self.packets_for_profile = 0;
        self.complete_profiles = 0;
    }

    pub fn complete_profiles(&self) -> u64 {
        self.complete_profiles
    }

    /// Feed one parsed data packet; completed (or superseded partial)
    /// profiles are pushed to `queue`.
    pub fn process(
        &mut self,
        packet: &DataPacket<'_>,
        alignment: &[AlignmentParams; CAMERA_MAX],
        queue: &ProfileQueue,
    ) {
        let source = packet.source_id();
        let timestamp_ns = packet.timestamp_ns;
        let total_packets = packet.number_datagrams;

        if source != self.source || timestamp_ns != self.timestamp_ns {
            if let Some(mut partial) = self.in_flight.take() {
                // A fragment for a new profile means the old one lost at
                // least one packet. Deliver it anyway.
                let expected = partial.packets_expected;
                partial.set_packet_info(self.packets_for_profile, expected);
                queue.push(partial);
            }

            self.source = source;
            self.timestamp_ns = timestamp_ns;
            self.packets_for_profile = 0;
            self.in_flight = Some(Profile::from_packet(packet));
        }

        let Some(profile) = self.in_flight.as_mut() else {
            return;
        };

        let camera = usize::from(packet.camera_id).min(CAMERA_MAX - 1);
        let alignment = &alignment[camera];
        let raw = packet.raw();
        let mask = packet.data_type;

        if mask.contains(DataType::BRIGHTNESS) && mask.contains(DataType::XY_DATA) {
            // Brightness rides with geometry: walk both layouts in
            // lockstep, one brightness byte per XY pair.
            if let (Some(xy), Some(b)) = (
                packet.layout(DataType::XY_DATA),
                packet.layout(DataType::BRIGHTNESS),
            ) {
                let start = u32::from(packet.start_column);
                let stride = total_packets * xy.step;
                let mut idx = start + packet.datagram_position * xy.step;
                let mut xy_at = xy.offset;
                let mut b_at = b.offset;

                for _ in 0..xy.num_vals {
                    let x_raw = read_i16(raw, xy_at);
                    let y_raw = read_i16(raw, xy_at + 2);
                    let brightness = raw.get(b_at).copied().unwrap_or(0);
                    xy_at += 4;
                    b_at += 1;

                    if x_raw != INVALID_XY as i16 && y_raw != INVALID_XY as i16 {
                        let p = alignment.camera_to_mill(i32::from(x_raw), i32::from(y_raw));
                        profile.insert_point_and_brightness(idx as usize, p.x, p.y, brightness);
                    }

                    idx += stride;
                }
            }
        } else if mask.contains(DataType::XY_DATA) {
            if let Some(xy) = packet.layout(DataType::XY_DATA) {
                let start = u32::from(packet.start_column);
                let stride = total_packets * xy.step;
                let mut idx = start + packet.datagram_position * xy.step;
                let mut at = xy.offset;

                for _ in 0..xy.num_vals {
                    let x_raw = read_i16(raw, at);
                    let y_raw = read_i16(raw, at + 2);
                    at += 4;

                    if x_raw != INVALID_XY as i16 && y_raw != INVALID_XY as i16 {
                        let p = alignment.camera_to_mill(i32::from(x_raw), i32::from(y_raw));
                        profile.insert_point(idx as usize, p.x, p.y);
                    }

                    idx += stride;
                }
            }
        } else if mask.contains(DataType::IMAGE) {
            // The final datagram of an image profile carries subpixel
            // data, not pixels; skip it.
            if self.packets_for_profile + 1 != total_packets {
                if let Some(layout) = packet.layout(DataType::IMAGE) {
                    let offset = packet.datagram_position as usize * IMAGE_SLICE_SIZE;
                    let end = (layout.offset + IMAGE_SLICE_SIZE).min(raw.len());
                    if layout.offset < end {
                        profile.insert_image_slice(offset, &raw[layout.offset..end]);
                    }
                    // Firmware quirk: in image mode the exposure field
                    // arrives right-shifted by 8; undo it.
                    profile.set_exposure_time(u32::from(packet.exposure_time_us) << 8);
                }
            }
        }

        self.packets_for_profile += 1;
        if self.packets_for_profile == total_packets {
            if let Some(mut done) = self.in_flight.take() {
                done.set_packet_info(total_packets, total_packets);
                queue.push(done);
            }
            self.complete_profiles += 1;
            self.packets_for_profile = 0;
            // source/timestamp stay as-is so a late duplicate fragment of
            // the finished profile is ignored rather than re-allocated.
        }
    }
}

fn read_i16(raw: &[u8], at: usize) -> i16 {
    match raw.get(at..at + 2) {
        Some(bytes) => i16::from_be_bytes([bytes[0], bytes[1]]),
        None => INVALID_XY as i16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cursor::CursorMut;
    use crate::protocol::DATA_MAGIC;

    const XY_LM: DataType = DataType(0x03);

    /// Build a data packet whose every column carries (x=column, y=100),
    /// brightness 7, interleaved exactly as the scan head would.
    fn build_fragment(
        timestamp_ns: u64,
        position: u32,
        total: u32,
        step: u16,
        num_cols: u32,
    ) -> Vec<u8> {
        let per_type = {
            let mut n = num_cols / (total * u32::from(step));
            if ((num_cols / u32::from(step)) % total) > position {
                n += 1;
            }
            n
        };

        let mut w = CursorMut::with_capacity(64);
        w.put_u16(DATA_MAGIC);
        w.put_u16(900);
        w.put_u8(1); // scan head
        w.put_u8(0); // camera
        w.put_u8(0); // laser
        w.put_u8(0);
        w.put_u64(timestamp_ns);
        w.put_u16(25);
        w.put_u16(XY_LM.bits());
        w.put_u16((per_type + per_type * 4) as u16);
        w.put_u8(0); // encoders
        w.put_u8(0);
        w.put_u32(position);
        w.put_u32(total);
        w.put_u16(0);
        w.put_u16((num_cols - 1) as u16);
        w.put_u16(step); // brightness step
        w.put_u16(step); // xy step

        // Brightness section, then XY section.
        for _ in 0..per_type {
            w.put_u8(7);
        }
        for j in 0..per_type {
            let column = (j * total + position) * u32::from(step);
            w.put_i16(column as i16);
            w.put_i16(100);
        }

        w.into_vec()
    }

    fn identity_alignment() -> [AlignmentParams; CAMERA_MAX] {
        [AlignmentParams::default(); CAMERA_MAX]
    }

    #[test]
    fn complete_profile_from_out_of_order_fragments() {
        let queue = ProfileQueue::new();
        let mut assembler = Assembler::new();
        let alignment = identity_alignment();

        for position in [2u32, 0, 3, 1] {
            let bytes = build_fragment(10, position, 4, 1, 1_456);
            let packet = DataPacket::parse(&bytes).unwrap();
            assembler.process(&packet, &alignment, &queue);
        }

        assert_eq!(queue.available(), 1);
        let profile = queue.pop(1).remove(0);
        assert_eq!(profile.packets_received, 4);
        assert_eq!(profile.packets_expected, 4);
        assert_eq!(profile.num_valid_geometry(), 1_456);
        assert_eq!(profile.num_valid_brightness(), 1_456);

        // Every column holds its own index: the stride formula placed
        // out-of-order fragments correctly.
        for (column, point) in profile.points().iter().enumerate() {
            assert_eq!(point.x, column as i32, "column {}", column);
            assert_eq!(point.y, 100);
            assert_eq!(point.brightness, 7);
        }
    }

    #[test]
    fn fragment_at_position_2_of_4_writes_strided_columns() {
        let queue = ProfileQueue::new();
        let mut assembler = Assembler::new();
        let alignment = identity_alignment();

        let bytes = build_fragment(10, 2, 4, 1, 1_456);
        let packet = DataPacket::parse(&bytes).unwrap();
        assert_eq!(packet.layout(DataType::XY_DATA).unwrap().num_vals, 364);
        assembler.process(&packet, &alignment, &queue);

        // Partial stays in flight until completion or supersession.
        assert_eq!(queue.available(), 0);
        let bytes = build_fragment(20, 0, 1, 1, 1_456);
        let packet = DataPacket::parse(&bytes).unwrap();
        assembler.process(&packet, &alignment, &queue);

        assert_eq!(queue.available(), 2);
        let partial = queue.pop(1).remove(0);
        assert_eq!(partial.packets_received, 1);
        assert_eq!(partial.packets_expected, 4);
        assert_eq!(partial.num_valid_geometry(), 364);
        // Columns {2, 6, 10, ..., 1454} carry data, nothing else does.
        for (column, point) in partial.points().iter().enumerate() {
            if column % 4 == 2 {
                assert_eq!(point.x, column as i32);
            } else {
                assert_eq!(point.x, INVALID_XY, "column {}", column);
            }
        }
    }

    #[test]
    fn invalid_sentinel_points_are_skipped() {
        let queue = ProfileQueue::new();
        let mut assembler = Assembler::new();
        let alignment = identity_alignment();

        // Single-fragment profile with every point invalid.
        let mut w = CursorMut::with_capacity(64);
        w.put_u16(DATA_MAGIC);
        w.put_u16(900);
        w.put_u8(1);
        w.put_u8(0);
        w.put_u8(0);
        w.put_u8(0);
        w.put_u64(5);
        w.put_u16(25);
        w.put_u16(DataType::XY_DATA.bits());
        w.put_u16(8);
        w.put_u8(0);
        w.put_u8(0);
        w.put_u32(0);
        w.put_u32(1);
        w.put_u16(0);
        w.put_u16(1);
        w.put_u16(1); // xy step
        for _ in 0..2 {
            w.put_i16(INVALID_XY as i16);
            w.put_i16(INVALID_XY as i16);
        }

        let bytes = w.into_vec();
        let packet = DataPacket::parse(&bytes).unwrap();
        assembler.process(&packet, &alignment, &queue);

        let profile = queue.pop(1).remove(0);
        assert_eq!(profile.num_valid_geometry(), 0);
        assert_eq!(profile.packets_received, 1);
    }

    #[test]
    fn alignment_transform_applies_to_stored_points() {
        let queue = ProfileQueue::new();
        let mut assembler = Assembler::new();
        let mut alignment = identity_alignment();
        alignment[0] = AlignmentParams::new(0.0, 1.0, 0.0, false);

        let bytes = build_fragment(10, 0, 1, 1, 4);
        let packet = DataPacket::parse(&bytes).unwrap();
        assembler.process(&packet, &alignment, &queue);

        let profile = queue.pop(1).remove(0);
        // Shift of 1 inch = 1000 mils on X.
        assert_eq!(profile.points()[0].x, 1_000);
        assert_eq!(profile.points()[1].x, 1_001);
        assert_eq!(profile.points()[0].y, 100);
    }

    #[test]
    fn n_profiles_times_k_fragments_deliver_exactly_n() {
        let queue = ProfileQueue::new();
        let mut assembler = Assembler::new();
        let alignment = identity_alignment();

        const N: u64 = 25;
        const K: u32 = 4;

        for profile_n in 0..N {
            // Arbitrary per-profile fragment order.
            let order = match profile_n % 4 {
                0 => [0u32, 1, 2, 3],
                1 => [3, 2, 1, 0],
                2 => [1, 3, 0, 2],
                _ => [2, 0, 3, 1],
            };
            for position in order {
                let bytes = build_fragment(1_000 + profile_n, position, K, 1, 1_456);
                let packet = DataPacket::parse(&bytes).unwrap();
                assembler.process(&packet, &alignment, &queue);
            }
        }

        assert_eq!(assembler.complete_profiles(), N);
        let profiles = queue.pop(PROFILE_QUEUE_MAX_USIZE);
        assert_eq!(profiles.len(), N as usize);
        for profile in &profiles {
            assert_eq!(profile.packets_received, K);
            assert_eq!(profile.packets_expected, K);
        }
    }

    const PROFILE_QUEUE_MAX_USIZE: usize = crate::queue::PROFILE_QUEUE_MAX;
}
