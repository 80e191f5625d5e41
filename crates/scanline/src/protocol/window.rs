// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Set-window command.
//!
//! Carries the scan window as zero-or-more half-plane constraints, already
//! mapped into the target camera's coordinate system. Units are 1/1000
//! inch. Each constraint record is four network-order `i32` values
//! `(x1, y1, x2, y2)`.

use super::cursor::{Cursor, CursorMut};
use super::{MessageType, ParseError, COMMAND_MAGIC};
use crate::geometry::{Point2D, WindowConstraint};

/// Set-window command for one camera.
#[derive(Debug, Clone, Default)]
pub struct SetWindowMessage {
    camera_id: u8,
    constraints: Vec<WindowConstraint>,
}

/// InfoHeader plus camera byte and three pad bytes.
const FIXED_HEADER_SIZE: usize = 8;
/// Four i32 endpoints per constraint record.
const CONSTRAINT_SIZE: usize = 4 * std::mem::size_of::<i32>();

impl SetWindowMessage {
    pub fn new(camera_id: u8) -> Self {
        Self {
            camera_id,
            constraints: Vec::new(),
        }
    }

    pub fn camera_id(&self) -> u8 {
        self.camera_id
    }

    pub fn constraints(&self) -> &[WindowConstraint] {
        &self.constraints
    }

    /// Endpoints in 1/1000 inch.
    pub fn add_constraint(&mut self, p0: Point2D<i64>, p1: Point2D<i64>) {
        self.constraints.push(WindowConstraint::new(p0, p1));
    }

    /// True when `(x, y)` is on the inside of every constraint.
    pub fn satisfies_constraints(&self, x: i64, y: i64) -> bool {
        let p = Point2D::new(x, y);
        self.constraints.iter().all(|c| c.satisfies(p))
    }

    pub fn serialize(&self) -> Vec<u8> {
        let total = FIXED_HEADER_SIZE + self.constraints.len() * CONSTRAINT_SIZE;
        let mut w = CursorMut::with_capacity(total);
        w.put_u16(COMMAND_MAGIC);
        w.put_u8(total as u8);
        w.put_u8(MessageType::SetWindow as u8);
        w.put_u8(self.camera_id);
        w.put_u8(0);
        w.put_u8(0);
        w.put_u8(0);

        for constraint in &self.constraints {
            w.put_i32(constraint.p0().x as i32);
            w.put_i32(constraint.p0().y as i32);
            w.put_i32(constraint.p1().x as i32);
            w.put_i32(constraint.p1().y as i32);
        }

        w.into_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut r = Cursor::new(bytes);
        if r.get_u16()? != COMMAND_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let size = r.get_u8()?;
        if size as usize != bytes.len() {
            return Err(ParseError::SizeMismatch);
        }
        if r.get_u8()? != MessageType::SetWindow as u8 {
            return Err(ParseError::BadType);
        }
        let camera_id = r.get_u8()?;
        r.skip(3)?;

        let mut msg = SetWindowMessage::new(camera_id);
        while r.remaining() >= CONSTRAINT_SIZE {
            let x1 = r.get_i32()? as i64;
            let y1 = r.get_i32()? as i64;
            let x2 = r.get_i32()? as i64;
            let y2 = r.get_i32()? as i64;
            msg.add_constraint(Point2D::new(x1, y1), Point2D::new(x2, y2));
        }

        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_size_matches_header_byte() {
        let mut msg = SetWindowMessage::new(1);
        msg.add_constraint(Point2D::new(-10_000, 10_000), Point2D::new(10_000, 10_000));
        msg.add_constraint(Point2D::new(10_000, -10_000), Point2D::new(-10_000, -10_000));
        let bytes = msg.serialize();
        assert_eq!(bytes.len(), 8 + 2 * 16);
        assert_eq!(bytes[2] as usize, bytes.len());
    }

    #[test]
    fn round_trip_preserves_endpoint_order() {
        let mut msg = SetWindowMessage::new(0);
        msg.add_constraint(Point2D::new(1, 2), Point2D::new(3, 4));
        msg.add_constraint(Point2D::new(-5, -6), Point2D::new(-7, -8));

        let parsed = SetWindowMessage::deserialize(&msg.serialize()).unwrap();
        assert_eq!(parsed.camera_id(), 0);
        assert_eq!(parsed.constraints().len(), 2);
        assert_eq!(parsed.constraints()[0].p0(), Point2D::new(1, 2));
        assert_eq!(parsed.constraints()[0].p1(), Point2D::new(3, 4));
        assert_eq!(parsed.constraints()[1].p0(), Point2D::new(-5, -6));
        assert_eq!(parsed.constraints()[1].p1(), Point2D::new(-7, -8));
    }

    #[test]
    fn empty_window_is_header_only() {
        let msg = SetWindowMessage::new(0);
        let bytes = msg.serialize();
        assert_eq!(bytes.len(), 8);
        let parsed = SetWindowMessage::deserialize(&bytes).unwrap();
        assert!(parsed.constraints().is_empty());
    }
}
