// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broadcast-connect and disconnect commands.
//!
//! `BroadcastConnect` is sprayed at the limited broadcast address on every
//! usable interface until the targeted scan head answers with a status
//! message. It tells the head where to send data: the client IP and the
//! per-head receive port chosen at socket bind time.

use super::cursor::{Cursor, CursorMut};
use super::{MessageType, ParseError, COMMAND_MAGIC, SCAN_SERVER_PORT};

/// How the scan head should treat the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    #[default]
    Normal = 0,
    Mappler = 1,
}

/// Connect command, serialized length 17 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConnectMessage {
    /// Client address the head should send data to.
    pub client_ip: u32,
    /// Client receive port; zero means the scan server default.
    pub client_port: u16,
    pub session_id: u8,
    pub scan_head_id: u8,
    pub serial_number: u32,
    pub connection_type: ConnectionType,
}

const BROADCAST_CONNECT_SIZE: usize = 17;

impl BroadcastConnectMessage {
    pub fn new(
        client_ip: u32,
        client_port: u16,
        session_id: u8,
        scan_head_id: u8,
        serial_number: u32,
    ) -> Self {
        Self {
            client_ip,
            client_port,
            session_id,
            scan_head_id,
            serial_number,
            connection_type: ConnectionType::Normal,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut w = CursorMut::with_capacity(BROADCAST_CONNECT_SIZE);
        w.put_u16(COMMAND_MAGIC);
        w.put_u8(BROADCAST_CONNECT_SIZE as u8);
        w.put_u8(MessageType::BroadcastConnect as u8);
        w.put_u32(self.client_ip);
        let port = if self.client_port == 0 {
            SCAN_SERVER_PORT
        } else {
            self.client_port
        };
        w.put_u16(port);
        w.put_u8(self.session_id);
        w.put_u8(self.scan_head_id);
        w.put_u8(self.connection_type as u8);
        w.put_u32(self.serial_number);
        w.into_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut r = Cursor::new(bytes);
        if r.get_u16()? != COMMAND_MAGIC {
            return Err(ParseError::BadMagic);
        }
        let size = r.get_u8()?;
        if size as usize != BROADCAST_CONNECT_SIZE || bytes.len() != BROADCAST_CONNECT_SIZE {
            return Err(ParseError::SizeMismatch);
        }
        if r.get_u8()? != MessageType::BroadcastConnect as u8 {
            return Err(ParseError::BadType);
        }

        let client_ip = r.get_u32()?;
        let client_port = r.get_u16()?;
        let session_id = r.get_u8()?;
        let scan_head_id = r.get_u8()?;
        let connection_type = match r.get_u8()? {
            0 => ConnectionType::Normal,
            1 => ConnectionType::Mappler,
            _ => return Err(ParseError::BadCount),
        };
        let serial_number = r.get_u32()?;

        Ok(Self {
            client_ip,
            client_port,
            session_id,
            scan_head_id,
            serial_number,
            connection_type,
        })
    }
}

/// Disconnect command: an `InfoHeader` and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectMessage;

const DISCONNECT_SIZE: usize = 4;

impl DisconnectMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = CursorMut::with_capacity(DISCONNECT_SIZE);
        w.put_u16(COMMAND_MAGIC);
        w.put_u8(DISCONNECT_SIZE as u8);
        w.put_u8(MessageType::Disconnect as u8);
        w.into_vec()
    }
}
