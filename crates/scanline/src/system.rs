// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session lifecycle for a fleet of scan heads.
//!
//! The system is a state machine over {Disconnected, Connected, Scanning}
//! with only the adjacent transitions legal. Membership changes happen
//! while Disconnected; the broadcast connect handshake, the window push,
//! rate negotiation, and scan start/stop all live here. Data-plane work
//! happens in the per-head receive tasks and the shared sender.

use crate::config::ScanHeadConfiguration;
use crate::error::{Error, Result};
use crate::format::DataFormat;
use crate::head::ScanHead;
use crate::net;
use crate::profile::Profile;
use crate::protocol::{
    BroadcastConnectMessage, DisconnectMessage, ScanRequest, SetWindowMessage,
};
use crate::sender::ScanSender;
use crate::version::VersionInformation;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hard ceiling on the configurable scan rate in hertz.
pub const MAX_SCAN_RATE_HZ: f64 = 4_000.0;
/// Floor on the configurable scan rate in hertz.
pub const MIN_SCAN_RATE_HZ: f64 = 0.2;

/// Wave period of the broadcast connect loop.
const CONNECT_POLL: Duration = Duration::from_millis(500);
/// Settle time after pushing window messages.
const WINDOW_PROPAGATION_DELAY: Duration = Duration::from_millis(500);
/// Bound on waiting for a post-window status refresh, per head.
const STATUS_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
/// Settle time after sending disconnects, so no status is in flight.
const DISCONNECT_SETTLE: Duration = Duration::from_millis(100);
/// Scan interval used for one-shot image captures.
const IMAGE_CAPTURE_INTERVAL_US: u32 = 250_000;

/// Connection state of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Disconnected,
    Connected,
    Scanning,
}

/// Host-side coordinator owning every scan head in the cell.
pub struct ScanSystem {
    heads_by_serial: HashMap<u32, Arc<ScanHead>>,
    serial_by_id: HashMap<u32, u32>,
    sender: ScanSender,
    session_id: u8,
    scan_rate_hz: f64,
    state: SystemState,
}

impl ScanSystem {
    pub fn new() -> Result<Self> {
        Ok(Self {
            heads_by_serial: HashMap::new(),
            serial_by_id: HashMap::new(),
            sender: ScanSender::spawn()?,
            session_id: 1,
            scan_rate_hz: 0.0,
            state: SystemState::Disconnected,
        })
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SystemState::Connected
    }

    pub fn is_scanning(&self) -> bool {
        self.state == SystemState::Scanning
    }

    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    // ===== Membership =====

    /// Register a new head. Serial and id must both be unused, and the
    /// system must not be scanning.
    pub fn create_scan_head(&mut self, serial: u32, id: u32) -> Result<Arc<ScanHead>> {
        if self.is_scanning() {
            return Err(Error::Scanning);
        }
        if self.heads_by_serial.contains_key(&serial) {
            return Err(Error::InvalidArgument(format!(
                "serial {} already managed",
                serial
            )));
        }
        if self.serial_by_id.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "id {} already assigned to another scan head",
                id
            )));
        }

        let head = Arc::new(ScanHead::create(serial, id)?);
        self.heads_by_serial.insert(serial, Arc::clone(&head));
        self.serial_by_id.insert(id, serial);
        log::info!("[system] created scan head serial={} id={}", serial, id);
        Ok(head)
    }

    pub fn scan_head_by_serial(&self, serial: u32) -> Result<Arc<ScanHead>> {
        self.heads_by_serial
            .get(&serial)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("serial {} not managed", serial)))
    }

    pub fn scan_head_by_id(&self, id: u32) -> Result<Arc<ScanHead>> {
        let serial = self
            .serial_by_id
            .get(&id)
            .ok_or_else(|| Error::InvalidArgument(format!("id {} not managed", id)))?;
        self.scan_head_by_serial(*serial)
    }

    pub fn scan_head_count(&self) -> usize {
        self.heads_by_serial.len()
    }

    pub fn scan_heads(&self) -> impl Iterator<Item = &Arc<ScanHead>> {
        self.heads_by_serial.values()
    }

    /// Unregister and tear down one head. Illegal while scanning.
    pub fn remove_scan_head(&mut self, serial: u32) -> Result<()> {
        if self.is_scanning() {
            return Err(Error::Scanning);
        }
        let head = self
            .heads_by_serial
            .remove(&serial)
            .ok_or_else(|| Error::InvalidArgument(format!("serial {} not managed", serial)))?;
        self.serial_by_id.remove(&head.id());
        head.shutdown();
        Ok(())
    }

    // ===== Rate and format =====

    /// Store the scan rate after checking the static range and the
    /// dynamic maximum for the currently connected heads.
    pub fn set_scan_rate(&mut self, rate_hz: f64) -> Result<()> {
        if !rate_hz.is_finite() || rate_hz < MIN_SCAN_RATE_HZ || rate_hz > MAX_SCAN_RATE_HZ {
            return Err(Error::InvalidArgument(format!(
                "scan rate {} out of range [{}, {}] Hz",
                rate_hz, MIN_SCAN_RATE_HZ, MAX_SCAN_RATE_HZ
            )));
        }
        let max_rate = self.max_scan_rate();
        if rate_hz > max_rate {
            return Err(Error::InvalidArgument(format!(
                "scan rate {} Hz exceeds window-limited max {} Hz",
                rate_hz, max_rate
            )));
        }
        self.scan_rate_hz = rate_hz;
        Ok(())
    }

    pub fn scan_rate(&self) -> f64 {
        self.scan_rate_hz
    }

    /// Highest rate every head can sustain: the least of the hard
    /// ceiling, each head's laser-on bound, and each head's reported
    /// window-limited maximum.
    pub fn max_scan_rate(&self) -> f64 {
        let mut max_rate = MAX_SCAN_RATE_HZ;

        for head in self.heads_by_serial.values() {
            let config = head.configuration();
            if config.laser_on_time_max_us > 0 {
                let laser_bound = 1_000_000.0 / f64::from(config.laser_on_time_max_us);
                if laser_bound < max_rate {
                    max_rate = laser_bound;
                }
            }

            if let Some(status) = head.status() {
                let reported = f64::from(status.max_scan_rate);
                if reported > 0.0 && reported < max_rate {
                    max_rate = reported;
                }
            }
        }

        max_rate
    }

    /// Apply one data format to every registered head.
    pub fn set_data_format(&mut self, format: DataFormat) {
        for head in self.heads_by_serial.values() {
            head.set_data_format(format);
        }
    }

    // ===== Connect / disconnect =====

    /// Broadcast-connect every registered head.
    ///
    /// Returns the number of heads that answered in time. The system
    /// transitions to Connected only when that is all of them; otherwise
    /// it stays Disconnected and the caller may retry. A major-version
    /// mismatch aborts immediately.
    pub fn connect(&mut self, timeout: Duration) -> Result<usize> {
        if self.is_connected() {
            return Err(Error::Connected);
        }
        if self.is_scanning() {
            return Err(Error::Scanning);
        }
        if self.heads_by_serial.is_empty() {
            return Err(Error::InvalidArgument("no scan heads registered".into()));
        }

        for head in self.heads_by_serial.values() {
            head.receive_start();
        }

        self.session_id = self.session_id.wrapping_add(1);
        if self.session_id == 0 {
            self.session_id = 1;
        }

        let connected = self.broadcast_connect(timeout)?;
        if connected.len() == self.heads_by_serial.len() {
            self.state = SystemState::Connected;
        }

        if self.state == SystemState::Connected {
            self.sender.start();
            self.push_windows();

            // Give the window messages time to land, then require a fresh
            // status from each head so max_scan_rate reflects the new
            // window.
            std::thread::sleep(WINDOW_PROPAGATION_DELAY);
            for head in self.heads_by_serial.values() {
                head.clear_status();
            }
            for head in self.heads_by_serial.values() {
                if head.wait_for_status(STATUS_REFRESH_TIMEOUT).is_none() {
                    log::warn!(
                        "[system] serial={} produced no status after window push",
                        head.serial_number()
                    );
                }
            }
        }

        log::info!(
            "[system] connect: {}/{} heads, state {:?}",
            connected.len(),
            self.heads_by_serial.len(),
            self.state
        );

        Ok(connected.len())
    }

    fn broadcast_connect(&mut self, timeout: Duration) -> Result<Vec<u32>> {
        // Every usable interface gets its own broadcast socket; scan
        // heads answer whichever wave reaches them.
        let mut sockets: Vec<(Ipv4Addr, UdpSocket)> = Vec::new();
        for addr in net::active_ipv4_addresses()? {
            match net::broadcast_socket(addr) {
                Ok(socket) => sockets.push((addr, socket)),
                Err(e) => {
                    log::debug!("[system] broadcast socket on {} failed: {}", addr, e);
                }
            }
        }
        if sockets.is_empty() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no valid broadcast interfaces",
            )));
        }

        let broadcast_dest = SocketAddrV4::new(net::broadcast_address(), crate::protocol::SCAN_SERVER_PORT);
        let client_version = VersionInformation::client();
        let started = Instant::now();
        let mut connected: Vec<u32> = Vec::new();

        while connected.len() < self.heads_by_serial.len() && started.elapsed() < timeout {
            for (iface_addr, socket) in &sockets {
                for (serial, head) in &self.heads_by_serial {
                    if connected.contains(serial) {
                        continue;
                    }

                    let message = BroadcastConnectMessage::new(
                        u32::from(*iface_addr),
                        head.receive_port(),
                        self.session_id,
                        head.id() as u8,
                        *serial,
                    );

                    // A stale snapshot must not satisfy the freshness
                    // check below.
                    head.clear_status();

                    if let Err(e) = socket.send_to(&message.serialize(), broadcast_dest) {
                        log::debug!("[system] broadcast via {} failed: {}", iface_addr, e);
                        break;
                    }
                }
            }

            std::thread::sleep(CONNECT_POLL);

            for (serial, head) in &self.heads_by_serial {
                if connected.contains(serial) {
                    continue;
                }

                let fresh = head
                    .status_received_at()
                    .map(|at| at >= started)
                    .unwrap_or(false);
                if !fresh {
                    continue;
                }

                let Some(status) = head.status() else {
                    continue;
                };
                if status.global_time == 0 {
                    continue;
                }

                if !client_version.is_compatible_with(&status.version) {
                    log::error!(
                        "[system] serial={} firmware {} incompatible with client {}",
                        serial,
                        status.version,
                        client_version
                    );
                    return Err(Error::VersionMismatch {
                        client: client_version,
                        server: status.version,
                    });
                }

                log::debug!(
                    "[system] serial={} answered from {:?}",
                    serial,
                    head.ip_address()
                );
                connected.push(*serial);
            }
        }

        Ok(connected)
    }

    /// Serialize each head's window through each camera's mill-to-camera
    /// transform and queue the set-window commands.
    ///
    /// With `cable_downstream` the camera's X axis is flipped, so the
    /// endpoint order is swapped to (P1, P0) to keep the half-plane
    /// orientation; otherwise endpoints go out as (P0, P1).
    fn push_windows(&self) {
        for head in self.heads_by_serial.values() {
            let Some(ip) = head.ip_address() else {
                continue;
            };
            let window = head.window();
            let cameras = head.camera_count().min(crate::format::CAMERA_MAX as u32);

            for camera_id in 0..cameras {
                let camera = crate::format::Camera::from_id(camera_id as u8);
                let alignment = head.alignment(camera);
                let mut message = SetWindowMessage::new(camera_id as u8);

                for constraint in window.constraints() {
                    let p0 = alignment
                        .mill_to_camera(constraint.p0().x as i32, constraint.p0().y as i32);
                    let p1 = alignment
                        .mill_to_camera(constraint.p1().x as i32, constraint.p1().y as i32);

                    if alignment.is_cable_downstream() {
                        message.add_constraint(p1.into(), p0.into());
                    } else {
                        message.add_constraint(p0.into(), p1.into());
                    }
                }

                self.sender.send(ip, message.serialize());
            }
        }
    }

    /// Disconnect every head. Sockets stay open; only the receive tasks
    /// park and the keepalive timer stops.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let message = DisconnectMessage.serialize();
        for head in self.heads_by_serial.values() {
            if let Some(ip) = head.ip_address() {
                self.sender.send(ip, message.clone());
            }
            head.receive_stop();
        }
        self.sender.stop();

        // Let in-flight status messages drain before clearing snapshots.
        std::thread::sleep(DISCONNECT_SETTLE);
        for head in self.heads_by_serial.values() {
            head.clear_status();
        }

        self.state = SystemState::Disconnected;
        log::info!("[system] disconnected");
        Ok(())
    }

    // ===== Scanning =====

    /// Start continuous scanning on every head.
    pub fn start_scanning(&mut self) -> Result<()> {
        self.start_scanning_inner(None)
    }

    /// Start continuous scanning on a single head. The whole system still
    /// transitions to Scanning.
    pub fn start_scanning_head(&mut self, id: u32) -> Result<()> {
        self.start_scanning_inner(Some(id))
    }

    fn start_scanning_inner(&mut self, only: Option<u32>) -> Result<()> {
        if self.is_scanning() {
            return Err(Error::Scanning);
        }
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if self.scan_rate_hz < MIN_SCAN_RATE_HZ {
            return Err(Error::InvalidArgument("scan rate not set".into()));
        }

        let heads: Vec<Arc<ScanHead>> = match only {
            Some(id) => vec![self.scan_head_by_id(id)?],
            None => self.heads_by_serial.values().cloned().collect(),
        };

        for head in &heads {
            if head.data_format().is_image() {
                return Err(Error::InvalidArgument(
                    "continuous scanning of the image format is not supported".into(),
                ));
            }
        }

        let scan_interval_us = (1_000_000.0 / self.scan_rate_hz).round() as u32;
        let mut requests = Vec::with_capacity(heads.len());

        for head in &heads {
            let Some(ip) = head.ip_address() else {
                return Err(Error::NotConnected);
            };

            head.receive_start();

            let request = ScanRequest::new(
                head.data_format(),
                0,
                head.receive_port(),
                head.id() as u8,
                scan_interval_us,
                0xFFFF_FFFF,
                &head.configuration(),
            );
            requests.push((ip, request.serialize(self.session_id)));
        }

        self.sender.enqueue_scan_requests(requests);
        self.state = SystemState::Scanning;
        log::info!(
            "[system] scanning at {} Hz (interval {} us)",
            self.scan_rate_hz,
            scan_interval_us
        );
        Ok(())
    }

    /// Stop the keepalive cadence and return to Connected. Receive tasks
    /// keep running so late fragments still complete profiles.
    pub fn stop_scanning(&mut self) -> Result<()> {
        if !self.is_scanning() {
            return Err(Error::NotScanning);
        }
        self.sender.clear_scan_requests();
        self.state = SystemState::Connected;
        log::info!("[system] scanning stopped");
        Ok(())
    }

    /// Capture one greyscale frame per camera from one head, using
    /// `config` in place of the head's stored configuration for the
    /// duration of the capture.
    ///
    /// Requires Connected and not Scanning. Returns the image-mode
    /// profiles that arrived within `timeout`.
    pub fn capture_images(
        &mut self,
        id: u32,
        config: ScanHeadConfiguration,
        timeout: Duration,
    ) -> Result<Vec<Profile>> {
        if self.is_scanning() {
            return Err(Error::Scanning);
        }
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let head = self.scan_head_by_id(id)?;
        let Some(ip) = head.ip_address() else {
            return Err(Error::NotConnected);
        };
        let cameras = head.camera_count().max(1);

        head.receive_start();

        let request = ScanRequest::new_image_capture(
            0,
            head.receive_port(),
            head.id() as u8,
            IMAGE_CAPTURE_INTERVAL_US,
            cameras,
            &config,
        );
        self.sender.send(ip, request.serialize(self.session_id));

        let available =
            head.wait_until_profiles_available(cameras, timeout.as_micros() as u64);
        let profiles = head.take_profiles(available);
        Ok(profiles)
    }
}

impl Drop for ScanSystem {
    fn drop(&mut self) {
        if self.is_scanning() {
            let _ = self.stop_scanning();
        }
        if self.is_connected() {
            let _ = self.disconnect();
        }
        for head in self.heads_by_serial.values() {
            head.shutdown();
        }
        self.sender.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_requires_unique_keys() {
        let mut system = ScanSystem::new().expect("create");
        system.create_scan_head(100, 0).expect("first head");

        assert!(matches!(
            system.create_scan_head(100, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            system.create_scan_head(101, 0),
            Err(Error::InvalidArgument(_))
        ));

        system.create_scan_head(101, 1).expect("second head");
        assert_eq!(system.scan_head_count(), 2);

        system.remove_scan_head(100).expect("remove");
        assert_eq!(system.scan_head_count(), 1);
        assert!(system.scan_head_by_id(0).is_err());
        assert!(system.scan_head_by_id(1).is_ok());
    }

    #[test]
    fn state_machine_rejects_illegal_events() {
        let mut system = ScanSystem::new().expect("create");

        // Disconnected: disconnect and stop/start scanning are illegal.
        assert!(matches!(system.disconnect(), Err(Error::NotConnected)));
        assert!(matches!(system.stop_scanning(), Err(Error::NotScanning)));
        assert!(matches!(system.start_scanning(), Err(Error::NotConnected)));

        // Connect with no heads registered is an argument error.
        assert!(matches!(
            system.connect(Duration::from_millis(10)),
            Err(Error::InvalidArgument(_))
        ));

        // Forced state walk covers the transitions a mock head would
        // drive; the wire path is exercised by the integration tests.
        system.create_scan_head(1, 0).expect("head");
        system.state = SystemState::Connected;
        assert!(matches!(
            system.connect(Duration::from_millis(10)),
            Err(Error::Connected)
        ));
        assert!(matches!(system.stop_scanning(), Err(Error::NotScanning)));

        system.state = SystemState::Scanning;
        assert!(matches!(
            system.connect(Duration::from_millis(10)),
            Err(Error::Scanning)
        ));
        assert!(matches!(system.disconnect(), Err(Error::NotConnected)));
        assert!(matches!(system.create_scan_head(2, 1), Err(Error::Scanning)));
        assert!(matches!(system.remove_scan_head(1), Err(Error::Scanning)));
        assert!(matches!(system.start_scanning(), Err(Error::Scanning)));

        system.stop_scanning().expect("scanning -> connected");
        assert_eq!(system.state(), SystemState::Connected);
        system.disconnect().expect("connected -> disconnected");
        assert_eq!(system.state(), SystemState::Disconnected);
    }

    #[test]
    fn scan_rate_range_is_enforced() {
        let mut system = ScanSystem::new().expect("create");
        assert!(system.set_scan_rate(0.1).is_err());
        assert!(system.set_scan_rate(4_001.0).is_err());
        assert!(system.set_scan_rate(f64::NAN).is_err());
        assert!(system.set_scan_rate(500.0).is_ok());
        assert_eq!(system.scan_rate(), 500.0);
    }

    #[test]
    fn max_scan_rate_folds_laser_bound() {
        let mut system = ScanSystem::new().expect("create");
        assert_eq!(system.max_scan_rate(), MAX_SCAN_RATE_HZ);

        let head = system.create_scan_head(1, 0).expect("head");
        // laser_on_time_max_us of 1000 bounds the rate to 1 kHz.
        assert_eq!(system.max_scan_rate(), 1_000.0);

        let mut config = head.configuration();
        config.laser_on_time_max_us = 2_000;
        config.laser_on_time_def_us = 1_500;
        head.set_configuration(config).expect("config");
        assert_eq!(system.max_scan_rate(), 500.0);
    }

    #[test]
    fn session_id_increments_and_skips_zero() {
        let mut system = ScanSystem::new().expect("create");
        system.session_id = u8::MAX;
        system.create_scan_head(1, 0).expect("head");
        // Connect fails (nothing answers) but still bumps the session.
        let _ = system.connect(Duration::from_millis(1));
        assert_eq!(system.session_id(), 1);
    }
}
