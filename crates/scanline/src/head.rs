// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One managed scan head.
//!
//! A `ScanHead` is a single type whose mutable interior lives behind one
//! lock with an associated condition variable. The receive task reaches
//! that interior through [`HeadShared`]; callers go through the `ScanHead`
//! methods. Status snapshots are last-writer-wins and only ever observed
//! whole.

use crate::config::ScanHeadConfiguration;
use crate::error::Result;
use crate::format::{Camera, DataFormat, CAMERA_MAX};
use crate::geometry::{AlignmentParams, ScanWindow};
use crate::profile::Profile;
use crate::protocol::StatusMessage;
use crate::queue::{ProfileQueue, PROFILE_QUEUE_MAX};
use crate::receiver::Receiver;
use crate::temperature::{self, ScanHeadTemperatures};
use std::net::Ipv4Addr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Scan head product families, learned from the status message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u16)]
pub enum ScanHeadType {
    #[default]
    Invalid = 0,
    Js50Wx = 1,
    Js50Wsc = 2,
}

impl ScanHeadType {
    fn from_product(product: u16) -> Self {
        match product {
            1 => ScanHeadType::Js50Wx,
            2 => ScanHeadType::Js50Wsc,
            _ => ScanHeadType::Invalid,
        }
    }
}

struct HeadControl {
    config: ScanHeadConfiguration,
    alignment: [AlignmentParams; CAMERA_MAX],
    window: ScanWindow,
    format: DataFormat,
    status: Option<StatusMessage>,
    status_received_at: Option<Instant>,
    product: ScanHeadType,
    ip: Option<Ipv4Addr>,
    packets_received: u64,
}

/// Interior of a scan head, shared with its receive task.
pub(crate) struct HeadShared {
    control: Mutex<HeadControl>,
    status_changed: Condvar,
}

impl HeadShared {
    fn new() -> Self {
        Self {
            control: Mutex::new(HeadControl {
                config: ScanHeadConfiguration::default(),
                alignment: [AlignmentParams::default(); CAMERA_MAX],
                window: ScanWindow::default(),
                format: DataFormat::default(),
                status: None,
                status_received_at: None,
                product: ScanHeadType::Invalid,
                ip: None,
                packets_received: 0,
            }),
            status_changed: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadControl> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the status snapshot; learns the head's address and product
    /// type as a side effect. Called from the receive task.
    pub(crate) fn store_status(&self, status: StatusMessage) {
        let mut control = self.lock();
        control.ip = Some(Ipv4Addr::from(status.scan_head_ip));
        control.product = ScanHeadType::from_product(status.version.product);
        control.status = Some(status);
        control.status_received_at = Some(Instant::now());
        drop(control);
        self.status_changed.notify_all();
    }

    pub(crate) fn count_data_packet(&self) {
        self.lock().packets_received += 1;
    }

    /// Copy of the per-camera alignment for the transform hot path.
    pub(crate) fn alignment_snapshot(&self) -> [AlignmentParams; CAMERA_MAX] {
        self.lock().alignment
    }
}

/// One networked scan head and its receive pipeline.
pub struct ScanHead {
    serial: u32,
    id: u32,
    shared: Arc<HeadShared>,
    queue: Arc<ProfileQueue>,
    receiver: Receiver,
}

impl ScanHead {
    /// Bind the receive socket and spawn the (stopped) receive task.
    pub(crate) fn create(serial: u32, id: u32) -> Result<Self> {
        let shared = Arc::new(HeadShared::new());
        let queue = Arc::new(ProfileQueue::new());
        let receiver = Receiver::spawn(serial, Arc::clone(&shared), Arc::clone(&queue))?;

        Ok(Self {
            serial,
            id,
            shared,
            queue,
            receiver,
        })
    }

    pub fn serial_number(&self) -> u32 {
        self.serial
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// UDP port this head's data arrives on, chosen at bind time.
    pub fn receive_port(&self) -> u16 {
        self.receiver.port()
    }

    /// Address learned from the head's status message during connect.
    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.shared.lock().ip
    }

    pub fn product_type(&self) -> ScanHeadType {
        self.shared.lock().product
    }

    /// Cameras reported by the last status message.
    pub fn camera_count(&self) -> u32 {
        self.shared
            .lock()
            .status
            .as_ref()
            .map(|s| u32::from(s.valid_cameras()))
            .unwrap_or(0)
    }

    pub fn configuration(&self) -> ScanHeadConfiguration {
        self.shared.lock().config
    }

    /// Validates ranges before storing.
    pub fn set_configuration(&self, config: ScanHeadConfiguration) -> Result<()> {
        config.validate()?;
        self.shared.lock().config = config;
        Ok(())
    }

    pub fn alignment(&self, camera: Camera) -> AlignmentParams {
        self.shared.lock().alignment[camera.index()]
    }

    pub fn set_alignment(&self, camera: Camera, alignment: AlignmentParams) {
        self.shared.lock().alignment[camera.index()] = alignment;
    }

    /// Apply one alignment to every camera.
    pub fn set_alignment_all(&self, alignment: AlignmentParams) {
        let mut control = self.shared.lock();
        for slot in control.alignment.iter_mut() {
            *slot = alignment;
        }
    }

    pub fn window(&self) -> ScanWindow {
        self.shared.lock().window.clone()
    }

    pub fn set_window(&self, window: ScanWindow) {
        self.shared.lock().window = window;
    }

    pub fn data_format(&self) -> DataFormat {
        self.shared.lock().format
    }

    pub fn set_data_format(&self, format: DataFormat) {
        self.shared.lock().format = format;
    }

    /// Last status snapshot, if any has arrived since the last clear.
    pub fn status(&self) -> Option<StatusMessage> {
        self.shared.lock().status.clone()
    }

    /// Drop the snapshot so a stale message cannot satisfy a freshness
    /// check during connect.
    pub fn clear_status(&self) {
        let mut control = self.shared.lock();
        control.status = None;
        control.status_received_at = None;
    }

    /// When the current snapshot arrived.
    pub(crate) fn status_received_at(&self) -> Option<Instant> {
        self.shared.lock().status_received_at
    }

    /// Block until a status snapshot arrives, up to `timeout`.
    pub(crate) fn wait_for_status(&self, timeout: Duration) -> Option<StatusMessage> {
        let deadline = Instant::now() + timeout;
        let mut control = self.shared.lock();
        while control.status.is_none() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .shared
                .status_changed
                .wait_timeout(control, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            control = guard;
        }
        control.status.clone()
    }

    /// Temperature readings over the head's REST interface.
    pub fn temperatures(&self) -> ScanHeadTemperatures {
        match self.ip_address() {
            Some(ip) => temperature::query(ip),
            None => ScanHeadTemperatures::default(),
        }
    }

    /// Profiles ready to be read.
    pub fn profiles_available(&self) -> u32 {
        self.queue.available() as u32
    }

    /// Block until `count` profiles are ready or `timeout_us` expires.
    /// Returns the depth at wake-up; fewer than requested is a timeout,
    /// not an error.
    pub fn wait_until_profiles_available(&self, count: u32, timeout_us: u64) -> u32 {
        let count = (count as usize).min(PROFILE_QUEUE_MAX);
        self.queue
            .wait_until_available(count, Duration::from_micros(timeout_us)) as u32
    }

    /// Drain up to `count` profiles in FIFO order.
    pub fn take_profiles(&self, count: u32) -> Vec<Profile> {
        self.queue.pop(count as usize)
    }

    pub fn clear_profiles(&self) {
        self.queue.clear();
    }

    /// Arm the receive pipeline: empty the ring, reset assembly, unpark
    /// the receive task.
    pub fn receive_start(&self) {
        self.queue.clear();
        self.queue.set_producer_running(true);
        self.receiver.start();
    }

    /// Park the receive task and release blocked consumers.
    pub fn receive_stop(&self) {
        self.receiver.stop();
        self.queue.set_producer_running(false);
    }

    /// Tear down the receive task and socket. Terminal.
    pub(crate) fn shutdown(&self) {
        self.receiver.stop();
        self.queue.set_producer_running(false);
        self.receiver.shutdown();
    }

    /// Data packets seen on the socket since creation, parsed or not.
    /// Compare against the head's own `num_packets_sent` report to judge
    /// UDP loss.
    pub fn packets_received(&self) -> u64 {
        self.shared.lock().packets_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_before_first_status() {
        let head = ScanHead::create(12_345, 0).expect("create");
        assert_eq!(head.serial_number(), 12_345);
        assert_eq!(head.id(), 0);
        assert_ne!(head.receive_port(), 0);
        assert_eq!(head.product_type(), ScanHeadType::Invalid);
        assert!(head.ip_address().is_none());
        assert!(head.status().is_none());
        assert_eq!(head.camera_count(), 0);
        assert_eq!(head.profiles_available(), 0);
        head.shutdown();
    }

    #[test]
    fn configuration_is_validated_on_set() {
        let head = ScanHead::create(1, 0).expect("create");
        let mut config = ScanHeadConfiguration::default();
        config.saturation_percentage = 500;
        assert!(head.set_configuration(config).is_err());
        // The bad value did not stick.
        assert_eq!(head.configuration().saturation_percentage, 30);
        head.shutdown();
    }

    #[test]
    fn status_learns_address_and_product() {
        let head = ScanHead::create(1, 0).expect("create");
        let mut status = StatusMessage::default();
        status.scan_head_ip = u32::from(Ipv4Addr::new(192, 168, 1, 32));
        status.version.product = 1;
        status.global_time = 55;
        head.shared.store_status(status);

        assert_eq!(head.ip_address(), Some(Ipv4Addr::new(192, 168, 1, 32)));
        assert_eq!(head.product_type(), ScanHeadType::Js50Wx);
        assert_eq!(head.status().map(|s| s.global_time), Some(55));

        head.clear_status();
        assert!(head.status().is_none());
        head.shutdown();
    }

    #[test]
    fn receiver_parks_and_resumes() {
        let head = ScanHead::create(1, 0).expect("create");
        head.receive_start();
        head.receive_stop();
        head.receive_start();
        let start = Instant::now();
        head.shutdown();
        // Teardown must finish within the socket timeout plus slack.
        assert!(start.elapsed() < Duration::from_millis(1_500));
    }
}
