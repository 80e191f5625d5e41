// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # scanline - client runtime for networked laser-profile scan heads
//!
//! A host computer discovers scan heads on the local network, configures
//! each one, commands synchronized continuous scanning, and ingests the
//! resulting stream of UDP profile fragments, which are reassembled,
//! coordinate-transformed, and queued for the application as complete
//! profiles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanline::{DataFormat, ScanSystem, ScanWindow};
//! use std::time::Duration;
//!
//! fn main() -> scanline::Result<()> {
//!     let mut system = ScanSystem::new()?;
//!     let head = system.create_scan_head(12345, 0)?;
//!     head.set_window(ScanWindow::new(20.0, -20.0, -20.0, 20.0)?);
//!
//!     system.connect(Duration::from_secs(5))?;
//!     system.set_scan_rate(500.0)?;
//!     system.set_data_format(DataFormat::XyFullLmFull);
//!     system.start_scanning()?;
//!
//!     let n = head.wait_until_profiles_available(100, 1_000_000);
//!     for profile in head.take_profiles(n) {
//!         println!("{} points", profile.num_valid_geometry());
//!     }
//!
//!     system.stop_scanning()?;
//!     system.disconnect()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                        Host application                          |
//! +------------------------------------------------------------------+
//! |  ScanSystem: lifecycle state machine, discovery, rate, windows   |
//! +------------------------------------------------------------------+
//! |  per head: receive task -> assembler -> profile queue            |
//! |  shared:   sender task + scan-request keepalive timer            |
//! +------------------------------------------------------------------+
//! |  UDP wire codec: connect / window / request / status / data      |
//! +------------------------------------------------------------------+
//! ```
//!
//! Logging goes through the `log` facade; install any logger in the host
//! binary. Background tasks never panic the process on wire garbage;
//! malformed datagrams are logged and dropped.

mod assembler;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod head;
pub mod net;
pub mod profile;
pub mod protocol;
pub mod queue;
mod receiver;
mod sender;
pub mod system;
pub mod temperature;
pub mod version;

pub use config::ScanHeadConfiguration;
pub use error::{Error, Result};
pub use format::{Camera, DataFormat, CAMERA_MAX};
pub use geometry::{AlignmentParams, Point2D, ScanWindow, WindowConstraint};
pub use head::{ScanHead, ScanHeadType};
pub use profile::{
    Profile, ProfilePoint, IMAGE_HEIGHT, IMAGE_WIDTH, INVALID_BRIGHTNESS, INVALID_XY,
    PROFILE_DATA_LEN,
};
pub use queue::PROFILE_QUEUE_MAX;
pub use system::{ScanSystem, SystemState, MAX_SCAN_RATE_HZ, MIN_SCAN_RATE_HZ};
pub use temperature::ScanHeadTemperatures;
pub use version::VersionInformation;
