// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Example code readability over pedantic

/// Basic scanning example.
///
/// Demonstrates:
/// - Creating a scan system and registering one scan head
/// - Configuring exposure, window, and alignment
/// - Connecting, scanning at a fixed rate, and draining profiles
use scanline::{DataFormat, ScanHeadConfiguration, ScanSystem, ScanWindow};
use std::time::Duration;

const SERIAL_NUMBER: u32 = 12345;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== scanline basic scanning example ===\n");

    let mut system = ScanSystem::new()?;
    let head = system.create_scan_head(SERIAL_NUMBER, 0)?;
    println!("[OK] Registered scan head {}", SERIAL_NUMBER);

    let mut config = ScanHeadConfiguration::default();
    config.laser_on_time_min_us = 100;
    config.laser_on_time_def_us = 250;
    config.laser_on_time_max_us = 1_000;
    config.laser_detection_threshold = 120;
    head.set_configuration(config)?;
    head.set_window(ScanWindow::new(20.0, -20.0, -20.0, 20.0)?);

    let connected = system.connect(Duration::from_secs(10))?;
    println!("[OK] Connected {} scan head(s)", connected);
    println!("     firmware reports max rate {} Hz", system.max_scan_rate());

    system.set_scan_rate(500.0)?;
    system.set_data_format(DataFormat::XyFullLmFull);
    system.start_scanning()?;
    println!("[OK] Scanning at 500 Hz");

    let mut total = 0u64;
    for _ in 0..10 {
        let available = head.wait_until_profiles_available(100, 1_000_000);
        for profile in head.take_profiles(available) {
            total += 1;
            if total % 500 == 0 {
                println!(
                    "     profile {}: {} valid points, {}/{} packets",
                    total,
                    profile.num_valid_geometry(),
                    profile.packets_received,
                    profile.packets_expected
                );
            }
        }
    }

    system.stop_scanning()?;
    system.disconnect()?;
    println!("[OK] Done, {} profiles received", total);
    Ok(())
}
