// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # scanline C FFI bindings
//!
//! C-compatible surface over the scanline scan head client.
//!
//! Handles are opaque 64-bit identifiers into process-wide registries,
//! never pointers; a stale or forged handle fails the lookup instead of
//! dereferencing garbage. Zero is the invalid handle. Every fallible
//! function returns `0` or a positive count on success and a negative
//! `SCANLINE_ERROR_*` code on failure; nothing unwinds across the FFI
//! boundary.

use scanline::config::ScanHeadConfiguration;
use scanline::error::Error;
use scanline::format::{Camera, DataFormat};
use scanline::geometry::{AlignmentParams, ScanWindow};
use scanline::head::{ScanHead, ScanHeadType};
use scanline::profile::{Profile, IMAGE_HEIGHT, IMAGE_WIDTH, PROFILE_DATA_LEN};
use scanline::system::{ScanSystem, MAX_SCAN_RATE_HZ};
use scanline::version::VersionInformation;
use std::collections::HashMap;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

// ============================================================================
// Error codes
// ============================================================================

pub const SCANLINE_ERROR_NONE: i32 = 0;
pub const SCANLINE_ERROR_INTERNAL: i32 = -1;
pub const SCANLINE_ERROR_NULL_ARGUMENT: i32 = -2;
pub const SCANLINE_ERROR_INVALID_ARGUMENT: i32 = -3;
pub const SCANLINE_ERROR_NOT_CONNECTED: i32 = -4;
pub const SCANLINE_ERROR_CONNECTED: i32 = -5;
pub const SCANLINE_ERROR_NOT_SCANNING: i32 = -6;
pub const SCANLINE_ERROR_SCANNING: i32 = -7;
pub const SCANLINE_ERROR_VERSION_COMPATIBILITY: i32 = -8;

/// Opaque handle to a scan system. Zero is invalid.
pub type ScanlineSystem = u64;
/// Opaque handle to a scan head. Zero is invalid.
pub type ScanlineHead = u64;

/// Maximum encoders per profile or status record.
pub const SCANLINE_ENCODER_MAX: usize = 3;
/// Maximum cameras per scan head.
pub const SCANLINE_CAMERA_MAX: usize = 2;
/// Point slots per profile.
pub const SCANLINE_PROFILE_DATA_LEN: usize = PROFILE_DATA_LEN;
/// Camera image dimensions.
pub const SCANLINE_IMAGE_WIDTH: usize = IMAGE_WIDTH;
pub const SCANLINE_IMAGE_HEIGHT: usize = IMAGE_HEIGHT;
pub const SCANLINE_IMAGE_DATA_LEN: usize = IMAGE_WIDTH * IMAGE_HEIGHT;

fn map_error(e: &Error) -> i32 {
    match e {
        Error::InvalidArgument(_) => SCANLINE_ERROR_INVALID_ARGUMENT,
        Error::NotConnected => SCANLINE_ERROR_NOT_CONNECTED,
        Error::Connected => SCANLINE_ERROR_CONNECTED,
        Error::NotScanning => SCANLINE_ERROR_NOT_SCANNING,
        Error::Scanning => SCANLINE_ERROR_SCANNING,
        Error::VersionMismatch { .. } => SCANLINE_ERROR_VERSION_COMPATIBILITY,
        Error::Timeout | Error::Io(_) | Error::Protocol(_) => SCANLINE_ERROR_INTERNAL,
    }
}

// ============================================================================
// Handle registries
// ============================================================================

struct SystemEntry {
    system: Arc<Mutex<ScanSystem>>,
}

struct HeadEntry {
    system: Arc<Mutex<ScanSystem>>,
    head: Arc<ScanHead>,
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn system_registry() -> &'static Mutex<HashMap<u64, SystemEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, SystemEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn head_registry() -> &'static Mutex<HashMap<u64, HeadEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, HeadEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

fn system_lookup(handle: ScanlineSystem) -> Option<Arc<Mutex<ScanSystem>>> {
    let registry = system_registry().lock().unwrap_or_else(|e| e.into_inner());
    registry.get(&handle).map(|entry| Arc::clone(&entry.system))
}

fn head_lookup(handle: ScanlineHead) -> Option<(Arc<Mutex<ScanSystem>>, Arc<ScanHead>)> {
    let registry = head_registry().lock().unwrap_or_else(|e| e.into_inner());
    registry
        .get(&handle)
        .map(|entry| (Arc::clone(&entry.system), Arc::clone(&entry.head)))
}

fn lock_system(system: &Arc<Mutex<ScanSystem>>) -> std::sync::MutexGuard<'_, ScanSystem> {
    system.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// C structs
// ============================================================================

/// One measured point; invalid entries carry the sentinel values.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScanlineProfilePoint {
    pub x: i32,
    pub y: i32,
    pub brightness: i32,
}

/// Exposure and threshold configuration, mirrored from the core type.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScanlineConfiguration {
    pub scan_offset_us: u32,
    pub camera_exposure_time_min_us: u32,
    pub camera_exposure_time_def_us: u32,
    pub camera_exposure_time_max_us: u32,
    pub laser_on_time_min_us: u32,
    pub laser_on_time_def_us: u32,
    pub laser_on_time_max_us: u32,
    pub laser_detection_threshold: u32,
    pub saturation_threshold: u32,
    pub saturation_percentage: u32,
}

impl From<&ScanlineConfiguration> for ScanHeadConfiguration {
    fn from(c: &ScanlineConfiguration) -> Self {
        ScanHeadConfiguration {
            scan_offset_us: c.scan_offset_us,
            camera_exposure_time_min_us: c.camera_exposure_time_min_us,
            camera_exposure_time_def_us: c.camera_exposure_time_def_us,
            camera_exposure_time_max_us: c.camera_exposure_time_max_us,
            laser_on_time_min_us: c.laser_on_time_min_us,
            laser_on_time_def_us: c.laser_on_time_def_us,
            laser_on_time_max_us: c.laser_on_time_max_us,
            laser_detection_threshold: c.laser_detection_threshold,
            saturation_threshold: c.saturation_threshold,
            saturation_percentage: c.saturation_percentage,
            ..ScanHeadConfiguration::default()
        }
    }
}

impl From<&ScanHeadConfiguration> for ScanlineConfiguration {
    fn from(c: &ScanHeadConfiguration) -> Self {
        ScanlineConfiguration {
            scan_offset_us: c.scan_offset_us,
            camera_exposure_time_min_us: c.camera_exposure_time_min_us,
            camera_exposure_time_def_us: c.camera_exposure_time_def_us,
            camera_exposure_time_max_us: c.camera_exposure_time_max_us,
            laser_on_time_min_us: c.laser_on_time_min_us,
            laser_on_time_def_us: c.laser_on_time_def_us,
            laser_on_time_max_us: c.laser_on_time_max_us,
            laser_detection_threshold: c.laser_detection_threshold,
            saturation_threshold: c.saturation_threshold,
            saturation_percentage: c.saturation_percentage,
        }
    }
}

/// One profile as handed to the host. `data_len` counts the valid
/// entries; for raw reads it is the full slot count.
#[repr(C)]
pub struct ScanlineProfile {
    pub scan_head_id: u32,
    pub camera: u32,
    pub laser: u32,
    pub timestamp_ns: u64,
    pub encoder_values: [i64; SCANLINE_ENCODER_MAX],
    pub num_encoder_values: u32,
    pub laser_on_time_us: u32,
    pub exposure_time_us: u32,
    pub format: u32,
    pub udp_packets_received: u32,
    pub udp_packets_expected: u32,
    pub data_valid_brightness: u32,
    pub data_valid_xy: u32,
    pub data_len: u32,
    pub data: [ScanlineProfilePoint; SCANLINE_PROFILE_DATA_LEN],
}

/// Greyscale camera frame.
#[repr(C)]
pub struct ScanlineCameraImage {
    pub scan_head_id: u32,
    pub camera: u32,
    pub timestamp_ns: u64,
    pub encoder_values: [i64; SCANLINE_ENCODER_MAX],
    pub num_encoder_values: u32,
    pub camera_exposure_time_us: u32,
    pub laser_on_time_us: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub data: [u8; SCANLINE_IMAGE_DATA_LEN],
}

/// Status snapshot plus temperatures for the host.
#[repr(C)]
pub struct ScanlineStatus {
    pub global_time_ns: u64,
    pub num_profiles_sent: u32,
    pub encoder_values: [i64; SCANLINE_ENCODER_MAX],
    pub num_encoder_values: u32,
    pub camera_pixels_in_window: [i32; SCANLINE_CAMERA_MAX],
    pub camera_temp: [i32; SCANLINE_CAMERA_MAX],
    pub mainboard_temp: i32,
    pub firmware_version_major: u32,
    pub firmware_version_minor: u32,
    pub firmware_version_patch: u32,
}

// ============================================================================
// Version and error strings
// ============================================================================

/// Client semantic version. Null out-pointers are skipped.
#[no_mangle]
pub extern "C" fn scanline_get_semantic_version(
    major: *mut u32,
    minor: *mut u32,
    patch: *mut u32,
) {
    let version = VersionInformation::client();
    // SAFETY: caller provides valid or null pointers; null is skipped.
    unsafe {
        if !major.is_null() {
            *major = version.major;
        }
        if !minor.is_null() {
            *minor = version.minor;
        }
        if !patch.is_null() {
            *patch = version.patch;
        }
    }
}

/// Static description of a return code. Never null.
#[no_mangle]
pub extern "C" fn scanline_get_error(return_code: i32) -> *const c_char {
    let message: &'static [u8] = if return_code >= 0 {
        b"none\0"
    } else {
        match return_code {
            SCANLINE_ERROR_INTERNAL => b"internal error\0",
            SCANLINE_ERROR_NULL_ARGUMENT => b"null value argument\0",
            SCANLINE_ERROR_INVALID_ARGUMENT => b"invalid argument\0",
            SCANLINE_ERROR_NOT_CONNECTED => b"state not connected\0",
            SCANLINE_ERROR_CONNECTED => b"state connected\0",
            SCANLINE_ERROR_NOT_SCANNING => b"state not scanning\0",
            SCANLINE_ERROR_SCANNING => b"state scanning\0",
            SCANLINE_ERROR_VERSION_COMPATIBILITY => b"versions not compatible\0",
            _ => b"unknown error\0",
        }
    };
    message.as_ptr().cast()
}

// ============================================================================
// Scan system lifecycle
// ============================================================================

/// Create a scan system. Returns zero on failure.
#[no_mangle]
pub extern "C" fn scanline_system_create() -> ScanlineSystem {
    match ScanSystem::new() {
        Ok(system) => {
            let handle = next_handle();
            let mut registry = system_registry().lock().unwrap_or_else(|e| e.into_inner());
            registry.insert(
                handle,
                SystemEntry {
                    system: Arc::new(Mutex::new(system)),
                },
            );
            handle
        }
        Err(_) => 0,
    }
}

/// Destroy a scan system: stops scanning, disconnects, releases every
/// head handle that belongs to it.
#[no_mangle]
pub extern "C" fn scanline_system_free(system: ScanlineSystem) {
    let entry = {
        let mut registry = system_registry().lock().unwrap_or_else(|e| e.into_inner());
        registry.remove(&system)
    };
    let Some(entry) = entry else {
        return;
    };

    {
        let mut registry = head_registry().lock().unwrap_or_else(|e| e.into_inner());
        registry.retain(|_, head| !Arc::ptr_eq(&head.system, &entry.system));
    }

    let mut guard = lock_system(&entry.system);
    if guard.is_scanning() {
        let _ = guard.stop_scanning();
    }
    if guard.is_connected() {
        let _ = guard.disconnect();
    }
    // Heads and sender shut down when the system drops with this entry.
}

/// Register a scan head. Returns the head handle or zero on failure.
#[no_mangle]
pub extern "C" fn scanline_system_create_scan_head(
    system: ScanlineSystem,
    serial: u32,
    id: u32,
) -> ScanlineHead {
    let Some(system) = system_lookup(system) else {
        return 0;
    };

    let head = {
        let mut guard = lock_system(&system);
        if guard.is_connected() || guard.is_scanning() {
            return 0;
        }
        match guard.create_scan_head(serial, id) {
            Ok(head) => head,
            Err(_) => return 0,
        }
    };

    let handle = next_handle();
    let mut registry = head_registry().lock().unwrap_or_else(|e| e.into_inner());
    registry.insert(handle, HeadEntry { system, head });
    handle
}

/// Look up a registered head by id. Returns zero when unknown.
#[no_mangle]
pub extern "C" fn scanline_system_get_scan_head_by_id(
    system: ScanlineSystem,
    id: u32,
) -> ScanlineHead {
    let Some(system) = system_lookup(system) else {
        return 0;
    };
    let head = {
        let guard = lock_system(&system);
        match guard.scan_head_by_id(id) {
            Ok(head) => head,
            Err(_) => return 0,
        }
    };

    let mut registry = head_registry().lock().unwrap_or_else(|e| e.into_inner());
    // Reuse an existing handle for the same head when there is one.
    for (handle, entry) in registry.iter() {
        if Arc::ptr_eq(&entry.head, &head) {
            return *handle;
        }
    }
    let handle = next_handle();
    registry.insert(handle, HeadEntry { system, head });
    handle
}

/// Look up a registered head by serial number. Returns zero when unknown.
#[no_mangle]
pub extern "C" fn scanline_system_get_scan_head_by_serial(
    system: ScanlineSystem,
    serial: u32,
) -> ScanlineHead {
    let Some(system) = system_lookup(system) else {
        return 0;
    };
    let head = {
        let guard = lock_system(&system);
        match guard.scan_head_by_serial(serial) {
            Ok(head) => head,
            Err(_) => return 0,
        }
    };

    let mut registry = head_registry().lock().unwrap_or_else(|e| e.into_inner());
    for (handle, entry) in registry.iter() {
        if Arc::ptr_eq(&entry.head, &head) {
            return *handle;
        }
    }
    let handle = next_handle();
    registry.insert(handle, HeadEntry { system, head });
    handle
}

/// Number of registered heads, or a negative error code.
#[no_mangle]
pub extern "C" fn scanline_system_get_number_scan_heads(system: ScanlineSystem) -> i32 {
    let Some(system) = system_lookup(system) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    let count = lock_system(&system).scan_head_count() as i32;
    count
}

/// Broadcast-connect all heads. Returns the number that connected, or a
/// negative error code. All heads connected implies state Connected.
#[no_mangle]
pub extern "C" fn scanline_system_connect(system: ScanlineSystem, timeout_s: i32) -> i32 {
    let Some(system) = system_lookup(system) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if timeout_s < 0 {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }

    let mut guard = lock_system(&system);
    match guard.connect(Duration::from_secs(timeout_s as u64)) {
        Ok(count) => count as i32,
        Err(e) => map_error(&e),
    }
}

#[no_mangle]
pub extern "C" fn scanline_system_disconnect(system: ScanlineSystem) -> i32 {
    let Some(system) = system_lookup(system) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    let mut guard = lock_system(&system);
    match guard.disconnect() {
        Ok(()) => SCANLINE_ERROR_NONE,
        Err(e) => map_error(&e),
    }
}

#[no_mangle]
pub extern "C" fn scanline_system_is_connected(system: ScanlineSystem) -> bool {
    system_lookup(system)
        .map(|system| lock_system(&system).is_connected())
        .unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn scanline_system_is_scanning(system: ScanlineSystem) -> bool {
    system_lookup(system)
        .map(|system| lock_system(&system).is_scanning())
        .unwrap_or(false)
}

/// Window-limited maximum scan rate in hertz. Before connecting this is
/// the static ceiling.
#[no_mangle]
pub extern "C" fn scanline_system_get_max_scan_rate(system: ScanlineSystem) -> f64 {
    let Some(system) = system_lookup(system) else {
        return 0.0;
    };
    let guard = lock_system(&system);
    if !guard.is_connected() && !guard.is_scanning() {
        return MAX_SCAN_RATE_HZ;
    }
    guard.max_scan_rate()
}

/// Validate rate and format, push them to every head, start scanning.
#[no_mangle]
pub extern "C" fn scanline_system_start_scanning(
    system: ScanlineSystem,
    rate_hz: f64,
    format: u32,
) -> i32 {
    let Some(system) = system_lookup(system) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if !rate_hz.is_finite() {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }
    let Some(format) = DataFormat::from_raw(format) else {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    };
    if format.is_image() {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }

    let mut guard = lock_system(&system);
    if !guard.is_connected() {
        if guard.is_scanning() {
            return SCANLINE_ERROR_SCANNING;
        }
        return SCANLINE_ERROR_NOT_CONNECTED;
    }
    if let Err(e) = guard.set_scan_rate(rate_hz) {
        return map_error(&e);
    }
    guard.set_data_format(format);
    match guard.start_scanning() {
        Ok(()) => SCANLINE_ERROR_NONE,
        Err(e) => map_error(&e),
    }
}

#[no_mangle]
pub extern "C" fn scanline_system_stop_scanning(system: ScanlineSystem) -> i32 {
    let Some(system) = system_lookup(system) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    let mut guard = lock_system(&system);
    match guard.stop_scanning() {
        Ok(()) => SCANLINE_ERROR_NONE,
        Err(e) => map_error(&e),
    }
}

// ============================================================================
// Scan head operations
// ============================================================================

#[no_mangle]
pub extern "C" fn scanline_head_get_id(head: ScanlineHead) -> u32 {
    match head_lookup(head) {
        Some((_, head)) => head.id(),
        // Make it obvious the handle was bad.
        None => u32::MAX,
    }
}

#[no_mangle]
pub extern "C" fn scanline_head_get_serial(head: ScanlineHead) -> u32 {
    match head_lookup(head) {
        Some((_, head)) => head.serial_number(),
        None => u32::MAX,
    }
}

/// Product type from the last status message; zero when unknown.
#[no_mangle]
pub extern "C" fn scanline_head_get_type(head: ScanlineHead) -> u32 {
    match head_lookup(head) {
        Some((_, head)) => head.product_type() as u32,
        None => ScanHeadType::Invalid as u32,
    }
}

/// A head counts as connected once it has a live status snapshot.
#[no_mangle]
pub extern "C" fn scanline_head_is_connected(head: ScanlineHead) -> bool {
    match head_lookup(head) {
        Some((_, head)) => head
            .status()
            .map(|status| status.global_time != 0)
            .unwrap_or(false),
        None => false,
    }
}

#[no_mangle]
pub extern "C" fn scanline_head_set_configuration(
    head: ScanlineHead,
    config: *const ScanlineConfiguration,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if config.is_null() {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }

    if lock_system(&system).is_scanning() {
        return SCANLINE_ERROR_SCANNING;
    }

    // SAFETY: non-null, caller guarantees a valid struct.
    let config = unsafe { &*config };
    match head.set_configuration(config.into()) {
        Ok(()) => SCANLINE_ERROR_NONE,
        Err(e) => map_error(&e),
    }
}

#[no_mangle]
pub extern "C" fn scanline_head_get_configuration(
    head: ScanlineHead,
    config: *mut ScanlineConfiguration,
) -> i32 {
    let Some((_, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if config.is_null() {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }
    let current = head.configuration();
    // SAFETY: non-null, caller guarantees writable.
    unsafe {
        *config = (&current).into();
    }
    SCANLINE_ERROR_NONE
}

/// Apply one alignment to every camera. Illegal once connected.
#[no_mangle]
pub extern "C" fn scanline_head_set_alignment(
    head: ScanlineHead,
    roll_degrees: f64,
    shift_x: f64,
    shift_y: f64,
    is_cable_downstream: bool,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if !roll_degrees.is_finite() || !shift_x.is_finite() || !shift_y.is_finite() {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }
    {
        let guard = lock_system(&system);
        if guard.is_connected() || guard.is_scanning() {
            return SCANLINE_ERROR_CONNECTED;
        }
    }

    head.set_alignment_all(AlignmentParams::new(
        roll_degrees,
        shift_x,
        shift_y,
        is_cable_downstream,
    ));
    SCANLINE_ERROR_NONE
}

/// Per-camera alignment variant.
#[no_mangle]
pub extern "C" fn scanline_head_set_alignment_camera(
    head: ScanlineHead,
    camera: u32,
    roll_degrees: f64,
    shift_x: f64,
    shift_y: f64,
    is_cable_downstream: bool,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if camera >= SCANLINE_CAMERA_MAX as u32 {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }
    if !roll_degrees.is_finite() || !shift_x.is_finite() || !shift_y.is_finite() {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }
    {
        let guard = lock_system(&system);
        if guard.is_connected() || guard.is_scanning() {
            return SCANLINE_ERROR_CONNECTED;
        }
    }

    head.set_alignment(
        Camera::from_id(camera as u8),
        AlignmentParams::new(roll_degrees, shift_x, shift_y, is_cable_downstream),
    );
    SCANLINE_ERROR_NONE
}

#[no_mangle]
pub extern "C" fn scanline_head_get_alignment_camera(
    head: ScanlineHead,
    camera: u32,
    roll_degrees: *mut f64,
    shift_x: *mut f64,
    shift_y: *mut f64,
    is_cable_downstream: *mut bool,
) -> i32 {
    let Some((_, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if camera >= SCANLINE_CAMERA_MAX as u32 {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }
    if roll_degrees.is_null()
        || shift_x.is_null()
        || shift_y.is_null()
        || is_cable_downstream.is_null()
    {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }

    let alignment = head.alignment(Camera::from_id(camera as u8));
    // SAFETY: pointers checked non-null above.
    unsafe {
        *roll_degrees = alignment.roll();
        *shift_x = alignment.shift_x();
        *shift_y = alignment.shift_y();
        *is_cable_downstream = alignment.is_cable_downstream();
    }
    SCANLINE_ERROR_NONE
}

/// Rectangular window in inches. Illegal once connected.
#[no_mangle]
pub extern "C" fn scanline_head_set_window_rectangular(
    head: ScanlineHead,
    window_top: f64,
    window_bottom: f64,
    window_left: f64,
    window_right: f64,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    {
        let guard = lock_system(&system);
        if guard.is_connected() || guard.is_scanning() {
            return SCANLINE_ERROR_CONNECTED;
        }
    }

    match ScanWindow::new(window_top, window_bottom, window_left, window_right) {
        Ok(window) => {
            head.set_window(window);
            SCANLINE_ERROR_NONE
        }
        Err(e) => map_error(&e),
    }
}

/// Profiles ready for reading, or a negative error code.
#[no_mangle]
pub extern "C" fn scanline_head_get_profiles_available(head: ScanlineHead) -> i32 {
    match head_lookup(head) {
        Some((_, head)) => head.profiles_available() as i32,
        None => SCANLINE_ERROR_NULL_ARGUMENT,
    }
}

/// Block until `count` profiles are ready or the timeout expires.
/// Returns the number available.
#[no_mangle]
pub extern "C" fn scanline_head_wait_until_profiles_available(
    head: ScanlineHead,
    count: u32,
    timeout_us: u32,
) -> i32 {
    let Some((_, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    head.wait_until_profiles_available(count, u64::from(timeout_us)) as i32
}

#[no_mangle]
pub extern "C" fn scanline_head_clear_profiles(head: ScanlineHead) -> i32 {
    match head_lookup(head) {
        Some((_, head)) => {
            head.clear_profiles();
            SCANLINE_ERROR_NONE
        }
        None => SCANLINE_ERROR_NULL_ARGUMENT,
    }
}

fn fill_profile(out: &mut ScanlineProfile, profile: &Profile, format: DataFormat, raw: bool) {
    out.scan_head_id = u32::from(profile.scan_head_id);
    out.camera = profile.camera as u32;
    out.laser = u32::from(profile.laser);
    out.timestamp_ns = profile.timestamp_ns;
    out.laser_on_time_us = profile.laser_on_time_us;
    out.exposure_time_us = profile.exposure_time_us;
    out.format = format as u32;
    out.udp_packets_received = profile.packets_received;
    out.udp_packets_expected = profile.packets_expected;
    out.data_valid_brightness = profile.num_valid_brightness();
    out.data_valid_xy = profile.num_valid_geometry();

    out.encoder_values = [0; SCANLINE_ENCODER_MAX];
    for (slot, value) in out
        .encoder_values
        .iter_mut()
        .zip(profile.encoders.iter())
    {
        *slot = *value;
    }
    out.num_encoder_values = profile.encoders.len().min(SCANLINE_ENCODER_MAX) as u32;

    if raw {
        // Full slot dump, sentinels intact.
        for (slot, point) in out.data.iter_mut().zip(profile.points().iter()) {
            slot.x = point.x;
            slot.y = point.y;
            slot.brightness = point.brightness;
        }
        out.data_len = profile.points().len() as u32;
    } else {
        // Compact: walk at the format's stride, keep valid points only.
        let stride = format.stride() as usize;
        let mut filled = 0usize;
        let points = profile.points();
        let mut n = 0usize;
        while n < points.len() {
            let point = &points[n];
            if point.x != scanline::INVALID_XY || point.y != scanline::INVALID_XY {
                out.data[filled] = ScanlineProfilePoint {
                    x: point.x,
                    y: point.y,
                    brightness: point.brightness,
                };
                filled += 1;
            }
            n += stride;
        }
        out.data_len = filled as u32;
    }
}

fn get_profiles_common(
    head: ScanlineHead,
    profiles: *mut ScanlineProfile,
    max_profiles: u32,
    raw: bool,
) -> i32 {
    let Some((_, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if profiles.is_null() {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }

    let format = head.data_format();
    let taken = head.take_profiles(max_profiles);
    // SAFETY: caller guarantees room for `max_profiles` entries;
    // `taken.len() <= max_profiles` by construction.
    let out = unsafe { std::slice::from_raw_parts_mut(profiles, taken.len()) };
    for (slot, profile) in out.iter_mut().zip(taken.iter()) {
        fill_profile(slot, profile, format, raw);
    }
    taken.len() as i32
}

/// Drain up to `max_profiles` compacted profiles. Returns the count.
#[no_mangle]
pub extern "C" fn scanline_head_get_profiles(
    head: ScanlineHead,
    profiles: *mut ScanlineProfile,
    max_profiles: u32,
) -> i32 {
    get_profiles_common(head, profiles, max_profiles, false)
}

/// Drain up to `max_profiles` raw profiles: every column slot, invalid
/// sentinels included. Returns the count.
#[no_mangle]
pub extern "C" fn scanline_head_get_raw_profiles(
    head: ScanlineHead,
    profiles: *mut ScanlineProfile,
    max_profiles: u32,
) -> i32 {
    get_profiles_common(head, profiles, max_profiles, true)
}

/// Capture one frame from `camera`, optionally with lasers lit. Runs a
/// short image-mode scan cycle with a temporary configuration and
/// restores nothing because the stored configuration is never touched.
#[no_mangle]
pub extern "C" fn scanline_head_get_camera_image(
    head: ScanlineHead,
    camera: u32,
    enable_lasers: bool,
    image: *mut ScanlineCameraImage,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if image.is_null() {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }
    if camera >= SCANLINE_CAMERA_MAX as u32 {
        return SCANLINE_ERROR_INVALID_ARGUMENT;
    }

    let config = head.configuration();
    let config = if enable_lasers {
        // Laser on time must never exceed camera exposure; the scan
        // server assumes as much.
        config.with_laser_clamped_to_exposure()
    } else {
        config.with_laser_disabled()
    };

    let captured = {
        let mut guard = lock_system(&system);
        match guard.capture_images(head.id(), config, Duration::from_secs(5)) {
            Ok(profiles) => profiles,
            Err(e) => return map_error(&e),
        }
    };

    for profile in &captured {
        if profile.camera as u32 != camera {
            continue;
        }

        // SAFETY: non-null, caller guarantees a writable struct.
        let out = unsafe { &mut *image };
        out.scan_head_id = u32::from(profile.scan_head_id);
        out.camera = profile.camera as u32;
        out.timestamp_ns = profile.timestamp_ns;
        out.camera_exposure_time_us = profile.exposure_time_us;
        out.laser_on_time_us = profile.laser_on_time_us;
        out.encoder_values = [0; SCANLINE_ENCODER_MAX];
        for (slot, value) in out.encoder_values.iter_mut().zip(profile.encoders.iter()) {
            *slot = *value;
        }
        out.num_encoder_values = profile.encoders.len().min(SCANLINE_ENCODER_MAX) as u32;
        out.image_width = SCANLINE_IMAGE_WIDTH as u32;
        out.image_height = SCANLINE_IMAGE_HEIGHT as u32;
        let frame = profile.image();
        let len = frame.len().min(SCANLINE_IMAGE_DATA_LEN);
        out.data[..len].copy_from_slice(&frame[..len]);
        return SCANLINE_ERROR_NONE;
    }

    SCANLINE_ERROR_INTERNAL
}

/// Status snapshot plus temperatures. Requires Connected, not Scanning.
#[no_mangle]
pub extern "C" fn scanline_head_get_status(
    head: ScanlineHead,
    status: *mut ScanlineStatus,
) -> i32 {
    let Some((system, head)) = head_lookup(head) else {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    };
    if status.is_null() {
        return SCANLINE_ERROR_NULL_ARGUMENT;
    }
    {
        let guard = lock_system(&system);
        if guard.is_scanning() {
            return SCANLINE_ERROR_SCANNING;
        }
        if !guard.is_connected() {
            return SCANLINE_ERROR_NOT_CONNECTED;
        }
    }

    let Some(snapshot) = head.status() else {
        return SCANLINE_ERROR_INTERNAL;
    };
    let temps = head.temperatures();

    // SAFETY: non-null, caller guarantees a writable struct.
    let out = unsafe { &mut *status };
    out.global_time_ns = snapshot.global_time;
    out.num_profiles_sent = snapshot.num_profiles_sent;
    out.encoder_values = [0; SCANLINE_ENCODER_MAX];
    for (slot, value) in out.encoder_values.iter_mut().zip(snapshot.encoders().iter()) {
        *slot = *value;
    }
    out.num_encoder_values = snapshot.encoders().len().min(SCANLINE_ENCODER_MAX) as u32;
    for camera in 0..SCANLINE_CAMERA_MAX {
        out.camera_pixels_in_window[camera] = snapshot.pixels_in_window(camera).unwrap_or(-1);
        out.camera_temp[camera] = temps.camera_temp_c[camera] as i32;
    }
    out.mainboard_temp = temps.mainboard_temp_c as i32;
    out.firmware_version_major = snapshot.version.major;
    out.firmware_version_minor = snapshot.version.minor;
    out.firmware_version_patch = snapshot.version.patch;
    SCANLINE_ERROR_NONE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handles_are_rejected() {
        assert_eq!(
            scanline_system_get_number_scan_heads(0),
            SCANLINE_ERROR_NULL_ARGUMENT
        );
        assert_eq!(scanline_system_connect(0, 1), SCANLINE_ERROR_NULL_ARGUMENT);
        assert!(!scanline_system_is_connected(0));
        assert_eq!(scanline_head_get_id(0), u32::MAX);
        assert_eq!(
            scanline_head_get_profiles_available(0),
            SCANLINE_ERROR_NULL_ARGUMENT
        );
        assert_eq!(
            scanline_head_wait_until_profiles_available(0, 1, 1),
            SCANLINE_ERROR_NULL_ARGUMENT
        );
    }

    #[test]
    fn system_and_head_lifecycle() {
        let system = scanline_system_create();
        assert_ne!(system, 0);
        assert_eq!(scanline_system_get_number_scan_heads(system), 0);

        let head = scanline_system_create_scan_head(system, 9_001, 0);
        assert_ne!(head, 0);
        assert_eq!(scanline_head_get_serial(head), 9_001);
        assert_eq!(scanline_head_get_id(head), 0);
        assert_eq!(scanline_system_get_number_scan_heads(system), 1);

        // Duplicate serial is rejected with the zero handle.
        assert_eq!(scanline_system_create_scan_head(system, 9_001, 1), 0);

        let by_id = scanline_system_get_scan_head_by_id(system, 0);
        assert_eq!(by_id, head);

        scanline_system_free(system);
        // Freed handles go stale.
        assert_eq!(
            scanline_system_get_number_scan_heads(system),
            SCANLINE_ERROR_NULL_ARGUMENT
        );
        assert_eq!(scanline_head_get_serial(head), u32::MAX);
    }

    #[test]
    fn state_errors_surface_as_codes() {
        let system = scanline_system_create();
        assert_ne!(system, 0);
        assert_eq!(
            scanline_system_disconnect(system),
            SCANLINE_ERROR_NOT_CONNECTED
        );
        assert_eq!(
            scanline_system_stop_scanning(system),
            SCANLINE_ERROR_NOT_SCANNING
        );
        assert_eq!(
            scanline_system_start_scanning(system, 500.0, 0),
            SCANLINE_ERROR_NOT_CONNECTED
        );
        assert_eq!(
            scanline_system_start_scanning(system, 500.0, 6),
            SCANLINE_ERROR_INVALID_ARGUMENT
        );
        assert_eq!(
            scanline_system_start_scanning(system, f64::NAN, 0),
            SCANLINE_ERROR_INVALID_ARGUMENT
        );
        scanline_system_free(system);
    }

    #[test]
    fn configuration_round_trips_through_the_ffi_structs() {
        let system = scanline_system_create();
        let head = scanline_system_create_scan_head(system, 77, 3);
        assert_ne!(head, 0);

        let config = ScanlineConfiguration {
            scan_offset_us: 1_000,
            camera_exposure_time_min_us: 100,
            camera_exposure_time_def_us: 500,
            camera_exposure_time_max_us: 1_000,
            laser_on_time_min_us: 50,
            laser_on_time_def_us: 100,
            laser_on_time_max_us: 200,
            laser_detection_threshold: 150,
            saturation_threshold: 700,
            saturation_percentage: 25,
        };
        assert_eq!(
            scanline_head_set_configuration(head, &config),
            SCANLINE_ERROR_NONE
        );

        let mut read_back = ScanlineConfiguration {
            scan_offset_us: 0,
            camera_exposure_time_min_us: 0,
            camera_exposure_time_def_us: 0,
            camera_exposure_time_max_us: 0,
            laser_on_time_min_us: 0,
            laser_on_time_def_us: 0,
            laser_on_time_max_us: 0,
            laser_detection_threshold: 0,
            saturation_threshold: 0,
            saturation_percentage: 0,
        };
        assert_eq!(
            scanline_head_get_configuration(head, &mut read_back),
            SCANLINE_ERROR_NONE
        );
        assert_eq!(read_back.scan_offset_us, 1_000);
        assert_eq!(read_back.laser_on_time_max_us, 200);

        // Out-of-range values map to the invalid-argument code.
        let mut bad = config;
        bad.saturation_percentage = 0;
        assert_eq!(
            scanline_head_set_configuration(head, &bad),
            SCANLINE_ERROR_INVALID_ARGUMENT
        );
        assert_eq!(
            scanline_head_set_configuration(head, std::ptr::null()),
            SCANLINE_ERROR_NULL_ARGUMENT
        );

        scanline_system_free(system);
    }

    #[test]
    fn alignment_and_window_setters_validate_arguments() {
        let system = scanline_system_create();
        let head = scanline_system_create_scan_head(system, 88, 4);

        assert_eq!(
            scanline_head_set_alignment(head, 5.0, 1.0, -1.0, true),
            SCANLINE_ERROR_NONE
        );
        let (mut roll, mut sx, mut sy, mut downstream) = (0.0, 0.0, 0.0, false);
        assert_eq!(
            scanline_head_get_alignment_camera(head, 1, &mut roll, &mut sx, &mut sy, &mut downstream),
            SCANLINE_ERROR_NONE
        );
        assert_eq!(roll, 5.0);
        assert!(downstream);

        assert_eq!(
            scanline_head_set_window_rectangular(head, 10.0, -10.0, -10.0, 10.0),
            SCANLINE_ERROR_NONE
        );
        // Degenerate window.
        assert_eq!(
            scanline_head_set_window_rectangular(head, -10.0, 10.0, -10.0, 10.0),
            SCANLINE_ERROR_INVALID_ARGUMENT
        );
        // Bad camera index.
        assert_eq!(
            scanline_head_set_alignment_camera(head, 2, 0.0, 0.0, 0.0, false),
            SCANLINE_ERROR_INVALID_ARGUMENT
        );

        scanline_system_free(system);
    }

    #[test]
    fn error_strings_cover_every_code() {
        for code in [0, -1, -2, -3, -4, -5, -6, -7, -8, -99, 5] {
            let ptr = scanline_get_error(code);
            assert!(!ptr.is_null());
            // SAFETY: scanline_get_error returns a static NUL-terminated string.
            let s = unsafe { std::ffi::CStr::from_ptr(ptr) };
            assert!(!s.to_bytes().is_empty());
        }
    }
}
