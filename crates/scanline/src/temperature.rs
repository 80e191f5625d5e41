// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scan head temperature readings over the REST interface.
//!
//! Each head exposes `GET http://<ip>:8080/sensors/temperature`. Failures
//! are not fatal; the caller gets zeroed readings and scanning is
//! unaffected.

use crate::format::CAMERA_MAX;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Port of the REST interface on every scan head.
const REST_PORT: u16 = 8_080;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Temperature snapshot in degrees Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanHeadTemperatures {
    pub camera_temp_c: [f64; CAMERA_MAX],
    pub mainboard_temp_c: f64,
    pub mainboard_humidity: f64,
}

#[derive(Deserialize)]
struct TemperatureResponse {
    #[serde(default)]
    camera: Vec<f64>,
    #[serde(default)]
    mainboard: f64,
    #[serde(rename = "mainboardHumidity", default)]
    mainboard_humidity: f64,
}

/// Query one head. Any transport or parse failure yields zeroes.
pub fn query(ip: Ipv4Addr) -> ScanHeadTemperatures {
    let url = format!("http://{}:{}/sensors/temperature", ip, REST_PORT);

    let response = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .and_then(|client| client.get(&url).send())
        .and_then(|response| response.json::<TemperatureResponse>());

    let mut temperatures = ScanHeadTemperatures::default();
    match response {
        Ok(body) => {
            for (slot, value) in temperatures.camera_temp_c.iter_mut().zip(body.camera) {
                *slot = value;
            }
            temperatures.mainboard_temp_c = body.mainboard;
            temperatures.mainboard_humidity = body.mainboard_humidity;
        }
        Err(e) => {
            log::debug!("[temp] query {} failed: {}", url, e);
        }
    }

    temperatures
}
