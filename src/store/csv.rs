//! Positional CSV rows: comma separated, never quoted, optional values left empty.

use crate::models::{BiometricReading, InertialReading, Reading, StreamKind, Vector3};

pub const INERTIAL_HEADER: &str = "timestamp,session_id,device_id,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,mag_x,mag_y,mag_z,battery_level";
pub const BIOMETRIC_HEADER: &str =
    "timestamp,session_id,device_id,heart_rate,step_count,calories,skin_temp,battery_level";

pub fn header(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Inertial => INERTIAL_HEADER,
        StreamKind::Biometric => BIOMETRIC_HEADER,
    }
}

pub fn is_header(line: &str) -> bool {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    line == INERTIAL_HEADER || line == BIOMETRIC_HEADER
}

/// Encodes one reading without the trailing newline.
pub fn encode_row(reading: &Reading) -> String {
    match reading {
        Reading::Inertial(r) => encode_inertial(r),
        Reading::Biometric(r) => encode_biometric(r),
    }
}

fn encode_inertial(r: &InertialReading) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        r.timestamp,
        r.session_id,
        r.device_id,
        vector(&r.accelerometer),
        vector(&r.gyroscope),
        vector(&r.magnetometer),
        r.battery_level
    )
}

fn encode_biometric(r: &BiometricReading) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        r.timestamp,
        r.session_id,
        r.device_id,
        optional(r.heart_rate),
        r.step_count,
        r.calories,
        optional(r.skin_temperature),
        r.battery_level
    )
}

fn vector(v: &Vector3) -> String {
    format!("{},{},{}", v.x, v.y, v.z)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
