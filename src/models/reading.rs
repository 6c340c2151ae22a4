use serde::{Deserialize, Serialize};

/// The two sensor streams a device delivers; each gets its own log file and columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Inertial,
    Biometric,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Inertial, StreamKind::Biometric];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Inertial => "inertial",
            StreamKind::Biometric => "biometric",
        }
    }

    pub fn from_prefix(value: &str) -> Option<Self> {
        match value {
            "inertial" => Some(StreamKind::Inertial),
            "biometric" => Some(StreamKind::Biometric),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InertialReading {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub session_id: String,
    pub device_id: String,
    pub accelerometer: Vector3,
    pub gyroscope: Vector3,
    pub magnetometer: Vector3,
    pub battery_level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BiometricReading {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub session_id: String,
    pub device_id: String,
    pub heart_rate: Option<u32>,
    pub step_count: u32,
    pub calories: f64,
    pub skin_temperature: Option<f64>,
    pub battery_level: u8,
}

/// One timestamped sample from the paired device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reading {
    Inertial(InertialReading),
    Biometric(BiometricReading),
}

impl Reading {
    pub fn kind(&self) -> StreamKind {
        match self {
            Reading::Inertial(_) => StreamKind::Inertial,
            Reading::Biometric(_) => StreamKind::Biometric,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Reading::Inertial(r) => r.timestamp,
            Reading::Biometric(r) => r.timestamp,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Reading::Inertial(r) => &r.session_id,
            Reading::Biometric(r) => &r.session_id,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Reading::Inertial(r) => &r.device_id,
            Reading::Biometric(r) => &r.device_id,
        }
    }

    pub fn battery_level(&self) -> u8 {
        match self {
            Reading::Inertial(r) => r.battery_level,
            Reading::Biometric(r) => r.battery_level,
        }
    }
}

impl From<InertialReading> for Reading {
    fn from(reading: InertialReading) -> Self {
        Reading::Inertial(reading)
    }
}

impl From<BiometricReading> for Reading {
    fn from(reading: BiometricReading) -> Self {
        Reading::Biometric(reading)
    }
}
