use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{BiometricReading, InertialReading, Reading, Vector3};

use super::{device::DeviceLink, events::DeviceEvent};

const INERTIAL_INTERVAL_MS: u64 = 100;
/// One biometric sample per this many inertial samples.
const BIOMETRIC_EVERY_TICKS: u64 = 10;

/// In-process stand-in for a paired wearable: streams 10 Hz inertial and
/// 1 Hz biometric readings into the device event queue while its battery drains.
pub struct SimulatedDevice {
    device_id: String,
    connected: AtomicBool,
    battery: Arc<AtomicU8>,
    /// Ticks between one-percent battery drops.
    drain_every_ticks: u64,
    events: mpsc::Sender<DeviceEvent>,
    stream: Mutex<Option<CancellationToken>>,
}

impl SimulatedDevice {
    pub fn new(device_id: impl Into<String>, events: mpsc::Sender<DeviceEvent>) -> Self {
        Self {
            device_id: device_id.into(),
            connected: AtomicBool::new(true),
            battery: Arc::new(AtomicU8::new(100)),
            drain_every_ticks: 600,
            events,
            stream: Mutex::new(None),
        }
    }

    pub fn with_battery(self, level: u8, drain_every_ticks: u64) -> Self {
        self.battery.store(level.min(100), Ordering::Relaxed);
        Self {
            drain_every_ticks: drain_every_ticks.max(1),
            ..self
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn battery_level(&self) -> u8 {
        self.battery.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceLink for SimulatedDevice {
    fn device_id(&self) -> String {
        self.device_id.clone()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn start_streaming(&self, session_id: &str) -> bool {
        if !self.connected.load(Ordering::Relaxed) {
            return false;
        }

        let mut stream = self.stream.lock().await;
        if let Some(previous) = stream.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        tokio::spawn(stream_readings(
            StreamSpec {
                session_id: session_id.to_string(),
                device_id: self.device_id.clone(),
                drain_every_ticks: self.drain_every_ticks,
            },
            self.battery.clone(),
            self.events.clone(),
            token.clone(),
        ));
        *stream = Some(token);

        info!("simulated device {} streaming {session_id}", self.device_id);
        true
    }

    async fn stop_streaming(&self) -> bool {
        if let Some(token) = self.stream.lock().await.take() {
            token.cancel();
        }
        true
    }
}

struct StreamSpec {
    session_id: String,
    device_id: String,
    drain_every_ticks: u64,
}

async fn stream_readings(
    spec: StreamSpec,
    battery: Arc<AtomicU8>,
    events: mpsc::Sender<DeviceEvent>,
    cancel_token: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_millis(INERTIAL_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick: u64 = 0;
    let mut steps: u32 = 0;
    let mut calories: f64 = 0.0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick += 1;
                if tick % spec.drain_every_ticks == 0 {
                    let _ = battery.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| b.checked_sub(1));
                }
                let level = battery.load(Ordering::Relaxed);
                let timestamp = Utc::now().timestamp_millis();

                let inertial = Reading::Inertial(InertialReading {
                    timestamp,
                    session_id: spec.session_id.clone(),
                    device_id: spec.device_id.clone(),
                    accelerometer: jitter(&mut rng, Vector3::new(0.0, 0.0, 9.81), 0.4),
                    gyroscope: jitter(&mut rng, Vector3::default(), 0.05),
                    magnetometer: jitter(&mut rng, Vector3::new(45.0, -12.0, 8.5), 0.8),
                    battery_level: level,
                });
                if events.send(DeviceEvent::Reading(inertial)).await.is_err() {
                    break;
                }

                if tick % BIOMETRIC_EVERY_TICKS == 0 {
                    steps += rng.gen_range(0..3);
                    calories = round2(calories + 0.05);
                    let biometric = Reading::Biometric(BiometricReading {
                        timestamp,
                        session_id: spec.session_id.clone(),
                        device_id: spec.device_id.clone(),
                        heart_rate: rng.gen_bool(0.9).then(|| rng.gen_range(62..96)),
                        step_count: steps,
                        calories,
                        skin_temperature: rng.gen_bool(0.8).then(|| round2(rng.gen_range(32.5..34.0))),
                        battery_level: level,
                    });
                    if events.send(DeviceEvent::Reading(biometric)).await.is_err() {
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}

fn jitter(rng: &mut StdRng, center: Vector3, spread: f64) -> Vector3 {
    Vector3::new(
        round2(center.x + rng.gen_range(-spread..spread)),
        round2(center.y + rng.gen_range(-spread..spread)),
        round2(center.z + rng.gen_range(-spread..spread)),
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
