use async_trait::async_trait;

/// The controller's view of the paired device. Transport, pairing and wire
/// encoding live behind this trait; readings and remote start/stop requests
/// arrive separately as `DeviceEvent`s.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    fn device_id(&self) -> String;

    async fn is_connected(&self) -> bool;

    /// Asks the device to stream readings tagged with `session_id`.
    /// Returns whether the device acknowledged.
    async fn start_streaming(&self, session_id: &str) -> bool;

    async fn stop_streaming(&self) -> bool;
}
