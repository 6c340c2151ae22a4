use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::collection::CollectionEvent;

use super::loop_worker::monitor_loop;
use super::monitor::StorageMonitor;

/// Owns the background storage monitoring task.
#[derive(Default)]
pub struct MonitorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        monitor: StorageMonitor,
        interval: Duration,
        events: broadcast::Sender<CollectionEvent>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("storage monitor already active");
        }

        info!("starting storage monitor (every {interval:?})");
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(monitor_loop(
            monitor,
            interval,
            events,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("storage monitor task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
