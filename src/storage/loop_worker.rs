use tokio::sync::broadcast;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::collection::CollectionEvent;

use super::monitor::{format_bytes, StorageMonitor};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Periodically re-reads storage stats and raises `LowStorage` while free
/// space sits under the threshold. After a failed check the next wait is
/// twice the normal interval; a successful check restores it.
pub async fn monitor_loop(
    monitor: StorageMonitor,
    interval: Duration,
    events: broadcast::Sender<CollectionEvent>,
    cancel_token: CancellationToken,
) {
    let mut delay = interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let checker = monitor.clone();
                let outcome = tokio::task::spawn_blocking(move || checker.stats()).await;

                match outcome {
                    Ok(Ok(stats)) => {
                        delay = interval;
                        if stats.is_low_space {
                            log_warn!(
                                "storage low: {} free of {}",
                                format_bytes(stats.free_space),
                                format_bytes(stats.total_space)
                            );
                            let _ = events.send(CollectionEvent::LowStorage(stats));
                        }
                    }
                    Ok(Err(err)) => {
                        delay = interval * 2;
                        log_error!("storage check failed, retrying in {:?}: {err}", delay);
                    }
                    Err(join_err) => {
                        delay = interval * 2;
                        log_error!("storage check worker failed, retrying in {:?}: {join_err}", delay);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("storage monitor loop shutting down");
                break;
            }
        }
    }
}
