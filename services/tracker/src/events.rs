//! services/tracker/src/events.rs
//!
//! Logs the engine's `TimesheetUpdated` stream.

use timecharge_core::TimesheetUpdated;
use tokio::sync::broadcast::{
    error::{RecvError, TryRecvError},
    Receiver,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Logs each update as JSON until cancelled or the engine is gone.
///
/// Updates already queued when the token fires are still logged.
/// Returns how many updates were logged.
pub async fn log_updates(
    mut updates: Receiver<TimesheetUpdated>,
    shutdown: CancellationToken,
) -> usize {
    let mut logged = 0;
    loop {
        tokio::select! {
            biased;
            received = updates.recv() => match received {
                Ok(update) => {
                    log_update(&update);
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Update listener fell behind");
                }
                Err(RecvError::Closed) => return logged,
            },
            _ = shutdown.cancelled() => break,
        }
    }

    loop {
        match updates.try_recv() {
            Ok(update) => {
                log_update(&update);
                logged += 1;
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Update listener fell behind");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return logged,
        }
    }
}

fn log_update(update: &TimesheetUpdated) {
    match serde_json::to_string(update) {
        Ok(json) => info!(event = %json, "Timesheet updated"),
        Err(e) => error!("Failed to encode update: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    fn update() -> TimesheetUpdated {
        TimesheetUpdated {
            timesheet_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn queued_updates_are_logged_after_cancellation() {
        let (sender, receiver) = broadcast::channel(16);
        for _ in 0..3 {
            sender.send(update()).unwrap();
        }
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(log_updates(receiver, shutdown).await, 3);
    }

    #[tokio::test]
    async fn listener_stops_when_the_sender_is_gone() {
        let (sender, receiver) = broadcast::channel(16);
        sender.send(update()).unwrap();
        drop(sender);

        assert_eq!(log_updates(receiver, CancellationToken::new()).await, 1);
    }
}
