use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::*;

/// Background task that drains `<notification>` messages from a transport
/// into the session's message log.
pub(super) struct NotificationListener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl NotificationListener {
    pub(super) fn spawn(
        transport: Arc<dyn Transport>,
        log: MessageLog,
        label: String,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            debug!("{label} notification listener started");
            loop {
                if !transport.is_connected() {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(interval) => continue,
                    }
                }
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = transport.take_notification(interval) => next,
                };
                match next {
                    Ok(Some(notification)) => {
                        debug!("{label} received notification");
                        log.append(notification);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("{label} notification wait failed: {e}");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(interval) => {}
                        }
                    }
                }
            }
            debug!("{label} notification listener stopped");
        });
        Self { cancel, handle }
    }

    /// Cancels the listener and waits for it to finish.
    pub(super) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            debug!("notification listener ended abnormally: {e}");
        }
    }

    /// Cancels the listener without waiting.
    pub(super) fn cancel(self) {
        self.cancel.cancel();
    }
}
