use tokio::sync::mpsc;
use tracing::info;

use claquete_types::notifications::Toast;

/// Fire-and-forget toast output. There is no acknowledgement channel.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, toast: Toast) {
        info!(severity = ?toast.severity, "{}: {}", toast.title, toast.description);
    }
}

/// Forwards toasts to whoever holds the receiver (a UI loop, a test).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, toast: Toast) {
        // Nobody listening is fine.
        let _ = self.tx.send(toast);
    }
}
