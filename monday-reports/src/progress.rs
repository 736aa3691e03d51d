//! Status event channel between the pipeline and the presentation layer
//!
//! The runner and API clients emit one event per meaningful step; the CLI
//! drains the receiver and prints. A dropped receiver never errors the
//! pipeline — sends are best-effort.

use tokio::sync::mpsc;

/// A single operator-visible status line.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Info(String),
    Warn(String),
    Error(String),
    /// Coarse upload progress for one file (whole-percent steps).
    Progress {
        filename: String,
        percent: u8,
        bytes_sent: u64,
        bytes_total: u64,
    },
}

/// Cloneable sending half handed to every component that reports status.
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusSender {
    /// Create a connected channel. The receiver belongs to the caller.
    pub fn channel() -> (StatusSender, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusSender { tx: Some(tx) }, rx)
    }

    /// A sender that discards every event. Used in tests and library callers
    /// that don't surface status.
    pub fn discard() -> StatusSender {
        StatusSender { tx: None }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(StatusEvent::Info(message.into()));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.send(StatusEvent::Warn(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(StatusEvent::Error(message.into()));
    }

    pub fn progress(&self, filename: &str, percent: u8, bytes_sent: u64, bytes_total: u64) {
        self.send(StatusEvent::Progress {
            filename: filename.to_string(),
            percent,
            bytes_sent,
            bytes_total,
        });
    }

    fn send(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            // Receiver may already be gone during shutdown; that's fine.
            let _ = tx.send(event);
        }
    }
}

/// Format a byte count the way the status stream displays sizes.
pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_sender_never_panics() {
        let sender = StatusSender::discard();
        sender.info("hello");
        sender.progress("a.xlsx", 50, 5, 10);
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (sender, mut rx) = StatusSender::channel();
        sender.info("first");
        sender.warn("second");

        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Info("first".into()));
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Warn("second".into()));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (sender, rx) = StatusSender::channel();
        drop(rx);
        sender.info("into the void");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}
