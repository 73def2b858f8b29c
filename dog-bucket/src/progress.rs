use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Progress of one object's chunked upload, emitted after each acknowledged chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub file_path: String,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

impl UploadProgress {
    pub fn new(file_path: impl Into<String>, uploaded_bytes: u64, total_bytes: u64) -> Self {
        Self {
            file_path: file_path.into(),
            uploaded_bytes,
            total_bytes,
            percentage: percentage(uploaded_bytes, total_bytes),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_bytes >= self.total_bytes
    }
}

/// `uploaded / total * 100`, exactly 100 once everything is written
pub fn percentage(uploaded_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 || uploaded_bytes >= total_bytes {
        100.0
    } else {
        uploaded_bytes as f64 / total_bytes as f64 * 100.0
    }
}

/// Stream of progress events consumed by the caller
pub type ProgressStream = UnboundedReceiverStream<UploadProgress>;

/// Producer side of a progress stream, shared by concurrent uploads
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<UploadProgress>,
}

impl ProgressSender {
    /// Send an event; a dropped stream just means nobody is listening
    pub fn send(&self, event: UploadProgress) {
        let _ = self.tx.send(event);
    }
}

/// Create a connected progress sender/stream pair
pub fn progress_channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, UnboundedReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 100.0);
        assert_eq!(percentage(512, 1024), 50.0);
        assert_eq!(percentage(1024, 1024), 100.0);
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (tx, rx) = progress_channel();
        tx.send(UploadProgress::new("a/b", 1, 2));
        tx.send(UploadProgress::new("a/b", 2, 2));
        drop(tx);

        let events: Vec<_> = rx.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].percentage, 50.0);
        assert!(events[1].is_complete());
    }

    #[test]
    fn test_send_after_stream_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send(UploadProgress::new("a/b", 1, 1));
    }
}
