use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use driftnet_core::ClickEvent;
use tokio::sync::mpsc;

/// Bounded, thread-safe queue between many producers (request handlers) and
/// exactly one consumer (the batcher). `Send` is the sole backpressure
/// signal: on a full buffer the event is dropped rather than blocking the
/// HTTP response (§4.B, §5).
pub struct ClickBuffer {
    tx: mpsc::Sender<ClickEvent>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<ClickEvent>>>,
    closed: Arc<AtomicBool>,
    len: Arc<std::sync::atomic::AtomicUsize>,
}

impl ClickBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            closed: Arc::new(AtomicBool::new(false)),
            len: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    /// Non-blocking send. Returns false if the buffer is full (backpressure)
    /// or the buffer has been closed.
    pub fn send(&self, event: ClickEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent; `AtomicBool::swap` already gives close-once semantics
    /// without a dedicated `sync::Once`.
    pub fn close(&self) {
        self.closed.swap(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Takes the receiver half. Panics if already taken: there is exactly
    /// one consumer (the batcher task) by construction.
    pub async fn take_receiver(&self) -> mpsc::Receiver<ClickEvent> {
        self.rx
            .lock()
            .await
            .take()
            .expect("ClickBuffer consumer already taken")
    }

    pub fn note_drained(&self, n: usize) {
        self.len.fetch_sub(n, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> ClickEvent {
        ClickEvent {
            query_id: "q".into(),
            result_id: "r".into(),
            position: 1,
            page: 1,
            destination_url: "https://example.com".into(),
            destination_hash: "h".into(),
            user_agent_hash: String::new(),
            generated_at: Utc::now(),
            clicked_at: Utc::now(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn send_returns_false_once_full() {
        let buf = ClickBuffer::new(2);
        assert!(buf.send(event()));
        assert!(buf.send(event()));
        assert!(!buf.send(event()));
    }

    #[tokio::test]
    async fn send_returns_false_after_close() {
        let buf = ClickBuffer::new(10);
        buf.close();
        assert!(!buf.send(event()));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let buf = ClickBuffer::new(10);
        buf.close();
        buf.close();
        assert!(buf.is_closed());
    }

    #[tokio::test]
    async fn draining_frees_capacity() {
        let buf = ClickBuffer::new(1);
        assert!(buf.send(event()));
        assert!(!buf.send(event()));
        let mut rx = buf.take_receiver().await;
        rx.recv().await.unwrap();
        buf.note_drained(1);
        assert!(buf.send(event()));
    }
}
