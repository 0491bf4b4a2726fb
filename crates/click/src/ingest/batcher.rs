use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use driftnet_core::{ClickEvent, PublishedClickRow};
use driftnet_storage::{click_store, Storage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::buffer::ClickBuffer;

/// Destination for a flushed batch. The production implementation writes
/// chunked multi-row inserts to Postgres; tests substitute an in-memory
/// sink so the batcher's threshold/timer/drain logic is exercised without
/// a live database (no `sqlx::test` harness is available to imitate here).
#[async_trait]
pub trait ClickSink: Send + Sync {
    async fn insert_batch(&self, rows: &[PublishedClickRow]) -> anyhow::Result<()>;
}

#[async_trait]
impl ClickSink for Storage {
    async fn insert_batch(&self, rows: &[PublishedClickRow]) -> anyhow::Result<()> {
        click_store::insert_batch(self.pool(), rows).await
    }
}

/// Single background task reading the buffer into a slice, flushing on
/// threshold or timer (§4.B "Batcher").
pub struct Batcher<S: ClickSink> {
    sink: Arc<S>,
    flush_threshold: usize,
    flush_interval: Duration,
    insert_batch_size: usize,
    flush_timeout: Duration,
}

impl<S: ClickSink> Batcher<S> {
    pub fn new(
        sink: Arc<S>,
        flush_threshold: usize,
        flush_interval: Duration,
        insert_batch_size: usize,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            flush_threshold,
            flush_interval,
            insert_batch_size,
            flush_timeout,
        }
    }

    /// Runs until `cancel` fires, then drains whatever remains and performs
    /// one final flush (§5 "Batcher performs one best-effort final flush").
    pub async fn run(self, buffer: Arc<ClickBuffer>, cancel: CancellationToken) {
        let mut rx = buffer.take_receiver().await;
        let mut batch: Vec<ClickEvent> = Vec::with_capacity(self.flush_threshold);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Self::drain_remaining(&mut rx, &mut batch);
                    self.flush(&mut batch).await;
                    break;
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            buffer.note_drained(1);
                            batch.push(event);
                            if batch.len() >= self.flush_threshold {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => {
                            self.flush(&mut batch).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut batch).await;
                }
            }
        }
    }

    fn drain_remaining(rx: &mut mpsc::Receiver<ClickEvent>, batch: &mut Vec<ClickEvent>) {
        while let Ok(event) = rx.try_recv() {
            batch.push(event);
        }
    }

    async fn flush(&self, batch: &mut Vec<ClickEvent>) {
        if batch.is_empty() {
            return;
        }
        let rows: Vec<PublishedClickRow> = batch.iter().map(PublishedClickRow::from).collect();
        let size = rows.len();

        let result = tokio::time::timeout(self.flush_timeout, async {
            for chunk in rows.chunks(self.insert_batch_size) {
                self.sink.insert_batch(chunk).await?;
            }
            anyhow::Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Click loss is acceptable; duplicates are worse, so the
                // batch is not retried (§4.B).
                warn!(batch_size = size, error = %e, "click batch flush failed");
            }
            Err(_) => {
                warn!(batch_size = size, "click batch flush timed out");
            }
        }

        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::Mutex as TokioMutex;

    struct MemSink {
        rows: TokioMutex<Vec<PublishedClickRow>>,
    }

    impl MemSink {
        fn new() -> Self {
            Self {
                rows: TokioMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ClickSink for MemSink {
        async fn insert_batch(&self, rows: &[PublishedClickRow]) -> anyhow::Result<()> {
            self.rows.lock().await.extend_from_slice(rows);
            Ok(())
        }
    }

    fn event(i: usize) -> ClickEvent {
        ClickEvent {
            query_id: format!("q{i}"),
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
    async fn flush_threshold_triggers_before_ticker() {
        let buffer = Arc::new(ClickBuffer::new(10));
        let sink = Arc::new(MemSink::new());
        let batcher = Batcher::new(sink.clone(), 3, Duration::from_secs(3600), 50, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        for i in 0..3 {
            buffer.send(event(i));
        }

        let cancel2 = cancel.clone();
        let handle = tokio::spawn(batcher.run(buffer.clone(), cancel2));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.rows.lock().await.len(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_performs_final_drain_and_flush() {
        let buffer = Arc::new(ClickBuffer::new(10));
        let sink = Arc::new(MemSink::new());
        let batcher = Batcher::new(sink.clone(), 500, Duration::from_secs(3600), 50, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        buffer.send(event(0));
        buffer.send(event(1));

        let cancel2 = cancel.clone();
        let handle = tokio::spawn(batcher.run(buffer.clone(), cancel2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.rows.lock().await.len(), 2);
    }
}
