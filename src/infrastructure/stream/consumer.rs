//! Persistence Consumer
//!
//! Drains the durable log through a consumer group and writes each record
//! to the row store. On a write failure the consumer pauses entirely for a
//! fixed delay, then retries the same record; records are acknowledged only
//! after a successful write, giving at-least-once persistence.
//!
//! Delivered-but-unacked records survive a crash in the group's pending
//! entries list. The consumer name is stable across restarts, and each run
//! starts by draining its own pending entries before reading new ones, so a
//! record stranded by a crash or a failed ack is redelivered rather than
//! silently dropped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::LogSettings;
use crate::domain::{ChatMessage, MessageRepository};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Attempts per record before giving up on an ack and falling back to a
/// pending-entries drain.
const ACK_RETRY_ATTEMPTS: u32 = 3;

/// Delay between ack attempts.
const ACK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Outcome of handling a single log record.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    /// The record was written to the row store.
    Persisted,
    /// The record carried an empty or malformed payload and was dropped.
    Skipped,
}

/// Where the consumer reads from next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadCursor {
    /// This consumer's own pending entries: records delivered to it before
    /// a crash or failed ack, never acknowledged.
    Pending,
    /// Records never delivered to any consumer of the group.
    New,
}

impl ReadCursor {
    fn stream_id(self) -> &'static str {
        match self {
            ReadCursor::Pending => "0",
            ReadCursor::New => ">",
        }
    }
}

/// Background consumer draining the durable log into the row store.
pub struct StreamConsumer<R> {
    conn: ConnectionManager,
    repository: Arc<R>,
    settings: LogSettings,
}

impl<R: MessageRepository> StreamConsumer<R> {
    pub fn new(conn: ConnectionManager, repository: Arc<R>, settings: LogSettings) -> Self {
        Self {
            conn,
            repository,
            settings,
        }
    }

    /// Run the consume loop until shutdown.
    ///
    /// Starts on the pending-entries cursor to reclaim records a previous
    /// run left unacked, then switches to new records once the backlog is
    /// drained.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.ensure_group().await {
            error!(error = %e, "Failed to create consumer group, consumer not started");
            return;
        }

        info!(
            stream = %self.settings.stream,
            group = %self.settings.group,
            consumer = %self.settings.consumer_name,
            start = ?self.settings.start,
            "Persistence consumer started"
        );

        let mut cursor = ReadCursor::Pending;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Persistence consumer stopped");
                    return;
                }
                batch = read_batch(&mut self.conn, &self.settings, cursor) => match batch {
                    Ok(reply) => {
                        let records = record_count(&reply);
                        if cursor == ReadCursor::Pending && records == 0 {
                            debug!("Pending entries drained");
                            cursor = ReadCursor::New;
                            continue;
                        }

                        match self.process_batch(reply, &mut shutdown).await {
                            ControlFlow::Break(()) => {
                                info!("Persistence consumer stopped");
                                return;
                            }
                            ControlFlow::Continue(acks_ok) => {
                                cursor = next_cursor(cursor, records, acks_ok);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Stream read failed, retrying");
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                }
            }
        }
    }

    /// Create the consumer group at the configured start position.
    ///
    /// Idempotent: an already-existing group is left untouched, preserving
    /// its read progress.
    async fn ensure_group(&mut self) -> Result<(), AppError> {
        let start = self.settings.start.stream_id();
        let result: Result<(), redis::RedisError> = self
            .conn
            .xgroup_create_mkstream(&self.settings.stream, &self.settings.group, start)
            .await;

        match result {
            Ok(()) => {
                info!(
                    group = %self.settings.group,
                    start,
                    "Consumer group created"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.settings.group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle every record of one read, acknowledging each after it is
    /// either persisted or skipped.
    ///
    /// Returns whether every ack went through; an unacked record stays in
    /// the pending entries list and the caller must not advance past it.
    async fn process_batch(
        &mut self,
        reply: StreamReadReply,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlFlow<(), bool> {
        let mut acks_ok = true;

        for key in reply.keys {
            for entry in key.ids {
                let payload: Option<String> = entry.get("payload");

                let outcome = handle_payload(
                    self.repository.as_ref(),
                    payload.as_deref(),
                    self.settings.pause(),
                    shutdown,
                )
                .await?;

                match outcome {
                    RecordOutcome::Persisted => {
                        debug!(record_id = %entry.id, "Record persisted");
                    }
                    RecordOutcome::Skipped => {
                        debug!(record_id = %entry.id, "Record skipped");
                    }
                }

                if !self.ack_with_retry(&entry.id).await {
                    acks_ok = false;
                }
            }
        }

        ControlFlow::Continue(acks_ok)
    }

    /// Acknowledge a record, retrying a few times on failure.
    ///
    /// Returns false if the record could not be acked; it then remains in
    /// the pending entries list and will be redelivered on the next
    /// pending-entries drain (a duplicate write is possible, a drop is not).
    async fn ack_with_retry(&mut self, record_id: &str) -> bool {
        for attempt in 1..=ACK_RETRY_ATTEMPTS {
            match self.ack(record_id).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        record_id = %record_id,
                        attempt,
                        error = %e,
                        "Failed to ack record"
                    );
                }
            }
            tokio::time::sleep(ACK_RETRY_DELAY).await;
        }
        false
    }

    async fn ack(&mut self, record_id: &str) -> Result<(), AppError> {
        let _: i64 = self
            .conn
            .xack(&self.settings.stream, &self.settings.group, &[record_id])
            .await?;
        Ok(())
    }
}

/// Read the next batch of records for this consumer at the given cursor.
async fn read_batch(
    conn: &mut ConnectionManager,
    settings: &LogSettings,
    cursor: ReadCursor,
) -> Result<StreamReadReply, AppError> {
    let opts = StreamReadOptions::default()
        .group(&settings.group, &settings.consumer_name)
        .count(settings.batch_size)
        .block(settings.block_ms as usize);

    let reply: StreamReadReply = conn
        .xread_options(&[&settings.stream], &[cursor.stream_id()], &opts)
        .await?;
    Ok(reply)
}

/// Total records across all keys of a read reply.
fn record_count(reply: &StreamReadReply) -> usize {
    reply.keys.iter().map(|key| key.ids.len()).sum()
}

/// The cursor for the next read.
///
/// A failed ack forces a pending-entries drain so the unacked record is
/// redelivered; an empty pending drain is handled by the caller before
/// processing, so `Pending` with records stays on `Pending` until the
/// backlog is empty.
fn next_cursor(cursor: ReadCursor, records: usize, acks_ok: bool) -> ReadCursor {
    if !acks_ok {
        return ReadCursor::Pending;
    }
    if cursor == ReadCursor::Pending && records == 0 {
        return ReadCursor::New;
    }
    cursor
}

/// Persist one record payload, pausing and retrying on write failure.
///
/// - Empty or missing payloads are skipped without a persistence attempt
///   and without triggering a pause.
/// - Malformed JSON payloads are logged and skipped likewise.
/// - A write failure pauses the whole consumer for the configured delay,
///   then retries the same record; no other records are processed during
///   the pause. Breaks only on shutdown.
pub(crate) async fn handle_payload<R: MessageRepository + ?Sized>(
    repository: &R,
    payload: Option<&str>,
    pause: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> ControlFlow<(), RecordOutcome> {
    let raw = match payload {
        None | Some("") => {
            metrics::LOG_RECORDS_SKIPPED.inc();
            return ControlFlow::Continue(RecordOutcome::Skipped);
        }
        Some(raw) => raw,
    };

    let chat = match serde_json::from_str::<ChatMessage>(raw) {
        Ok(chat) => chat,
        Err(e) => {
            warn!(error = %e, "Discarding malformed log record");
            metrics::LOG_RECORDS_SKIPPED.inc();
            return ControlFlow::Continue(RecordOutcome::Skipped);
        }
    };

    loop {
        match repository.insert(&chat.message, &chat.username).await {
            Ok(row) => {
                metrics::LOG_RECORDS_PERSISTED.inc();
                debug!(id = row.id, "Message persisted");
                return ControlFlow::Continue(RecordOutcome::Persisted);
            }
            Err(e) => {
                metrics::PERSISTENCE_FAILURES.inc();
                metrics::CONSUMER_PAUSES.inc();
                warn!(
                    error = %e,
                    pause_secs = pause.as_secs(),
                    "Persistence failed, pausing consumer"
                );
                tokio::select! {
                    _ = shutdown.changed() => return ControlFlow::Break(()),
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockMessageRepository, PersistedMessage};
    use chrono::Utc;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use redis::streams::{StreamId, StreamKey};

    fn persisted(id: i64, content: &str, username: &str) -> PersistedMessage {
        PersistedMessage {
            id,
            content: content.into(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }

    fn shutdown_rx() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the test duration
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn non_empty_payload_is_persisted_with_one_attempt() {
        let mut repo = MockMessageRepository::new();
        repo.expect_insert()
            .with(eq("hello"), eq("alice"))
            .times(1)
            .returning(|c, u| Ok(persisted(1, c, u)));

        let mut shutdown = shutdown_rx();
        let outcome = handle_payload(
            &repo,
            Some(r#"{"message":"hello","username":"alice"}"#),
            Duration::from_secs(60),
            &mut shutdown,
        )
        .await;

        assert_eq!(outcome, ControlFlow::Continue(RecordOutcome::Persisted));
    }

    #[tokio::test]
    async fn empty_payload_is_skipped_without_attempt() {
        let mut repo = MockMessageRepository::new();
        repo.expect_insert().times(0);

        let mut shutdown = shutdown_rx();

        let outcome =
            handle_payload(&repo, Some(""), Duration::from_secs(60), &mut shutdown).await;
        assert_eq!(outcome, ControlFlow::Continue(RecordOutcome::Skipped));

        let outcome = handle_payload(&repo, None, Duration::from_secs(60), &mut shutdown).await;
        assert_eq!(outcome, ControlFlow::Continue(RecordOutcome::Skipped));
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped_without_attempt() {
        let mut repo = MockMessageRepository::new();
        repo.expect_insert().times(0);

        let mut shutdown = shutdown_rx();
        let outcome = handle_payload(
            &repo,
            Some("not json"),
            Duration::from_secs(60),
            &mut shutdown,
        )
        .await;

        assert_eq!(outcome, ControlFlow::Continue(RecordOutcome::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_pauses_then_retries_same_record() {
        let mut repo = MockMessageRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_insert()
            .with(eq("hello"), eq("alice"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(AppError::Internal("row store down".into())));
        repo.expect_insert()
            .with(eq("hello"), eq("alice"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|c, u| Ok(persisted(1, c, u)));

        let pauses_before = metrics::CONSUMER_PAUSES.get();

        let mut shutdown = shutdown_rx();
        let outcome = handle_payload(
            &repo,
            Some(r#"{"message":"hello","username":"alice"}"#),
            Duration::from_secs(60),
            &mut shutdown,
        )
        .await;

        assert_eq!(outcome, ControlFlow::Continue(RecordOutcome::Persisted));
        assert_eq!(metrics::CONSUMER_PAUSES.get(), pauses_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_pause_breaks_the_loop() {
        let mut repo = MockMessageRepository::new();
        repo.expect_insert()
            .returning(|_, _| Err(AppError::Internal("row store down".into())));

        let (tx, mut shutdown) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(true);
        });

        let outcome = handle_payload(
            &repo,
            Some(r#"{"message":"hello","username":"alice"}"#),
            Duration::from_secs(60),
            &mut shutdown,
        )
        .await;

        assert_eq!(outcome, ControlFlow::Break(()));
    }

    fn reply_with(ids: &[&str]) -> StreamReadReply {
        StreamReadReply {
            keys: vec![StreamKey {
                key: "chat-log".into(),
                ids: ids
                    .iter()
                    .map(|id| StreamId {
                        id: (*id).into(),
                        ..Default::default()
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn cursor_stream_ids() {
        assert_eq!(ReadCursor::Pending.stream_id(), "0");
        assert_eq!(ReadCursor::New.stream_id(), ">");
    }

    #[test]
    fn record_count_sums_all_keys() {
        assert_eq!(record_count(&StreamReadReply::default()), 0);
        assert_eq!(record_count(&reply_with(&["1-0", "2-0"])), 2);
    }

    #[test]
    fn consumer_starts_on_pending_and_switches_after_drain() {
        // Records delivered before a crash are redelivered first; only an
        // empty pending read moves the cursor to new records.
        assert_eq!(
            next_cursor(ReadCursor::Pending, 2, true),
            ReadCursor::Pending
        );
        assert_eq!(next_cursor(ReadCursor::Pending, 0, true), ReadCursor::New);
        assert_eq!(next_cursor(ReadCursor::New, 5, true), ReadCursor::New);
    }

    #[test]
    fn failed_ack_falls_back_to_pending_drain() {
        // An unacked record must be redelivered, not left stranded in the
        // pending entries list while the consumer reads past it.
        assert_eq!(next_cursor(ReadCursor::New, 5, false), ReadCursor::Pending);
        assert_eq!(
            next_cursor(ReadCursor::Pending, 2, false),
            ReadCursor::Pending
        );
    }
}
