//! RocksDB-backed broker implementation.
//!
//! Messages live in the `messages` column family keyed by
//! `queue || 0x00 || ulid`, so a forward prefix scan visits them in publish
//! order. The in-flight set is memory-only: a crash between delivery and
//! acknowledgement reverts the message to ready, which is exactly the
//! at-least-once contract consumers must tolerate.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use tokio::sync::mpsc;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use ulid::Ulid;

use crate::envelope::{DeadLetterRecord, Envelope, PublishOptions};
use crate::error::{QueueError, Result};
use crate::keys;

/// Column family names for the broker database.
mod cf {
    /// Ready and delayed messages, keyed by `queue || 0x00 || ulid`.
    pub const MESSAGES: &str = "messages";

    /// Dead-letter records, keyed by the original queue's prefix.
    pub const DEAD_LETTERS: &str = "dead_letters";
}

/// Suffix appended to a queue name to form its dead-letter channel name.
pub const DLQ_SUFFIX: &str = ".dlq";

/// Options for a consumer.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeOptions {
    /// Maximum number of unacknowledged deliveries in flight at once.
    pub prefetch: usize,

    /// How often the dispatcher rescans for delayed messages becoming ready.
    pub poll_interval: Duration,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            prefetch: 4,
            poll_interval: Duration::from_millis(250),
        }
    }
}

struct BrokerInner {
    db: DBWithThreadMode<MultiThreaded>,
    queues: Mutex<HashSet<String>>,
    in_flight: Mutex<HashSet<Vec<u8>>>,
    notify: Notify,
}

impl BrokerInner {
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| QueueError::Unavailable(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    fn check_declared(&self, queue: &str) -> Result<()> {
        let queues = self.queues.lock().expect("broker queue set poisoned");
        if queues.contains(queue) {
            Ok(())
        } else {
            Err(QueueError::UnknownQueue(queue.to_string()))
        }
    }

    /// Find and claim the oldest ready message in a queue.
    fn next_ready(&self, queue: &str) -> Result<Option<(Vec<u8>, Envelope)>> {
        let cf = self.cf(cf::MESSAGES)?;
        let prefix = keys::queue_prefix(queue);
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let now = Utc::now();
        let mut in_flight = self.in_flight.lock().expect("broker in-flight set poisoned");

        for item in iter {
            let (key, value) = item.map_err(|e| QueueError::Unavailable(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if in_flight.contains(key.as_ref()) {
                continue;
            }
            let envelope: Envelope = Self::deserialize(&value)?;
            if !envelope.is_ready(now) {
                continue;
            }
            in_flight.insert(key.to_vec());
            return Ok(Some((key.to_vec(), envelope)));
        }

        Ok(None)
    }

    /// Delete an acknowledged message.
    fn remove_message(&self, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf::MESSAGES)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        self.in_flight
            .lock()
            .expect("broker in-flight set poisoned")
            .remove(key);
        Ok(())
    }

    /// Re-publish a delivery with the attempt counter incremented and an
    /// optional not-before delay, atomically replacing the old message.
    #[allow(clippy::cast_possible_truncation)]
    fn requeue(&self, key: &[u8], envelope: &Envelope, delay: Option<Duration>) -> Result<Ulid> {
        let next = Envelope {
            id: Ulid::new(),
            queue: envelope.queue.clone(),
            payload: envelope.payload.clone(),
            attempt: envelope.attempt + 1,
            not_before: delay
                .map(|d| Utc::now() + chrono::Duration::milliseconds(d.as_millis() as i64)),
            enqueued_at: envelope.enqueued_at,
        };

        let cf = self.cf(cf::MESSAGES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf,
            keys::message_key(&next.queue, &next.id),
            Self::serialize(&next)?,
        );
        batch.delete_cf(&cf, key);
        self.db
            .write(batch)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        self.in_flight
            .lock()
            .expect("broker in-flight set poisoned")
            .remove(key);
        self.notify.notify_waiters();
        Ok(next.id)
    }

    /// Move a delivery to the queue's dead-letter channel.
    fn dead_letter(&self, key: &[u8], envelope: &Envelope, error: &str) -> Result<()> {
        let record = DeadLetterRecord {
            message_id: envelope.id,
            queue: envelope.queue.clone(),
            payload: envelope.payload.clone(),
            error: error.to_string(),
            attempts: envelope.attempt,
            enqueued_at: envelope.enqueued_at,
            dead_lettered_at: Utc::now(),
        };

        let cf_messages = self.cf(cf::MESSAGES)?;
        let cf_dead = self.cf(cf::DEAD_LETTERS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_dead,
            keys::message_key(&envelope.queue, &envelope.id),
            Self::serialize(&record)?,
        );
        batch.delete_cf(&cf_messages, key);
        self.db
            .write(batch)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        self.in_flight
            .lock()
            .expect("broker in-flight set poisoned")
            .remove(key);
        Ok(())
    }

    /// Return an unsettled delivery to the ready set (dropped without ack).
    fn release(&self, key: &[u8]) {
        self.in_flight
            .lock()
            .expect("broker in-flight set poisoned")
            .remove(key);
        self.notify.notify_waiters();
    }
}

/// A durable, at-least-once message broker backed by `RocksDB`.
///
/// Explicitly constructed with a bounded lifecycle: open it, declare
/// queues, hand out consumers, and stop the consumers to shut down. No
/// process-wide state is involved, so multiple brokers can coexist in one
/// test process.
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Open or create the broker database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Unavailable` if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(cf::MESSAGES, Options::default()),
            ColumnFamilyDescriptor::new(cf::DEAD_LETTERS, Options::default()),
        ];

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(BrokerInner {
                db,
                queues: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashSet::new()),
                notify: Notify::new(),
            }),
        })
    }

    /// Declare a queue, together with its dead-letter channel
    /// (`<name>.dlq`).
    ///
    /// Declaring is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidQueueName` for names unusable as key
    /// prefixes.
    pub fn declare_queue(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('\0') || name.ends_with(DLQ_SUFFIX) {
            return Err(QueueError::InvalidQueueName(name.to_string()));
        }
        let mut queues = self.inner.queues.lock().expect("broker queue set poisoned");
        queues.insert(name.to_string());
        queues.insert(format!("{name}{DLQ_SUFFIX}"));
        Ok(())
    }

    /// Publish a message to a queue.
    ///
    /// The message is durable once this call returns. With
    /// `PublishOptions::delay` set, delivery is withheld until the delay
    /// elapses.
    ///
    /// # Errors
    ///
    /// - `QueueError::UnknownQueue` if the queue was never declared.
    /// - `QueueError::Unavailable` if the write fails (nothing published).
    #[allow(clippy::cast_possible_truncation)]
    pub fn publish<T: serde::Serialize>(
        &self,
        queue: &str,
        payload: &T,
        options: PublishOptions,
    ) -> Result<Ulid> {
        self.inner.check_declared(queue)?;

        let envelope = Envelope {
            id: Ulid::new(),
            queue: queue.to_string(),
            payload: serde_json::to_value(payload)
                .map_err(|e| QueueError::Serialization(e.to_string()))?,
            attempt: 1,
            not_before: options
                .delay
                .map(|d| Utc::now() + chrono::Duration::milliseconds(d.as_millis() as i64)),
            enqueued_at: Utc::now(),
        };

        let cf = self.inner.cf(cf::MESSAGES)?;
        self.inner
            .db
            .put_cf(
                &cf,
                keys::message_key(queue, &envelope.id),
                BrokerInner::serialize(&envelope)?,
            )
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        tracing::debug!(queue = %queue, message_id = %envelope.id, "message published");
        self.inner.notify.notify_waiters();
        Ok(envelope.id)
    }

    /// Start consuming a queue.
    ///
    /// The returned [`Consumer`] yields deliveries in publish order, at
    /// most `prefetch` unacknowledged at a time.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::UnknownQueue` if the queue was never declared.
    pub fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer> {
        self.inner.check_declared(queue)?;

        let (tx, rx) = mpsc::channel(options.prefetch.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(dispatch(
            Arc::clone(&self.inner),
            queue.to_string(),
            tx,
            shutdown_rx,
            options,
        ));

        Ok(Consumer {
            rx,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// List dead-letter records for a queue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dead_letters(&self, queue: &str, limit: usize) -> Result<Vec<DeadLetterRecord>> {
        let cf = self.inner.cf(cf::DEAD_LETTERS)?;
        let prefix = keys::queue_prefix(queue);
        let iter = self.inner.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| QueueError::Unavailable(e.to_string()))?;
            if !key.starts_with(&prefix) || records.len() >= limit {
                break;
            }
            records.push(BrokerInner::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Count messages currently stored for a queue (ready, delayed, and
    /// in flight).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn queue_depth(&self, queue: &str) -> Result<usize> {
        let cf = self.inner.cf(cf::MESSAGES)?;
        let prefix = keys::queue_prefix(queue);
        let iter = self.inner.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut count = 0;
        for item in iter {
            let (key, _) = item.map_err(|e| QueueError::Unavailable(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

/// Dispatcher task feeding one consumer.
async fn dispatch(
    inner: Arc<BrokerInner>,
    queue: String,
    tx: mpsc::Sender<Delivery>,
    mut shutdown: watch::Receiver<bool>,
    options: ConsumeOptions,
) {
    let semaphore = Arc::new(Semaphore::new(options.prefetch.max(1)));

    loop {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => {
                match permit {
                    Ok(p) => p,
                    Err(_) => return,
                }
            }
            _ = shutdown.changed() => return,
        };

        let mut permit = Some(permit);
        loop {
            match inner.next_ready(&queue) {
                Ok(Some((key, envelope))) => {
                    let delivery = Delivery {
                        envelope,
                        key,
                        inner: Arc::clone(&inner),
                        _permit: permit.take().expect("permit handed out once"),
                        settled: false,
                    };
                    if tx.send(delivery).await.is_err() {
                        // Consumer dropped; the unsettled delivery releases
                        // itself back to the ready set.
                        return;
                    }
                    break;
                }
                Ok(None) => {
                    tokio::select! {
                        () = inner.notify.notified() => {}
                        () = sleep(options.poll_interval) => {}
                        _ = shutdown.changed() => return,
                    }
                }
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "queue scan failed, backing off");
                    tokio::select! {
                        () = sleep(options.poll_interval) => {}
                        _ = shutdown.changed() => return,
                    }
                }
            }
        }
    }
}

/// Handle for a queue consumer.
///
/// Dropping the consumer (or calling [`Consumer::stop`]) shuts the
/// dispatcher down; unacknowledged deliveries return to the ready set.
pub struct Consumer {
    rx: mpsc::Receiver<Delivery>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl Consumer {
    /// Receive the next delivery. Returns `None` once the dispatcher has
    /// stopped.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Stop the consumer and wait for its dispatcher to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// A message borrowed from the broker for processing.
///
/// Every delivery must be settled exactly once with [`Delivery::ack`],
/// [`Delivery::nack_requeue`], or [`Delivery::nack_dead_letter`]. A
/// delivery dropped unsettled returns to the ready set for redelivery.
pub struct Delivery {
    envelope: Envelope,
    key: Vec<u8>,
    inner: Arc<BrokerInner>,
    _permit: OwnedSemaphorePermit,
    settled: bool,
}

impl Delivery {
    /// The wire envelope.
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The delivery attempt number, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.envelope.attempt
    }

    /// Deserialize the message payload.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Serialization` if the payload does not match.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.envelope.payload.clone())
            .map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Acknowledge the delivery, removing the message permanently.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; the message stays queued and
    /// will be redelivered.
    pub fn ack(mut self) -> Result<()> {
        self.inner.remove_message(&self.key)?;
        self.settled = true;
        Ok(())
    }

    /// Negatively acknowledge and requeue, incrementing the attempt header
    /// and optionally delaying redelivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the original message stays
    /// queued and will be redelivered.
    pub fn nack_requeue(mut self, delay: Option<Duration>) -> Result<Ulid> {
        let id = self.inner.requeue(&self.key, &self.envelope, delay)?;
        self.settled = true;
        Ok(id)
    }

    /// Negatively acknowledge without requeue, moving the message to the
    /// queue's dead-letter channel with the final error.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails; the original message stays
    /// queued and will be redelivered.
    pub fn nack_dead_letter(mut self, error: &str) -> Result<()> {
        self.inner.dead_letter(&self.key, &self.envelope, error)?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.release(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestPayload {
        job: u32,
    }

    const RECV_WAIT: Duration = Duration::from_secs(2);

    fn test_options() -> ConsumeOptions {
        ConsumeOptions {
            prefetch: 1,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn create_test_broker() -> (Broker, TempDir) {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(dir.path()).unwrap();
        broker.declare_queue("content-generation").unwrap();
        (broker, dir)
    }

    #[tokio::test]
    async fn publish_consume_ack() {
        let (broker, _dir) = create_test_broker();
        broker
            .publish(
                "content-generation",
                &TestPayload { job: 1 },
                PublishOptions::default(),
            )
            .unwrap();

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();
        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();

        assert_eq!(delivery.attempt(), 1);
        assert_eq!(
            delivery.payload::<TestPayload>().unwrap(),
            TestPayload { job: 1 }
        );

        delivery.ack().unwrap();
        assert_eq!(broker.queue_depth("content-generation").unwrap(), 0);

        let second = timeout(Duration::from_millis(100), consumer.recv()).await;
        assert!(second.is_err(), "queue should be empty after ack");
        consumer.stop().await;
    }

    #[tokio::test]
    async fn unacked_delivery_is_redelivered() {
        let (broker, _dir) = create_test_broker();
        let id = broker
            .publish(
                "content-generation",
                &TestPayload { job: 7 },
                PublishOptions::default(),
            )
            .unwrap();

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();

        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        assert_eq!(delivery.envelope().id, id);
        drop(delivery); // Processing "crashed" before settling.

        let redelivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        assert_eq!(redelivery.envelope().id, id);
        assert_eq!(redelivery.attempt(), 1, "drop without nack keeps the attempt");
        redelivery.ack().unwrap();
        consumer.stop().await;
    }

    #[tokio::test]
    async fn nack_requeue_increments_attempt_and_delays() {
        let (broker, _dir) = create_test_broker();
        broker
            .publish(
                "content-generation",
                &TestPayload { job: 2 },
                PublishOptions::default(),
            )
            .unwrap();

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();
        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        delivery
            .nack_requeue(Some(Duration::from_millis(150)))
            .unwrap();

        // Not redelivered before the delay elapses.
        let early = timeout(Duration::from_millis(50), consumer.recv()).await;
        assert!(early.is_err());

        let redelivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        assert_eq!(redelivery.attempt(), 2);
        redelivery.ack().unwrap();
        consumer.stop().await;
    }

    #[tokio::test]
    async fn nack_dead_letter_moves_message() {
        let (broker, _dir) = create_test_broker();
        broker
            .publish(
                "content-generation",
                &TestPayload { job: 3 },
                PublishOptions::default(),
            )
            .unwrap();

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();
        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        delivery.nack_dead_letter("provider rejected prompt").unwrap();

        assert_eq!(broker.queue_depth("content-generation").unwrap(), 0);

        let records = broker.dead_letters("content-generation", 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].error, "provider rejected prompt");
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].queue, "content-generation");
        consumer.stop().await;
    }

    #[tokio::test]
    async fn prefetch_bounds_in_flight_deliveries() {
        let (broker, _dir) = create_test_broker();
        for job in 0..3 {
            broker
                .publish(
                    "content-generation",
                    &TestPayload { job },
                    PublishOptions::default(),
                )
                .unwrap();
        }

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();

        let first = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        let blocked = timeout(Duration::from_millis(100), consumer.recv()).await;
        assert!(blocked.is_err(), "prefetch=1 must block a second delivery");

        first.ack().unwrap();
        let second = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        second.ack().unwrap();
        consumer.stop().await;
    }

    #[tokio::test]
    async fn delayed_publish_withholds_delivery() {
        let (broker, _dir) = create_test_broker();
        broker
            .publish(
                "content-generation",
                &TestPayload { job: 4 },
                PublishOptions {
                    delay: Some(Duration::from_millis(150)),
                },
            )
            .unwrap();

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();
        let early = timeout(Duration::from_millis(50), consumer.recv()).await;
        assert!(early.is_err());

        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        delivery.ack().unwrap();
        consumer.stop().await;
    }

    #[tokio::test]
    async fn two_consumers_never_share_a_delivery() {
        let (broker, _dir) = create_test_broker();
        let first_id = broker
            .publish(
                "content-generation",
                &TestPayload { job: 1 },
                PublishOptions::default(),
            )
            .unwrap();
        let second_id = broker
            .publish(
                "content-generation",
                &TestPayload { job: 2 },
                PublishOptions::default(),
            )
            .unwrap();

        let mut c1 = broker
            .consume("content-generation", test_options())
            .unwrap();
        let mut c2 = broker
            .consume("content-generation", test_options())
            .unwrap();

        let d1 = timeout(RECV_WAIT, c1.recv()).await.unwrap().unwrap();
        let d2 = timeout(RECV_WAIT, c2.recv()).await.unwrap().unwrap();

        let mut ids = vec![d1.envelope().id, d2.envelope().id];
        ids.sort_unstable();
        let mut expected = vec![first_id, second_id];
        expected.sort_unstable();
        assert_eq!(ids, expected);

        d1.ack().unwrap();
        d2.ack().unwrap();
        c1.stop().await;
        c2.stop().await;
    }

    #[tokio::test]
    async fn messages_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let broker = Broker::open(dir.path()).unwrap();
            broker.declare_queue("content-generation").unwrap();
            broker
                .publish(
                    "content-generation",
                    &TestPayload { job: 9 },
                    PublishOptions::default(),
                )
                .unwrap();
        }

        let broker = Broker::open(dir.path()).unwrap();
        broker.declare_queue("content-generation").unwrap();
        assert_eq!(broker.queue_depth("content-generation").unwrap(), 1);

        let mut consumer = broker
            .consume("content-generation", test_options())
            .unwrap();
        let delivery = timeout(RECV_WAIT, consumer.recv()).await.unwrap().unwrap();
        assert_eq!(
            delivery.payload::<TestPayload>().unwrap(),
            TestPayload { job: 9 }
        );
        delivery.ack().unwrap();
        consumer.stop().await;
    }

    #[tokio::test]
    async fn publish_to_undeclared_queue_fails() {
        let (broker, _dir) = create_test_broker();
        let result = broker.publish("nope", &TestPayload { job: 0 }, PublishOptions::default());
        assert!(matches!(result, Err(QueueError::UnknownQueue(_))));
    }

    #[test]
    fn declare_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(dir.path()).unwrap();
        assert!(matches!(
            broker.declare_queue(""),
            Err(QueueError::InvalidQueueName(_))
        ));
        assert!(matches!(
            broker.declare_queue("jobs.dlq"),
            Err(QueueError::InvalidQueueName(_))
        ));
    }
}
