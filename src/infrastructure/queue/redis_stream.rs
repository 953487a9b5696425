//! Redis Streams submission queue.
//!
//! One stream carries every submission. Each named queue is a consumer group
//! on that stream, so every group sees every entry:
//!
//! - publish: `XADD <stream> MAXLEN ~ n * payload <json>`
//! - receive: `XAUTOCLAIM` for entries idle past the ack timeout, then
//!   `XREADGROUP ... STREAMS <stream> >` for new ones
//! - ack: `XACK`
//! - nack: nothing; the entry stays in the pending list until reclaimed
//!
//! Reads are issued without `BLOCK` and polled, so one multiplexed
//! connection can serve publishers and every worker at once.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::domain::{QueueDelivery, QueueError, SubmissionQueue};

/// Field holding the JSON payload inside a stream entry.
const PAYLOAD_FIELD: &str = "payload";

/// Pause between empty polls while a receive is waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Broker(e.to_string())
    }
}

#[derive(Clone)]
pub struct RedisStreamQueue {
    conn: ConnectionManager,
    stream: String,
    block: Duration,
    ack_timeout: Duration,
    max_len: usize,
}

impl RedisStreamQueue {
    pub fn new(
        conn: ConnectionManager,
        stream: impl Into<String>,
        block: Duration,
        ack_timeout: Duration,
        max_len: usize,
    ) -> Self {
        Self {
            conn,
            stream: stream.into(),
            block,
            ack_timeout,
            max_len,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Take over one entry of `group` idle longer than the ack timeout.
    async fn reclaim(&self, group: &str, consumer: &str) -> Result<Option<QueueDelivery>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(group)
            .arg(consumer)
            .arg(self.ack_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(entry) = reply.claimed.into_iter().next() else {
            return Ok(None);
        };
        let delivery_count = self.delivery_count(group, &entry.id).await?;
        debug!(
            stream = %self.stream,
            group = %group,
            entry_id = %entry.id,
            delivery_count,
            "Reclaimed pending entry"
        );
        to_delivery(group, entry, delivery_count).map(Some)
    }

    /// Read one entry never delivered to `group`.
    async fn read_new(&self, group: &str, consumer: &str) -> Result<Option<QueueDelivery>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        match entry {
            Some(entry) => to_delivery(group, entry, 1).map(Some),
            None => Ok(None),
        }
    }

    async fn delivery_count(&self, group: &str, entry_id: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(group)
            .arg(entry_id)
            .arg(entry_id)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        Ok(reply
            .ids
            .first()
            .map_or(1, |pending| pending.times_delivered as u64))
    }
}

fn to_delivery(group: &str, entry: StreamId, delivery_count: u64) -> Result<QueueDelivery, QueueError> {
    let payload: String = entry.get(PAYLOAD_FIELD).ok_or_else(|| {
        QueueError::Protocol(format!("entry {} has no {} field", entry.id, PAYLOAD_FIELD))
    })?;

    Ok(QueueDelivery {
        id: entry.id,
        group: group.to_string(),
        payload,
        delivery_count,
    })
}

#[async_trait]
impl SubmissionQueue for RedisStreamQueue {
    #[instrument(skip(self, payload), fields(stream = %self.stream))]
    async fn publish(&self, payload: &str) -> Result<String, QueueError> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        debug!(entry_id = %id, "Submission published");
        Ok(id)
    }

    async fn ensure_group(&self, group: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                debug!(stream = %self.stream, group = %group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn receive(&self, group: &str, consumer: &str) -> Result<Option<QueueDelivery>, QueueError> {
        let deadline = Instant::now() + self.block;
        loop {
            if let Some(delivery) = self.reclaim(group, consumer).await? {
                return Ok(Some(delivery));
            }
            if let Some(delivery) = self.read_new(group, consumer).await? {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, delivery: &QueueDelivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let acked: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&delivery.group)
            .arg(&delivery.id)
            .query_async(&mut conn)
            .await?;

        if acked == 0 {
            warn!(
                group = %delivery.group,
                entry_id = %delivery.id,
                "Ack for an entry that was not pending"
            );
        }
        Ok(())
    }

    async fn nack(&self, delivery: &QueueDelivery) -> Result<(), QueueError> {
        debug!(
            group = %delivery.group,
            entry_id = %delivery.id,
            ack_timeout_ms = self.ack_timeout.as_millis() as u64,
            "Entry left pending for redelivery"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(fields: &[(&str, &str)]) -> StreamId {
        StreamId {
            id: "1718000000000-0".to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), redis::Value::BulkString(v.as_bytes().to_vec())))
                .collect::<HashMap<_, _>>(),
            milliseconds_elapsed_from_delivery: None,
            delivered_count: None,
        }
    }

    #[test]
    fn test_entry_payload_becomes_delivery() {
        let delivery = to_delivery("chat:message:storage", entry(&[("payload", "{}")]), 3).unwrap();
        assert_eq!(delivery.id, "1718000000000-0");
        assert_eq!(delivery.payload, "{}");
        assert!(delivery.is_redelivery());
    }

    #[test]
    fn test_entry_without_payload_is_protocol_error() {
        let err = to_delivery("g", entry(&[("body", "{}")]), 1).unwrap_err();
        assert!(matches!(err, QueueError::Protocol(_)));
    }

    #[test]
    fn test_connection_errors_become_broker_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = QueueError::from(redis::RedisError::from(io));
        assert!(matches!(err, QueueError::Broker(msg) if msg.contains("refused")));
    }
}
