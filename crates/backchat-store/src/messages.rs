//! Append-only per-room message log.
//!
//! Messages are keyed `(roomId, sentAt)` with `sentAt` doubling as the sort
//! key, so two writers landing in the same millisecond collide. The save path
//! resolves collisions by nudging `sentAt` forward and retrying, bounded at
//! [`SENT_AT_ATTEMPTS`]; beyond four simultaneous writers ordering degrades
//! to best effort. Retention trims the log back to
//! [`MESSAGE_RETENTION_LIMIT`] whenever the counter overshoots it.

use std::sync::Arc;

use backchat_common::{now_ms, Error, Result};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::batch::batch_write_chunked;
use crate::config::StoreConfig;
use crate::model::{from_item, to_item, Message, NewMessage};
use crate::rooms::RoomStore;
use crate::table::{Condition, Item, QueryRequest, TableClient, WriteRequest};

/// Soft cap on stored messages per room.
pub const MESSAGE_RETENTION_LIMIT: i64 = 200;

/// Secondary lookup path for delete-by-`messageId`. Not room-scoped, hence
/// the client-side `roomId` filter in [`MessageStore::delete_message`].
pub const MESSAGE_ID_INDEX: &str = "messageId-index";

/// Default page size for `fetch_messages`.
pub const DEFAULT_FETCH_LIMIT: usize = 50;

/// Total insert attempts per message: the original write plus three
/// collision retries, each bumping `sentAt` by one. The final attempt is
/// unconditional, so retries are best-effort collision avoidance, not a
/// guarantee.
const SENT_AT_ATTEMPTS: u32 = 4;

#[derive(Clone)]
pub struct MessageStore {
    table: Arc<dyn TableClient>,
    config: Arc<StoreConfig>,
    rooms: RoomStore,
}

impl MessageStore {
    pub(crate) fn new(
        table: Arc<dyn TableClient>,
        config: Arc<StoreConfig>,
        rooms: RoomStore,
    ) -> Self {
        Self { table, config, rooms }
    }

    fn key(room_id: &str, sent_at: i64) -> Item {
        let mut key = Item::new();
        key.insert("roomId".into(), Value::from(room_id));
        key.insert("sentAt".into(), Value::from(sent_at));
        key
    }

    /// Append a message, resolve its `sentAt`, bump the room's counter and
    /// trim retention. Returns the stored message with `timestamp` resolved.
    #[instrument(level = "debug", skip(self, new), fields(message_id = %new.id))]
    pub async fn save_message(&self, room_id: &str, new: NewMessage) -> Result<Message> {
        self.save_from(room_id, new, now_ms()).await
    }

    async fn save_from(&self, room_id: &str, new: NewMessage, base_ms: i64) -> Result<Message> {
        let message = self.insert_with_retry(room_id, new, base_ms).await?;
        match self.rooms.bump_counters(room_id, 0, 1).await {
            Ok(room) if room.message_count > MESSAGE_RETENTION_LIMIT => {
                self.trim_retention(room_id, room.message_count).await?;
            }
            Ok(_) => {}
            // The room's own expiry already achieved what a counter update
            // would have protected; the message itself is durable.
            Err(e) if e.is_gone() => {
                debug!("🔧 Room {room_id} gone during message count update");
            }
            Err(e) => return Err(e),
        }
        Ok(message)
    }

    async fn insert_with_retry(
        &self,
        room_id: &str,
        new: NewMessage,
        base_ms: i64,
    ) -> Result<Message> {
        let mut sent_at = base_ms;
        let mut attempt = 1;
        loop {
            let message = Message {
                room_id: room_id.to_owned(),
                sent_at,
                message_id: new.id.clone(),
                text: new.text.clone(),
                sender: new.sender.clone(),
                timestamp: sent_at,
                expires_at: self.rooms.fresh_ttl(sent_at),
            };
            let guard = if attempt < SENT_AT_ATTEMPTS {
                Some(Condition::AttributeNotExists(vec![
                    "roomId".into(),
                    "sentAt".into(),
                ]))
            } else {
                None
            };
            match self
                .table
                .put_item(&self.config.messages_table, to_item(&message)?, guard)
                .await
            {
                Ok(()) => return Ok(message),
                Err(Error::Conflict(_)) if attempt < SENT_AT_ATTEMPTS => {
                    warn!(
                        "⚠️ sentAt collision in room {room_id} at {sent_at} (attempt {attempt})"
                    );
                    sent_at += 1;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete the oldest `count - limit` messages and reset the counter to
    /// exactly the limit (absolute reset, not a decrement).
    async fn trim_retention(&self, room_id: &str, count: i64) -> Result<()> {
        let excess = (count - MESSAGE_RETENTION_LIMIT) as usize;
        info!("🔧 Trimming {excess} message(s) from room {room_id}");
        let page = self
            .table
            .query(
                &self.config.messages_table,
                QueryRequest::partition("roomId", Value::from(room_id))
                    .limit(excess)
                    .project(&["roomId", "sentAt"]),
            )
            .await?;
        let deletes: Vec<WriteRequest> = page.items.into_iter().map(WriteRequest::Delete).collect();
        batch_write_chunked(self.table.as_ref(), &self.config.messages_table, deletes).await?;
        self.rooms
            .reset_message_count(room_id, MESSAGE_RETENTION_LIMIT)
            .await
    }

    /// The most recent `limit` messages in ascending chronological order.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_messages(&self, room_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let response = self
            .table
            .query(
                &self.config.messages_table,
                QueryRequest::partition("roomId", Value::from(room_id))
                    .descending()
                    .limit(limit.unwrap_or(DEFAULT_FETCH_LIMIT)),
            )
            .await?;
        let mut messages: Vec<Message> = response
            .items
            .into_iter()
            .map(from_item)
            .collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Delete by externally-visible `messageId`. Resolves the `(roomId,
    /// sentAt)` key through the secondary index and filters for the requested
    /// room, since `messageId` values are not room-scoped. Returns whether a
    /// message was deleted; an unknown id is not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<bool> {
        let response = self
            .table
            .query(
                &self.config.messages_table,
                QueryRequest::partition("messageId", Value::from(message_id))
                    .on_index(MESSAGE_ID_INDEX)
                    .limit(1),
            )
            .await?;
        let matched = response
            .items
            .into_iter()
            .find(|item| item.get("roomId").and_then(Value::as_str) == Some(room_id));
        let Some(item) = matched else {
            debug!("🔧 Message {message_id} not found in room {room_id}");
            return Ok(false);
        };
        let sent_at = item
            .get("sentAt")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Validation(format!("message {message_id} lacks sentAt")))?;
        self.table
            .delete_item(&self.config.messages_table, &Self::key(room_id, sent_at))
            .await?;
        match self.rooms.bump_counters(room_id, 0, -1).await {
            Ok(_) => {}
            Err(e) if e.is_gone() => {
                debug!("🔧 Room {room_id} gone during message count decrement");
            }
            Err(e) => return Err(e),
        }
        info!("✅ Deleted message {message_id} from room {room_id}");
        Ok(true)
    }
}
