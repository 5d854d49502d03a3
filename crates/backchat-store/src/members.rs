//! Room membership store.
//!
//! Membership rows are keyed `(roomId, userId)` with at most one row per
//! pair; join and leave keep the room's `participantCount` in step. The
//! duplicate-join counter policy is deliberate: see
//! `StoreConfig::count_duplicate_joins`.

use std::sync::Arc;

use backchat_common::{now_ms, Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::StoreConfig;
use crate::model::{from_item, to_item, ChatUser, Member};
use crate::rooms::RoomStore;
use crate::table::{Condition, Item, QueryRequest, TableClient};

#[derive(Clone)]
pub struct MemberStore {
    table: Arc<dyn TableClient>,
    config: Arc<StoreConfig>,
    rooms: RoomStore,
}

/// Member row narrowed to the attributes `list_members` projects.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberProjection {
    user_id: String,
    username: String,
    #[serde(rename = "type")]
    user_type: String,
}

impl MemberStore {
    pub(crate) fn new(
        table: Arc<dyn TableClient>,
        config: Arc<StoreConfig>,
        rooms: RoomStore,
    ) -> Self {
        Self { table, config, rooms }
    }

    fn key(room_id: &str, user_id: &str) -> Item {
        let mut key = Item::new();
        key.insert("roomId".into(), Value::from(room_id));
        key.insert("userId".into(), Value::from(user_id));
        key
    }

    /// Add `user` to the room and return the resulting participant count.
    ///
    /// The row insert is conditional on `(roomId, userId)` being absent; a
    /// duplicate join is a harmless no-op for the row itself. Whether the
    /// counter still moves on a duplicate is governed by
    /// `count_duplicate_joins`.
    #[instrument(level = "debug", skip(self, user), fields(user_id = %user.id))]
    pub async fn add_member(&self, room_id: &str, user: &ChatUser) -> Result<i64> {
        let now = now_ms();
        let member = Member {
            room_id: room_id.to_owned(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            user_type: user.user_type.clone(),
            joined_at: now,
            expires_at: self.rooms.fresh_ttl(now),
        };
        let guard = Condition::AttributeNotExists(vec!["roomId".into(), "userId".into()]);
        let inserted = match self
            .table
            .put_item(&self.config.members_table, to_item(&member)?, Some(guard))
            .await
        {
            Ok(()) => true,
            Err(Error::Conflict(_)) => {
                warn!("⚠️ Duplicate join: {} already in room {room_id}", user.id);
                false
            }
            Err(e) => return Err(e),
        };
        let delta = if inserted || self.config.count_duplicate_joins {
            1
        } else {
            0
        };
        match self.rooms.bump_counters(room_id, delta, 0).await {
            Ok(room) => {
                debug!(
                    "🔧 Room {room_id} participant count now {}",
                    room.participant_count
                );
                Ok(room.participant_count.max(0))
            }
            Err(e) if e.is_gone() => Err(Error::NotFound(format!("room {room_id}"))),
            Err(e) => Err(e),
        }
    }

    /// Remove a member and return the resulting participant count, clamped to
    /// zero at this read side (the stored attribute is left unclamped). A
    /// room that is already gone makes the decrement a no-op returning 0.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<i64> {
        self.table
            .delete_item(&self.config.members_table, &Self::key(room_id, user_id))
            .await?;
        match self.rooms.bump_counters(room_id, -1, 0).await {
            Ok(room) => Ok(room.participant_count.max(0)),
            Err(e) if e.is_gone() => {
                debug!("🔧 Room {room_id} already gone; leave becomes a no-op");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// All members of a room, projected to `{id, username, type}`.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_members(&self, room_id: &str) -> Result<Vec<ChatUser>> {
        let response = self
            .table
            .query(
                &self.config.members_table,
                QueryRequest::partition("roomId", Value::from(room_id))
                    .project(&["userId", "username", "type"]),
            )
            .await?;
        response
            .items
            .into_iter()
            .map(|item| {
                let member: MemberProjection = from_item(item)?;
                Ok(ChatUser {
                    id: member.user_id,
                    username: member.username,
                    user_type: member.user_type,
                })
            })
            .collect()
    }
}
