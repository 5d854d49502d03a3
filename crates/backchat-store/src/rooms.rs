//! Room metadata store.
//!
//! Owns the Room records plus the denormalized `participantCount` /
//! `messageCount` counters that every join, leave and message save flows
//! through. Counter maintenance is exposed crate-internally so the member and
//! message stores keep the room's `lastActivity` and sliding TTL fresh on
//! each mutation.

use std::sync::Arc;

use backchat_common::{now_ms, ttl_seconds, Error, Result};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::model::{from_item, to_item, NewRoom, Room, RoomSummary};
use crate::table::{Condition, Item, TableClient, Update};

#[derive(Clone)]
pub struct RoomStore {
    table: Arc<dyn TableClient>,
    config: Arc<StoreConfig>,
}

impl RoomStore {
    pub(crate) fn new(table: Arc<dyn TableClient>, config: Arc<StoreConfig>) -> Self {
        Self { table, config }
    }

    fn key(room_id: &str) -> Item {
        let mut key = Item::new();
        key.insert("id".into(), Value::from(room_id));
        key
    }

    pub(crate) fn fresh_ttl(&self, now: i64) -> i64 {
        ttl_seconds(now, self.config.max_session_ttl_ms, self.config.max_session_ttl_ms)
    }

    /// Insert a new room. `AlreadyExists` when the id is taken — a hard
    /// uniqueness guarantee backed by a conditional write, not best-effort.
    #[instrument(level = "debug", skip(self, new))]
    pub async fn create_room(&self, new: NewRoom) -> Result<Room> {
        let now = now_ms();
        let room = Room {
            id: new.id,
            name: new.name,
            owner_id: new.owner_id,
            settings: new.settings,
            created_at: now,
            last_activity: now,
            participant_count: 0,
            message_count: 0,
            expires_at: self.fresh_ttl(now),
        };
        debug!("🔧 Creating room {}", room.id);
        let item = to_item(&room)?;
        let guard = Condition::AttributeNotExists(vec!["id".into()]);
        match self
            .table
            .put_item(&self.config.rooms_table, item, Some(guard))
            .await
        {
            Ok(()) => {
                info!("✅ Room {} created", room.id);
                Ok(room)
            }
            Err(Error::Conflict(_)) => {
                Err(Error::AlreadyExists(format!("room {}", room.id)))
            }
            Err(e) => Err(e),
        }
    }

    /// Point lookup; absent rooms are `None`, not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let item = self
            .table
            .get_item(&self.config.rooms_table, &Self::key(room_id))
            .await?;
        item.map(from_item).transpose()
    }

    /// Full scan of a minimal projection, newest activity first. Acceptable
    /// only while the live-room working set stays small; freshness is weak.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        let items = self
            .table
            .scan(
                &self.config.rooms_table,
                Some(vec![
                    "id".into(),
                    "name".into(),
                    "participantCount".into(),
                    "lastActivity".into(),
                ]),
            )
            .await?;
        let mut rooms: Vec<RoomSummary> =
            items.into_iter().map(from_item).collect::<Result<_>>()?;
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rooms)
    }

    /// Apply counter deltas and refresh `lastActivity` and the sliding TTL,
    /// guarded on the room still existing. Returns the post-update room.
    pub(crate) async fn bump_counters(
        &self,
        room_id: &str,
        participants: i64,
        messages: i64,
    ) -> Result<Room> {
        let now = now_ms();
        let mut update = Update::default()
            .set("lastActivity", json!(now))
            .set("expiresAt", json!(self.fresh_ttl(now)))
            .when(Condition::AttributeExists("id".into()));
        if participants != 0 {
            update = update.add("participantCount", participants);
        }
        if messages != 0 {
            update = update.add("messageCount", messages);
        }
        let item = self
            .table
            .update_item(&self.config.rooms_table, &Self::key(room_id), update)
            .await?;
        from_item(item)
    }

    /// Absolute reset used by retention trimming. A room that vanished while
    /// the trim ran is tolerated; its expiry already won the race.
    pub(crate) async fn reset_message_count(&self, room_id: &str, value: i64) -> Result<()> {
        let update = Update::default()
            .set("messageCount", json!(value))
            .when(Condition::AttributeExists("id".into()));
        match self
            .table
            .update_item(&self.config.rooms_table, &Self::key(room_id), update)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_gone() => {
                warn!("⚠️ Room {room_id} vanished during retention reset");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the Room record, treating "already gone" as success.
    pub(crate) async fn delete_room_record(&self, room_id: &str) -> Result<()> {
        match self
            .table
            .delete_item(&self.config.rooms_table, &Self::key(room_id))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_gone() => {
                warn!("⚠️ Room {room_id} already gone while expiring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
