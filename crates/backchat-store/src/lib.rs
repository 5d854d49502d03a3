// =============================================================================
// Backchat Store Library
// =============================================================================
//
// Project: Backchat - Real-Time Chat Room Persistence Core
// License: Apache 2.0 / MIT
//
// Description:
//   Persistence and consistency layer for chat rooms, memberships, message
//   history and presence sessions, built on a pluggable document-table
//   service with partition/sort-key addressing, conditional writes, TTL
//   attributes and size-limited batched writes. The protocol layer is the
//   sole caller; this crate exposes no listener or CLI of its own.
//
// =============================================================================

pub mod batch;
pub mod config;
pub mod lifecycle;
pub mod members;
pub mod memory;
pub mod messages;
pub mod model;
pub mod rooms;
pub mod sessions;
pub mod table;

use std::sync::Arc;

use backchat_common::Result;
use tracing::{info, instrument};

pub use backchat_common::{Error, Result as StoreResult};
pub use batch::{batch_write_chunked, MAX_BATCH_ITEMS};
pub use config::StoreConfig;
pub use lifecycle::delete_all_room_items;
pub use members::MemberStore;
pub use memory::MemoryTableClient;
pub use messages::{MessageStore, DEFAULT_FETCH_LIMIT, MESSAGE_ID_INDEX, MESSAGE_RETENTION_LIMIT};
pub use model::{
    ChatUser, Member, Message, NewMessage, NewRoom, Room, RoomSummary, SessionUser, UserSession,
};
pub use rooms::RoomStore;
pub use sessions::SessionStore;
pub use table::{
    Condition, Item, QueryRequest, QueryResponse, TableClient, Update, UpdateAction, WriteRequest,
};

/// Facade over the entity stores: the whole surface the protocol layer calls
/// per inbound event. Every operation is one or more round trips to the
/// external table service; no in-process locks or caches exist here, so
/// concurrent calls coordinate only through the service's conditional
/// writes.
#[derive(Clone)]
pub struct ChatStore {
    table: Arc<dyn TableClient>,
    config: Arc<StoreConfig>,
    rooms: RoomStore,
    members: MemberStore,
    messages: MessageStore,
    sessions: SessionStore,
}

impl ChatStore {
    /// Wire the stores over a table client and validated configuration.
    pub fn new(table: Arc<dyn TableClient>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let rooms = RoomStore::new(table.clone(), config.clone());
        let members = MemberStore::new(table.clone(), config.clone(), rooms.clone());
        let messages = MessageStore::new(table.clone(), config.clone(), rooms.clone());
        let sessions = SessionStore::new(table.clone(), config.clone());
        Ok(Self {
            table,
            config,
            rooms,
            members,
            messages,
            sessions,
        })
    }

    /// Wire the stores from `BACKCHAT_`-prefixed environment variables.
    pub fn from_env(table: Arc<dyn TableClient>) -> Result<Self> {
        let config = StoreConfig::from_env()?;
        Self::new(table, config)
    }

    pub async fn create_room(&self, new: NewRoom) -> Result<Room> {
        self.rooms.create_room(new).await
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        self.rooms.get_room(room_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        self.rooms.list_rooms().await
    }

    pub async fn add_member(&self, room_id: &str, user: &ChatUser) -> Result<i64> {
        self.members.add_member(room_id, user).await
    }

    pub async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<i64> {
        self.members.remove_member(room_id, user_id).await
    }

    pub async fn list_members(&self, room_id: &str) -> Result<Vec<ChatUser>> {
        self.members.list_members(room_id).await
    }

    pub async fn save_message(&self, room_id: &str, new: NewMessage) -> Result<Message> {
        self.messages.save_message(room_id, new).await
    }

    pub async fn fetch_messages(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        self.messages.fetch_messages(room_id, limit).await
    }

    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<bool> {
        self.messages.delete_message(room_id, message_id).await
    }

    pub async fn set_user_session(&self, user: &SessionUser) -> Result<UserSession> {
        self.sessions.set_user_session(user).await
    }

    pub async fn remove_user_session(&self, user_id: &str) -> Result<()> {
        self.sessions.remove_user_session(user_id).await
    }

    /// Remove the Room record (already-gone is success) while concurrently
    /// cascading deletion of its member and message rows. Not atomic: a
    /// failure mid-cascade leaves orphans that self-expire via their own
    /// TTL.
    #[instrument(level = "debug", skip(self))]
    pub async fn expire_room(&self, room_id: &str) -> Result<()> {
        futures::try_join!(
            self.rooms.delete_room_record(room_id),
            delete_all_room_items(
                self.table.as_ref(),
                &self.config.members_table,
                "userId",
                room_id,
            ),
            delete_all_room_items(
                self.table.as_ref(),
                &self.config.messages_table,
                "sentAt",
                room_id,
            ),
        )?;
        info!("✅ Room {room_id} expired");
        Ok(())
    }
}
