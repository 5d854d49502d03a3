//! Presence session store.
//!
//! One record per connected user, upserted on every presence update with a
//! short idle TTL that is independent from the room's long TTL. A user with
//! no current room gets an explicit null `currentRoomId`, never a missing
//! attribute.

use std::sync::Arc;

use backchat_common::{now_ms, ttl_seconds, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::model::{to_item, SessionUser, UserSession};
use crate::table::{Item, TableClient};

#[derive(Clone)]
pub struct SessionStore {
    table: Arc<dyn TableClient>,
    config: Arc<StoreConfig>,
}

impl SessionStore {
    pub(crate) fn new(table: Arc<dyn TableClient>, config: Arc<StoreConfig>) -> Self {
        Self { table, config }
    }

    fn key(user_id: &str) -> Item {
        let mut key = Item::new();
        key.insert("userId".into(), Value::from(user_id));
        key
    }

    /// Upsert the user's presence record, always overwriting `lastSeen` and
    /// the idle TTL.
    #[instrument(level = "debug", skip(self, user), fields(user_id = %user.id))]
    pub async fn set_user_session(&self, user: &SessionUser) -> Result<UserSession> {
        let now = now_ms();
        let session = UserSession {
            user_id: user.id.clone(),
            username: user.username.clone(),
            user_type: user.user_type.clone(),
            current_room_id: user.current_room_id.clone(),
            last_seen: now,
            expires_at: ttl_seconds(
                now,
                self.config.session_idle_timeout_ms,
                self.config.max_session_ttl_ms,
            ),
        };
        debug!("🔧 Refreshing presence for {}", session.user_id);
        self.table
            .put_item(&self.config.sessions_table, to_item(&session)?, None)
            .await?;
        Ok(session)
    }

    /// Drop the user's presence record. Deleting a nonexistent session is
    /// not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_user_session(&self, user_id: &str) -> Result<()> {
        self.table
            .delete_item(&self.config.sessions_table, &Self::key(user_id))
            .await
    }
}
