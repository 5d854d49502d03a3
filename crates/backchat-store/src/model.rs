//! Entity types stored in the document tables.
//!
//! Field names serialize to the wire attribute names (`participantCount`,
//! `lastActivity`, …) so a struct and its table item are the same shape. All
//! timestamps are epoch milliseconds except `expiresAt`, which the table
//! service requires in epoch seconds.

use backchat_common::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::table::Item;

/// Denormalized user snapshot carried by member listings and message senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
    /// Role, e.g. "instructor" or "student". Opaque to this core.
    #[serde(rename = "type")]
    pub user_type: String,
}

/// A chat room with denormalized counters.
///
/// `participant_count` is decremented without a floor at the store, so the
/// raw attribute can read negative after racing leaves; callers surfacing it
/// clamp at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Opaque settings blob, passed through untouched.
    #[serde(default)]
    pub settings: Value,
    pub created_at: i64,
    pub last_activity: i64,
    pub participant_count: i64,
    pub message_count: i64,
    pub expires_at: i64,
}

/// Input to `create_room`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub settings: Value,
}

/// Minimal projection returned by `list_rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub participant_count: i64,
    #[serde(default)]
    pub last_activity: i64,
}

/// One membership record, keyed `(roomId, userId)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub joined_at: i64,
    pub expires_at: i64,
}

/// Input to `save_message`; `id` is the externally-visible message id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub text: String,
    pub sender: ChatUser,
}

/// One stored message, keyed `(roomId, sentAt)`.
///
/// `sent_at` values are strictly increasing within a room up to the
/// collision-retry bound; `timestamp` mirrors the resolved `sent_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub room_id: String,
    pub sent_at: i64,
    pub message_id: String,
    pub text: String,
    pub sender: ChatUser,
    pub timestamp: i64,
    pub expires_at: i64,
}

/// Presence input to `set_user_session`. A `None` room is written as an
/// explicit null, never omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub current_room_id: Option<String>,
}

/// One presence record per connected user, keyed `userId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub current_room_id: Option<String>,
    pub last_seen: i64,
    pub expires_at: i64,
}

pub(crate) fn to_item<T: Serialize>(value: &T) -> Result<Item> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(format!(
            "expected an object item, got {other}"
        ))),
    }
}

pub(crate) fn from_item<T: DeserializeOwned>(item: Item) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(item))?)
}
