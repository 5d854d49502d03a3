// =============================================================================
// Backchat Common Library
// =============================================================================
//
// Project: Backchat - Real-Time Chat Room Persistence Core
// License: Apache 2.0 / MIT
//
// Description:
//   Shared building blocks for the Backchat persistence layer: the error
//   taxonomy used across every store, and the epoch/TTL time helpers that
//   drive sliding expiry on rooms, members, messages and presence sessions.
//
// =============================================================================

pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{now_ms, ttl_seconds, MIN_TTL_MS};
