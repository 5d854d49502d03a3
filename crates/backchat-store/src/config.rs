//! Environment-sourced store configuration.
//!
//! Loaded once at startup through figment's `Env` provider with a
//! `BACKCHAT_` prefix. Table names have no defaults on purpose: a missing
//! name is a deployment mistake and aborts process start.

use backchat_common::{Error, Result};
use figment::{providers::Env, Figment};
use serde::Deserialize;
use tracing::{debug, error, info};

/// Long-TTL ceiling for room/member/message records: 24 hours.
fn default_max_session_ttl_ms() -> i64 {
    24 * 60 * 60 * 1000
}

/// Idle TTL for presence sessions: 30 minutes.
fn default_session_idle_timeout_ms() -> i64 {
    30 * 60 * 1000
}

/// Source behavior: duplicate joins still bump `participantCount`.
fn default_count_duplicate_joins() -> bool {
    true
}

/// Configuration for the persistence core.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Table holding Room records.
    pub rooms_table: String,
    /// Table holding Member records.
    pub members_table: String,
    /// Table holding Message records.
    pub messages_table: String,
    /// Table holding UserSession records.
    pub sessions_table: String,

    /// Ceiling (and default duration) of the long sliding TTL applied to
    /// rooms, members and messages, in milliseconds.
    #[serde(default = "default_max_session_ttl_ms")]
    pub max_session_ttl_ms: i64,

    /// Idle TTL applied to presence sessions, in milliseconds.
    #[serde(default = "default_session_idle_timeout_ms")]
    pub session_idle_timeout_ms: i64,

    /// Whether a duplicate join still increments `participantCount`.
    /// Defaults to the original counting of join events rather than
    /// distinct members.
    #[serde(default = "default_count_duplicate_joins")]
    pub count_duplicate_joins: bool,
}

impl StoreConfig {
    /// Load from `BACKCHAT_`-prefixed environment variables and validate.
    pub fn from_env() -> Result<Self> {
        debug!("🔧 Loading store configuration from environment");
        let config: StoreConfig = Figment::new()
            .merge(Env::prefixed("BACKCHAT_"))
            .extract()
            .map_err(|e| {
                error!("❌ Invalid store configuration: {e}");
                Error::Config(e.to_string())
            })?;
        config.validate()?;
        info!(
            "✅ Store configuration loaded (rooms={}, members={}, messages={}, sessions={})",
            config.rooms_table, config.members_table, config.messages_table, config.sessions_table
        );
        Ok(config)
    }

    /// Reject empty table names and non-positive TTL windows.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("rooms_table", &self.rooms_table),
            ("members_table", &self.members_table),
            ("messages_table", &self.messages_table),
            ("sessions_table", &self.sessions_table),
        ] {
            if value.trim().is_empty() {
                error!("❌ Missing table name: {name}");
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        if self.max_session_ttl_ms <= 0 || self.session_idle_timeout_ms <= 0 {
            return Err(Error::Config("TTL windows must be positive".into()));
        }
        Ok(())
    }
}
