//! Room lifecycle controller.
//!
//! Cascading cleanup of a room's dependent records. The cascade is
//! deliberately not atomic: a crash mid-sweep can leave orphaned member or
//! message rows after the Room record is gone, and those rows still carry
//! their own TTL and self-expire. This is an accepted consistency
//! relaxation.

use backchat_common::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::batch::batch_write_chunked;
use crate::table::{QueryRequest, TableClient, WriteRequest};

/// Delete every item belonging to `room_id` in `table_name`, paginating a
/// keys-only query and flushing each page through the chunked batch writer
/// until the store reports no further pages.
pub async fn delete_all_room_items(
    table: &dyn TableClient,
    table_name: &str,
    sort_key: &str,
    room_id: &str,
) -> Result<()> {
    let mut start_key = None;
    let mut removed = 0usize;
    loop {
        let page = table
            .query(
                table_name,
                QueryRequest::partition("roomId", Value::from(room_id))
                    .project(&["roomId", sort_key])
                    .start_after(start_key.take()),
            )
            .await?;
        let last_evaluated_key = page.last_evaluated_key;
        removed += page.items.len();
        let deletes: Vec<WriteRequest> = page.items.into_iter().map(WriteRequest::Delete).collect();
        batch_write_chunked(table, table_name, deletes).await?;
        match last_evaluated_key {
            Some(key) => {
                debug!("🔧 Cascade for room {room_id} continuing past {removed} item(s)");
                start_key = Some(key);
            }
            None => break,
        }
    }
    info!("✅ Removed {removed} item(s) for room {room_id} from {table_name}");
    Ok(())
}
