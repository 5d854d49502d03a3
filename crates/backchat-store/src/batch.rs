//! Chunked batch writer.
//!
//! The table service rejects batched writes above [`MAX_BATCH_ITEMS`]
//! requests per call, so unbounded request lists are split into consecutive
//! chunks and flushed one at a time. Chunks are deliberately sequenced rather
//! than issued in parallel; a failed chunk aborts the rest and propagates.

use backchat_common::Result;
use tracing::debug;

use crate::table::{TableClient, WriteRequest};

/// Per-call item limit of the external batched-write operation.
pub const MAX_BATCH_ITEMS: usize = 25;

/// Issue `requests` against `table_name` in order, at most [`MAX_BATCH_ITEMS`]
/// per call. No compensation is attempted beyond what the underlying call
/// itself retries.
pub async fn batch_write_chunked(
    table: &dyn TableClient,
    table_name: &str,
    requests: Vec<WriteRequest>,
) -> Result<()> {
    if requests.is_empty() {
        return Ok(());
    }
    let total = requests.len();
    debug!(
        "🔧 batch write: {} requests to {} in {} chunk(s)",
        total,
        table_name,
        total.div_ceil(MAX_BATCH_ITEMS)
    );
    for chunk in requests.chunks(MAX_BATCH_ITEMS) {
        table.batch_write(table_name, chunk.to_vec()).await?;
    }
    Ok(())
}
