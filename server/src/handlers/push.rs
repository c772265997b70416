//! Push handler - accepts one record submission at a time.

use crate::db::RecordTable;
use crate::error::{AppError, Result};
use serde_json::Value;
use tether_engine::Timestamp;

/// Store a submitted record, stamped with the server's clock.
///
/// Returns the record as stored so clients can see the assigned key and stamp.
pub fn handle_push(
    table: &RecordTable,
    collection: &str,
    body: Value,
    now: Timestamp,
) -> Result<Value> {
    if !body.is_object() {
        return Err(AppError::BadRequest(format!(
            "expected a JSON object for {collection}"
        )));
    }
    Ok(table.upsert(collection, body, now).payload)
}
