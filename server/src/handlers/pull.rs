//! Pull handler - serves records changed since a client's watermark.

use crate::config::Config;
use crate::db::RecordTable;
use crate::error::{AppError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tether_engine::Timestamp;

/// Query parameters for pull sync.
#[derive(Debug, Default, Deserialize)]
pub struct PullQuery {
    /// Watermark from the client's last successful cycle (empty for initial sync)
    pub after: Option<String>,
}

impl PullQuery {
    fn watermark(&self) -> Result<Option<Timestamp>> {
        match self.after.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Timestamp::parse(raw)
                .map(Some)
                .map_err(|_| AppError::BadRequest(format!("invalid after timestamp: {raw}"))),
        }
    }
}

/// Process a pull request for one collection.
pub fn handle_pull(
    table: &RecordTable,
    config: &Config,
    collection: &str,
    query: &PullQuery,
) -> Result<Value> {
    let after = query.watermark()?;
    let records = table.changed_since(collection, after);

    tracing::debug!(
        collection,
        after = ?after.map(|t| t.to_string()),
        count = records.len(),
        "serving pull"
    );

    Ok(match &config.read_envelope {
        None => Value::Array(records),
        Some(path) => {
            let count = records.len();
            let mut body = path.wrap(Value::Array(records));
            if let Value::Object(map) = &mut body {
                map.entry("count").or_insert(json!(count));
            }
            body
        }
    })
}
