//! Inventory export
//!
//! Writes the learned API inventory as pretty-printed JSON:
//!
//! ```json
//! {
//!   "entryCount": 1,
//!   "entries": [
//!     {
//!       "method": "GET",
//!       "path": "/users/42",
//!       "request_schema": "{}",
//!       "response_schema": "{\"email\":\"\"}",
//!       "contains_pii": true
//!     }
//!   ]
//! }
//! ```

use serde::Serialize;
use std::io::Write;

use crate::domain::ExportError;
use crate::schema::ApiSchema;

#[derive(Debug, Serialize)]
struct InventoryExport<'a> {
    #[serde(rename = "entryCount")]
    entry_count: usize,
    entries: &'a [ApiSchema],
}

/// Write `entries` to `writer` as JSON
///
/// # Errors
/// Returns an error if serialization or the underlying write fails
pub fn export_inventory<W: Write>(
    entries: &[ApiSchema],
    mut writer: W,
) -> Result<(), ExportError> {
    let export = InventoryExport {
        entry_count: entries.len(),
        entries,
    };
    serde_json::to_writer_pretty(&mut writer, &export)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
