use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::ResponseFormat;
use crate::Document;
use crate::DocumentId;
use crate::Result;

#[derive(Serialize)]
struct PutEntry<'a> {
    put: &'a DocumentId,
    fields: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct RemoveEntry<'a> {
    remove: &'a DocumentId,
}

/// Serializes one visited document: `{"id", "fields"}` inside the buffered
/// documents array, `{"put", "fields"}` as a line.
pub(crate) fn document_bytes(
    format: ResponseFormat,
    document: &Document,
) -> Result<Vec<u8>> {
    let bytes = match format {
        ResponseFormat::Buffered => serde_json::to_vec(document)?,
        ResponseFormat::Lines => serde_json::to_vec(&PutEntry {
            put: &document.id,
            fields: &document.fields,
        })?,
    };
    Ok(bytes)
}

pub(crate) fn removal_bytes(id: &DocumentId) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&RemoveEntry { remove: id })?)
}

/// Appends `,"key":value` to an open buffered object.
pub(crate) fn append_field(
    out: &mut Vec<u8>,
    key: &str,
    value: &Value,
) -> Result<()> {
    out.push(b',');
    serde_json::to_writer(&mut *out, key)?;
    out.push(b':');
    serde_json::to_writer(&mut *out, value)?;
    Ok(())
}

/// Appends `{"key":value}\n`.
pub(crate) fn append_line(
    out: &mut Vec<u8>,
    key: &str,
    value: &Value,
) -> Result<()> {
    out.push(b'{');
    serde_json::to_writer(&mut *out, key)?;
    out.push(b':');
    serde_json::to_writer(&mut *out, value)?;
    out.extend_from_slice(b"}\n");
    Ok(())
}
