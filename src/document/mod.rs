//! Documents and the mutations the gateway issues against them.

mod document_id;
mod document_operation;
pub use document_id::*;
pub use document_operation::*;


use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A stored document: its id and its field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(
        id: DocumentId,
        fields: Map<String, Value>,
    ) -> Self {
        Self { id, fields }
    }

    /// Keeps only the named fields. `None` or `"[all]"` keeps everything,
    /// `"[id]"` drops every field.
    pub fn project(
        mut self,
        field_set: Option<&str>,
    ) -> Self {
        match field_set {
            None | Some("[all]") | Some("[document]") => self,
            Some("[id]") => {
                self.fields.clear();
                self
            }
            Some(set) => {
                // "<doctype>:f1,f2" or "f1,f2"
                let names = set.split_once(':').map(|(_, f)| f).unwrap_or(set);
                let wanted: Vec<&str> = names.split(',').map(str::trim).collect();
                self.fields.retain(|k, _| wanted.iter().any(|w| w == k));
                self
            }
        }
    }
}
