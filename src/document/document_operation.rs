use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use super::Document;
use super::DocumentId;

/// A single field modification carried by an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldUpdate {
    Assign(Value),
    Increment(f64),
    Decrement(f64),
}

impl FieldUpdate {
    /// Applies this update to the current field value, returning the new value.
    /// `Ok(None)` removes the field.
    pub fn apply(
        &self,
        current: Option<&Value>,
    ) -> std::result::Result<Option<Value>, String> {
        match self {
            FieldUpdate::Assign(Value::Null) => Ok(None),
            FieldUpdate::Assign(v) => Ok(Some(v.clone())),
            FieldUpdate::Increment(delta) => arithmetic(current, *delta),
            FieldUpdate::Decrement(delta) => arithmetic(current, -*delta),
        }
    }
}

fn arithmetic(
    current: Option<&Value>,
    delta: f64,
) -> std::result::Result<Option<Value>, String> {
    let base = match current {
        None | Some(Value::Null) => Value::from(0),
        Some(v) => v.clone(),
    };
    match base {
        Value::Number(n) if n.is_i64() && delta.fract() == 0.0 => {
            let v = n.as_i64().unwrap_or_default() + delta as i64;
            Ok(Some(Value::from(v)))
        }
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or_default() + delta;
            Number::from_f64(v)
                .map(|n| Some(Value::Number(n)))
                .ok_or_else(|| format!("arithmetic result {v} is not a finite number"))
        }
        other => Err(format!("cannot apply arithmetic to non-numeric value {other}")),
    }
}

/// Precondition a mutation must satisfy to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestAndSetCondition {
    /// Document selection expression evaluated against the stored document
    Selection(String),
    /// The stored document must have exactly this persisted timestamp
    Timestamp(u64),
}

impl fmt::Display for TestAndSetCondition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TestAndSetCondition::Selection(s) => f.write_str(s),
            TestAndSetCondition::Timestamp(t) => write!(f, "timestamp == {t}"),
        }
    }
}

/// A set of field updates against one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    pub id: DocumentId,
    pub fields: Vec<(String, FieldUpdate)>,
    pub create_if_missing: bool,
}

impl DocumentUpdate {
    /// Decodes a raw update field map (`{"f": {"assign": ..}}`).
    pub fn from_json(
        id: DocumentId,
        fields: &Map<String, Value>,
        create_if_missing: bool,
    ) -> std::result::Result<Self, String> {
        let fields = fields
            .iter()
            .map(|(name, raw)| {
                serde_json::from_value::<FieldUpdate>(raw.clone())
                    .map(|u| (name.clone(), u))
                    .map_err(|e| format!("invalid update for field '{name}': {e}"))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            id,
            fields,
            create_if_missing,
        })
    }

    pub fn apply_to(
        &self,
        document: &mut Document,
    ) -> std::result::Result<(), String> {
        for (name, update) in &self.fields {
            match update.apply(document.fields.get(name))? {
                Some(v) => {
                    document.fields.insert(name.clone(), v);
                }
                None => {
                    document.fields.remove(name);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOperation {
    Put {
        document: Document,
    },
    Update {
        update: DocumentUpdate,
    },
    Remove {
        id: DocumentId,
    },
    Get {
        id: DocumentId,
        field_set: Option<String>,
    },
}

impl DocumentOperation {
    pub fn id(&self) -> &DocumentId {
        match self {
            DocumentOperation::Put { document } => &document.id,
            DocumentOperation::Update { update } => &update.id,
            DocumentOperation::Remove { id } => id,
            DocumentOperation::Get { id, .. } => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DocumentOperation::Put { .. } => "put",
            DocumentOperation::Update { .. } => "update",
            DocumentOperation::Remove { .. } => "remove",
            DocumentOperation::Get { .. } => "get",
        }
    }

    pub fn create_if_missing(&self) -> bool {
        matches!(self, DocumentOperation::Update { update } if update.create_if_missing)
    }
}
