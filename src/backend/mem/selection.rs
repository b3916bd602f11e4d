use serde_json::Value;

use crate::Document;

/// The small document-selection language understood by the in-memory store:
/// `true`, a bare document type, or `<type>.<field> == <json literal>`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    All,
    DocType(String),
    FieldEquals {
        doc_type: String,
        field: String,
        value: Value,
    },
}

impl Selection {
    pub(crate) fn parse(raw: Option<&str>) -> std::result::Result<Self, String> {
        let raw = match raw.map(str::trim) {
            None | Some("") | Some("true") => return Ok(Selection::All),
            Some(raw) => raw,
        };

        let Some((lhs, rhs)) = raw.split_once("==") else {
            if is_identifier(raw) {
                return Ok(Selection::DocType(raw.to_string()));
            }
            return Err(format!("unsupported selection '{raw}'"));
        };

        let (doc_type, field) = lhs
            .trim()
            .split_once('.')
            .filter(|(t, f)| is_identifier(t) && is_identifier(f))
            .ok_or_else(|| format!("expected <type>.<field> on the left of '==' in '{raw}'"))?;
        let literal = rhs.trim().replace('\'', "\"");
        let value = serde_json::from_str(&literal).map_err(|e| format!("invalid literal in '{raw}': {e}"))?;

        Ok(Selection::FieldEquals {
            doc_type: doc_type.to_string(),
            field: field.to_string(),
            value,
        })
    }

    pub(crate) fn matches(
        &self,
        document: &Document,
    ) -> bool {
        match self {
            Selection::All => true,
            Selection::DocType(doc_type) => document.id.doc_type() == doc_type,
            Selection::FieldEquals { doc_type, field, value } => {
                document.id.doc_type() == doc_type && document.fields.get(field) == Some(value)
            }
        }
    }

    /// Removal entries have no fields; only the document type can be checked.
    pub(crate) fn matches_type(
        &self,
        doc_type: &str,
    ) -> bool {
        match self {
            Selection::All => true,
            Selection::DocType(t) | Selection::FieldEquals { doc_type: t, .. } => t == doc_type,
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
