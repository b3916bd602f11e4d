use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::DispatchError;

/// Document identifier of the form `id:<namespace>:<type>:<key=value,...>:<user-specific>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    raw: String,
    // byte offsets of the four separating colons
    colons: [usize; 4],
}

impl DocumentId {
    pub fn parse(raw: &str) -> std::result::Result<Self, DispatchError> {
        let invalid = || DispatchError::BadRequest(format!("invalid document id '{raw}'"));

        let mut colons = [0usize; 4];
        let mut found = 0;
        for (i, b) in raw.bytes().enumerate() {
            if b == b':' {
                colons[found] = i;
                found += 1;
                if found == 4 {
                    break;
                }
            }
        }
        if found < 4 || &raw[..colons[0]] != "id" {
            return Err(invalid());
        }

        let id = Self {
            raw: raw.to_string(),
            colons,
        };
        if id.namespace().is_empty() || id.doc_type().is_empty() || id.user_specific().is_empty() {
            return Err(invalid());
        }
        Ok(id)
    }

    pub fn namespace(&self) -> &str {
        &self.raw[self.colons[0] + 1..self.colons[1]]
    }

    pub fn doc_type(&self) -> &str {
        &self.raw[self.colons[1] + 1..self.colons[2]]
    }

    /// The `n=<number>` or `g=<group>` location modifiers, possibly empty.
    pub fn modifiers(&self) -> &str {
        &self.raw[self.colons[2] + 1..self.colons[3]]
    }

    pub fn user_specific(&self) -> &str {
        &self.raw[self.colons[3] + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DocumentId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DocumentId {
    type Err = DispatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DocumentId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
