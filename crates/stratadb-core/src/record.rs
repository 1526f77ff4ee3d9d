use std::fmt;
use thiserror::Error as ThisError;

///
/// RecordId
///
/// Collection-qualified identity of a persisted document. The canonical
/// text form is `collection:key`; keys are opaque text (ulid, uuid, or a
/// caller-declared primary key rendered canonically).
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordId {
    collection: String,
    key: String,
}

impl RecordId {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parse the canonical `collection:key` form.
    pub fn parse(text: &str) -> Result<Self, RecordIdParseError> {
        match text.split_once(':') {
            Some((collection, key)) if !collection.is_empty() && !key.is_empty() => {
                Ok(Self::new(collection, key))
            }
            _ => Err(RecordIdParseError {
                text: text.to_string(),
            }),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.key)
    }
}

///
/// RecordIdParseError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("invalid record id '{text}' (expected collection:key)")]
pub struct RecordIdParseError {
    pub text: String,
}
