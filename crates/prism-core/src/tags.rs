use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MAX_TAG_CHARS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("tag cannot be empty")]
    Empty,
    #[error("tag {tag:?} exceeds {max} characters")]
    TooLong { tag: String, max: usize },
    #[error("tag list is not valid json: {0}")]
    Serialization(String),
}

/// Unordered set of short labels attached to a profile section, stored as a sorted JSON list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTags(BTreeSet<String>);

impl ProfileTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Result<Self, TagError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = Self::new();
        for label in labels {
            tags.insert(label.as_ref())?;
        }
        Ok(tags)
    }

    /// Returns `false` when the label was already present.
    pub fn insert(&mut self, label: &str) -> Result<bool, TagError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(TagError::Empty);
        }
        if label.chars().count() > MAX_TAG_CHARS {
            return Err(TagError::TooLong {
                tag: label.to_string(),
                max: MAX_TAG_CHARS,
            });
        }
        Ok(self.0.insert(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label.trim())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, TagError> {
        serde_json::to_string(&self.0).map_err(|err| TagError::Serialization(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, TagError> {
        let labels: Vec<String> =
            serde_json::from_str(raw).map_err(|err| TagError::Serialization(err.to_string()))?;
        Self::from_labels(labels)
    }
}
