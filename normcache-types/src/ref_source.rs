//! Reference-source tags.
//!
//! A tag records one reason an entity is alive, conventionally
//! `"<origin-kind>:<origin-id>"`. An entity whose tag set is empty is garbage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single reference-source tag such as `collection:feed` or `record:profile`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefSource(String);

impl RefSource {
    pub const COLLECTION: &'static str = "collection";
    pub const RECORD: &'static str = "record";

    /// Tag held by an ordered collection view.
    #[must_use]
    pub fn collection(origin_id: &str) -> Self {
        Self(format!("{}:{origin_id}", Self::COLLECTION))
    }

    /// Tag held by a single-record view.
    #[must_use]
    pub fn record(origin_id: &str) -> Self {
        Self(format!("{}:{origin_id}", Self::RECORD))
    }

    #[must_use]
    pub fn for_origin(origin_id: &str, is_collection: bool) -> Self {
        if is_collection {
            Self::collection(origin_id)
        } else {
            Self::record(origin_id)
        }
    }

    /// The part before the first `:`, if the tag follows the convention.
    #[must_use]
    pub fn origin_kind(&self) -> Option<&str> {
        self.0.split_once(':').map(|(kind, _)| kind)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RefSource {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for RefSource {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}
