use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

const ZERO_HASH: &str = "0x0";

/// Content-addressed identifier of an encrypted blob.
///
/// The bucket treats hashes as opaque strings; it only cares that
/// they are non-empty and never reused. [`ContentHash::zero`] is the
/// tombstone recorded in the version map for removed content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The tombstone sentinel
    pub fn zero() -> Self {
        Self(ZERO_HASH.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_HASH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this hash may be assigned to a live element
    pub fn is_assignable(&self) -> bool {
        !self.0.is_empty() && !self.is_zero()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Position of an element in the bucket's append-only element table
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a record within the triple it was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Meta,
    Data,
    Container,
}

impl ElementKind {
    /// Creation and validation order within a triple
    pub const ORDER: [ElementKind; 3] = [ElementKind::Meta, ElementKind::Data, ElementKind::Container];
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Meta => write!(f, "meta"),
            ElementKind::Data => write!(f, "data"),
            ElementKind::Container => write!(f, "container"),
        }
    }
}

/// Application-defined content tag shared by every record of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(pub u8);

/// Replication target declared for an element's content
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RedundancyLevel(pub u8);

impl RedundancyLevel {
    /// Fully de-replicated; the only level at which a record may be removed
    pub const NONE: RedundancyLevel = RedundancyLevel(0);
}

impl fmt::Display for RedundancyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three hashes created, updated and removed together
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashTriple {
    pub meta: ContentHash,
    pub data: ContentHash,
    pub container: ContentHash,
}

impl HashTriple {
    pub fn new(
        meta: impl Into<ContentHash>,
        data: impl Into<ContentHash>,
        container: impl Into<ContentHash>,
    ) -> Self {
        Self {
            meta: meta.into(),
            data: data.into(),
            container: container.into(),
        }
    }

    pub fn get(&self, kind: ElementKind) -> &ContentHash {
        match kind {
            ElementKind::Meta => &self.meta,
            ElementKind::Data => &self.data,
            ElementKind::Container => &self.container,
        }
    }
}

/// Kind of mutation recorded in the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    UpdateParent,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::UpdateParent => write!(f, "update_parent"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One append-only row of the bucket history.
///
/// `previous` is set for [`Operation::Update`] (the superseded element) and
/// `parent` for [`Operation::UpdateParent`] (the new parent, `None` for root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub element: ElementId,
    pub operation: Operation,
    pub block_height: u64,
    pub sender: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ElementId>,
}

/// Bucket-level scalars persisted alongside the element table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMeta {
    /// The account that is charged for bucket operations
    pub account: PublicKey,
    /// Block height at creation; nothing may reference an earlier height
    pub genesis: u64,
    /// Width of a key epoch in blocks
    pub epoch_size: u64,
    /// Default redundancy for newly created elements
    pub min_element_redundancy: RedundancyLevel,
    /// Terminal flag; once set only reads are accepted
    pub closed: bool,
}
