//! Entities tracked inside a transaction scope.
//!
//! Each entry is keyed by its *current* name. `old_name` records the name
//! the entity had when the top-level transaction started, and is only
//! present when the entity was renamed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a role in the host catalog.
///
/// Owners are tracked by id rather than by name so that a later rename of
/// the owning role in the same transaction is still reported correctly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u32);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role#{}", self.0)
    }
}

/// The pending operation for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// An upsert: either a creation or an alteration.
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "del")]
    Delete,
}

impl Op {
    /// Wire representation of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Set => "set",
            Op::Delete => "del",
        }
    }
}

/// Pending change to a database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbEntry {
    pub name: String,
    pub owner: Option<RoleId>,
    pub old_name: Option<String>,
    pub op: Op,
}

impl DbEntry {
    pub fn new(name: impl Into<String>, op: Op) -> Self {
        Self {
            name: name.into(),
            owner: None,
            old_name: None,
            op,
        }
    }

    /// The name this lineage had before its earliest recorded rename.
    ///
    /// Falls back to the current name when no rename was recorded.
    pub fn origin(&self) -> &str {
        self.old_name.as_deref().unwrap_or(&self.name)
    }
}

/// Pending change to a role.
///
/// `password` is the plaintext staged at capture time. The stored hash is
/// only looked up when the delta is rendered.
#[derive(Clone, PartialEq, Eq)]
pub struct RoleEntry {
    pub name: String,
    pub old_name: Option<String>,
    pub password: Option<String>,
    pub op: Op,
}

impl RoleEntry {
    pub fn new(name: impl Into<String>, op: Op) -> Self {
        Self {
            name: name.into(),
            old_name: None,
            password: None,
            op,
        }
    }

    /// See [`DbEntry::origin`].
    pub fn origin(&self) -> &str {
        self.old_name.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for RoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleEntry")
            .field("name", &self.name)
            .field("old_name", &self.old_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("op", &self.op)
            .finish()
    }
}
