//! Canonical delta message sent to the control plane.
//!
//! ```text
//! {
//!   "dbs":   [ {"op":"set"|"del","name":..,"owner"?:..,"old_name"?:..} ],
//!   "roles": [ {"op":"set"|"del","name":..,"password"?:..,"encrypted_password"?:..,"old_name"?:..} ]
//! }
//! ```
//!
//! Role credentials are resolved while rendering, never while recording:
//! the hash sent is the one stored when the transaction is about to commit.

use relay_core::{Catalog, Op, RelayError, Result};
use relay_delta::Scope;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbChange {
    pub op: Op,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    pub op: Op,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

impl std::fmt::Debug for RoleChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleChange")
            .field("op", &self.op)
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("encrypted_password", &self.encrypted_password)
            .field("old_name", &self.old_name)
            .finish()
    }
}

/// The net effect of one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaMessage {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dbs: Vec<DbChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleChange>,
}

impl DeltaMessage {
    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty() && self.roles.is_empty()
    }

    /// Encode as the JSON request body.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Encoding(e.to_string()))
    }

    pub fn db(&self, name: &str) -> Option<&DbChange> {
        self.dbs.iter().find(|c| c.name == name)
    }

    pub fn role(&self, name: &str) -> Option<&RoleChange> {
        self.roles.iter().find(|c| c.name == name)
    }
}

/// Render the root scope of a transaction.
///
/// Returns `Ok(None)` when there is nothing to send. Fails without a
/// partial result if an owner or a staged password cannot be resolved.
pub fn render<C: Catalog + ?Sized>(root: &Scope, catalog: &C) -> Result<Option<DeltaMessage>> {
    if root.is_empty() {
        return Ok(None);
    }

    let mut message = DeltaMessage::default();

    for entry in root.dbs().values() {
        let owner = match entry.owner {
            Some(id) => Some(catalog.role_name(id)?),
            None => None,
        };
        message.dbs.push(DbChange {
            op: entry.op,
            name: entry.name.clone(),
            owner,
            old_name: entry.old_name.clone(),
        });
    }

    for entry in root.roles().values() {
        let encrypted_password = match entry.password {
            Some(_) => Some(resolve_password(catalog, &entry.name)?),
            None => None,
        };
        message.roles.push(RoleChange {
            op: entry.op,
            name: entry.name.clone(),
            password: entry.password.clone(),
            encrypted_password,
            old_name: entry.old_name.clone(),
        });
    }

    Ok(Some(message))
}

fn resolve_password<C: Catalog + ?Sized>(catalog: &C, role: &str) -> Result<String> {
    catalog.stored_password(role).map_err(|err| match err {
        RelayError::PasswordResolution { .. } => err,
        other => RelayError::PasswordResolution {
            role: role.to_string(),
            detail: other.to_string(),
        },
    })
}
