//! Catalog seam.
//!
//! The relay never owns role or database state. It asks the host catalog
//! to resolve role references while recording, and to read stored
//! credentials while rendering. [`MemoryCatalog`] is a self-contained
//! implementation used by tests and by the replay tool.

use crate::entity::RoleId;
use crate::error::{RelayError, Result};
use crate::event::DdlEvent;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Read access to the host catalog.
pub trait Catalog {
    /// Resolve a role name to its id.
    fn role_id(&self, name: &str) -> Result<RoleId>;

    /// Resolve a role id to its current name.
    fn role_name(&self, id: RoleId) -> Result<String>;

    /// The role executing the current statement.
    fn current_user(&self) -> RoleId;

    /// Whether the current user holds elevated (superuser) privilege.
    fn is_superuser(&self) -> bool;

    /// The credential hash currently stored for `role`.
    fn stored_password(&self, role: &str) -> Result<String>;
}

#[derive(Clone, Debug)]
struct MemoryRole {
    name: String,
    password_hash: Option<String>,
}

/// In-memory catalog.
///
/// Passwords are stored as `SHA-256$<hex>` digests salted with the role
/// name, standing in for the host's real verifier format.
#[derive(Clone, Debug)]
pub struct MemoryCatalog {
    roles: BTreeMap<RoleId, MemoryRole>,
    databases: BTreeMap<String, RoleId>,
    next_id: u32,
    current_user: RoleId,
    superuser: bool,
}

impl MemoryCatalog {
    /// Create a catalog whose only role is the session user `user`.
    pub fn new(user: &str) -> Self {
        let mut catalog = Self {
            roles: BTreeMap::new(),
            databases: BTreeMap::new(),
            next_id: 10,
            current_user: RoleId(10),
            superuser: false,
        };
        catalog.current_user = catalog.insert_role(user, None);
        catalog
    }

    pub fn set_superuser(&mut self, superuser: bool) {
        self.superuser = superuser;
    }

    /// Add a role. Role names are unique, so an existing name is refused.
    pub fn create_role(&mut self, name: &str, password: Option<&str>) -> Result<RoleId> {
        if self.role_id(name).is_ok() {
            return Err(RelayError::Unsupported(format!("creating existing role \"{}\"", name)));
        }
        Ok(self.insert_role(name, password))
    }

    fn insert_role(&mut self, name: &str, password: Option<&str>) -> RoleId {
        let id = RoleId(self.next_id);
        self.next_id += 1;
        self.roles.insert(
            id,
            MemoryRole {
                name: name.to_string(),
                password_hash: password.map(|p| hash_password(name, p)),
            },
        );
        id
    }

    pub fn set_password(&mut self, name: &str, password: Option<&str>) -> Result<()> {
        let id = self.role_id(name)?;
        if let Some(role) = self.roles.get_mut(&id) {
            role.password_hash = password.map(|p| hash_password(name, p));
        }
        Ok(())
    }

    /// Remove the stored credential without touching the role, as an
    /// out-of-band change would.
    pub fn clear_password(&mut self, name: &str) -> Result<()> {
        self.set_password(name, None)
    }

    pub fn rename_role(&mut self, old: &str, new: &str) -> Result<()> {
        if self.role_id(new).is_ok() {
            return Err(RelayError::Unsupported(format!("renaming to existing role \"{}\"", new)));
        }
        let id = self.role_id(old)?;
        if let Some(role) = self.roles.get_mut(&id) {
            role.name = new.to_string();
        }
        Ok(())
    }

    pub fn drop_role(&mut self, name: &str) -> Result<()> {
        let id = self.role_id(name)?;
        self.roles.remove(&id);
        Ok(())
    }

    pub fn create_database(&mut self, name: &str, owner: RoleId) {
        self.databases.insert(name.to_string(), owner);
    }

    pub fn rename_database(&mut self, old: &str, new: &str) -> Result<()> {
        let owner = self
            .databases
            .remove(old)
            .ok_or_else(|| RelayError::missing_database(old))?;
        self.databases.insert(new.to_string(), owner);
        Ok(())
    }

    pub fn drop_database(&mut self, name: &str) -> Result<()> {
        self.databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RelayError::missing_database(name))
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    pub fn database_owner(&self, name: &str) -> Option<RoleId> {
        self.databases.get(name).copied()
    }

    /// Execute `event` against the catalog, as the host would after the
    /// relay has recorded it.
    pub fn apply(&mut self, event: &DdlEvent) -> Result<()> {
        match event {
            DdlEvent::CreateDatabase { name, owner } => {
                let owner = match owner {
                    Some(owner) => self.role_id(owner)?,
                    None => self.current_user,
                };
                self.create_database(name, owner);
            }
            DdlEvent::AlterDatabaseOwner { name, new_owner } => {
                let owner = self.role_id(new_owner)?;
                let slot = self
                    .databases
                    .get_mut(name)
                    .ok_or_else(|| RelayError::missing_database(name.as_str()))?;
                *slot = owner;
            }
            DdlEvent::RenameDatabase { old_name, new_name } => {
                self.rename_database(old_name, new_name)?
            }
            DdlEvent::DropDatabase { name } => self.drop_database(name)?,
            DdlEvent::CreateRole { name, password } => {
                self.create_role(name, password.as_deref())?;
            }
            DdlEvent::AlterRolePassword { name, password } => {
                self.set_password(name, password.as_deref())?
            }
            DdlEvent::AlterRole { name } => {
                self.role_id(name)?;
            }
            DdlEvent::RenameRole { old_name, new_name } => self.rename_role(old_name, new_name)?,
            DdlEvent::DropRole { name } => self.drop_role(name)?,
            DdlEvent::CreateTablespace { .. } | DdlEvent::Other => {}
        }
        Ok(())
    }
}

impl Catalog for MemoryCatalog {
    fn role_id(&self, name: &str) -> Result<RoleId> {
        self.roles
            .iter()
            .find(|(_, role)| role.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| RelayError::missing_role(name))
    }

    fn role_name(&self, id: RoleId) -> Result<String> {
        self.roles
            .get(&id)
            .map(|role| role.name.clone())
            .ok_or_else(|| RelayError::missing_role(id.to_string()))
    }

    fn current_user(&self) -> RoleId {
        self.current_user
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }

    fn stored_password(&self, role: &str) -> Result<String> {
        let id = self.role_id(role)?;
        self.roles
            .get(&id)
            .and_then(|r| r.password_hash.clone())
            .ok_or_else(|| RelayError::PasswordResolution {
                role: role.to_string(),
                detail: "role has no password".to_string(),
            })
    }
}

fn hash_password(role: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(role.as_bytes());
    let digest: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("SHA-256${}", digest)
}
