//! Replay scripts.
//!
//! ```json
//! {
//!   "user": "alice",
//!   "roles": [{ "name": "bob", "password": "secret" }],
//!   "databases": [{ "name": "legacy", "owner": "bob" }],
//!   "transactions": [
//!     { "steps": [
//!         { "event": { "kind": "rename_database", "old_name": "legacy", "new_name": "archive" } },
//!         "savepoint",
//!         { "event": { "kind": "create_role", "name": "tmp" } },
//!         "rollback"
//!     ] }
//!   ]
//! }
//! ```

use relay_core::{DdlEvent, MemoryCatalog, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Session user; created if missing.
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub roles: Vec<SeedRole>,
    #[serde(default)]
    pub databases: Vec<SeedDatabase>,
    pub transactions: Vec<Transaction>,
}

fn default_user() -> String {
    "postgres".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SeedRole {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedDatabase {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Transaction {
    pub steps: Vec<Step>,
    /// End with `ROLLBACK` instead of `COMMIT`.
    #[serde(default)]
    pub abort: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// `SAVEPOINT`
    Savepoint,
    /// `RELEASE SAVEPOINT` of the innermost savepoint.
    Release,
    /// `ROLLBACK TO SAVEPOINT` followed by `RELEASE` of the innermost savepoint.
    Rollback,
    Event(DdlEvent),
}

impl Script {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Catalog state before the first transaction.
    pub fn seed_catalog(&self) -> Result<MemoryCatalog> {
        let mut catalog = MemoryCatalog::new(&self.user);
        catalog.set_superuser(self.superuser);
        for role in &self.roles {
            catalog.create_role(&role.name, role.password.as_deref())?;
        }
        for db in &self.databases {
            catalog.apply(&DdlEvent::CreateDatabase {
                name: db.name.clone(),
                owner: db.owner.clone(),
            })?;
        }
        Ok(catalog)
    }
}
