//! Typed administrative events produced by the statement interceptor.

use serde::{Deserialize, Serialize};

/// A classified administrative statement.
///
/// `Other` stands for every statement the relay does not track; handling
/// it is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DdlEvent {
    CreateDatabase {
        name: String,
        #[serde(default)]
        owner: Option<String>,
    },
    AlterDatabaseOwner {
        name: String,
        new_owner: String,
    },
    RenameDatabase {
        old_name: String,
        new_name: String,
    },
    DropDatabase {
        name: String,
    },
    CreateRole {
        name: String,
        #[serde(default)]
        password: Option<String>,
    },
    /// `ALTER ROLE ... PASSWORD`. A `None` password is `PASSWORD NULL`.
    AlterRolePassword {
        name: String,
        #[serde(default)]
        password: Option<String>,
    },
    /// `ALTER ROLE` without a password clause.
    AlterRole {
        name: String,
    },
    RenameRole {
        old_name: String,
        new_name: String,
    },
    DropRole {
        name: String,
    },
    CreateTablespace {
        name: String,
    },
    Other,
}

impl DdlEvent {
    /// Short statement tag, used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            DdlEvent::CreateDatabase { .. } => "CREATE DATABASE",
            DdlEvent::AlterDatabaseOwner { .. } => "ALTER DATABASE OWNER",
            DdlEvent::RenameDatabase { .. } => "ALTER DATABASE RENAME",
            DdlEvent::DropDatabase { .. } => "DROP DATABASE",
            DdlEvent::CreateRole { .. } => "CREATE ROLE",
            DdlEvent::AlterRolePassword { .. } => "ALTER ROLE PASSWORD",
            DdlEvent::AlterRole { .. } => "ALTER ROLE",
            DdlEvent::RenameRole { .. } => "ALTER ROLE RENAME",
            DdlEvent::DropRole { .. } => "DROP ROLE",
            DdlEvent::CreateTablespace { .. } => "CREATE TABLESPACE",
            DdlEvent::Other => "OTHER",
        }
    }
}
