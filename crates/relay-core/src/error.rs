//! Error taxonomy for the DDL relay.
//!
//! Every variant is fatal for the statement or commit that raised it.
//! Skipped deliveries are not errors and are reported through
//! `DeliveryOutcome` in `relay-forward` instead.

use thiserror::Error;

/// Errors surfaced to the host transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// A referenced role or database does not exist.
    #[error("{kind} \"{name}\" does not exist")]
    Lookup { kind: &'static str, name: String },

    /// The protected role was targeted without sufficient privilege.
    #[error("permission denied: {0}")]
    Privilege(String),

    /// The stored credential of a role could not be read at render time.
    #[error("failed to get encrypted password for role \"{role}\": {detail}")]
    PasswordResolution { role: String, detail: String },

    /// Every delivery attempt failed before a response was received.
    #[error("failed to deliver to control plane after {attempts} attempts: {detail}")]
    Transport { attempts: u32, detail: String },

    /// The control plane answered with a non-success status.
    #[error("received HTTP code {status} from control plane{}", format_body(.body))]
    Protocol { status: u16, body: String },

    /// The statement is refused outright.
    #[error("{0} is not supported")]
    Unsupported(String),

    #[error("failed to encode delta message: {0}")]
    Encoding(String),
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

impl RelayError {
    pub fn missing_role(name: impl Into<String>) -> Self {
        RelayError::Lookup {
            kind: "role",
            name: name.into(),
        }
    }

    pub fn missing_database(name: impl Into<String>) -> Self {
        RelayError::Lookup {
            kind: "database",
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
