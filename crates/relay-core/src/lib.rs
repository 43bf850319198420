//! # relay-core
//!
//! Shared vocabulary for the DDL relay: the entities tracked per
//! transaction, the typed administrative events that mutate them, the
//! catalog seam used to resolve role references and stored credentials,
//! and the error taxonomy surfaced to the committing transaction.
//!
//! ## Example
//!
//! ```rust
//! use relay_core::{Catalog, MemoryCatalog};
//!
//! let mut catalog = MemoryCatalog::new("alice");
//! let bob = catalog.create_role("bob", Some("hunter2")).unwrap();
//!
//! assert_eq!(catalog.role_id("bob").unwrap(), bob);
//! assert!(catalog.stored_password("bob").unwrap().starts_with("SHA-256$"));
//! assert!(catalog.create_role("bob", None).is_err());
//! ```

pub mod catalog;
pub mod entity;
pub mod error;
pub mod event;

pub use catalog::{Catalog, MemoryCatalog};
pub use entity::{DbEntry, Op, RoleEntry, RoleId};
pub use error::{RelayError, Result};
pub use event::DdlEvent;
