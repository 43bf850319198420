//! # relay-delta
//!
//! Per-transaction delta accumulation with sub-transaction awareness.
//!
//! ## Model
//!
//! ```text
//! On statement e at depth d:
//!   S[d] = S[d] ⊕ e        // upsert/supersede in the scope for depth d
//!
//! On sub-transaction commit at depth d:
//!   S[d-1] = S[d-1] ⊔ S[d] // fold, collapsing rename chains
//!
//! On sub-transaction abort at depth d:
//!   drop S[d]
//! ```
//!
//! Each scope holds at most one entry per current name and per kind
//! (database, role). An entry's `old_name` is always the name its lineage
//! had when the top-level transaction started.
//!
//! # Example
//!
//! ```rust
//! use relay_core::MemoryCatalog;
//! use relay_delta::{DeltaStore, MutationRecorder};
//!
//! let catalog = MemoryCatalog::new("alice");
//! let mut store = DeltaStore::new();
//!
//! MutationRecorder::new(&mut store, &catalog, "neon_superuser")
//!     .rename_database("a", "b")
//!     .unwrap();
//!
//! store.enter_scope();
//! MutationRecorder::new(&mut store, &catalog, "neon_superuser")
//!     .rename_database("b", "c")
//!     .unwrap();
//! store.commit_scope();
//!
//! let entry = store.root().db("c").unwrap();
//! assert_eq!(entry.old_name.as_deref(), Some("a"));
//! ```

pub mod merge;
pub mod recorder;
pub mod scope;

pub use merge::{merge_scope, Tracked};
pub use recorder::MutationRecorder;
pub use scope::{DeltaStore, Level, Scope};
