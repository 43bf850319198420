//! # relay-hook
//!
//! Binds delta tracking and delivery to the host's transaction lifecycle.
//!
//! ```rust
//! use relay_core::{DdlEvent, MemoryCatalog};
//! use relay_forward::{DeliveryClient, DeliveryOutcome, RetryPolicy, SkipReason};
//! use relay_hook::{Coordinator, SharedSettings};
//! use std::sync::Arc;
//!
//! let client = Arc::new(DeliveryClient::from_env("NEON_CONTROL_PLANE_TOKEN", RetryPolicy::default()));
//! let mut coordinator = Coordinator::new(SharedSettings::default(), client);
//! let catalog = MemoryCatalog::new("alice");
//!
//! coordinator.begin_transaction();
//! let event = DdlEvent::CreateDatabase { name: "shop".into(), owner: None };
//! coordinator.handle_event(&event, &catalog).unwrap();
//!
//! // No console url configured: nothing leaves the process.
//! let outcome = coordinator.pre_commit(&catalog).unwrap();
//! assert_eq!(outcome, DeliveryOutcome::Skipped(SkipReason::NoEndpoint));
//! coordinator.transaction_end();
//! ```

pub mod config;
pub mod context;
pub mod coordinator;

pub use config::{RelaySettings, RelaySettingsBuilder, SharedSettings, DEFAULT_PRIVILEGED_ROLE};
pub use context::TransactionContext;
pub use coordinator::Coordinator;
