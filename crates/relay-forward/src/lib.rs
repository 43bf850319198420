//! # relay-forward
//!
//! Renders a transaction's root scope into the control plane delta message
//! and delivers it over HTTP.
//!
//! - [`message`]: the wire format and [`render`]
//! - [`transport`]: the [`HttpTransport`] seam and its `ureq` implementation
//! - [`delivery`]: [`DeliveryClient`] with bounded retry

pub mod delivery;
pub mod message;
pub mod transport;

pub use delivery::{
    truncate_body, DeliveryClient, DeliveryOutcome, ForwardTarget, Pause, RetryPolicy, SkipReason,
    ThreadSleep, ERROR_BODY_LIMIT, TOKEN_ENV_VAR,
};
pub use message::{render, DbChange, DeltaMessage, RoleChange};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, TransportError, UreqTransport};
