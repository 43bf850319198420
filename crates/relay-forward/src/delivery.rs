//! Delivery of the delta message to the control plane.
//!
//! One `PATCH` per committing transaction. Transport failures are retried
//! up to [`RetryPolicy::max_attempts`] times with a fixed pause between
//! attempts; a completed response with any status other than 200 fails
//! immediately.

use crate::message::{render, DeltaMessage};
use crate::transport::{HttpRequest, HttpTransport, UreqTransport};
use relay_core::{Catalog, RelayError, Result};
use relay_delta::Scope;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum number of response body bytes kept for error reports.
pub const ERROR_BODY_LIMIT: usize = 1024;

/// Default environment variable holding the bearer token.
pub const TOKEN_ENV_VAR: &str = "NEON_CONTROL_PLANE_TOKEN";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }
}

/// How the client waits between attempts.
pub trait Pause: Send + Sync {
    fn pause(&self, delay: Duration);
}

/// Blocks the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Where a transaction's delta goes, as seen by the committing transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardTarget {
    pub url: Option<String>,
    pub enabled: bool,
}

impl ForwardTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            enabled: true,
        }
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        match self.url.as_deref() {
            None | Some("") => Some(SkipReason::NoEndpoint),
            Some(_) if !self.enabled => Some(SkipReason::ForwardingDisabled),
            Some(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NothingToSend,
    NoEndpoint,
    ForwardingDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NothingToSend => "no database or role changes",
            SkipReason::NoEndpoint => "control plane url not set",
            SkipReason::ForwardingDisabled => "ddl forwarding disabled",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Skipped(SkipReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Process-wide client for the control plane.
pub struct DeliveryClient<T: HttpTransport = UreqTransport> {
    transport: T,
    token: Option<String>,
    policy: RetryPolicy,
    pause: Box<dyn Pause>,
}

impl DeliveryClient<UreqTransport> {
    /// Build a `ureq` client, reading the bearer token from `token_var` once.
    pub fn from_env(token_var: &str, policy: RetryPolicy) -> Self {
        let token = std::env::var(token_var).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            info!(var = token_var, "no control plane token set, requests will be unauthenticated");
        }
        Self::new(
            UreqTransport::new(policy.timeout, ERROR_BODY_LIMIT),
            token,
            policy,
        )
    }
}

impl<T: HttpTransport> DeliveryClient<T> {
    pub fn new(transport: T, token: Option<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            token,
            policy,
            pause: Box::new(ThreadSleep),
        }
    }

    /// Replace the pause strategy.
    pub fn with_pause(mut self, pause: impl Pause + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Render `root` and deliver it.
    ///
    /// Nothing is rendered (and no credential is looked up) when the
    /// transaction changed nothing or forwarding is off.
    pub fn forward<C: Catalog + ?Sized>(
        &self,
        target: &ForwardTarget,
        root: &Scope,
        catalog: &C,
    ) -> Result<DeliveryOutcome> {
        if root.is_empty() {
            return Ok(skipped(SkipReason::NothingToSend));
        }
        if let Some(reason) = target.skip_reason() {
            return Ok(skipped(reason));
        }
        match render(root, catalog)? {
            Some(message) => self.deliver(target, &message),
            None => Ok(skipped(SkipReason::NothingToSend)),
        }
    }

    /// Send an already rendered message.
    pub fn deliver(&self, target: &ForwardTarget, message: &DeltaMessage) -> Result<DeliveryOutcome> {
        if message.is_empty() {
            return Ok(skipped(SkipReason::NothingToSend));
        }
        if let Some(reason) = target.skip_reason() {
            return Ok(skipped(reason));
        }
        let url = match target.url.as_deref() {
            Some(url) => url,
            None => return Ok(skipped(SkipReason::NoEndpoint)),
        };
        debug!(url, "sending ddl delta to control plane");

        let body = message.to_json()?;
        let mut headers = vec![("Content-Type", "application/json".to_string())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {}", token)));
        }
        let request = HttpRequest {
            method: "PATCH",
            url,
            headers,
            body: &body,
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.transport.send(&request) {
                Ok(response) if response.status == 200 => {
                    info!(
                        attempts = attempt,
                        dbs = message.dbs.len(),
                        roles = message.roles.len(),
                        "delivered ddl delta to control plane"
                    );
                    return Ok(DeliveryOutcome::Delivered { attempts: attempt });
                }
                Ok(response) => {
                    return Err(RelayError::Protocol {
                        status: response.status,
                        body: truncate_body(&response.body, ERROR_BODY_LIMIT),
                    });
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "control plane request failed"
                    );
                    last_error = err.0;
                    if attempt < max_attempts {
                        self.pause.pause(self.policy.delay);
                    }
                }
            }
        }

        Err(RelayError::Transport {
            attempts: max_attempts,
            detail: last_error,
        })
    }
}

fn skipped(reason: SkipReason) -> DeliveryOutcome {
    info!(%reason, "skipping control plane delivery");
    DeliveryOutcome::Skipped(reason)
}

/// Lossy UTF-8 of at most `limit` bytes, cut at a character boundary.
pub fn truncate_body(body: &[u8], limit: usize) -> String {
    let mut text = String::from_utf8_lossy(&body[..body.len().min(limit)]).into_owned();
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
