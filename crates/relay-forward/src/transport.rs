//! HTTP transport abstraction.
//!
//! The delivery client only needs "send this request, give me the status
//! and the beginning of the body". Transport-level failures (connect,
//! timeout, TLS, I/O) are reported as [`TransportError`] and are retried;
//! any completed response, whatever its status, is returned as
//! [`HttpResponse`].

use once_cell::sync::OnceCell;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure before a response was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// An outbound request.
#[derive(Clone, Debug)]
pub struct HttpRequest<'a> {
    pub method: &'static str,
    pub url: &'a str,
    pub headers: Vec<(&'static str, String)>,
    pub body: &'a str,
}

/// A completed response. `body` holds at most the transport's body limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Blocking HTTP transport.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

/// `ureq`-backed transport.
///
/// The agent (and its connection pool) is built on first use and reused for
/// every later request.
pub struct UreqTransport {
    agent: OnceCell<ureq::Agent>,
    timeout: Duration,
    body_limit: usize,
}

impl UreqTransport {
    pub fn new(timeout: Duration, body_limit: usize) -> Self {
        Self {
            agent: OnceCell::new(),
            timeout,
            body_limit,
        }
    }

    /// Whether the agent has been built yet.
    pub fn is_initialized(&self) -> bool {
        self.agent.get().is_some()
    }

    fn agent(&self) -> &ureq::Agent {
        self.agent.get_or_init(|| {
            debug!(timeout_ms = self.timeout.as_millis() as u64, "building control plane http agent");
            ureq::AgentBuilder::new().timeout(self.timeout).build()
        })
    }

    fn read_body(&self, response: ureq::Response) -> Vec<u8> {
        let mut body = Vec::new();
        let mut reader = response.into_reader().take(self.body_limit as u64);
        // The status already decided the outcome; a short body is enough.
        if let Err(err) = reader.read_to_end(&mut body) {
            debug!(error = %err, "failed to read control plane response body");
        }
        body
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let mut call = self.agent().request(request.method, request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        match call.send_string(request.body) {
            Ok(response) => {
                let status = response.status();
                Ok(HttpResponse {
                    status,
                    body: self.read_body(response),
                })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpResponse {
                status,
                body: self.read_body(response),
            }),
            Err(ureq::Error::Transport(transport)) => Err(TransportError(transport.to_string())),
        }
    }
}
