//! # contract: the HTTP seam between the reconciler and the network
//!
//! The core crate never opens a socket. Everything it needs from HTTP goes
//! through the [`Transport`] trait: one request in, one [`RawResponse`] out.
//! The CLI crate implements it on top of `reqwest`; tests use the generated
//! [`MockTransport`].
//!
//! ## Error contract
//! - A transport never returns `Err`. Any HTTP status, including 4xx and 5xx,
//!   is a [`RawResponse::Received`].
//! - DNS, TLS, connection and timeout problems become [`RawResponse::Failed`],
//!   so callers inspect every outcome the same way.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A fully prepared request. Headers are already filled in by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Serialised JSON body, if any.
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// The server answered, whatever the status.
    Received { status: u16, body: String },
    /// No HTTP response was obtained.
    Failed { reason: String },
}

impl RawResponse {
    pub fn status(&self) -> Option<u16> {
        match self {
            RawResponse::Received { status, .. } => Some(*status),
            RawResponse::Failed { .. } => None,
        }
    }
}

/// Executes HTTP requests against the remote API.
///
/// Implementations must be `Send + Sync` so a single transport can back the
/// client for the whole invocation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP call. Never fails; see the module docs.
    async fn send(&self, request: ApiRequest) -> RawResponse;
}
