//! `reqwest`-backed implementation of the core [`Transport`] seam.
//!
//! Certificate validation, proxying and the request timeout are fixed when the
//! transport is built; every call after that is a plain request/response.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bu_reconcile_core::contract::{ApiRequest, Method, RawResponse, Transport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection-level options resolved from flags, config and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub validate_certs: bool,
    pub https_proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            validate_certs: true,
            https_proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.validate_certs);

        if let Some(proxy) = &settings.https_proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .with_context(|| format!("Invalid https proxy URL '{proxy}'"))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        tracing::info!(
            validate_certs = settings.validate_certs,
            proxy_set = settings.https_proxy.is_some(),
            timeout_secs = settings.timeout.as_secs(),
            "Initialised HTTP transport"
        );
        if !settings.validate_certs {
            tracing::warn!("TLS certificate validation is disabled");
        }
        Ok(HttpTransport { client })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> RawResponse {
        let mut builder = self.client.request(to_reqwest(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => {
                        tracing::debug!(url = %request.url, status, bytes = body.len(), "HTTP response received");
                        RawResponse::Received { status, body }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, url = %request.url, status, "Failed to read response body");
                        RawResponse::Failed {
                            reason: format!("failed to read response body: {e}"),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = ?e, url = %request.url, "HTTP request failed");
                RawResponse::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
