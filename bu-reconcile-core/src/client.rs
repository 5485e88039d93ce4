//! Authenticated access to the Better Uptime v2 REST API.
//!
//! [`ApiClient`] builds URLs and headers and hands requests to a
//! [`Transport`]. List requests are followed page by page until the cursor at
//! `data.pagination.next` runs out.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::contract::{ApiRequest, Method, RawResponse, Transport};
use crate::model::{FieldMap, RemoteRecord, ResourceKind};

pub const DEFAULT_BASE_URL: &str = "https://betteruptime.com/api/v2/";

/// Cursor value the API uses to mark the last page. It is the string
/// `"null"`, not a JSON null.
pub const END_OF_PAGES: &str = "null";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("response from {url} (status {status}) is not valid JSON: {source}")]
    Decode {
        url: String,
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} (status {status}) is not a JSON object")]
    NotAnObject { url: String, status: u16 },

    #[error("API returned errors: {0}")]
    Remote(Value),

    #[error("API response carried neither `data` nor `errors`")]
    MissingData,

    #[error("malformed record in API response: {0}")]
    Record(#[source] serde_json::Error),
}

/// Client for one API token. Cheap to build; holds no connection state of its
/// own beyond what the transport keeps.
pub struct ApiClient<T> {
    transport: T,
    token: String,
    base_url: String,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, token: impl Into<String>) -> Self {
        ApiClient {
            transport,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Points the client at another API root. A trailing `/` is added if
    /// missing.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.base_url, kind.path())
    }

    pub fn record_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}{}/{}", self.base_url, kind.path(), id)
    }

    /// Sends one request with the bearer token and JSON content type.
    pub async fn send(&self, method: Method, url: String, body: Option<&FieldMap>) -> RawResponse {
        let request = ApiRequest {
            method,
            url,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", self.token)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: body.map(|fields| Value::Object(fields.clone()).to_string()),
        };
        debug!(method = method.as_str(), url = %request.url, "Sending API request");
        self.transport.send(request).await
    }

    /// Lists every record of `kind`, or the single record `id`, following
    /// pagination to the end.
    pub async fn fetch_all(
        &self,
        kind: ResourceKind,
        id: Option<u64>,
    ) -> Result<Vec<RemoteRecord>, FetchError> {
        let mut url = match id {
            Some(id) => self.record_url(kind, &id.to_string()),
            None => self.collection_url(kind),
        };
        info!(kind = %kind, id = ?id, "Fetching remote records");

        let mut pages = PageAccumulator::default();
        let mut page_count = 0usize;

        loop {
            let (status, body) = match self.send(Method::Get, url.clone(), None).await {
                RawResponse::Received { status, body } => (status, body),
                RawResponse::Failed { reason } => {
                    error!(url = %url, reason = %reason, "Transport failure while listing");
                    return Err(FetchError::Transport { url, reason });
                }
            };
            page_count += 1;
            debug!(url = %url, status, page = page_count, "Received page");

            let page = match serde_json::from_str::<Value>(&body) {
                Ok(Value::Object(page)) => page,
                Ok(_) => return Err(FetchError::NotAnObject { url, status }),
                Err(source) => {
                    error!(url = %url, status, error = %source, "Page is not valid JSON");
                    return Err(FetchError::Decode { url, status, source });
                }
            };

            let next = next_page(&page).map(str::to_owned);
            pages.merge(page);

            match next {
                Some(next) if next == url => {
                    warn!(url = %url, "Pagination cursor points at the current page, stopping");
                    break;
                }
                Some(next) => url = next,
                None => break,
            }
        }

        let records = pages.into_records()?;
        info!(kind = %kind, pages = page_count, count = records.len(), "Fetched remote records");
        Ok(records)
    }

    pub async fn create(&self, kind: ResourceKind, payload: &FieldMap) -> RawResponse {
        self.send(Method::Post, self.collection_url(kind), Some(payload))
            .await
    }

    pub async fn update(&self, kind: ResourceKind, id: &str, payload: &FieldMap) -> RawResponse {
        self.send(Method::Patch, self.record_url(kind, id), Some(payload))
            .await
    }

    pub async fn delete(&self, kind: ResourceKind, id: &str) -> RawResponse {
        self.send(Method::Delete, self.record_url(kind, id), None)
            .await
    }
}

/// The cursor of a decoded page, unless the page is the last one.
///
/// Pagination stops when `data` is missing, when it has no `pagination`
/// member, when `next` is missing or not a string, or when `next` is the
/// literal string `"null"`.
pub fn next_page(page: &FieldMap) -> Option<&str> {
    let next = page.get("data")?.get("pagination")?.get("next")?.as_str()?;
    (next != END_OF_PAGES).then_some(next)
}

/// Top-level merge of every page. `data` accumulates in page order; any other
/// key keeps the value of the latest page that carried it.
#[derive(Debug, Default)]
struct PageAccumulator {
    data: Vec<Value>,
    saw_data: bool,
    rest: FieldMap,
}

impl PageAccumulator {
    fn merge(&mut self, page: FieldMap) {
        for (key, value) in page {
            if key != "data" {
                self.rest.insert(key, value);
                continue;
            }
            self.saw_data = true;
            match value {
                Value::Array(items) => self.data.extend(items),
                Value::Null => {}
                other => self.data.push(other),
            }
        }
    }

    fn into_records(mut self) -> Result<Vec<RemoteRecord>, FetchError> {
        if let Some(errors) = self.rest.remove("errors") {
            warn!(errors = %errors, "API reported errors while listing");
            return Err(FetchError::Remote(errors));
        }
        if !self.saw_data {
            return Err(FetchError::MissingData);
        }
        let mut records = Vec::with_capacity(self.data.len());
        for entry in self.data {
            // An object page without an id only carries the cursor.
            if entry.is_object() && entry.get("id").is_none() {
                debug!("Skipping data entry without id");
                continue;
            }
            records.push(serde_json::from_value(entry).map_err(FetchError::Record)?);
        }
        Ok(records)
    }
}
