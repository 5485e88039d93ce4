//! Typed desired-state records and the records returned by the API.
//!
//! Every resource kind gets its own record struct with one optional field per
//! API attribute. The HTTP boundary only ever sees the [`FieldMap`] produced by
//! [`ToFieldMap::to_field_map`], which contains the fields that were set and
//! nothing else. Control inputs (token, state, match keys, id) live outside the
//! record, so they can never leak into a payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A JSON object keyed by API field name.
pub type FieldMap = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("fields {fields:?} must be given together")]
    RequiredTogether { fields: &'static [&'static str] },

    #[error("one of {fields:?} is required")]
    RequiredOneOf { fields: &'static [&'static str] },

    #[error("unknown resource kind '{0}' (expected 'monitors' or 'status-pages')")]
    UnknownKind(String),

    #[error("unknown state '{0}' (expected 'present' or 'absent')")]
    UnknownState(String),

    #[error("record did not serialise to a JSON object: {0}")]
    NotAnObject(String),

    #[error("failed to project record fields: {0}")]
    Projection(#[from] serde_json::Error),
}

/// The REST collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Monitors,
    StatusPages,
}

impl ResourceKind {
    /// Path segment under the API base.
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Monitors => "monitors",
            ResourceKind::StatusPages => "status-pages",
        }
    }

    /// Fields used to identify a record when the caller gives none.
    pub fn default_match_keys(&self) -> Vec<String> {
        match self {
            ResourceKind::Monitors => vec!["url".to_string()],
            ResourceKind::StatusPages => vec!["subdomain".to_string()],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ResourceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitors" | "monitor" => Ok(ResourceKind::Monitors),
            "status-pages" | "status_pages" | "status_page" => Ok(ResourceKind::StatusPages),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// Whether the record should exist remotely after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Present,
    Absent,
}

impl FromStr for State {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(State::Present),
            "absent" => Ok(State::Absent),
            _ => Err(ModelError::UnknownState(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    Status,
    ExpectedStatusCode,
    Keyword,
    KeywordAbsence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Eu,
    As,
    Au,
}

/// Desired configuration of a single uptime monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorRecord {
    /// URL or host to monitor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_type: Option<MonitorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status_codes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Value>,
    /// Days before domain expiry to alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_expiration: Option<i64>,
    /// Days before certificate expiry to alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_expiration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    /// Keyword checked by `keyword` and `keyword_absence` monitors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
    /// Seconds to wait before escalating to the whole team.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_wait: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<Region>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronounceable_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_ssl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_frequency: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<HttpMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_password: Option<String>,
    /// Start of the daily maintenance window, `HH:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_from: Option<String>,
    /// End of the daily maintenance window, `HH:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_to: Option<String>,
}

/// Desired configuration of a public status page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusPageRecord {
    /// Days of incident history shown on the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_from_search_engines: Option<bool>,
}

/// Projection of a typed record onto the JSON object sent over the wire.
pub trait ToFieldMap: Serialize {
    fn to_field_map(&self) -> Result<FieldMap, ModelError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ModelError::NotAnObject(other.to_string())),
        }
    }
}

impl ToFieldMap for MonitorRecord {}
impl ToFieldMap for StatusPageRecord {}

/// Caller-declared target state for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesiredRecord {
    Monitor(MonitorRecord),
    StatusPage(StatusPageRecord),
}

impl DesiredRecord {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredRecord::Monitor(_) => ResourceKind::Monitors,
            DesiredRecord::StatusPage(_) => ResourceKind::StatusPages,
        }
    }

    pub fn to_field_map(&self) -> Result<FieldMap, ModelError> {
        match self {
            DesiredRecord::Monitor(m) => m.to_field_map(),
            DesiredRecord::StatusPage(s) => s.to_field_map(),
        }
    }

    /// Checks the per-kind field rules. `id` counts as identification for
    /// the one-of rule.
    pub fn validate(&self, id: Option<u64>) -> Result<(), ModelError> {
        match self {
            DesiredRecord::Monitor(m) => {
                const TOGETHER: &[&str] = &["url", "monitor_type"];
                if m.url.is_some() != m.monitor_type.is_some() {
                    return Err(ModelError::RequiredTogether { fields: TOGETHER });
                }
                if id.is_none() && m.url.is_none() {
                    return Err(ModelError::RequiredOneOf {
                        fields: &["id", "url"],
                    });
                }
            }
            DesiredRecord::StatusPage(s) => {
                const TOGETHER: &[&str] = &["company_name", "company_url", "timezone", "subdomain"];
                let set = [
                    s.company_name.is_some(),
                    s.company_url.is_some(),
                    s.timezone.is_some(),
                    s.subdomain.is_some(),
                ];
                if set.iter().any(|b| *b) && !set.iter().all(|b| *b) {
                    return Err(ModelError::RequiredTogether { fields: TOGETHER });
                }
                if id.is_none() && s.subdomain.is_none() {
                    return Err(ModelError::RequiredOneOf {
                        fields: &["id", "subdomain"],
                    });
                }
            }
        }
        Ok(())
    }
}

/// One entity as currently stored by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub attributes: FieldMap,
}

// The API serialises ids as strings, but numbers are accepted too.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "record id must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_map_only_contains_set_fields() {
        let record = MonitorRecord {
            url: Some("https://x.com".into()),
            monitor_type: Some(MonitorType::Status),
            paused: Some(false),
            ..Default::default()
        };
        let map = record.to_field_map().unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"url": "https://x.com", "monitor_type": "status", "paused": false})
        );
    }

    #[test]
    fn enums_use_api_spelling() {
        let record = MonitorRecord {
            http_method: Some(HttpMethod::Head),
            regions: Some(vec![Region::Eu, Region::As]),
            monitor_type: Some(MonitorType::KeywordAbsence),
            ..Default::default()
        };
        let map = record.to_field_map().unwrap();
        assert_eq!(map["http_method"], json!("HEAD"));
        assert_eq!(map["regions"], json!(["eu", "as"]));
        assert_eq!(map["monitor_type"], json!("keyword_absence"));
    }

    #[test]
    fn desired_record_is_tagged_by_type() {
        let record: DesiredRecord = serde_json::from_value(json!({
            "type": "status_page",
            "subdomain": "acme",
            "history": 90
        }))
        .unwrap();
        assert_eq!(record.kind(), ResourceKind::StatusPages);
        assert_eq!(
            Value::Object(record.to_field_map().unwrap()),
            json!({"history": 90, "subdomain": "acme"})
        );
    }

    #[test]
    fn unknown_record_fields_are_rejected() {
        let err = serde_json::from_value::<DesiredRecord>(json!({
            "type": "monitor",
            "urll": "https://x.com"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn remote_id_accepts_numbers() {
        let record: RemoteRecord = serde_json::from_value(json!({
            "id": 42,
            "type": "monitor",
            "attributes": {"url": "https://x.com"}
        }))
        .unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.attributes["url"], json!("https://x.com"));
    }

    #[test]
    fn monitor_requires_url_and_type_together() {
        let record = DesiredRecord::Monitor(MonitorRecord {
            url: Some("https://x.com".into()),
            ..Default::default()
        });
        assert!(matches!(
            record.validate(None),
            Err(ModelError::RequiredTogether { .. })
        ));
    }

    #[test]
    fn monitor_requires_id_or_url() {
        let record = DesiredRecord::Monitor(MonitorRecord {
            paused: Some(true),
            ..Default::default()
        });
        assert!(matches!(
            record.validate(None),
            Err(ModelError::RequiredOneOf { .. })
        ));
        assert!(record.validate(Some(7)).is_ok());
    }

    #[test]
    fn status_page_requires_identity_fields_together() {
        let partial = DesiredRecord::StatusPage(StatusPageRecord {
            subdomain: Some("acme".into()),
            company_name: Some("Acme".into()),
            ..Default::default()
        });
        assert!(matches!(
            partial.validate(None),
            Err(ModelError::RequiredTogether { .. })
        ));

        let complete = DesiredRecord::StatusPage(StatusPageRecord {
            subdomain: Some("acme".into()),
            company_name: Some("Acme".into()),
            company_url: Some("https://acme.test".into()),
            timezone: Some("UTC".into()),
            ..Default::default()
        });
        assert!(complete.validate(None).is_ok());
    }

    #[test]
    fn state_and_kind_parse_from_strings() {
        assert_eq!("Absent".parse::<State>().unwrap(), State::Absent);
        assert!("gone".parse::<State>().is_err());
        assert_eq!(
            "status-pages".parse::<ResourceKind>().unwrap(),
            ResourceKind::StatusPages
        );
        assert_eq!(ResourceKind::Monitors.to_string(), "monitors");
    }
}
