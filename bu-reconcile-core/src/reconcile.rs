//! Desired-state reconciliation: list → match → diff → decide → execute.
//!
//! One invocation performs a single listing (following pagination) and at
//! most one mutating call. Nothing is cached between invocations.
//!
//! # Decision table
//!
//! Evaluated top to bottom, first row wins:
//!
//! | matched | diff      | state   | action          |
//! |---------|-----------|---------|-----------------|
//! | yes     | empty     | absent  | delete          |
//! | yes     | non-empty | present | update (PATCH)  |
//! | no      | -         | present | create (POST)   |
//! | otherwise                     || no-op          |
//!
//! Updates send the complete desired record rather than only the diff. Remote
//! fields that the desired record leaves out can be reset by the API as a
//! result.
//!
//! # Errors
//! [`Reconciler::plan`] returns typed errors. [`Reconciler::reconcile`] turns
//! every failure into a [`ReconcileOutcome`] with `failed` set, so callers get
//! one shape back whatever happened.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::{ApiClient, FetchError};
use crate::contract::{RawResponse, Transport};
use crate::model::{DesiredRecord, FieldMap, ModelError, RemoteRecord, ResourceKind, State};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no match keys given; at least one field is needed to identify the record")]
    NoMatchKeys,

    #[error("match key '{0}' is not set on the desired record")]
    MissingMatchKey(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// The single action chosen for an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Create,
    Update { id: String },
    Delete { id: String },
    Noop,
}

impl Action {
    /// Status code that marks the call as successful.
    pub fn expected_status(&self) -> Option<u16> {
        match self {
            Action::Create => Some(201),
            Action::Update { .. } => Some(200),
            Action::Delete { .. } => Some(204),
            Action::Noop => None,
        }
    }
}

/// Everything needed for one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileRequest {
    pub record: DesiredRecord,
    /// Restricts the listing to one remote record.
    pub id: Option<u64>,
    pub match_keys: Vec<String>,
    pub state: State,
    /// Decide and report, but do not issue the mutating call.
    pub dry_run: bool,
}

/// The decision, before anything is executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub kind: ResourceKind,
    pub payload: FieldMap,
    pub matched: Option<RemoteRecord>,
    pub diff: FieldMap,
    pub action: Action,
}

/// Structured result of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub changed: bool,
    pub failed: bool,
    /// Absent when the invocation failed before a decision was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "FieldMap::is_empty")]
    pub diff: FieldMap,
    /// Attributes of the resulting record, `{}` after a delete.
    pub result: Value,
    /// Status of the mutating call, if one was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ReconcileOutcome {
    fn decided(plan: &Plan, result: Value) -> Self {
        ReconcileOutcome {
            changed: false,
            failed: false,
            action: Some(plan.action.clone()),
            diff: plan.diff.clone(),
            result,
            return_code: None,
            msg: None,
        }
    }

    fn failure(msg: String, result: Value) -> Self {
        ReconcileOutcome {
            changed: false,
            failed: true,
            action: None,
            diff: FieldMap::new(),
            result,
            return_code: None,
            msg: Some(msg),
        }
    }
}

fn empty_result() -> Value {
    Value::Object(FieldMap::new())
}

/// Fails fast when a match key cannot be compared.
pub fn validate_match_keys(desired: &FieldMap, keys: &[String]) -> Result<(), ReconcileError> {
    if keys.is_empty() {
        return Err(ReconcileError::NoMatchKeys);
    }
    match keys.iter().find(|key| !desired.contains_key(key.as_str())) {
        Some(key) => Err(ReconcileError::MissingMatchKey(key.clone())),
        None => Ok(()),
    }
}

/// First remote record, in list order, whose attributes equal the desired
/// value for every match key.
pub fn find_match<'a>(
    desired: &FieldMap,
    remote: &'a [RemoteRecord],
    keys: &[String],
) -> Option<&'a RemoteRecord> {
    remote.iter().find(|record| {
        keys.iter().all(|key| match desired.get(key) {
            Some(value) => record.attributes.get(key) == Some(value),
            None => false,
        })
    })
}

/// Desired fields whose value differs from, or is missing in, `attributes`.
pub fn compute_diff(desired: &FieldMap, attributes: &FieldMap) -> FieldMap {
    desired
        .iter()
        .filter(|(key, value)| attributes.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn decide(matched: Option<&RemoteRecord>, diff: &FieldMap, state: State) -> Action {
    match (matched, state) {
        (Some(record), State::Absent) if diff.is_empty() => Action::Delete {
            id: record.id.clone(),
        },
        (Some(record), State::Present) if !diff.is_empty() => Action::Update {
            id: record.id.clone(),
        },
        (None, State::Present) => Action::Create,
        _ => Action::Noop,
    }
}

/// Reconciles desired records through an owned [`ApiClient`].
pub struct Reconciler<T> {
    client: ApiClient<T>,
}

impl<T: Transport> Reconciler<T> {
    pub fn new(client: ApiClient<T>) -> Self {
        Reconciler { client }
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    /// Validates the request, lists the remote records and decides.
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<Plan, ReconcileError> {
        let kind = request.record.kind();
        request.record.validate(request.id)?;
        let payload = request.record.to_field_map()?;
        validate_match_keys(&payload, &request.match_keys)?;

        let remote = self.client.fetch_all(kind, request.id).await?;

        let matched = find_match(&payload, &remote, &request.match_keys).cloned();
        let diff = match &matched {
            Some(record) => compute_diff(&payload, &record.attributes),
            None => FieldMap::new(),
        };
        let action = decide(matched.as_ref(), &diff, request.state);

        info!(
            kind = %kind,
            candidates = remote.len(),
            matched_id = matched.as_ref().map(|r| r.id.as_str()),
            diff_fields = diff.len(),
            action = ?action,
            "Reconciliation decided"
        );
        debug!(diff = ?diff, "Computed diff");

        Ok(Plan {
            kind,
            payload,
            matched,
            diff,
            action,
        })
    }

    /// Runs one full invocation. Never returns an error; failures are
    /// reported in the outcome.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        let plan = match self.plan(request).await {
            Ok(plan) => plan,
            Err(ReconcileError::Fetch(FetchError::Remote(errors))) => {
                error!(errors = %errors, "Listing failed with remote errors");
                return ReconcileOutcome::failure("Task failed.".to_string(), errors);
            }
            Err(e) => {
                error!(error = %e, "Reconciliation failed before any change");
                return ReconcileOutcome::failure(e.to_string(), empty_result());
            }
        };

        if request.dry_run {
            let result = match (&plan.action, &plan.matched) {
                (Action::Create, _) => Value::Object(plan.payload.clone()),
                (_, Some(record)) => Value::Object(record.attributes.clone()),
                (_, None) => empty_result(),
            };
            let mut outcome = ReconcileOutcome::decided(&plan, result);
            outcome.changed = plan.action != Action::Noop;
            outcome.msg = Some("dry run".to_string());
            info!(action = ?plan.action, "Dry run, no request issued");
            return outcome;
        }

        self.execute(&plan).await
    }

    async fn execute(&self, plan: &Plan) -> ReconcileOutcome {
        let matched_attributes = plan
            .matched
            .as_ref()
            .map(|r| Value::Object(r.attributes.clone()))
            .unwrap_or_else(empty_result);

        let response = match &plan.action {
            Action::Noop => return ReconcileOutcome::decided(plan, matched_attributes),
            Action::Delete { id } => {
                info!(kind = %plan.kind, id = %id, "Deleting remote record");
                self.client.delete(plan.kind, id).await
            }
            Action::Update { id } => {
                warn!(
                    kind = %plan.kind,
                    id = %id,
                    fields = plan.payload.len(),
                    "Updating with the full desired record; remote fields not declared may be reset"
                );
                self.client.update(plan.kind, id, &plan.payload).await
            }
            Action::Create => {
                info!(kind = %plan.kind, "Creating remote record");
                self.client.create(plan.kind, &plan.payload).await
            }
        };

        shape_response(plan, matched_attributes, response)
    }
}

fn shape_response(plan: &Plan, matched_attributes: Value, response: RawResponse) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::decided(plan, matched_attributes);
    let expected = plan.action.expected_status();
    let is_delete = matches!(plan.action, Action::Delete { .. });

    let (status, body) = match response {
        RawResponse::Received { status, body } => (status, body),
        RawResponse::Failed { reason } => {
            error!(reason = %reason, "Mutating request failed in transport");
            outcome.failed = true;
            outcome.msg = Some(reason);
            return outcome;
        }
    };
    outcome.return_code = Some(status);

    let decoded = if body.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Some(value),
            // Delete responses carry no meaningful body.
            Err(_) if is_delete => None,
            Err(e) => {
                error!(status, error = %e, "Response body is not valid JSON");
                outcome.failed = true;
                outcome.msg = Some(format!("response (status {status}) is not valid JSON: {e}"));
                return outcome;
            }
        }
    };

    if let Some(errors) = decoded.as_ref().and_then(|body| body.get("errors")) {
        error!(status, errors = %errors, "API rejected the request");
        outcome.failed = true;
        outcome.msg = Some("Task failed.".to_string());
        outcome.result = errors.clone();
        return outcome;
    }

    if Some(status) != expected {
        warn!(status, expected = ?expected, "Unexpected status, treating as no change");
        outcome.msg = Some(format!(
            "unexpected status {status} (expected {}), no change recorded",
            expected.unwrap_or_default()
        ));
        if let Some(body) = decoded {
            outcome.result = body;
        }
        return outcome;
    }

    outcome.changed = true;
    outcome.result = if is_delete {
        empty_result()
    } else {
        decoded
            .map(record_attributes)
            .unwrap_or_else(|| Value::Object(plan.payload.clone()))
    };
    info!(status, action = ?plan.action, "Remote record changed");
    outcome
}

/// `data.attributes` of a single-record response, or the whole body.
fn record_attributes(body: Value) -> Value {
    match body.pointer("/data/attributes") {
        Some(attributes) => attributes.clone(),
        None => body,
    }
}
