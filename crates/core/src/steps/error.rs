//! Structured step error.
//!
//! A `StepError` names the step that failed, what it was doing, the context
//! values captured while it ran, advisory possible causes, and the underlying
//! cause. Details are sanitized when the error is built: credential-like keys
//! are blanked and long values truncated, so the error can be logged and sent
//! to the dashboard as is.

use da_protocol::installation_models::StepFailure;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Context values attached to a step error.
pub type Details = BTreeMap<String, Value>;

const SENSITIVE_KEY_SUFFIXES: [&str; 5] = ["key", "token", "secret", "password", "authorization"];

/// Longest detail value kept before truncation.
pub const MAX_DETAIL_LENGTH: usize = 500;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct StepError {
    step: String,
    action: Option<String>,
    details: Details,
    possible_causes: Vec<String>,
    cause: String,
    message: String,
}

impl StepError {
    pub fn builder(step: impl Into<String>) -> StepErrorBuilder {
        StepErrorBuilder {
            step: step.into(),
            action: None,
            details: Details::new(),
            possible_causes: Vec::new(),
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Sanitized details.
    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn possible_causes(&self) -> &[String] {
        &self.possible_causes
    }

    /// Message of the underlying failure.
    pub fn cause(&self) -> &str {
        &self.cause
    }

    /// Serializable form attached to the failed step's progress entry.
    pub fn to_failure(&self) -> StepFailure {
        StepFailure {
            message: self.message.clone(),
            details: self.details.clone(),
            possible_causes: self.possible_causes.clone(),
        }
    }
}

pub struct StepErrorBuilder {
    step: String,
    action: Option<String>,
    details: Details,
    possible_causes: Vec<String>,
}

impl StepErrorBuilder {
    /// What the step was doing, phrased to follow "while".
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        self.details.extend(details);
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn possible_causes<I, S>(mut self, causes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_causes
            .extend(causes.into_iter().map(Into::into));
        self
    }

    /// Finish the error with the underlying `cause`.
    pub fn build(self, cause: impl fmt::Display) -> StepError {
        let details: Details = self
            .details
            .into_iter()
            .map(|(key, value)| {
                let value = sanitize_value(&key, value);
                (key, value)
            })
            .collect();

        let possible_causes: Vec<String> = self
            .possible_causes
            .iter()
            .map(|cause| cause.trim())
            .filter(|cause| !cause.is_empty())
            .map(str::to_string)
            .collect();

        let cause = cause.to_string();
        let message = render_message(
            &self.step,
            self.action.as_deref(),
            &details,
            &possible_causes,
            &cause,
        );

        StepError {
            step: self.step,
            action: self.action,
            details,
            possible_causes,
            cause,
            message,
        }
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_SUFFIXES
        .iter()
        .any(|suffix| key.ends_with(suffix))
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_DETAIL_LENGTH {
        return text;
    }
    let mut truncated: String = text.chars().take(MAX_DETAIL_LENGTH).collect();
    truncated.push_str("...");
    truncated
}

fn sanitize_value(key: &str, value: Value) -> Value {
    if is_sensitive(key) {
        return Value::String(String::new());
    }

    match value {
        Value::String(text) => Value::String(truncate(text)),
        Value::Array(_) | Value::Object(_) => Value::String(truncate(value.to_string())),
        other => other,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_message(
    step: &str,
    action: Option<&str>,
    details: &Details,
    possible_causes: &[String],
    cause: &str,
) -> String {
    let mut parts = Vec::with_capacity(4);

    parts.push(match action {
        Some(action) => format!("\"{step}\" step failed while {action}"),
        None => format!("\"{step}\" step failed"),
    });

    if !details.is_empty() {
        let rendered: Vec<String> = details
            .iter()
            .map(|(key, value)| format!("{key}={}", render_value(value)))
            .collect();
        parts.push(format!("Details: {}", rendered.join(", ")));
    }

    if !possible_causes.is_empty() {
        parts.push(format!("Possible causes: {}", possible_causes.join("; ")));
    }

    parts.push(format!("Cause: {cause}"));
    parts.join(". ")
}
