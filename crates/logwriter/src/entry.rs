use crate::error::Error;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Labels as they appear on entries, resources and groups. Ordered so that two label sets with
/// the same pairs compare and hash the same, whatever order they were inserted in.
pub type Labels = BTreeMap<String, String>;

/// The [severity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity) of a log entry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(Severity::Default),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "NOTICE" => Ok(Severity::Notice),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            "ALERT" => Ok(Severity::Alert),
            "EMERGENCY" => Ok(Severity::Emergency),
            other => Err(Error::InvalidArgument(format!("unknown severity '{other}'"))),
        }
    }
}

/// What a log entry carries
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Map<String, serde_json::Value>),
}

/// A single log line, ready to be handed to an [`AsyncWriter`](crate::writer::AsyncWriter).
///
/// Entries are assembled with the `with_*` methods and are not changed anymore once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    payload: Payload,
    severity: Severity,
    timestamp: Option<DateTime<Utc>>,
    labels: Labels,
}

impl Entry {
    /// Creates an entry with a `textPayload`
    pub fn text(message: impl Into<String>) -> Self {
        Self::with_payload(Payload::Text(message.into()))
    }

    /// Creates an entry with a `jsonPayload`
    pub fn json(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::with_payload(Payload::Json(fields))
    }

    pub fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            severity: Severity::Default,
            timestamp: None,
            labels: Labels::new(),
        }
    }

    #[must_use]
    pub fn with_severity(self, severity: Severity) -> Self {
        Self { severity, ..self }
    }

    #[must_use]
    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    /// Adds a label specific to this entry. These do not take part in grouping.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// The [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource)
/// the entries were produced by, e.g. a `gce_instance` or `k8s_container`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    type_: String,
    labels: Labels,
}

impl Resource {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            labels: Labels::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// Identifies the entries that are combined into a single remote write: same log name, same
/// resource and same labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    log_name: String,
    resource: Resource,
    labels: Labels,
}

impl GroupKey {
    /// Derives the key from the grouping attributes of a write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the log name or the resource type is blank, or
    /// when any of the label keys is empty.
    pub fn new(log_name: &str, resource: &Resource, labels: &Labels) -> Result<Self, Error> {
        if log_name.trim().is_empty() {
            return Err(Error::InvalidArgument("the log name may not be empty".to_string()));
        }
        if resource.type_().trim().is_empty() {
            return Err(Error::InvalidArgument(
                "the resource type may not be empty".to_string(),
            ));
        }
        if resource.labels().keys().any(String::is_empty) {
            return Err(Error::InvalidArgument(
                "resource label keys may not be empty".to_string(),
            ));
        }
        if labels.keys().any(String::is_empty) {
            return Err(Error::InvalidArgument("label keys may not be empty".to_string()));
        }
        Ok(Self {
            log_name: log_name.to_string(),
            resource: resource.clone(),
            labels: labels.clone(),
        })
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}
