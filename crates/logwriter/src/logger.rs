use crate::entry::{Entry, Labels, Resource, Severity};
use crate::error::Error;
use crate::writer::AsyncWriter;

use slog::{self, Drain, Key, Level, Never, OwnedKVList, Record, KV};
use std::fmt;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;

use chrono::Utc;

/// Builder for the [`Logger`]
#[derive(Default, Debug)]
pub struct Builder {
    log_name: String,
    log_level_label: Option<String>,
    resource_type: String,
    default_labels: Labels,
    resource_labels: Labels,
}

/// A [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) that hands every
/// record to an [`AsyncWriter`] as a log entry.
///
/// Logging never fails: records the writer refuses, because it stopped or its pending entry
/// limit is reached, are counted in [`DroppedRecords`] instead.
pub struct Logger {
    log_name: String,
    log_level_label: Option<String>,
    default_labels: Labels,
    resource: Resource,
    writer: AsyncWriter,
    dropped: DroppedRecords,
}

/// Counts the records a [`Logger`] could not hand to its writer. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct DroppedRecords(Arc<AtomicU64>);

impl DroppedRecords {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

impl Builder {
    /// Creates a Builder object.
    ///
    /// # Parameters
    /// - `log_name`: The `logName` string to be used in the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
    /// - `resource_type`: The required `type` field set in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) object of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry). For example: `k8s_container`.
    #[must_use = "The builder must be used"]
    pub fn new(log_name: &str, resource_type: &str) -> Self {
        Self {
            log_name: log_name.to_string(),
            resource_type: resource_type.to_string(),
            ..Default::default()
        }
    }

    /// Sets resource labels to be applied.
    ///
    /// These labels will populate the `labels` field in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource).
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use google_logwriter::logger::Builder;
    ///
    /// let builder = Builder::new("projects/my-gcp-project/logs/my-log-id", "k8s_container")
    ///     .with_resource_labels(json!({
    ///         "location": "europe-west1-b",
    ///         "container_name": "my-app",
    ///         "project_id": "my-gcp-project",
    ///         "cluster_name": "my-gke-cluster",
    ///         "namespace_name": "my-gke-namespace"
    ///     }))
    ///     .unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not a JSON object with string values.
    #[must_use = "The builder must be used"]
    pub fn with_resource_labels(self, labels: serde_json::Value) -> Result<Self, Error> {
        Ok(Self {
            resource_labels: serde_json::from_value(labels).map_err(Error::ResourceLabelsError)?,
            ..self
        })
    }

    /// Sets default labels to be applied in the labels field.
    ///
    /// These populate the `labels` field of the write request and so apply to all entries logged
    /// through the drain. Key-values of the log statement end up in the labels of the entry
    /// itself.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not a JSON object with string values.
    #[must_use = "The builder must be used"]
    pub fn with_default_labels(self, labels: serde_json::Value) -> Result<Self, Error> {
        Ok(Self {
            default_labels: serde_json::from_value(labels).map_err(Error::DefaultLabelsError)?,
            ..self
        })
    }

    /// Sets the label name to store the log level
    ///
    /// If not set, the log level is not propagated, but you will still have the [severity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogSeverity), which is always there.
    #[must_use = "The builder must be used"]
    pub fn with_log_level_label(self, log_level_label: &str) -> Self {
        Self {
            log_level_label: Some(log_level_label.into()),
            ..self
        }
    }

    /// Returns the drain. Records logged to it are written through `writer`.
    #[must_use = "The logger must be used to handle logging correctly"]
    pub fn build(self, writer: AsyncWriter) -> Logger {
        Logger {
            log_name: self.log_name,
            log_level_label: self.log_level_label,
            default_labels: self.default_labels,
            resource: Resource::new(self.resource_type).with_labels(self.resource_labels),
            writer,
            dropped: DroppedRecords::default(),
        }
    }
}

impl Logger {
    /// The counter of records that were dropped. Take it before the drain is moved into a
    /// [`slog::Logger`].
    pub fn dropped_records(&self) -> DroppedRecords {
        self.dropped.clone()
    }

    // Determine a sensible severity based on the log level
    fn get_severity(log_level: Level) -> Severity {
        match log_level {
            Level::Critical => Severity::Critical,
            Level::Error => Severity::Error,
            Level::Warning => Severity::Warning,
            Level::Info => Severity::Info,
            Level::Debug | Level::Trace => Severity::Debug,
        }
    }

    fn construct_log_entry(&self, message: &str, log_level: Level, serializer: Serializer) -> Entry {
        let json_payload = serde_json::Map::from_iter([("message".to_string(), json!(message))]);

        let mut entry = Entry::json(json_payload)
            .with_severity(Self::get_severity(log_level))
            .with_timestamp(Utc::now())
            .with_labels(serializer.map);

        // We add the log level to the labels if requested
        if let Some(label) = &self.log_level_label {
            entry = entry.with_label(label.clone(), log_level.as_str());
        }
        entry
    }
}

#[derive(Debug)]
struct Serializer {
    map: Labels,
}

impl Serializer {
    fn new() -> Self {
        Self { map: Labels::new() }
    }
}

impl slog::Serializer for Serializer {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.map.insert(key.into(), value);
        Ok(())
    }
}

impl Drain for Logger {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let mut serializer = Serializer::new();

        // Record values go last so they win over the logger's values
        let _ = values.serialize(record, &mut serializer);
        let _ = record.kv().serialize(record, &mut serializer);

        let log_entry = self.construct_log_entry(
            format!("{}", record.msg()).as_str(),
            record.level(),
            serializer,
        );

        if self
            .writer
            .write_entries(
                vec![log_entry],
                &self.log_name,
                &self.resource,
                &self.default_labels,
            )
            .is_err()
        {
            self.dropped.inc();
        }
        Ok(())
    }
}
