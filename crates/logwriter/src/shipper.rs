use crate::entry::{Entry, GroupKey, Labels, Payload, Resource};
use crate::error::Error;
use crate::flush::EntriesWriter;

use async_trait::async_trait;
use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};
use reqwest::{Client, Response};
use std::collections::HashMap;

/// The Google Logging API endpoint used when no other is given
pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

async fn get_error_response(response: Response, context: String) -> Error {
    let status = response.status();

    let body = match response.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<String>(&bytes) {
            Ok(json) => json,
            Err(_) => String::from_utf8_lossy(&bytes).to_string(),
        },
        Err(e) => format!("could not decode body of HTTP Error response: {e}"),
    };

    Error::HttpResponseError {
        context,
        status,
        body,
    }
}

fn to_hash_map(labels: &Labels) -> Option<HashMap<String, String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.clone().into_iter().collect())
    }
}

fn to_monitored_resource(resource: &Resource) -> MonitoredResource {
    MonitoredResource {
        type_: Some(resource.type_().to_string()),
        labels: to_hash_map(resource.labels()),
    }
}

fn to_log_entry(entry: &Entry) -> LogEntry {
    let (text_payload, json_payload) = match entry.payload() {
        Payload::Text(text) => (Some(text.clone()), None),
        Payload::Json(fields) => (None, Some(fields.clone().into_iter().collect())),
    };
    LogEntry {
        text_payload,
        json_payload,
        severity: Some(entry.severity().as_str().to_string()),
        timestamp: entry.timestamp(),
        labels: to_hash_map(entry.labels()),
        ..Default::default()
    }
}

/// Turns a short log name like `web_app_log` into `projects/{project_id}/logs/web_app_log`.
/// Names that already start with `projects/` are returned as they are.
pub fn full_log_name(project_id: Option<&str>, log_name: &str) -> String {
    match project_id {
        Some(project_id) if !log_name.starts_with("projects/") => {
            format!("projects/{project_id}/logs/{log_name}")
        }
        _ => log_name.to_string(),
    }
}

/// Builds the [`WriteLogEntriesRequest`](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write)
/// for a group. The log name, resource and labels of the group are set once on the request and
/// apply to every entry in it. See [`full_log_name`] for how `project_id` is used.
pub fn write_request(
    project_id: Option<&str>,
    key: &GroupKey,
    entries: &[Entry],
) -> WriteLogEntriesRequest {
    WriteLogEntriesRequest {
        log_name: Some(full_log_name(project_id, key.log_name())),
        resource: Some(to_monitored_resource(key.resource())),
        labels: to_hash_map(key.labels()),
        entries: Some(entries.iter().map(to_log_entry).collect()),
        ..Default::default()
    }
}

/// An [`EntriesWriter`] that posts to the `entries:write` method of the
/// [Google Logging REST API](https://cloud.google.com/logging/docs/reference/v2/rest).
///
/// The bearer token, if any, is used as is. Obtaining and refreshing it is up to the caller.
/// Short log names are qualified with the project set through
/// [`with_project`](Self::with_project).
pub struct HttpEntriesWriter {
    client: Client,
    endpoint: String,
    project_id: Option<String>,
    token: Option<String>,
}

impl Default for HttpEntriesWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpEntriesWriter {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Sends to another API base URL, e.g. a local emulator.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        HttpEntriesWriter {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: None,
            token: None,
        }
    }

    #[must_use]
    pub fn with_project(self, project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    fn url(&self) -> String {
        format!("{}/v2/entries:write", self.endpoint)
    }
}

#[async_trait]
impl EntriesWriter for HttpEntriesWriter {
    async fn write_entries(&self, key: &GroupKey, entries: Vec<Entry>) -> Result<(), Error> {
        let body = write_request(self.project_id.as_deref(), key, &entries);

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP POST request to the Google Logging API".to_string(),
                source: e,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(get_error_response(
                response,
                "response when sending log entries to Google Logging API".to_string(),
            )
            .await)
        }
    }
}
