use crate::entry::GroupKey;

#[cfg(feature = "shipper")]
use reqwest::{self, StatusCode};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("the writer has been stopped and no longer accepts log entries")]
    WriterClosed,
    #[error("the pending buffer is full, it may not hold more than {limit} entries")]
    BufferFull { limit: usize },
    #[error("Failed to read the 'default_labels' object from the JSON value, is it an object of strings?. Parse error: {0}")]
    DefaultLabelsError(serde_json::Error),
    #[error("Failed to read the 'resource_labels' object from the JSON value, is it an object of strings?. Parse error: {0}")]
    ResourceLabelsError(serde_json::Error),
    #[error("the remote write failed: {0}")]
    Remote(String),
    #[cfg(feature = "shipper")]
    #[error("Reqwest error with context '{context}'. Error: {source}")]
    ShipperReqwestError {
        context: String,
        source: reqwest::Error,
    },
    #[cfg(feature = "shipper")]
    #[error("unsuccessful HTTP response error with context '{context}'. HTTP status code: '{status}', body: '{body}'")]
    HttpResponseError {
        context: String,
        status: StatusCode,
        body: String,
    },
}

#[cfg(feature = "shipper")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ShipperReqwestError {
            context: "Error sending HTTP request".to_string(),
            source: err,
        }
    }
}

/// A group that could not be written during a flush cycle.
///
/// Carries the grouping attributes and the number of entries that were lost, never the
/// entries themselves.
#[derive(thiserror::Error, Debug)]
#[error("failed to write {entry_count} entries to log '{}': {source}", .group.log_name())]
pub struct FlushError {
    pub group: GroupKey,
    pub entry_count: usize,
    pub source: Error,
}
