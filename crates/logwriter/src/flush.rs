use crate::buffer::Snapshot;
use crate::entry::{Entry, GroupKey};
use crate::error::{Error, FlushError};

use async_trait::async_trait;
use slog::{debug, error, Logger};
use std::sync::Arc;

/// Writes a group of entries to the remote logging API, e.g.
/// [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries).
///
/// Implementations get the entries in the order they were written and take ownership of them.
/// They are called once per group per flush and are never retried.
#[async_trait]
pub trait EntriesWriter: Send + Sync {
    async fn write_entries(&self, key: &GroupKey, entries: Vec<Entry>) -> Result<(), Error>;
}

/// Gets told about every group that could not be written.
///
/// Whatever should happen with a failure, like logging or counting it, happens here.
/// The writer itself moves on.
pub trait ErrorHook: Send + Sync {
    fn on_flush_error(&self, error: FlushError);
}

impl<F> ErrorHook for F
where
    F: Fn(FlushError) + Send + Sync,
{
    fn on_flush_error(&self, error: FlushError) {
        self(error)
    }
}

/// The [`ErrorHook`] used when none is configured. It logs the failure.
pub struct LoggingErrorHook {
    log: Logger,
}

impl LoggingErrorHook {
    pub fn new(log: Logger) -> Self {
        LoggingErrorHook { log }
    }
}

impl ErrorHook for LoggingErrorHook {
    fn on_flush_error(&self, err: FlushError) {
        error!(self.log, "Could not write log entries: {}", err;
            "log-name" => err.group.log_name(),
            "resource-type" => err.group.resource().type_(),
            "entries" => err.entry_count,
        );
    }
}

/// What came out of a single [`FlushExecutor::flush`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub groups_written: usize,
    pub entries_written: usize,
    pub groups_failed: usize,
    pub entries_failed: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.groups_written == 0 && self.groups_failed == 0
    }
}

/// Hands the groups of a [`Snapshot`] to an [`EntriesWriter`], one call per group.
pub struct FlushExecutor {
    writer: Arc<dyn EntriesWriter>,
    error_hook: Arc<dyn ErrorHook>,
    log: Logger,
}

impl FlushExecutor {
    pub fn new(writer: Arc<dyn EntriesWriter>, error_hook: Arc<dyn ErrorHook>, log: Logger) -> Self {
        FlushExecutor {
            writer,
            error_hook,
            log,
        }
    }

    /// Writes every group of the snapshot in order. A group that fails is reported to the error
    /// hook and the remaining groups are still attempted.
    pub async fn flush(&self, snapshot: Snapshot) -> FlushReport {
        let mut report = FlushReport::default();
        for (key, entries) in snapshot {
            let entry_count = entries.len();
            match self.writer.write_entries(&key, entries).await {
                Ok(()) => {
                    report.groups_written += 1;
                    report.entries_written += entry_count;
                }
                Err(source) => {
                    report.groups_failed += 1;
                    report.entries_failed += entry_count;
                    self.error_hook.on_flush_error(FlushError {
                        group: key,
                        entry_count,
                        source,
                    });
                }
            }
        }
        if !report.is_empty() {
            debug!(self.log, "Flushed pending log entries";
                "groups-written" => report.groups_written,
                "entries-written" => report.entries_written,
                "groups-failed" => report.groups_failed,
                "entries-failed" => report.entries_failed,
            );
        }
        report
    }
}
