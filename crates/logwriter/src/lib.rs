//! A batching, asynchronous writer for [Google Cloud Logging](https://cloud.google.com/logging).
//!
//! # Usage
//!
//! The [`AsyncWriter`](writer::AsyncWriter) accepts log entries from any thread and returns
//! straight away. A background task takes whatever is pending and sends it off with one
//! [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries)
//! call per group of entries that share a log name, resource and labels.
//!
//! Start by configuring the writer with its [`Builder`](writer::Builder) and pick how entries
//! are sent by passing an [`EntriesWriter`](flush::EntriesWriter):
//!
//! 1. [`HttpEntriesWriter`](shipper::HttpEntriesWriter): Posts to the Google Logging REST API. (Requires the `shipper` feature.)
//! 2. Your own implementation, for instance to print the entries for an external agent that ships them.
//!
//! Groups that fail to be written are passed to an [`ErrorHook`](flush::ErrorHook). They are
//! not retried.
//!
//! To log through [slog](https://slog-rs.github.io/slog/slog/), wrap the writer in the
//! [`logger`] drain. Its [`Builder`](logger::Builder) supports several `with_*` methods to set
//! the labels attached to the [log entries](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry).

/// Log entries and the keys they are grouped by
pub mod entry;

/// Error types
pub mod error;

/// The buffer that holds entries until they are flushed
pub mod buffer;

/// Writing a batch of groups to the remote API
pub mod flush;

/// The writer and its background flush loop
pub mod writer;

/// The [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) that logs to an [`AsyncWriter`](writer::AsyncWriter)
pub mod logger;

/// An [`EntriesWriter`](flush::EntriesWriter) for the Google Logging REST API
#[cfg(feature = "shipper")]
pub mod shipper;
