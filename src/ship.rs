//! Turns lines read from standard input into log entries and hands them to the writer.
use crate::{args, metrics};

use chrono::Utc;
use clap::ArgMatches;
use google_logwriter::entry::{Entry, Labels, Resource, Severity};
use google_logwriter::error::{Error, FlushError};
use google_logwriter::flush::ErrorHook;
use google_logwriter::shipper::HttpEntriesWriter;
use google_logwriter::writer::{AsyncWriter, Builder};
use slog::{error, info, o, warn, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Where the lines end up: the grouping attributes and the severity every line gets.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub log_name: String,
    pub resource: Resource,
    pub labels: Labels,
    pub severity: Severity,
}

fn parse_labels(m: &ArgMatches, arg: &str) -> Result<Labels, String> {
    match m.value_of(arg) {
        Some(json) => serde_json::from_str(json).map_err(|e| {
            format!(
                "--{} needs to be a JSON object with string values: {}",
                arg, e
            )
        }),
        None => Ok(Labels::new()),
    }
}

fn parse_number<T>(m: &ArgMatches, arg: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    m.value_of(arg)
        .map(|val| {
            val.parse::<T>().map_err(|e| {
                format!(
                    "unable to parse given value '{}' for --{}: {}. Please use a numeric value",
                    val, arg, e
                )
            })
        })
        .transpose()
}

impl Target {
    pub fn from_args(m: &ArgMatches) -> Result<Self, String> {
        let log_name = m
            .value_of(args::LOG_NAME)
            .ok_or_else(|| format!("--{} is required", args::LOG_NAME))?
            .to_string();
        if !log_name.starts_with("projects/") && m.value_of(args::PROJECT).is_none() {
            return Err(format!(
                "log name '{}' is not of the form projects/PROJECT_ID/logs/LOG_ID, please also set --{}",
                log_name,
                args::PROJECT
            ));
        }
        let resource_type = m.value_of(args::RESOURCE_TYPE).unwrap_or("global");
        let resource = Resource::new(resource_type)
            .with_labels(parse_labels(m, args::RESOURCE_LABELS)?);
        let labels = parse_labels(m, args::LABELS)?;
        let severity = match m.value_of(args::SEVERITY) {
            Some(s) => s.parse::<Severity>().map_err(|e| e.to_string())?,
            None => Severity::Default,
        };

        Ok(Target {
            log_name,
            resource,
            labels,
            severity,
        })
    }
}

/// Reports failed writes in the metrics and the log.
pub struct MetricsErrorHook {
    log: Logger,
}

impl ErrorHook for MetricsErrorHook {
    fn on_flush_error(&self, err: FlushError) {
        metrics::GROUPS_FAILED.inc();
        metrics::ENTRIES_FAILED.inc_by(err.entry_count as u64);
        error!(self.log, "Could not ship log entries: {}", err;
            "log-name" => err.group.log_name(),
            "entries" => err.entry_count,
        );
    }
}

/// Creates the writer that sends to the Google Logging API configured on the command line.
pub fn create_writer(root_log: &Logger, m: &ArgMatches) -> Result<AsyncWriter, String> {
    let log = root_log.new(o!("module" => "writer"));

    let mut remote = match m.value_of(args::API_ENDPOINT) {
        Some(endpoint) => HttpEntriesWriter::with_endpoint(endpoint),
        None => HttpEntriesWriter::new(),
    };
    if let Some(project) = m.value_of(args::PROJECT) {
        remote = remote.with_project(project);
    }
    match m.value_of(args::API_TOKEN) {
        Some(token) => remote = remote.with_token(token),
        None => warn!(
            log,
            "No --{} given, requests to the logging API are not authenticated",
            args::API_TOKEN
        ),
    }

    let mut builder = Builder::new()
        .with_logger(log.clone())
        .with_error_hook(MetricsErrorHook { log });
    if let Some(interval) = flush_interval(m)? {
        builder = builder.with_interval(interval);
    }
    if let Some(limit) = parse_number::<usize>(m, args::MAX_PENDING_ENTRIES)? {
        builder = builder.with_max_pending_entries(limit);
    }

    Ok(builder.build(Arc::new(remote)))
}

fn flush_interval(m: &ArgMatches) -> Result<Option<Duration>, String> {
    match parse_number::<u64>(m, args::FLUSH_INTERVAL)? {
        Some(0) => Err(format!("--{} must be at least 1", args::FLUSH_INTERVAL)),
        millis => Ok(millis.map(Duration::from_millis)),
    }
}

/// The time allowed for the final flush on shutdown.
pub fn shutdown_timeout(m: &ArgMatches) -> Result<Duration, String> {
    Ok(Duration::from_secs(
        parse_number::<u64>(m, args::SHUTDOWN_TIMEOUT)?.unwrap_or(10),
    ))
}

/// Submits every non-blank line of `reader` as a text entry until the input ends. Returns the
/// number of entries submitted.
pub async fn ship_lines<R>(
    log: &Logger,
    reader: R,
    writer: &AsyncWriter,
    target: &Target,
) -> Result<u64, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut submitted = 0;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("could not read from input: {}", e))?
    {
        metrics::LINES_READ.inc();
        if line.trim().is_empty() {
            continue;
        }

        let entry = Entry::text(line)
            .with_severity(target.severity)
            .with_timestamp(Utc::now());
        match writer.write_entries(
            vec![entry],
            &target.log_name,
            &target.resource,
            &target.labels,
        ) {
            Ok(()) => {
                metrics::ENTRIES_SUBMITTED.inc();
                submitted += 1;
            }
            Err(Error::BufferFull { limit }) => {
                metrics::ENTRIES_DROPPED.inc();
                warn!(log, "Dropped a log line, {} entries are already pending", limit);
            }
            Err(e) => return Err(format!("could not submit log line: {}", e)),
        }
    }
    info!(log, "End of input reached"; "submitted" => submitted);
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;
    use async_trait::async_trait;
    use google_logwriter::entry::{GroupKey, Payload};
    use google_logwriter::flush::EntriesWriter;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(GroupKey, Vec<Entry>)>>,
    }

    #[async_trait]
    impl EntriesWriter for Recorder {
        async fn write_entries(&self, key: &GroupKey, entries: Vec<Entry>) -> Result<(), Error> {
            self.calls.lock().unwrap().push((key.clone(), entries));
            Ok(())
        }
    }

    fn discard() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn matches(extra: &[&str]) -> ArgMatches {
        let mut argv = vec![app::NAME, "--log-name", "projects/test/logs/web_app_log"];
        argv.extend_from_slice(extra);
        args::clap_app().try_get_matches_from(argv).unwrap()
    }

    fn target() -> Target {
        Target {
            log_name: "projects/test/logs/web_app_log".to_string(),
            resource: Resource::new("gce_instance").with_label("zone", "global"),
            labels: Labels::from([("env".to_string(), "production".to_string())]),
            severity: Severity::Info,
        }
    }

    #[test]
    fn target_from_args() {
        let m = matches(&[
            "--resource-type",
            "gce_instance",
            "--resource-labels",
            r#"{"zone": "global"}"#,
            "--labels",
            r#"{"env": "production"}"#,
            "--severity",
            "info",
        ]);
        assert_eq!(Target::from_args(&m).unwrap(), target());
    }

    #[test]
    fn target_rejects_labels_that_are_not_objects() {
        let m = matches(&["--labels", "[1, 2]"]);
        assert!(Target::from_args(&m).is_err());
    }

    #[test]
    fn short_log_names_need_a_project() {
        let m = args::clap_app()
            .try_get_matches_from([app::NAME, "--log-name", "web_app_log"])
            .unwrap();
        assert!(Target::from_args(&m).is_err());

        let m = args::clap_app()
            .try_get_matches_from([app::NAME, "--log-name", "web_app_log", "--project", "test"])
            .unwrap();
        assert_eq!(Target::from_args(&m).unwrap().log_name, "web_app_log");
    }

    #[test]
    fn numbers_are_checked() {
        let m = matches(&["--flush-interval", "soon"]);
        assert!(flush_interval(&m).is_err());
        let m = matches(&["--flush-interval", "0"]);
        assert!(flush_interval(&m).is_err());
        let m = matches(&["--flush-interval", "250"]);
        assert_eq!(flush_interval(&m).unwrap(), Some(Duration::from_millis(250)));
        let m = matches(&["--shutdown-timeout", "3"]);
        assert_eq!(shutdown_timeout(&m).unwrap(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn ships_non_blank_lines_as_one_group() {
        let remote = Arc::new(Recorder::default());
        let writer = Builder::new().build(remote.clone());
        writer.suspend();

        let input: &[u8] = b"first line\n\n   \nsecond line\n";
        let submitted = ship_lines(&discard(), input, &writer, &target())
            .await
            .unwrap();
        assert_eq!(submitted, 2);
        assert!(writer.stop_and_wait(Duration::from_secs(2)).await);

        let calls = remote.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (key, entries) = &calls[0];
        assert_eq!(key.log_name(), "projects/test/logs/web_app_log");
        let texts: Vec<_> = entries
            .iter()
            .map(|entry| match entry.payload() {
                Payload::Text(text) => text.as_str(),
                Payload::Json(_) => "json",
            })
            .collect();
        assert_eq!(texts, vec!["first line", "second line"]);
        assert!(entries.iter().all(|e| e.severity() == Severity::Info));
    }

    #[tokio::test]
    async fn lines_over_the_limit_are_dropped() {
        let remote = Arc::new(Recorder::default());
        let writer = Builder::new()
            .with_max_pending_entries(1)
            .build(remote.clone());
        writer.suspend();

        let input: &[u8] = b"kept\ndropped\n";
        let submitted = ship_lines(&discard(), input, &writer, &target())
            .await
            .unwrap();
        assert_eq!(submitted, 1);
        assert_eq!(writer.pending_entries(), 1);
        assert!(writer.stop_and_wait(Duration::from_secs(2)).await);
    }
}
