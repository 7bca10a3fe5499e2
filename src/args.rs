use crate::app;
use clap::{Arg, Command};
use strum::{Display, EnumString};

pub const API_ENDPOINT: &str = "api-endpoint";
pub const API_TOKEN: &str = "api-token";
pub const FLUSH_INTERVAL: &str = "flush-interval";
pub const HTTP_BIND_ADDRESS: &str = "bind-address-http";
pub const LABELS: &str = "labels";
pub const LOG_LEVEL: &str = "log-level";
pub const LOG_NAME: &str = "log-name";
pub const MAX_PENDING_ENTRIES: &str = "max-pending-entries";
pub const PROJECT: &str = "project";
pub const RESOURCE_LABELS: &str = "resource-labels";
pub const RESOURCE_TYPE: &str = "resource-type";
pub const SEVERITY: &str = "severity";
pub const SHUTDOWN_TIMEOUT: &str = "shutdown-timeout";
pub const VERBOSITY: &str = "verbose";

#[derive(EnumString, Display, Debug, PartialEq, Eq, Clone, Copy)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevelType {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub(crate) fn clap_app() -> Command<'static> {
    Command::new(app::NAME)
        .version(app::VERSION)
        .about("Ships log lines from standard input to Google Cloud Logging")
        .author("The bol.com unFTP team")
        .arg(
            Arg::new(VERBOSITY)
                .short('v')
                .multiple_occurrences(true)
                .help("verbosity level"),
        )
        .arg(
            Arg::new(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .help("Sets the level of the diagnostic logging of logship itself, overrides -v")
                .possible_values(["error", "warn", "info", "debug", "trace"])
                .env("LOGSHIP_LOG_LEVEL")
                .takes_value(true),
        )
        .arg(
            Arg::new(LOG_NAME)
                .long(LOG_NAME)
                .value_name("NAME")
                .help("Sets the log name the entries are written to, e.g. my-log with --project or projects/my-project/logs/my-log")
                .env("LOGSHIP_LOG_NAME")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new(PROJECT)
                .long(PROJECT)
                .value_name("PROJECT_ID")
                .help("Sets the Google Cloud project that short log names are qualified with")
                .env("LOGSHIP_PROJECT")
                .takes_value(true),
        )
        .arg(
            Arg::new(RESOURCE_TYPE)
                .long(RESOURCE_TYPE)
                .value_name("TYPE")
                .help("Sets the monitored resource type, e.g. gce_instance or k8s_container")
                .default_value("global")
                .env("LOGSHIP_RESOURCE_TYPE")
                .takes_value(true),
        )
        .arg(
            Arg::new(RESOURCE_LABELS)
                .long(RESOURCE_LABELS)
                .value_name("JSON")
                .help("Sets the monitored resource labels as a JSON object of strings")
                .env("LOGSHIP_RESOURCE_LABELS")
                .takes_value(true),
        )
        .arg(
            Arg::new(LABELS)
                .long(LABELS)
                .value_name("JSON")
                .help("Sets the labels applied to all entries as a JSON object of strings")
                .env("LOGSHIP_LABELS")
                .takes_value(true),
        )
        .arg(
            Arg::new(SEVERITY)
                .long(SEVERITY)
                .value_name("SEVERITY")
                .help("Sets the severity given to every line, e.g. INFO or ERROR")
                .default_value("DEFAULT")
                .env("LOGSHIP_SEVERITY")
                .takes_value(true),
        )
        .arg(
            Arg::new(FLUSH_INTERVAL)
                .long(FLUSH_INTERVAL)
                .value_name("MILLISECONDS")
                .help("Sets how often pending entries are looked at when no new lines come in")
                .default_value("5000")
                .env("LOGSHIP_FLUSH_INTERVAL")
                .takes_value(true),
        )
        .arg(
            Arg::new(MAX_PENDING_ENTRIES)
                .long(MAX_PENDING_ENTRIES)
                .value_name("COUNT")
                .help("Sets the maximum number of entries waiting to be written. Lines beyond that are dropped")
                .env("LOGSHIP_MAX_PENDING_ENTRIES")
                .takes_value(true),
        )
        .arg(
            Arg::new(SHUTDOWN_TIMEOUT)
                .long(SHUTDOWN_TIMEOUT)
                .value_name("SECONDS")
                .help("Sets how long to wait for pending entries to be written when shutting down")
                .default_value("10")
                .env("LOGSHIP_SHUTDOWN_TIMEOUT")
                .takes_value(true),
        )
        .arg(
            Arg::new(API_ENDPOINT)
                .long(API_ENDPOINT)
                .value_name("URL")
                .help("Sets the base URL of the Google Logging API")
                .default_value(google_logwriter::shipper::DEFAULT_ENDPOINT)
                .env("LOGSHIP_API_ENDPOINT")
                .takes_value(true),
        )
        .arg(
            Arg::new(API_TOKEN)
                .long(API_TOKEN)
                .value_name("TOKEN")
                .help("Sets the bearer token sent to the Google Logging API")
                .env("LOGSHIP_API_TOKEN")
                .hide_env_values(true)
                .takes_value(true),
        )
        .arg(
            Arg::new(HTTP_BIND_ADDRESS)
                .long(HTTP_BIND_ADDRESS)
                .value_name("HOST_PORT")
                .help("Sets the host and port for the HTTP server used by prometheus metrics collection")
                .env("LOGSHIP_METRICS_ADDRESS")
                .takes_value(true),
        )
}
