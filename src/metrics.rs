use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref LINES_READ: IntCounter = register_int_counter!(
        "logship_lines_read_total",
        "Total number of lines read from standard input."
    )
    .unwrap();
    pub static ref ENTRIES_SUBMITTED: IntCounter = register_int_counter!(
        "logship_entries_submitted_total",
        "Total number of log entries handed to the writer."
    )
    .unwrap();
    pub static ref ENTRIES_DROPPED: IntCounter = register_int_counter!(
        "logship_entries_dropped_total",
        "Total number of log entries refused because too many were pending."
    )
    .unwrap();
    pub static ref GROUPS_FAILED: IntCounter = register_int_counter!(
        "logship_write_failures_total",
        "Total number of write requests to the Google Logging API that failed."
    )
    .unwrap();
    pub static ref ENTRIES_FAILED: IntCounter = register_int_counter!(
        "logship_entries_failed_total",
        "Total number of log entries lost in failed write requests."
    )
    .unwrap();
}

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        buffer.clear();
    }
    buffer
}
