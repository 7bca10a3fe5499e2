use crate::buffer::{PendingBuffer, Snapshot};
use crate::entry::{Entry, GroupKey, Labels, Resource};
use crate::error::Error;
use crate::flush::{EntriesWriter, ErrorHook, FlushExecutor, LoggingErrorHook};

use slog::{debug, o, Logger};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};

/// How long the flush loop sleeps when nothing wakes it up.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// The lifecycle of an [`AsyncWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Entries are flushed as they come in
    Running,
    /// Entries are buffered but not flushed
    Suspended,
    /// Stop was requested, the remaining entries are being flushed
    Stopping,
    /// Everything was flushed, new entries are refused
    Stopped,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriterState::Running => "running",
            WriterState::Suspended => "suspended",
            WriterState::Stopping => "stopping",
            WriterState::Stopped => "stopped",
        })
    }
}

/// Builder for the [`AsyncWriter`]
pub struct Builder {
    interval: Duration,
    max_pending_entries: Option<usize>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    log: Option<Logger>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            interval: DEFAULT_FLUSH_INTERVAL,
            max_pending_entries: None,
            error_hook: None,
            log: None,
        }
    }
}

impl Builder {
    #[must_use = "The builder must be used"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long the flush loop waits before it looks at the buffer again when it is not
    /// woken up by a write or a lifecycle change. Defaults to [`DEFAULT_FLUSH_INTERVAL`].
    #[must_use = "The builder must be used"]
    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Caps the number of entries waiting to be flushed. Writes that would go over it fail with
    /// [`Error::BufferFull`]. Without a cap the buffer grows as long as writes outpace flushes.
    #[must_use = "The builder must be used"]
    pub fn with_max_pending_entries(self, limit: usize) -> Self {
        Self {
            max_pending_entries: Some(limit),
            ..self
        }
    }

    /// Sets the hook that is told about groups that could not be written. If not set, failures
    /// are logged to the logger given in [`with_logger`](Self::with_logger).
    #[must_use = "The builder must be used"]
    pub fn with_error_hook(self, hook: impl ErrorHook + 'static) -> Self {
        Self {
            error_hook: Some(Arc::new(hook)),
            ..self
        }
    }

    /// Sets the logger the writer reports flushes and lifecycle changes to. Nothing is logged
    /// if not set.
    #[must_use = "The builder must be used"]
    pub fn with_logger(self, log: Logger) -> Self {
        Self {
            log: Some(log),
            ..self
        }
    }

    /// Creates the writer and spawns its flush loop on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime, like [`tokio::spawn`].
    #[must_use = "The writer stops as soon as it is dropped"]
    pub fn build(self, remote: Arc<dyn EntriesWriter>) -> AsyncWriter {
        self.build_on(remote, &Handle::current())
    }

    /// Creates the writer and spawns its flush loop on the given runtime.
    #[must_use = "The writer stops as soon as it is dropped"]
    pub fn build_on(self, remote: Arc<dyn EntriesWriter>, runtime: &Handle) -> AsyncWriter {
        let log = self
            .log
            .unwrap_or_else(|| Logger::root(slog::Discard, o!()));
        let error_hook = self
            .error_hook
            .unwrap_or_else(|| Arc::new(LoggingErrorHook::new(log.clone())));
        let (stopped, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: WriterState::Running,
                buffer: PendingBuffer::new(),
            }),
            wake: Notify::new(),
            stopped,
            max_pending_entries: self.max_pending_entries,
            log: log.clone(),
        });

        let executor = FlushExecutor::new(remote, error_hook, log);
        runtime.spawn(run_flush_loop(shared.clone(), executor, self.interval));

        AsyncWriter {
            handle: Arc::new(WriterHandle { shared }),
        }
    }
}

struct Inner {
    state: WriterState,
    buffer: PendingBuffer,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Notify,
    stopped: watch::Sender<bool>,
    max_pending_entries: Option<usize>,
    log: Logger,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The state is consistent after every critical section, a panic elsewhere doesn't
        // invalidate it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: &[WriterState], to: WriterState) -> bool {
        let changed = {
            let mut inner = self.lock();
            if from.contains(&inner.state) {
                inner.state = to;
                true
            } else {
                false
            }
        };
        if changed {
            debug!(self.log, "Log writer is now {}", to);
        }
        changed
    }

    fn stop(&self) -> bool {
        let changed = self.transition(
            &[WriterState::Running, WriterState::Suspended],
            WriterState::Stopping,
        );
        if changed {
            self.wake.notify_one();
        }
        changed
    }
}

// Stops the writer once the last AsyncWriter clone is gone. The flush loop holds on to `Shared`
// itself, so this can't live on `Shared`.
struct WriterHandle {
    shared: Arc<Shared>,
}

impl Drop for WriterHandle {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

/// Buffers log entries and writes them in groups from a background task.
///
/// [`write_entries`](Self::write_entries) only puts entries in the pending buffer and returns,
/// it never waits on the network. Entries written with the same log name, resource and labels
/// end up in the same remote write, in the order they were written, for as long as they are
/// waiting together in the buffer.
///
/// Clones share the same buffer and flush loop. Dropping the last clone stops the writer.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use google_logwriter::entry::{Entry, GroupKey, Labels, Resource};
/// use google_logwriter::error::Error;
/// use google_logwriter::flush::EntriesWriter;
/// use google_logwriter::writer::Builder;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Stdout;
///
/// #[async_trait]
/// impl EntriesWriter for Stdout {
///     async fn write_entries(&self, key: &GroupKey, entries: Vec<Entry>) -> Result<(), Error> {
///         println!("{}: {} entries", key.log_name(), entries.len());
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let writer = Builder::new().build(Arc::new(Stdout));
/// writer
///     .write_entries(
///         vec![Entry::text("hello"), Entry::text("world")],
///         "projects/my-gcp-project/logs/my-log-id",
///         &Resource::new("gce_instance").with_label("zone", "europe-west1-b"),
///         &Labels::new(),
///     )
///     .unwrap();
/// assert!(writer.stop_and_wait(Duration::from_secs(1)).await);
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncWriter {
    handle: Arc<WriterHandle>,
}

impl AsyncWriter {
    fn shared(&self) -> &Shared {
        &self.handle.shared
    }

    /// Queues entries for the group identified by `log_name`, `resource` and `labels` and wakes
    /// up the flush loop unless the writer is suspended.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `entries` is empty or the grouping attributes are blank
    /// - [`Error::WriterClosed`] once the writer has stopped
    /// - [`Error::BufferFull`] if a pending entry limit is set and would be exceeded
    pub fn write_entries(
        &self,
        entries: Vec<Entry>,
        log_name: &str,
        resource: &Resource,
        labels: &Labels,
    ) -> Result<(), Error> {
        if entries.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one log entry is needed".to_string(),
            ));
        }
        let key = GroupKey::new(log_name, resource, labels)?;

        let shared = self.shared();
        let wake = {
            let mut inner = shared.lock();
            if inner.state == WriterState::Stopped {
                return Err(Error::WriterClosed);
            }
            if let Some(limit) = shared.max_pending_entries {
                if inner.buffer.len() + entries.len() > limit {
                    return Err(Error::BufferFull { limit });
                }
            }
            inner.buffer.append(key, entries);
            inner.state != WriterState::Suspended
        };
        if wake {
            shared.wake.notify_one();
        }
        Ok(())
    }

    /// Stops flushing until [`resume`](Self::resume) is called. Writes are still accepted.
    ///
    /// Returns `false` if the writer was not running.
    pub fn suspend(&self) -> bool {
        self.shared()
            .transition(&[WriterState::Running], WriterState::Suspended)
    }

    /// Continues flushing after a [`suspend`](Self::suspend), starting right away with whatever
    /// was buffered in the meantime.
    ///
    /// Returns `false` if the writer was not suspended.
    pub fn resume(&self) -> bool {
        let shared = self.shared();
        let changed = shared.transition(&[WriterState::Suspended], WriterState::Running);
        if changed {
            shared.wake.notify_one();
        }
        changed
    }

    /// Asks the flush loop to write out everything that is pending and end. Does not wait for
    /// that to happen, see [`wait_until_stopped`](Self::wait_until_stopped). Entries written
    /// before the final flush is done are still included in it.
    ///
    /// The loop keeps flushing until it finds the buffer empty, so a producer that never stops
    /// writing keeps the writer in [`WriterState::Stopping`]. Waiting for it then only ends on
    /// the timeout.
    ///
    /// Returns `false` if a stop was requested before.
    pub fn stop(&self) -> bool {
        self.shared().stop()
    }

    /// Waits for the writer to reach [`WriterState::Stopped`]. Returns `false` if `timeout`
    /// passed first. Does not stop the writer by itself.
    pub async fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let mut stopped = self.shared().stopped.subscribe();
        let done = tokio::time::timeout(timeout, async {
            stopped.wait_for(|stopped| *stopped).await.is_ok()
        })
        .await;
        matches!(done, Ok(true))
    }

    /// [`stop`](Self::stop) followed by [`wait_until_stopped`](Self::wait_until_stopped).
    pub async fn stop_and_wait(&self, timeout: Duration) -> bool {
        self.stop();
        self.wait_until_stopped(timeout).await
    }

    /// Makes the flush loop look at the buffer now instead of at the next interval tick. Has no
    /// effect while suspended.
    pub fn flush_now(&self) {
        self.shared().wake.notify_one();
    }

    pub fn state(&self) -> WriterState {
        self.shared().lock().state
    }

    /// The number of entries waiting to be flushed.
    pub fn pending_entries(&self) -> usize {
        self.shared().lock().buffer.len()
    }
}

enum Step {
    Flush(Snapshot),
    FinalFlush(Snapshot),
    Wait,
    Exit,
}

async fn run_flush_loop(shared: Arc<Shared>, executor: FlushExecutor, interval: Duration) {
    debug!(shared.log, "Log writer started"; "interval" => format!("{:?}", interval));
    loop {
        let step = {
            let mut inner = shared.lock();
            match inner.state {
                WriterState::Running => Step::Flush(inner.buffer.drain()),
                WriterState::Suspended => Step::Wait,
                // Stopped is only set together with finding the buffer empty, so nothing written
                // before that moment is left behind.
                WriterState::Stopping if inner.buffer.is_empty() => {
                    inner.state = WriterState::Stopped;
                    Step::Exit
                }
                WriterState::Stopping => Step::FinalFlush(inner.buffer.drain()),
                WriterState::Stopped => Step::Exit,
            }
        };

        match step {
            Step::Flush(snapshot) => {
                if !snapshot.is_empty() {
                    executor.flush(snapshot).await;
                }
            }
            Step::FinalFlush(snapshot) => {
                executor.flush(snapshot).await;
                continue;
            }
            Step::Wait => {}
            Step::Exit => break,
        }

        tokio::select! {
            _ = shared.wake.notified() => {},
            _ = tokio::time::sleep(interval) => {},
        }
    }
    debug!(shared.log, "Log writer is now {}", WriterState::Stopped);
    shared.stopped.send_replace(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlushError;
    use crate::flush::tests::{env, RecordingWriter};
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(2);

    fn resource() -> Resource {
        Resource::new("gce_instance")
            .with_label("zone", "global")
            .with_label("instance_id", "abc123")
    }

    fn key(labels: &Labels) -> GroupKey {
        GroupKey::new("web_app_log", &resource(), labels).unwrap()
    }

    fn entries(payloads: &[&str]) -> Vec<Entry> {
        payloads.iter().map(|p| Entry::text(*p)).collect()
    }

    fn write(writer: &AsyncWriter, payloads: &[&str], labels: &Labels) -> Result<(), Error> {
        writer.write_entries(entries(payloads), "web_app_log", &resource(), labels)
    }

    #[tokio::test]
    async fn writes_a_single_entry() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        write(&writer, &["payload1"], &env("production")).unwrap();
        writer.stop();
        assert!(writer.wait_until_stopped(WAIT).await);

        assert_eq!(
            remote.calls(),
            vec![(key(&env("production")), entries(&["payload1"]))]
        );
    }

    #[tokio::test]
    async fn combines_related_entries() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        writer.suspend();
        write(&writer, &["payload1"], &env("production")).unwrap();
        write(&writer, &["payload2"], &env("production")).unwrap();
        writer.resume();
        writer.stop();
        assert!(writer.wait_until_stopped(WAIT).await);

        assert_eq!(
            remote.calls(),
            vec![(key(&env("production")), entries(&["payload1", "payload2"]))]
        );
    }

    #[tokio::test]
    async fn separates_unrelated_entries() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        writer.suspend();
        write(&writer, &["payload1"], &env("production")).unwrap();
        write(&writer, &["payload2"], &env("staging")).unwrap();
        writer.resume();
        writer.stop();
        assert!(writer.wait_until_stopped(WAIT).await);

        assert_eq!(
            remote.calls(),
            vec![
                (key(&env("production")), entries(&["payload1"])),
                (key(&env("staging")), entries(&["payload2"])),
            ]
        );
    }

    #[tokio::test]
    async fn stopping_while_suspended_still_flushes() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        writer.suspend();
        write(&writer, &["payload1", "payload2"], &env("production")).unwrap();
        assert!(writer.stop_and_wait(WAIT).await);

        assert_eq!(remote.calls().len(), 1);
        assert_eq!(writer.state(), WriterState::Stopped);
    }

    #[tokio::test]
    async fn suspended_writer_does_not_flush() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new()
            .with_interval(Duration::from_millis(10))
            .build(remote.clone());

        writer.suspend();
        write(&writer, &["payload1"], &env("production")).unwrap();
        writer.flush_now();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(remote.calls().is_empty());
        assert_eq!(writer.pending_entries(), 1);
    }

    #[tokio::test]
    async fn lifecycle_calls_are_idempotent() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        assert!(writer.suspend());
        assert!(!writer.suspend());
        assert_eq!(writer.state(), WriterState::Suspended);

        assert!(writer.resume());
        assert!(!writer.resume());
        assert_eq!(writer.state(), WriterState::Running);

        assert!(writer.stop());
        assert!(!writer.stop());
        assert!(!writer.suspend());
        assert!(!writer.resume());
        assert!(writer.wait_until_stopped(WAIT).await);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn rejects_writes_after_stop() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        assert!(writer.stop_and_wait(WAIT).await);
        let result = write(&writer, &["too late"], &env("production"));

        assert!(matches!(result, Err(Error::WriterClosed)));
        assert_eq!(writer.pending_entries(), 0);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_writes_and_blank_attributes() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());

        let empty = writer.write_entries(vec![], "web_app_log", &resource(), &Labels::new());
        assert!(matches!(empty, Err(Error::InvalidArgument(_))));

        let blank = writer.write_entries(entries(&["a"]), "", &resource(), &Labels::new());
        assert!(matches!(blank, Err(Error::InvalidArgument(_))));
        assert_eq!(writer.pending_entries(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_without_stop() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote);

        assert!(!writer.wait_until_stopped(Duration::from_millis(20)).await);
        assert_eq!(writer.state(), WriterState::Running);
    }

    // Polls until the remote saw `count` calls or `WAIT` passed.
    async fn wait_for_calls(remote: &RecordingWriter, count: usize) -> bool {
        tokio::time::timeout(WAIT, async {
            while remote.calls().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn write_wakes_an_idle_loop() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new()
            .with_interval(Duration::from_secs(3600))
            .build(remote.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        write(&writer, &["payload1"], &env("production")).unwrap();

        assert!(wait_for_calls(&remote, 1).await);
        assert_eq!(writer.state(), WriterState::Running);
        assert_eq!(writer.pending_entries(), 0);
    }

    #[tokio::test]
    async fn resume_flushes_without_waiting_for_the_interval() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new()
            .with_interval(Duration::from_secs(3600))
            .build(remote.clone());

        write(&writer, &["payload1"], &env("production")).unwrap();
        assert!(wait_for_calls(&remote, 1).await);

        writer.suspend();
        write(&writer, &["payload2"], &env("production")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.calls().len(), 1);

        writer.resume();
        assert!(wait_for_calls(&remote, 2).await);
        assert_eq!(
            remote.calls()[1],
            (key(&env("production")), entries(&["payload2"]))
        );
        assert_eq!(writer.state(), WriterState::Running);
    }

    #[tokio::test]
    async fn failed_group_is_reported_once_and_others_still_written() {
        let remote = Arc::new(RecordingWriter::failing_for(env("production")));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let writer = Builder::new()
            .with_error_hook(move |err: FlushError| {
                sink.lock().unwrap().push((err.group, err.entry_count))
            })
            .build(remote.clone());

        writer.suspend();
        write(&writer, &["a", "b"], &env("production")).unwrap();
        write(&writer, &["c"], &env("staging")).unwrap();
        writer.resume();
        assert!(writer.stop_and_wait(WAIT).await);

        assert_eq!(
            *failures.lock().unwrap(),
            vec![(key(&env("production")), 2)]
        );
        // Not retried: one attempt per group
        assert_eq!(remote.calls().len(), 2);
        assert_eq!(remote.calls()[1], (key(&env("staging")), entries(&["c"])));
    }

    #[tokio::test]
    async fn keeps_flushing_after_a_failure() {
        let remote = Arc::new(RecordingWriter::failing_for(env("production")));
        let writer = Builder::new()
            .with_error_hook(|_: FlushError| {})
            .build(remote.clone());

        write(&writer, &["lost"], &env("production")).unwrap();
        writer.flush_now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        write(&writer, &["kept"], &env("staging")).unwrap();
        assert!(writer.stop_and_wait(WAIT).await);

        let calls = remote.calls();
        assert_eq!(calls.last(), Some(&(key(&env("staging")), entries(&["kept"]))));
    }

    #[tokio::test]
    async fn refuses_writes_beyond_the_pending_limit() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new()
            .with_max_pending_entries(2)
            .build(remote.clone());

        writer.suspend();
        write(&writer, &["a", "b"], &env("production")).unwrap();
        let result = write(&writer, &["c"], &env("production"));

        assert!(matches!(result, Err(Error::BufferFull { limit: 2 })));
        assert_eq!(writer.pending_entries(), 2);
        assert!(writer.stop_and_wait(WAIT).await);
        assert_eq!(remote.calls()[0].1, entries(&["a", "b"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_entry_is_lost_or_duplicated_across_stop() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new()
            .with_interval(Duration::from_millis(1))
            .build(remote.clone());

        let mut producers = Vec::new();
        for producer in 0..4 {
            let writer = writer.clone();
            producers.push(std::thread::spawn(move || {
                let labels = env(&format!("producer-{producer}"));
                let mut accepted = Vec::new();
                for i in 0..500 {
                    let payload = format!("{producer}-{i}");
                    let result = write(&writer, &[payload.as_str()], &labels);
                    match result {
                        Ok(()) => accepted.push(payload),
                        Err(Error::WriterClosed) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                accepted
            }));
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(writer.stop_and_wait(Duration::from_secs(10)).await);

        let mut accepted: Vec<String> = producers
            .into_iter()
            .flat_map(|p| p.join().unwrap())
            .collect();
        let mut flushed: Vec<String> = remote
            .calls()
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .map(|entry| match entry.payload() {
                crate::entry::Payload::Text(text) => text.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        accepted.sort();
        flushed.sort();
        assert_eq!(accepted, flushed);
    }

    #[tokio::test]
    async fn dropping_the_last_clone_stops_the_writer() {
        let remote = Arc::new(RecordingWriter::default());
        let writer = Builder::new().build(remote.clone());
        let clone = writer.clone();

        writer.suspend();
        write(&writer, &["payload1"], &env("production")).unwrap();
        drop(writer);
        assert_eq!(clone.state(), WriterState::Suspended);
        drop(clone);

        let flushed = tokio::time::timeout(WAIT, async {
            while remote.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(flushed.is_ok());
        assert_eq!(remote.calls()[0].1, entries(&["payload1"]));
    }
}
