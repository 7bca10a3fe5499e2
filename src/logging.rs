use crate::args;

use args::{LOG_LEVEL, VERBOSITY};
use clap::ArgMatches;
use slog::{o, Drain, Level, Logger};
use slog_async::{Async, AsyncGuard};
use slog_term::{CompactFormat, TermDecorator};

fn min_log_level(arg_matches: &ArgMatches) -> Result<Level, String> {
    let min_log_level = match arg_matches.occurrences_of(VERBOSITY) {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    match arg_matches.value_of(LOG_LEVEL) {
        Some(level) => Ok(
            match level
                .parse::<args::LogLevelType>()
                .map_err(|e| format!("unknown log level '{}': {}", level, e))?
            {
                args::LogLevelType::Error => Level::Error,
                args::LogLevelType::Warn => Level::Warning,
                args::LogLevelType::Info => Level::Info,
                args::LogLevelType::Debug => Level::Debug,
                args::LogLevelType::Trace => Level::Trace,
            },
        ),
        None => Ok(min_log_level),
    }
}

/// Creates the root logger. Records still queued are written out when the returned guard is
/// dropped.
pub fn create_logger(arg_matches: &ArgMatches) -> Result<(Logger, AsyncGuard), String> {
    let min_log_level = min_log_level(arg_matches)?;

    let decorator = TermDecorator::new().stderr().build();
    let term_drain = CompactFormat::new(decorator)
        .build()
        .filter_level(min_log_level)
        .fuse();

    let (drain, guard) = Async::new(term_drain).build_with_guard();
    Ok((Logger::root(drain.fuse(), o!()), guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;
    use pretty_assertions::assert_eq;

    fn level_for(extra: &[&str]) -> Level {
        let mut argv = vec![app::NAME, "--log-name", "projects/test/logs/app"];
        argv.extend_from_slice(extra);
        let matches = args::clap_app().try_get_matches_from(argv).unwrap();
        min_log_level(&matches).unwrap()
    }

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(level_for(&[]), Level::Warning);
        assert_eq!(level_for(&["-v"]), Level::Info);
        assert_eq!(level_for(&["-vv"]), Level::Debug);
        assert_eq!(level_for(&["-vvv"]), Level::Trace);
    }

    #[test]
    fn dropping_the_guard_ends_the_logger_thread() {
        let argv = [app::NAME, "--log-name", "projects/test/logs/app", "-v"];
        let matches = args::clap_app().try_get_matches_from(argv).unwrap();
        let (log, guard) = create_logger(&matches).unwrap();

        slog::info!(log, "last words");
        drop(log);
        drop(guard);
    }

    #[test]
    fn log_level_overrides_verbosity() {
        assert_eq!(level_for(&["-vvv", "--log-level", "error"]), Level::Error);
    }
}
