#[macro_use]
extern crate lazy_static;

mod app;
mod args;
mod http;
mod logging;
mod metrics;
mod ship;

use clap::ArgMatches;
use google_logwriter::writer::AsyncWriter;
use ship::Target;
use slog::*;
use std::{process, result::Result};
use tokio::io::BufReader;

struct ExitSignal(pub &'static str);

async fn listen_for_signals() -> Result<ExitSignal, String> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term_sig = signal(SignalKind::terminate())
            .map_err(|e| format!("could not listen for TERM signals: {}", e))?;
        let mut int_sig = signal(SignalKind::interrupt())
            .map_err(|e| format!("Could not listen for INT signal: {}", e))?;

        let sig_name = tokio::select! {
            Some(_signal) = term_sig.recv() => {
                "SIG_TERM"
            },
            Some(_signal) = int_sig.recv() => {
                "SIG_INT"
            },
        };
        Ok(ExitSignal(sig_name))
    }

    #[cfg(windows)]
    {
        use tokio::signal;
        signal::ctrl_c()
            .await
            .map_err(|e| format!("could not listen for ctrl-c: {}", e))?;
        Ok(ExitSignal("CTRL-C"))
    }
}

async fn main_task(
    arg_matches: &ArgMatches,
    log: &Logger,
    root_log: &Logger,
    writer: &AsyncWriter,
    target: &Target,
) -> Result<(), String> {
    let timeout = ship::shutdown_timeout(arg_matches)?;
    let (shutdown_sender, http_receiver) = tokio::sync::broadcast::channel(1);
    let (http_done_sender, mut shutdown_done_received) = tokio::sync::mpsc::channel(1);

    if let Some(addr) = arg_matches.value_of(args::HTTP_BIND_ADDRESS) {
        let addr = String::from(addr);
        let log = root_log.new(o!("module" => "http"));
        let writer = writer.clone();
        tokio::spawn(async move {
            if let Err(e) = http::start(&log, &addr, writer, http_receiver, http_done_sender).await
            {
                error!(log, "HTTP Server error: {}", e)
            }
        });
    } else {
        drop(http_done_sender);
    }

    let ship_log = root_log.new(o!("module" => "ship"));
    let stdin = BufReader::new(tokio::io::stdin());
    let result = tokio::select! {
        shipped = ship::ship_lines(&ship_log, stdin, writer, target) => shipped.map(|_| ()),
        signal = listen_for_signals() => signal.map(|signal| {
            info!(log, "Received signal {}, shutting down...", signal.0);
        }),
    };

    if writer.stop_and_wait(timeout).await {
        info!(log, "All pending log entries handled");
    } else {
        warn!(log, "Gave up waiting for pending log entries";
            "timeout" => format!("{:?}", timeout),
            "pending" => writer.pending_entries(),
        );
    }

    drop(shutdown_sender);

    // When every sender has gone out of scope, the recv call
    // will return with an error. We ignore the error.
    let _ = shutdown_done_received.recv().await;

    result
}

async fn run(arg_matches: ArgMatches) -> Result<(), String> {
    let (root_logger, log_guard) = logging::create_logger(&arg_matches)?;
    let log = root_logger.new(o!("module" => "main"));

    let target = Target::from_args(&arg_matches)?;
    let writer = ship::create_writer(&root_logger, &arg_matches)?;

    info!(log, "Starting {}.", app::NAME;
    "version" => app::VERSION,
    "log-name" => &target.log_name,
    "resource-type" => target.resource.type_(),
    "severity" => target.severity.as_str(),
    "http-address" => arg_matches.value_of(args::HTTP_BIND_ADDRESS),
    );

    let result = main_task(&arg_matches, &log, &root_logger, &writer, &target).await;
    drop(writer);
    info!(log, "Exiting...");

    drop(log);
    drop(root_logger);
    drop(log_guard);
    result
}

#[tokio::main]
async fn main() {
    let arg_matches = args::clap_app().get_matches();
    if let Err(e) = run(arg_matches).await {
        eprintln!("\nError: {}", e);
        process::exit(1);
    };
    // A pending stdin read occupies a blocking thread the runtime would wait for. The log
    // records are written out by now, see `run`.
    process::exit(0);
}
