use clap::Parser;
use env_logger::Env;
use log::error;
use ruuvi_fleet_monitor::app::{self, Cli, RunOutcome};
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;
const EXIT_FLEET_NOT_OK: i32 = 3;

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed the
/// future never resolves and the default signal disposition applies.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = std::io::stdout();
    match app::run(cli.command, shutdown_signal(), &mut stdout).await {
        Ok(RunOutcome::Completed) => std::process::exit(EXIT_SUCCESS),
        Ok(RunOutcome::FleetNotOk) => std::process::exit(EXIT_FLEET_NOT_OK),
        Err(why) => {
            error!("{}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
