//! rotary CLI - tee with dated, size-rotated log files

use clap::Parser;
use rotary_core::constants::{EXIT_FAILURE, EXIT_SUCCESS};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod output;
mod tee;

use cli::Cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("rotary={0},rotary_logs={0},rotary_core={0}", log_level).into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match tee::execute(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            EXIT_FAILURE
        }
    };

    // The stdin relay may still be blocked in a read after an interrupt
    std::process::exit(code);
}
