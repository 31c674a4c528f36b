//! The tee loop: relay stdin to the mirrored stdout until EOF or an interrupt

use anyhow::{Context, Result};
use rotary_core::constants::MB;
use rotary_core::{Config, Prefix};
use rotary_logs::{shutdown, Coordinator, StartOptions};
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::output::print_info;

/// Build the effective configuration from the config file, environment and flags
pub fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::from_env(),
    };

    config.overwrite = !cli.append;
    config.merge_streams = cli.merge;
    if let Some(mode) = cli.output_error {
        config.broken_pipe = mode.into();
    }
    if let Some(encoding) = cli.encoding {
        config.encoding = encoding;
    }
    if !cli.tag_lines {
        config.prefix = Prefix::none();
    }
    Ok(config)
}

pub fn start_options(cli: &Cli) -> StartOptions {
    let mut options = StartOptions::new();
    if let Some(folder) = &cli.folder {
        options = options.folder(folder.clone());
    }
    if let Some(mb) = cli.max_size {
        options = options.max_size(mb.saturating_mul(MB as i64));
    }
    options
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let coordinator = Arc::new(Coordinator::new(config));
    let folder = coordinator.start(start_options(&cli))?;
    if cli.verbose > 0 {
        print_info(&format!("Logging to {}", folder.display()));
    }

    let relay = {
        let coordinator = Arc::clone(&coordinator);
        tokio::task::spawn_blocking(move || relay_stdin(&coordinator))
    };

    let result = if cli.ignore_interrupts {
        relay.await.context("stdin relay panicked")?
    } else {
        tokio::select! {
            joined = relay => joined.context("stdin relay panicked")?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping");
                Ok(0)
            }
        }
    };

    coordinator.stop();
    shutdown::run_hooks();

    let bytes = result?;
    info!("Relayed {} bytes", bytes);
    Ok(())
}

/// Copy stdin line by line; invalid UTF-8 is replaced
fn relay_stdin(coordinator: &Coordinator) -> Result<u64> {
    let mut input = coordinator.stdin();
    let out = coordinator.stdout();
    let mut line = Vec::new();
    let mut total = 0u64;

    loop {
        line.clear();
        let n = input
            .read_until(b'\n', &mut line)
            .context("Failed to read standard input")?;
        if n == 0 {
            break;
        }
        out.write_str(&String::from_utf8_lossy(&line))?;
        total += n as u64;
    }

    out.flush()?;
    Ok(total)
}
