//! CLI argument definitions

use clap::{Parser, ValueEnum};
use rotary_core::{BrokenPipePolicy, Encoding};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rotary")]
#[command(
    version,
    about = "Copy standard input to standard output and to dated, size-rotated log files"
)]
pub struct Cli {
    /// Append to the first log file instead of overwriting it
    #[arg(short, long)]
    pub append: bool,

    /// Keep every stream in one file instead of per-stream subfolders
    #[arg(short, long)]
    pub merge: bool,

    /// Ignore interrupt signals
    #[arg(short, long)]
    pub ignore_interrupts: bool,

    /// Maximum size of one log file in megabytes
    #[arg(short = 's', long, value_name = "MB", allow_hyphen_values = true)]
    pub max_size: Option<i64>,

    /// Log folder ("logs" is appended when missing)
    #[arg(short, long, value_name = "DIR")]
    pub folder: Option<PathBuf>,

    /// Behaviour when writing to standard output fails
    #[arg(short = 'p', long, value_enum, value_name = "MODE")]
    pub output_error: Option<OutputError>,

    /// Encoding of the log files (utf-8, utf-16le, utf-16be)
    #[arg(short, long, value_name = "ENCODING")]
    pub encoding: Option<Encoding>,

    /// Tag logged lines with their stream ([STDOUT] ...)
    #[arg(short = 't', long)]
    pub tag_lines: bool,

    /// TOML config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputError {
    /// Diagnose errors writing to any output
    Warn,
    /// Diagnose errors writing to any output that is not a pipe
    #[value(name = "warn-nopipe")]
    WarnNopipe,
    /// Exit on error writing to any output
    Exit,
    /// Exit on error writing to any output that is not a pipe
    #[value(name = "exit-nopipe")]
    ExitNopipe,
}

impl From<OutputError> for BrokenPipePolicy {
    fn from(mode: OutputError) -> Self {
        match mode {
            OutputError::Warn => BrokenPipePolicy::Warn,
            OutputError::WarnNopipe => BrokenPipePolicy::WarnNoPipe,
            OutputError::Exit => BrokenPipePolicy::Exit,
            OutputError::ExitNopipe => BrokenPipePolicy::ExitNoPipe,
        }
    }
}
