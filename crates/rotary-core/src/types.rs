//! Core types for rotary

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which standard stream a mirror or sink belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    In,
    Out,
    Err,
    Unknown,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::In => "stdin",
            StreamKind::Out => "stdout",
            StreamKind::Err => "stderr",
            StreamKind::Unknown => "stdunknown",
        }
    }

    /// Subfolder used for this stream's files in split mode
    pub fn folder_name(&self) -> &'static str {
        match self {
            StreamKind::In => "stdin",
            StreamKind::Out => "stdout",
            StreamKind::Err => "stderr",
            StreamKind::Unknown => "std_unknown",
        }
    }

    /// Line prefix written to the log file, trailing space included
    pub fn tag(&self) -> &'static str {
        match self {
            StreamKind::In => "[STDIN] ",
            StreamKind::Out => "[STDOUT] ",
            StreamKind::Err => "[STDERR] ",
            StreamKind::Unknown => "[STDUNKNOWN] ",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stream switches for line prefixes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prefix {
    #[serde(default)]
    pub std_in: bool,
    #[serde(default)]
    pub std_out: bool,
    #[serde(default)]
    pub std_err: bool,
}

impl Default for Prefix {
    fn default() -> Self {
        Self::all()
    }
}

impl Prefix {
    pub fn all() -> Self {
        Self {
            std_in: true,
            std_out: true,
            std_err: true,
        }
    }

    pub fn none() -> Self {
        Self {
            std_in: false,
            std_out: false,
            std_err: false,
        }
    }

    pub fn any(&self) -> bool {
        self.std_in || self.std_out || self.std_err
    }

    /// Prefix to put in front of text coming from `kind`.
    ///
    /// A known stream whose switch is off gets nothing. `Unknown` gets the
    /// generic tag as soon as any switch is on.
    pub fn tag_for(&self, kind: StreamKind) -> &'static str {
        let enabled = match kind {
            StreamKind::In => self.std_in,
            StreamKind::Out => self.std_out,
            StreamKind::Err => self.std_err,
            StreamKind::Unknown => self.any(),
        };
        if enabled {
            kind.tag()
        } else {
            ""
        }
    }
}

/// How the first log file of a sink is opened
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Truncate the first file; later rotations always append
    Truncate,
    #[default]
    Append,
}

impl WriteMode {
    pub fn from_override(overwrite: bool) -> Self {
        if overwrite {
            WriteMode::Truncate
        } else {
            WriteMode::Append
        }
    }
}

/// Text encoding used for log files
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-16le")]
    Utf16Le,
    #[serde(rename = "utf-16be")]
    Utf16Be,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
        }
    }

    /// Number of bytes `text` occupies once encoded
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            Encoding::Utf8 => text.len(),
            Encoding::Utf16Le | Encoding::Utf16Be => text.encode_utf16().count() * 2,
        }
    }

    /// Append the encoded form of `text` to `out`
    pub fn encode_into(&self, text: &str, out: &mut Vec<u8>) {
        match self {
            Encoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Encoding::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-16le" | "utf16le" => Ok(Encoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Encoding::Utf16Be),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do when the terminal side of a mirror reports a broken pipe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BrokenPipePolicy {
    /// Always print a diagnostic and keep going
    Warn,
    /// Like `Warn`, but stay silent when the stream is a pipe
    #[default]
    #[serde(rename = "warn-nopipe")]
    WarnNoPipe,
    /// Always exit with a failure status
    Exit,
    /// Like `Exit`, but keep going silently when the stream is a pipe
    #[serde(rename = "exit-nopipe")]
    ExitNoPipe,
}

/// Outcome of applying a [`BrokenPipePolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeAction {
    Ignore,
    Warn,
    Exit,
}

impl BrokenPipePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokenPipePolicy::Warn => "warn",
            BrokenPipePolicy::WarnNoPipe => "warn-nopipe",
            BrokenPipePolicy::Exit => "exit",
            BrokenPipePolicy::ExitNoPipe => "exit-nopipe",
        }
    }

    pub fn action(&self, is_pipe: bool) -> PipeAction {
        match self {
            BrokenPipePolicy::Warn => PipeAction::Warn,
            BrokenPipePolicy::Exit => PipeAction::Exit,
            BrokenPipePolicy::WarnNoPipe if is_pipe => PipeAction::Ignore,
            BrokenPipePolicy::WarnNoPipe => PipeAction::Warn,
            BrokenPipePolicy::ExitNoPipe if is_pipe => PipeAction::Ignore,
            BrokenPipePolicy::ExitNoPipe => PipeAction::Exit,
        }
    }
}

impl std::fmt::Display for BrokenPipePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
