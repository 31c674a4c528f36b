//! Rotary output mirroring
//!
//! Duplicates everything written to stdout and stderr into size-rotated log
//! files under a dated folder layout, while the terminal keeps receiving the
//! same text.
//!
//! ```no_run
//! use rotary_core::Config;
//! use rotary_logs::{Coordinator, StartOptions};
//!
//! let coordinator = Coordinator::new(Config::from_env());
//! coordinator.start(StartOptions::new()).unwrap();
//! rotary_logs::rprintln!("hello from {}", "rotary");
//! coordinator.stop();
//! ```

pub mod coordinator;
pub mod mirror;
pub mod rotation;
pub mod shutdown;
pub mod sink;
pub mod stream;

pub use coordinator::{Coordinator, LoggerState, StartOptions};
pub use mirror::StreamMirror;
pub use rotation::RotationConfig;
pub use shutdown::{Flushable, HookId, ShutdownHooks};
pub use sink::{FileTarget, LogFileHandle, RotatingSink, SinkConfig};
pub use stream::{
    Discard, InputHandle, MemoryStream, OutputSlots, StreamHandle, Terminal, TextStream,
};

use rotary_core::StreamKind;
use std::io::{self, StdinLock};

/// Handle on the process stdout slot
pub fn stdout() -> StreamHandle {
    OutputSlots::process().handle(StreamKind::Out)
}

/// Handle on the process stderr slot
pub fn stderr() -> StreamHandle {
    OutputSlots::process().handle(StreamKind::Err)
}

/// Locked process stdin, recorded while a stdin mirror is installed
pub fn stdin() -> InputHandle<StdinLock<'static>> {
    OutputSlots::process().input(io::stdin().lock())
}

/// Like `print!`, through the mirrored stdout
#[macro_export]
macro_rules! rprint {
    ($($arg:tt)*) => {{
        let _ = $crate::stdout().write_str(&format!($($arg)*));
    }};
}

/// Like `println!`, through the mirrored stdout
#[macro_export]
macro_rules! rprintln {
    () => {
        $crate::rprint!("\n")
    };
    ($($arg:tt)*) => {{
        let _ = $crate::stdout().write_str(&format!("{}\n", format_args!($($arg)*)));
    }};
}

/// Like `eprint!`, through the mirrored stderr
#[macro_export]
macro_rules! reprint {
    ($($arg:tt)*) => {{
        let _ = $crate::stderr().write_str(&format!($($arg)*));
    }};
}

/// Like `eprintln!`, through the mirrored stderr
#[macro_export]
macro_rules! reprintln {
    () => {
        $crate::reprint!("\n")
    };
    ($($arg:tt)*) => {{
        let _ = $crate::stderr().write_str(&format!("{}\n", format_args!($($arg)*)));
    }};
}
