//! Terminal output for rotary's own messages
//!
//! These go straight to the real stderr, never through the mirrored slots.

use colored::Colorize;

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message);
}
