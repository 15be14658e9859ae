//! Terminal output for the CLI front ends

use colored::{ColoredString, Colorize};
use parking_lot::RwLock;

static QUIET: RwLock<bool> = RwLock::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Plain,
    Info,
    Warning,
    Success,
}

impl Tone {
    fn paint(self, message: &str) -> ColoredString {
        match self {
            Self::Plain => message.normal(),
            Self::Info => message.cyan().bold(),
            Self::Warning => message.yellow().bold(),
            Self::Success => message.green().bold(),
        }
    }
}

/// Silence everything except errors
pub fn set_quiet_mode(enabled: bool) {
    *QUIET.write() = enabled;
}

pub fn is_quiet_mode() -> bool {
    *QUIET.read()
}

fn emit(tone: Tone, message: &str) {
    if !is_quiet_mode() {
        println!("{}", tone.paint(message));
    }
}

pub fn print_version(version: &str) {
    emit(
        Tone::Plain,
        &format!("{} {}", "git-llm".bright_magenta().bold(), version.dimmed()),
    );
}

pub fn print_info(message: &str) {
    emit(Tone::Info, message);
}

pub fn print_warning(message: &str) {
    emit(Tone::Warning, message);
}

pub fn print_success(message: &str) {
    emit(Tone::Success, message);
}

pub fn print_message(message: &str) {
    emit(Tone::Plain, message);
}

pub fn print_newline() {
    emit(Tone::Plain, "");
}

/// Errors go to stderr and ignore quiet mode
pub fn print_error(message: &str) {
    eprintln!("{}", message.red().bold());
}

/// Print a step of a multi-stage pipeline, e.g. `[2/5] Extracting files`
pub fn print_step(index: usize, total: usize, message: &str) {
    emit(
        Tone::Plain,
        &format!("{} {}", format!("[{index}/{total}]").dimmed(), message.bold()),
    );
}

/// Print a `key: value` line with the key highlighted
pub fn print_field(key: &str, value: &str) {
    emit(Tone::Plain, &format!("  {} {value}", format!("{key}:").bright_blue()));
}

fn diff_line(line: &str) -> ColoredString {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold()
    } else if line.starts_with('+') {
        line.green()
    } else if line.starts_with('-') {
        line.red()
    } else if line.starts_with("@@") {
        line.cyan()
    } else {
        line.normal()
    }
}

/// Print a block between two rules; unified diff lines are colored by kind
pub fn print_bordered_content(content: &str) {
    if is_quiet_mode() {
        return;
    }
    let rule = "─".repeat(60).bright_black();
    println!("{rule}");
    for line in content.lines() {
        println!("{}", diff_line(line));
    }
    println!("{rule}");
}
