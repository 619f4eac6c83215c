//! Status lines and spinners on stderr, so stdout stays machine readable.

use std::io::Write;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Width the status label is right-aligned to.
const LABEL_WIDTH: usize = 12;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Action,
    Info,
    Warn,
}

impl Tone {
    fn style(self) -> Style {
        let style = Style::new().bold();
        match self {
            Tone::Action => style.green(),
            Tone::Info => style.cyan(),
            Tone::Warn => style.yellow(),
        }
    }
}

fn emit(tone: Tone, label: &str, message: &str) {
    let label = tone.style().apply_to(format!("{label:>LABEL_WIDTH$}"));
    let _ = writeln!(std::io::stderr(), "{label} {message}");
}

/// `   Resolving 3 requirements for python 3.9.5 on linux/x86_64`
pub fn status(label: &str, message: &str) {
    emit(Tone::Action, label, message);
}

pub fn status_info(label: &str, message: &str) {
    emit(Tone::Info, label, message);
}

pub fn status_warn(label: &str, message: &str) {
    emit(Tone::Warn, label, message);
}

/// Spinner for a resolution run; finish it with
/// [`ProgressBar::finish_and_clear`] before printing results.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
