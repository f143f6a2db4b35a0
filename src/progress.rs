use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner style used while a setup step is running.
/// - Yellow spinner with animated braille-style frames.
/// - Displays the current step (`{wide_msg}`) next to the spinner.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .unwrap()
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Green check mark: the workspace is ready.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg}").unwrap()
}

/// Yellow mark: ready, but something was downgraded to a warning.
pub fn warn_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m!\x1b[0m {wide_msg}").unwrap()
}

/// Red cross: setup stopped.
pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[31m✘\x1b[0m {wide_msg}").unwrap()
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(msg.to_string());
    pb
}
