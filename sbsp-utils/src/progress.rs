/// Progress bar helpers
///
/// Bars are hidden when stderr is not a terminal so that batch logs stay clean.
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

/// Create a standard progress bar with consistent styling
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    if total == 0 && message.is_empty() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed_precise})")
        .map(|s| s.progress_chars("━━─"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());

    if !std::io::stderr().is_terminal() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb
}

/// Create a hidden progress bar that doesn't display anything
pub fn create_hidden_progress_bar() -> ProgressBar {
    ProgressBar::hidden()
}

/// Visible bar when `visible`, hidden otherwise
pub fn progress_bar_for(total: u64, message: &str, visible: bool) -> ProgressBar {
    if visible {
        create_progress_bar(total, message)
    } else {
        create_hidden_progress_bar()
    }
}
