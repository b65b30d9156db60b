pub mod completions;
pub mod config;
pub mod list;
pub mod man_pages;
pub mod run;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Colour a status label (`passed`, `failed (exit 1)`, ...) or context state.
pub fn colorize_status(label: &str) -> String {
    use console::Style;
    let style = if label == "passed" || label == "ready" {
        Style::new().green()
    } else if label.starts_with("failed") || label == "broken" || label.ends_with("error") {
        Style::new().red().bold()
    } else if label == "skipped" || label.starts_with("ignored") {
        Style::new().yellow()
    } else if label == "interrupted" || label == "created" {
        Style::new().dim()
    } else {
        return label.to_owned();
    };
    style.apply_to(label).to_string()
}

/// Map a run's exit code onto a process exit status byte.
pub fn exit_byte(code: i32) -> u8 {
    if code == 0 {
        return EXIT_SUCCESS;
    }
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_map() {
        let val = serde_json::json!({"envlist": ["py27", "pep8"]});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"envlist\""));
        assert!(result.contains("\"pep8\""));
    }

    #[test]
    fn colorize_keeps_label_text() {
        for label in [
            "passed",
            "failed (exit 1)",
            "config error",
            "skipped",
            "ignored failure (exit 2)",
            "interrupted",
            "broken",
        ] {
            assert!(colorize_status(label).contains(label));
        }
    }

    #[test]
    fn colorize_unknown_is_unchanged() {
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn exit_bytes() {
        assert_eq!(exit_byte(0), EXIT_SUCCESS);
        assert_eq!(exit_byte(3), 3);
        assert_eq!(exit_byte(130), 130);
        assert_eq!(exit_byte(256), EXIT_FAILURE);
        assert_eq!(exit_byte(-1), EXIT_FAILURE);
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("creating virtualenv...");
        spin_ok(&pb, "done");
    }

    #[test]
    fn spinner_fail_creates_progress_bar() {
        let pb = spinner("creating virtualenv...");
        spin_fail(&pb, "failed");
    }
}
