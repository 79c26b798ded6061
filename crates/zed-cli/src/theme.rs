//! CLI theme and styling.

use colored::Colorize;

pub(crate) struct Theme;

impl Theme {
    /// Format a success marker line.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a column header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }
}
