//! CLI theme and styling.

use capgate::Tier;
use colored::{ColoredString, Colorize};

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
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

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Color a tier label by how protected it is.
    pub(crate) fn tier(tier: Tier) -> ColoredString {
        let label = tier.as_str();
        match tier {
            Tier::Essential => label.magenta().bold(),
            Tier::High => label.green(),
            Tier::Medium => label.yellow(),
            Tier::Low => label.dimmed(),
        }
    }
}
