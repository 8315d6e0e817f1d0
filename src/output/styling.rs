use std::fmt::Display;

use console::{style, StyledObject};

/// A phase that is still running.
pub fn pending(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn done(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().green()
}

/// Section heading on stderr, e.g. "Phases" or "Jobs".
pub fn heading(icon: &str, text: &str) -> String {
    format!("{}  {}", style(icon).bright(), style(text).bright().underlined())
}

/// Written files, trace ids and viewer links.
pub fn link(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn note(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn title(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// A GitLab pipeline or job status, colored by outcome.
pub fn status(status: &str) -> StyledObject<&str> {
    match status {
        "success" => style(status).green(),
        "failed" => style(status).red(),
        "canceled" | "skipped" | "manual" => style(status).dim(),
        _ => style(status).yellow(),
    }
}
