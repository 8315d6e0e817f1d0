use chrono::{DateTime, Utc};
use log::debug;
use regex::{Captures, Regex};

use super::timestamp::{first_timestamp, timestamps};

/// A named, timestamped phase of a job recovered from its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub name: String,
    /// Visual category; several patterns may share one.
    pub tag: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The log text the pattern matched.
    pub body: String,
    /// Whether `start` was re-derived because the logged start was not
    /// before the logged end.
    pub start_adjusted: bool,
}

impl Span {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// An extraction rule for one recognizable CI phase.
///
/// The matcher must define named groups `start` and `end` capturing
/// timestamps, and may define `body`; without it the whole match is the body.
/// Because group names must be unique, a pattern whose alternation binds a
/// role in two branches names the second one `<role>_alt`.
#[derive(Debug, Clone)]
pub struct SpanPattern {
    name: &'static str,
    tag: Option<&'static str>,
    matcher: Regex,
}

impl SpanPattern {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            tag: None,
            matcher: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> &'static str {
        self.tag.unwrap_or(self.name)
    }
}

fn role<'h>(caps: &Captures<'h>, name: &str) -> Option<regex::Match<'h>> {
    caps.name(name)
        .or_else(|| caps.name(&format!("{name}_alt")))
}

/// Applies one pattern to a job log.
///
/// Returns `None` when the pattern does not match or either captured
/// timestamp does not parse. When the logged end is not after the logged
/// start (runner log buffering delays the start marker), the start is
/// replaced by the first timestamp in the matched text that is not after the
/// end, or by the end itself, and the span is flagged as adjusted.
pub fn log_search(pattern: &SpanPattern, log: &str) -> Option<Span> {
    let caps = pattern.matcher.captures(log)?;

    let start = first_timestamp(role(&caps, "start")?.as_str())?;
    let end = first_timestamp(role(&caps, "end")?.as_str())?;
    let body = role(&caps, "body")
        .or_else(|| caps.get(0))?
        .as_str();

    let mut span = Span {
        name: pattern.name().to_string(),
        tag: pattern.tag().to_string(),
        start,
        end,
        body: body.to_string(),
        start_adjusted: false,
    };

    if end <= start {
        span.start = timestamps(body).find(|ts| *ts <= end).unwrap_or(end);
        span.start_adjusted = true;
        debug!(
            "Adjusted start of '{}' from {} to {} (end {})",
            span.name, start, span.start, end
        );
    }

    Some(span)
}
