use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::job::Job;
use super::span::Span;
use crate::providers::gitlab::types::GitLabPipeline;

pub const DEFAULT_DEPLOY_ENVIRONMENTS: [&str; 3] = ["dev", "qfnq", "prod"];

/// Spans at or below this length get no duration label.
const LABEL_THRESHOLD_SECONDS: i64 = 30;

/// Fill/stroke colors per span tag, used as Mermaid task ids.
const TAG_STYLES: &[(&str, &str, &str)] = &[
    ("docker", "fill: #1D63EC; stroke: #01298A;", "fill: white; stroke: gray;"),
    ("git", "fill: #F25037; stroke: #2F2708;", "fill: white; stroke: gray;"),
    ("apt", "fill: #A80031; stroke: #E9541F;", "fill: white; stroke: gray;"),
    ("npm", "fill: #A01021; stroke: #872322;", "fill: white;"),
    ("esbuild", "fill: #FFCF02; stroke: #191919;", "fill: black; stroke: gray;"),
    ("serverless", "fill: #FD5850; stroke: #9B0902;", "fill: white; stroke: gray;"),
    ("next_build", "fill: #000; stroke: #333;", "fill: white; stroke: gray;"),
];

/// Order of job sections on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Job name, byte-wise
    #[default]
    Name,
    /// Job start time
    Time,
    /// Runner id
    Runner,
}

#[derive(Debug, Clone)]
pub struct GanttOptions {
    pub sort: SortKey,
    /// Job name prefixes (without the trailing `/`) that get a deploy marker
    pub deploy_environments: Vec<String>,
}

impl Default for GanttOptions {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            deploy_environments: DEFAULT_DEPLOY_ENVIRONMENTS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Stable sort; ties keep their input order.
pub fn sort_jobs(jobs: &[Job], key: SortKey) -> Vec<&Job> {
    let mut sorted: Vec<&Job> = jobs.iter().collect();
    match key {
        SortKey::Name => sorted.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Time => sorted.sort_by_key(|job| job.started_at),
        SortKey::Runner => sorted.sort_by_key(|job| job.runner.id),
    }
    sorted
}

/// Earliest start among jobs named `<env>/...`, if any.
pub fn deploy_marker(jobs: &[Job], env: &str) -> Option<DateTime<Utc>> {
    let prefix = format!("{env}/");
    jobs.iter()
        .filter(|job| job.name.starts_with(&prefix))
        .map(|job| job.started_at)
        .min()
}

/// Renders the Mermaid Gantt document for a pipeline.
///
/// An empty job list still yields a valid header-only document.
pub fn render_gantt(jobs: &[Job], pipeline: &GitLabPipeline, options: &GanttOptions) -> String {
    let mut lines = vec![
        front_matter(),
        format!("%% {}", pipeline.web_url),
        [
            "gantt".to_string(),
            format!("  title {}", pipeline.title()),
            "  dateFormat x".to_string(),
            "  %% axisFormat %X".to_string(),
            "  axisFormat %H:%M".to_string(),
            "  tickInterval 2minute".to_string(),
        ]
        .join("\n"),
        String::new(),
    ];

    for env in &options.deploy_environments {
        if let Some(at) = deploy_marker(jobs, env) {
            debug!("Deploy marker for {env} at {at}");
            lines.push(format!("deploy {env} : vert, {}, 0m", at.timestamp_millis()));
        }
    }

    lines.push(
        sort_jobs(jobs, options.sort)
            .into_iter()
            .map(job_section)
            .collect::<Vec<_>>()
            .join("\n\n"),
    );

    lines.join("\n")
}

fn front_matter() -> String {
    let css: String = TAG_STYLES
        .iter()
        .map(|(tag, bar, text)| format!("      #{tag} {{ {bar} }}\n      #{tag}-text {{ {text} }}\n"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "---\n\
         theme: default\n\
         displayMode: compact\n\
         config:\n  \
           securityLevel: \"loose\"\n  \
           themeCSS: \"\n\
         {css}    \"\n  \
           gantt:\n    \
             topAxis: true\n\
         ---"
    )
}

fn job_section(job: &Job) -> String {
    let slug = slug(&job.name);

    let label = [
        Some(job.name.clone()),
        Some(format!("runner #{}", job.runner.id)),
        job.runner.version.as_ref().map(|v| format!("  v{v}")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("<br>");

    let mut lines = vec![
        format!("section {label}"),
        format!(
            "job #{} ({}m) :{slug}, {}, {}",
            job.id,
            round_to_tenth(minutes(job.duration())),
            job.started_at.timestamp_millis(),
            job.finished_at.timestamp_millis()
        ),
        format!("click {slug} href \"{}\"", job.web_url),
    ];
    lines.extend(job.spans.iter().map(span_bar));

    lines.join("\n")
}

fn span_bar(span: &Span) -> String {
    let duration = span.duration();
    let name = if duration > Duration::seconds(LABEL_THRESHOLD_SECONDS) {
        format!("{} ({:.1}m)", span.name, minutes(duration))
    } else {
        span.name.clone()
    };

    format!(
        "{name} :{}, {}, {}",
        span.tag,
        span.start.timestamp_millis(),
        span.end.timestamp_millis()
    )
}

/// Mermaid task id for a job: colons become spaces, whitespace runs become `_`.
fn slug(name: &str) -> String {
    name.replace(':', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[allow(clippy::cast_precision_loss)]
fn minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
