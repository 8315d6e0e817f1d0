use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;

use super::catalogue::CATALOGUE;
use super::span::{log_search, Span, SpanPattern};
use super::timestamp::parse_timestamp;
use crate::providers::gitlab::types::{GitLabJob, GitLabRunner, GitLabUser};

static RUNNER_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\n]*Running with gitlab-runner (?P<version>\d+\.\d+\.\d+) \(")
        .expect("runner banner pattern is valid")
});

/// A fetched job after log extraction, before completeness filtering.
#[derive(Debug, Clone)]
pub struct ExtractedJob {
    pub job: GitLabJob,
    pub log: String,
    pub runner_version: Option<String>,
    /// `None` when GitLab reported no start time or it did not parse.
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub spans: Vec<Span>,
}

/// The runner a complete job executed on.
#[derive(Debug, Clone, PartialEq)]
pub struct Runner {
    pub id: u64,
    pub name: Option<String>,
    /// Parsed from the runner banner in the job log
    pub version: Option<String>,
    pub ip_address: Option<String>,
    pub runner_type: Option<String>,
}

/// A complete job: started, finished, run by a known runner.
///
/// Only complete jobs reach the Gantt and trace assemblers.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub stage: Option<String>,
    pub status: String,
    pub runner: Runner,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub queued_duration: Option<f64>,
    pub web_url: String,
    pub user: Option<GitLabUser>,
    pub failure_reason: Option<String>,
    /// Web URL of the pipeline the job belongs to, when GitLab reports it
    pub pipeline_url: Option<String>,
    pub log: String,
    pub spans: Vec<Span>,
}

impl Job {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Version from the `Running with gitlab-runner X.Y.Z (` banner on the
/// log's first line.
pub fn runner_version(log: &str) -> Option<String> {
    RUNNER_BANNER
        .captures(log)
        .and_then(|caps| caps.name("version"))
        .map(|version| version.as_str().to_string())
}

/// Runs every pattern against `log` in order, keeping the ones that matched.
pub fn extract_spans(patterns: &[SpanPattern], log: &str) -> Vec<Span> {
    patterns
        .iter()
        .filter_map(|pattern| log_search(pattern, log))
        .collect()
}

/// Enriches one job with data recovered from its log.
pub fn extract_job(job: GitLabJob, log: String) -> ExtractedJob {
    let spans = extract_spans(&CATALOGUE, &log);
    debug!("Job #{} ({}): {} spans", job.id, job.name, spans.len());

    ExtractedJob {
        runner_version: runner_version(&log),
        started_at: job.started_at.as_deref().and_then(parse_timestamp),
        finished_at: job.finished_at.as_deref().and_then(parse_timestamp),
        spans,
        log,
        job,
    }
}

impl ExtractedJob {
    /// Converts into a [`Job`] if start, finish and runner are all known.
    pub fn into_complete(self) -> Option<Job> {
        let (Some(started_at), Some(finished_at), Some(runner)) =
            (self.started_at, self.finished_at, self.job.runner)
        else {
            return None;
        };

        let GitLabRunner {
            id,
            description,
            ip_address,
            runner_type,
        } = runner;

        Some(Job {
            id: self.job.id,
            name: self.job.name,
            stage: self.job.stage,
            status: self.job.status,
            runner: Runner {
                id,
                name: description,
                version: self.runner_version,
                ip_address,
                runner_type,
            },
            started_at,
            finished_at,
            queued_duration: self.job.queued_duration,
            web_url: self.job.web_url,
            user: self.job.user,
            failure_reason: self.job.failure_reason,
            pipeline_url: self.job.pipeline.and_then(|p| p.web_url),
            log: self.log,
            spans: self.spans,
        })
    }
}

/// Drops incomplete jobs and, with a selector, every job but the selected one.
///
/// Input order is preserved.
pub fn filter_jobs(jobs: Vec<ExtractedJob>, only: Option<u64>) -> Vec<Job> {
    let total = jobs.len();

    let complete: Vec<Job> = jobs
        .into_iter()
        .filter(|job| only.map_or(true, |id| job.job.id == id))
        .filter_map(|job| {
            let id = job.job.id;
            let complete = job.into_complete();
            if complete.is_none() {
                debug!("Skipping incomplete job #{id}");
            }
            complete
        })
        .collect();

    debug!("Kept {} of {total} jobs", complete.len());
    complete
}
