use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::debug;

use super::attributes::{self as attr, AttributeValue};
use super::ids::{IdGenerator, SpanId, TraceId};
use super::job::Job;
use super::span::Span;
use crate::providers::gitlab::links::runner_url;
use crate::providers::gitlab::types::GitLabPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Error { message: Option<String> },
}

/// A finished span ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: SpanStatus,
    pub attributes: IndexMap<&'static str, AttributeValue>,
}

/// Receives spans as the trace is assembled.
///
/// A parent is always recorded before its children.
pub trait SpanSink {
    fn record(&mut self, span: TraceSpan);
}

impl SpanSink for Vec<TraceSpan> {
    fn record(&mut self, span: TraceSpan) {
        self.push(span);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub trace_id: TraceId,
    pub span_count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn status_for(status: &str, message: Option<&str>) -> SpanStatus {
    if status == "success" {
        SpanStatus::Unset
    } else {
        SpanStatus::Error {
            message: message.map(ToString::to_string),
        }
    }
}

/// Records the pipeline → job → task span tree for `jobs` into `sink`.
///
/// The pipeline span runs from the pipeline's creation to the latest job
/// finish (or just its creation time when there are no jobs).
pub fn emit_trace<S, G>(
    sink: &mut S,
    ids: &G,
    pipeline: &GitLabPipeline,
    jobs: &[Job],
) -> TraceSummary
where
    S: SpanSink + ?Sized,
    G: IdGenerator + ?Sized,
{
    let trace_id = ids.trace_id(pipeline.id);
    let root_id = ids.pipeline_span_id(pipeline.id);

    let start = pipeline.created_at;
    let end = jobs
        .iter()
        .map(|job| job.finished_at)
        .fold(start, |latest, finished| latest.max(finished));

    let mut attributes: IndexMap<&'static str, AttributeValue> = IndexMap::new();
    attributes.insert(attr::PROJECT_ID, pipeline.project_id.into());
    attributes.insert(attr::PIPELINE_ID, pipeline.id.into());
    if let Some(name) = &pipeline.name {
        attributes.insert(attr::PIPELINE_NAME, name.as_str().into());
    }
    attributes.insert(attr::PIPELINE_URL, pipeline.web_url.as_str().into());

    sink.record(TraceSpan {
        trace_id: trace_id.clone(),
        span_id: root_id.clone(),
        parent_span_id: None,
        name: format!("pipeline #{}", pipeline.id),
        kind: SpanKind::Server,
        start,
        end,
        status: status_for(&pipeline.status, None),
        attributes,
    });
    let mut span_count = 1;

    for job in jobs {
        let job_id = ids.job_span_id(job.id);
        sink.record(job_span(&trace_id, &root_id, job_id.clone(), pipeline, job));
        span_count += 1;

        for (index, span) in job.spans.iter().enumerate() {
            sink.record(task_span(
                &trace_id,
                &job_id,
                ids.task_span_id(job.id, index),
                span,
            ));
            span_count += 1;
        }
    }

    debug!("Assembled trace {trace_id} with {span_count} spans");

    TraceSummary {
        trace_id,
        span_count,
        start,
        end,
    }
}

fn job_span(
    trace_id: &TraceId,
    parent: &SpanId,
    span_id: SpanId,
    pipeline: &GitLabPipeline,
    job: &Job,
) -> TraceSpan {
    let mut attributes: IndexMap<&'static str, AttributeValue> = IndexMap::new();
    attributes.insert(attr::JOB_ID, job.id.into());
    attributes.insert(attr::JOB_NAME, job.name.as_str().into());
    attributes.insert(attr::JOB_URL, job.web_url.as_str().into());
    attributes.insert(attr::JOB_STATUS, job.status.as_str().into());
    if let Some(stage) = &job.stage {
        attributes.insert(attr::JOB_STAGE, stage.as_str().into());
    }
    if let Some(queued) = job.queued_duration {
        attributes.insert(attr::JOB_QUEUED_DURATION, queued.into());
    }

    attributes.insert(attr::RUNNER_ID, job.runner.id.into());
    if let Some(name) = &job.runner.name {
        attributes.insert(attr::RUNNER_NAME, name.as_str().into());
    }
    if let Some(version) = &job.runner.version {
        attributes.insert(attr::CICD_WORKER_VERSION, version.as_str().into());
    }
    if let Some(ip) = &job.runner.ip_address {
        attributes.insert(attr::CICD_WORKER_IP_ADDRESS, ip.as_str().into());
    }
    if let Some(runner_type) = &job.runner.runner_type {
        attributes.insert(attr::CICD_WORKER_TYPE, runner_type.as_str().into());
    }

    let pipeline_url = job.pipeline_url.as_deref().unwrap_or(&pipeline.web_url);
    match runner_url(pipeline_url, job.runner.id) {
        Some(url) => {
            attributes.insert(attr::RUNNER_URL, url.into());
        }
        None => debug!("No runner URL for job #{} from {pipeline_url}", job.id),
    }

    if let Some(user) = &job.user {
        attributes.insert(attr::CICD_PIPELINE_TASK_STARTED_BY_ID, user.id.into());
        let name = user.name.as_deref().unwrap_or(&user.username);
        attributes.insert(attr::CICD_PIPELINE_TASK_STARTED_BY_NAME, name.into());
    }

    TraceSpan {
        trace_id: trace_id.clone(),
        span_id,
        parent_span_id: Some(parent.clone()),
        name: format!("{} #{}", job.name, job.id),
        kind: SpanKind::Internal,
        start: job.started_at,
        end: job.finished_at,
        status: status_for(&job.status, job.failure_reason.as_deref()),
        attributes,
    }
}

fn task_span(trace_id: &TraceId, parent: &SpanId, span_id: SpanId, span: &Span) -> TraceSpan {
    let mut attributes: IndexMap<&'static str, AttributeValue> = IndexMap::new();
    attributes.insert(attr::CICD_PIPELINE_TASK_STEP_NAME, span.name.as_str().into());
    attributes.insert(attr::CICD_PIPELINE_TASK_STEP_TAG, span.tag.as_str().into());
    attributes.insert(attr::CICD_PIPELINE_TASK_STEP_LOGS, span.body.as_str().into());
    attributes.insert(
        attr::CICD_PIPELINE_TASK_STEP_ADJUSTED_START_TS,
        span.start_adjusted.into(),
    );

    TraceSpan {
        trace_id: trace_id.clone(),
        span_id,
        parent_span_id: Some(parent.clone()),
        name: span.name.clone(),
        kind: SpanKind::Client,
        start: span.start,
        end: span.end,
        status: SpanStatus::Unset,
        attributes,
    }
}
