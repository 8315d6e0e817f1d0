//! Attribute keys attached to exported trace spans.

pub const SERVICE_NAME: &str = "service.name";

pub const PROJECT_ID: &str = "gitlab.project.id";
pub const PIPELINE_ID: &str = "pipeline.id";
pub const PIPELINE_NAME: &str = "pipeline.name";
pub const PIPELINE_URL: &str = "pipeline.url";

pub const JOB_ID: &str = "job.id";
pub const JOB_NAME: &str = "job.name";
pub const JOB_URL: &str = "job.url";
pub const JOB_STATUS: &str = "job.status";
pub const JOB_STAGE: &str = "job.stage";
pub const JOB_QUEUED_DURATION: &str = "job.queued_duration";

pub const RUNNER_ID: &str = "runner.id";
pub const RUNNER_NAME: &str = "runner.name";
pub const RUNNER_URL: &str = "runner.url";
pub const CICD_WORKER_VERSION: &str = "cicd.worker.version";
pub const CICD_WORKER_IP_ADDRESS: &str = "cicd.worker.ip_address";
pub const CICD_WORKER_TYPE: &str = "cicd.worker.type";

pub const CICD_PIPELINE_TASK_STARTED_BY_ID: &str = "cicd.pipeline.task.started_by.id";
pub const CICD_PIPELINE_TASK_STARTED_BY_NAME: &str = "cicd.pipeline.task.started_by.name";

pub const CICD_PIPELINE_TASK_STEP_NAME: &str = "cicd.pipeline.task.step.name";
pub const CICD_PIPELINE_TASK_STEP_TAG: &str = "cicd.pipeline.task.step.tag";
pub const CICD_PIPELINE_TASK_STEP_LOGS: &str = "cicd.pipeline.task.step.logs";
/// Set when GitLab logged the step's start after its end and the start was
/// re-derived from the step's log lines.
pub const CICD_PIPELINE_TASK_STEP_ADJUSTED_START_TS: &str =
    "cicd.pipeline.task.step.adjusted_start_ts";

/// A typed span attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        // GitLab ids fit comfortably in i64.
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
