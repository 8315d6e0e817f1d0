use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitLab project as returned by `GET /projects/:id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabProject {
    pub id: u64,
    pub name: String,
    /// Full path, e.g. "group/project"
    pub path_with_namespace: String,
    pub web_url: String,
}

/// A GitLab pipeline as returned by `GET /projects/:id/pipelines/:pipeline_id`.
///
/// Read-only context for both the Gantt and the trace output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabPipeline {
    pub id: u64,
    pub project_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// Git reference that triggered the pipeline (e.g. "main")
    #[serde(rename = "ref", default)]
    pub ref_: Option<String>,
    /// Final pipeline status (e.g. "success", "failed")
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub web_url: String,
}

impl GitLabPipeline {
    /// Display title: the pipeline name, falling back to its ref and then its id.
    pub fn title(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.ref_.clone())
            .unwrap_or_else(|| format!("pipeline #{}", self.id))
    }
}

/// A job as returned by `GET /projects/:id/pipelines/:pipeline_id/jobs`.
///
/// Timestamps stay raw strings here; they are normalized during extraction
/// so that a malformed value drops the job instead of failing the fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabJob {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub stage: Option<String>,
    /// Final job status (e.g. "success", "failed")
    pub status: String,
    #[serde(default)]
    pub runner: Option<GitLabRunner>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    /// Seconds spent waiting for a runner
    #[serde(default)]
    pub queued_duration: Option<f64>,
    pub web_url: String,
    #[serde(default)]
    pub user: Option<GitLabUser>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub pipeline: Option<GitLabJobPipeline>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabRunner {
    pub id: u64,
    /// Runner name as shown in the GitLab UI
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// "instance_type", "group_type" or "project_type"
    #[serde(default)]
    pub runner_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The pipeline reference embedded in each job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabJobPipeline {
    pub id: u64,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deserializes_with_missing_optional_fields() {
        let json = r#"{
            "id": 42,
            "name": "build",
            "status": "created",
            "web_url": "https://gitlab.com/group/project/-/jobs/42"
        }"#;

        let job: GitLabJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, 42);
        assert!(job.runner.is_none());
        assert!(job.started_at.is_none());
        assert!(job.pipeline.is_none());
    }

    #[test]
    fn test_pipeline_title_falls_back_to_ref() {
        let json = r#"{
            "id": 7,
            "project_id": 3,
            "ref": "main",
            "status": "success",
            "created_at": "2024-01-01T09:00:00.000Z",
            "web_url": "https://gitlab.com/group/project/-/pipelines/7"
        }"#;

        let pipeline: GitLabPipeline = serde_json::from_str(json).unwrap();
        assert_eq!(pipeline.title(), "main");
    }
}
