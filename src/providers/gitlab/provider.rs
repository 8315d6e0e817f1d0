use futures::future::try_join_all;
use log::{debug, info, warn};

use super::cache::{CacheKey, ResponseCache};
use super::client::GitLabClient;
use super::types::{GitLabJob, GitLabPipeline, GitLabProject};
use crate::error::Result;
use crate::timeline::job::{extract_job, filter_jobs, ExtractedJob, Job};

/// GitLab data source for pipeline timelines.
///
/// Every request goes through the on-disk response cache first.
pub struct GitLabProvider {
    client: GitLabClient,
    cache: ResponseCache,
}

impl GitLabProvider {
    pub fn new(client: GitLabClient, cache: ResponseCache) -> Self {
        Self { client, cache }
    }

    /// Looks up a project by numeric id or `group/project` path.
    ///
    /// # Errors
    ///
    /// Returns an error if the project cannot be fetched.
    pub async fn fetch_project(&self, project: &str) -> Result<GitLabProject> {
        self.cache
            .json(CacheKey::Project(project.to_string()), || {
                self.client.get_project(project)
            })
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the pipeline cannot be fetched.
    pub async fn fetch_pipeline(&self, project: &str, pipeline_id: u64) -> Result<GitLabPipeline> {
        self.cache
            .json(CacheKey::Pipeline(pipeline_id), || {
                self.client.get_pipeline(project, pipeline_id)
            })
            .await
    }

    /// Lists the pipeline's jobs, or fetches just `only` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails.
    pub async fn fetch_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
        only: Option<u64>,
    ) -> Result<Vec<GitLabJob>> {
        let Some(job_id) = only else {
            return self
                .cache
                .json(CacheKey::PipelineJobs(pipeline_id), || {
                    self.client.list_jobs(project, pipeline_id)
                })
                .await;
        };

        let job: GitLabJob = self
            .cache
            .json(CacheKey::Job(job_id), || self.client.get_job(project, job_id))
            .await?;

        if let Some(pipeline) = &job.pipeline {
            if pipeline.id != pipeline_id {
                warn!(
                    "Job #{job_id} belongs to pipeline #{}, not #{pipeline_id}",
                    pipeline.id
                );
            }
        }

        Ok(vec![job])
    }

    async fn fetch_log(&self, project: &str, job_id: u64) -> Result<String> {
        self.cache
            .text(CacheKey::JobLog(job_id), || {
                self.client.get_job_log(project, job_id)
            })
            .await
    }

    /// Fetches every job's log and extracts its spans.
    ///
    /// Jobs are processed concurrently; the client bounds the number of
    /// requests in flight. The first failure aborts the whole batch. Output
    /// order matches input order.
    ///
    /// # Errors
    ///
    /// Returns an error if any log fetch or extraction task fails.
    pub async fn extract_jobs(&self, project: &str, jobs: Vec<GitLabJob>) -> Result<Vec<ExtractedJob>> {
        let futures = jobs.into_iter().map(|job| async move {
            let log = self.fetch_log(project, job.id).await?;
            debug!("Job #{}: {} bytes of log", job.id, log.len());
            let extracted = tokio::task::spawn_blocking(move || extract_job(job, log)).await?;
            Ok::<_, crate::error::PipeSpanError>(extracted)
        });

        try_join_all(futures).await
    }

    /// Fetches, extracts and filters the jobs of one pipeline.
    ///
    /// Also returns how many jobs were fetched before filtering.
    ///
    /// # Errors
    ///
    /// Returns an error if any GitLab request or extraction task fails.
    pub async fn collect_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
        only: Option<u64>,
    ) -> Result<(Vec<Job>, usize)> {
        let jobs = self.fetch_jobs(project, pipeline_id, only).await?;
        let fetched = jobs.len();
        info!("Fetching logs for {fetched} jobs of pipeline #{pipeline_id}");

        let extracted = self.extract_jobs(project, jobs).await?;
        let complete = filter_jobs(extracted, only);

        if complete.is_empty() {
            warn!("No complete jobs in pipeline #{pipeline_id}");
        }

        Ok((complete, fetched))
    }
}
