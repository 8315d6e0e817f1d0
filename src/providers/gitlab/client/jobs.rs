use log::debug;

use super::core::{GitLabClient, PAGE_SIZE};
use crate::error::Result;
use crate::providers::gitlab::types::GitLabJob;

const NEXT_PAGE_HEADER: &str = "x-next-page";

impl GitLabClient {
    /// `GET /projects/:id/pipelines/:pipeline_id/jobs`, following every page.
    pub async fn list_jobs(&self, project: &str, pipeline_id: u64) -> Result<Vec<GitLabJob>> {
        let base = Self::join(&self.project_url(project)?, &format!("pipelines/{pipeline_id}/jobs"))?;

        let mut all_jobs = Vec::new();
        let mut page = 1;

        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let (jobs, headers): (Vec<GitLabJob>, _) = self.get_json(url).await?;
            all_jobs.extend(jobs);

            let next_page = headers
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u32>().ok());

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        debug!("Fetched {} jobs for pipeline #{pipeline_id}", all_jobs.len());

        Ok(all_jobs)
    }

    /// `GET /projects/:id/jobs/:job_id`
    pub async fn get_job(&self, project: &str, job_id: u64) -> Result<GitLabJob> {
        let url = Self::join(&self.project_url(project)?, &format!("jobs/{job_id}"))?;
        let (job, _) = self.get_json(url).await?;
        Ok(job)
    }

    /// `GET /projects/:id/jobs/:job_id/trace`, the raw job log.
    pub async fn get_job_log(&self, project: &str, job_id: u64) -> Result<String> {
        let url = Self::join(&self.project_url(project)?, &format!("jobs/{job_id}/trace"))?;
        self.get_text(url).await
    }
}
