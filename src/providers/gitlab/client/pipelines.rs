use log::debug;

use super::core::GitLabClient;
use crate::error::Result;
use crate::providers::gitlab::types::{GitLabPipeline, GitLabProject};

impl GitLabClient {
    /// `GET /projects/:id` where `id` is a numeric id or a full path.
    pub async fn get_project(&self, project: &str) -> Result<GitLabProject> {
        let url = Self::join(
            &self.api_url,
            &format!("projects/{}", urlencoding::encode(project)),
        )?;
        let (project, _) = self.get_json(url).await?;
        Ok(project)
    }

    /// `GET /projects/:id/pipelines/:pipeline_id`
    pub async fn get_pipeline(&self, project: &str, pipeline_id: u64) -> Result<GitLabPipeline> {
        debug!("Fetching pipeline #{pipeline_id} of {project}");
        let url = Self::join(&self.project_url(project)?, &format!("pipelines/{pipeline_id}"))?;
        let (pipeline, _) = self.get_json(url).await?;
        Ok(pipeline)
    }
}
