use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use crate::auth::{self, CredentialSource, Credentials, Token, DEFAULT_HOST};
use crate::config::Config;
use crate::output::{self, MermaidRenderer, OtlpExporter, PhaseProgress, TraceDestination};
use crate::providers::gitlab::types::GitLabPipeline;
use crate::providers::gitlab::{GitLabClient, GitLabProvider, ResponseCache};
use crate::timeline::{emit_trace, render_gantt, GanttOptions, Job, SortKey, ZeroPaddedIds};

#[derive(Parser)]
#[command(name = "pipespan")]
#[command(author, version, about = "GitLab pipeline timelines as Gantt charts and traces", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GitLab instance URL (default: from 1Password, else https://gitlab.com)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// GitLab personal access token
    #[arg(short, long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file (default: ./pipespan.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ignore cached GitLab responses (fresh ones are still cached)
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Delete the response cache for this instance before running
    #[arg(long, global = true, default_value_t = false)]
    clear_cache: bool,
}

/// Which pipeline, and optionally which single job, to look at.
#[derive(Args)]
struct Target {
    /// Project id or path (e.g. "group/project")
    project: String,

    /// Pipeline id
    pipeline: u64,

    /// Only include this job
    job: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a Mermaid Gantt chart of the pipeline's jobs and phases
    Gantt {
        #[command(flatten)]
        target: Target,

        /// Order of job sections
        #[arg(short, long, value_enum)]
        sort: Option<SortKey>,

        /// Render the chart to SVG with the Mermaid CLI
        #[arg(long, overrides_with = "no_svg")]
        svg: bool,

        /// Only write the Mermaid source
        #[arg(long, overrides_with = "svg")]
        no_svg: bool,

        /// Directory for gantt-<pipeline>.mmd/.svg
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Export the pipeline as an OpenTelemetry trace
    Trace {
        #[command(flatten)]
        target: Target,

        /// Trace collector
        #[arg(short, long, value_enum)]
        dest: Option<TraceDestination>,

        /// SolarWinds ingestion token
        #[arg(long, env = "SWO_TELEMETRY_AUTH_TOKEN", hide_env_values = true)]
        swo_token: Option<String>,
    },
}

/// Explicit token wins; a bare URL means anonymous access; otherwise ask
/// 1Password for both host and token.
fn credential_source(url: Option<String>, token: Option<String>, config: &Config) -> CredentialSource {
    let token = token.or_else(|| config.gitlab.token.clone());
    let host = url.or_else(|| config.gitlab.base_url.clone());

    match (host, token) {
        (host, Some(token)) => CredentialSource::Explicit {
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            token: Some(Token::from(token)),
        },
        (Some(host), None) => CredentialSource::Explicit { host, token: None },
        (None, None) => CredentialSource::OnePassword {
            item: config.gitlab.op_item.clone(),
        },
    }
}

impl Cli {
    async fn provider(&self, config: &Config) -> Result<GitLabProvider> {
        let Credentials { host, token } = auth::resolve(credential_source(
            self.url.clone(),
            self.token.clone(),
            config,
        )).await?;
        if token.is_none() {
            info!("No GitLab token, using anonymous access");
        }

        let client = GitLabClient::new(&host, token, config.gitlab.max_concurrent_requests)?
            .with_retry_policy(config.gitlab.retry_policy());
        let cache = ResponseCache::for_host(&host, config.gitlab.cache_dir.as_deref(), self.no_cache)?;
        if self.clear_cache {
            cache.clear()?;
        }

        Ok(GitLabProvider::new(client, cache))
    }

    /// Runs phases 1 and 2, leaving phase 3 (`output`) started.
    async fn collect(
        &self,
        provider: &GitLabProvider,
        target: &Target,
        output: &str,
    ) -> Result<(GitLabPipeline, Vec<Job>, PhaseProgress)> {
        let progress = PhaseProgress::start_pipeline(target.pipeline);
        let project = provider.fetch_project(&target.project).await?;
        let pipeline = provider.fetch_pipeline(&target.project, target.pipeline).await?;
        info!(
            "Pipeline #{} of {} (project #{} \"{}\", {}): {}",
            pipeline.id,
            project.path_with_namespace,
            project.id,
            project.name,
            project.web_url,
            pipeline.status
        );

        let progress = progress.finish_pipeline_start_jobs(&pipeline.title());
        let (jobs, fetched) = provider
            .collect_jobs(&target.project, target.pipeline, target.job)
            .await?;

        let progress = progress.finish_jobs_start_output(jobs.len(), fetched, output);
        Ok((pipeline, jobs, progress))
    }

    async fn execute_gantt(
        &self,
        config: &Config,
        target: &Target,
        sort: Option<SortKey>,
        svg: bool,
        output_dir: Option<PathBuf>,
    ) -> Result<()> {
        let provider = self.provider(config).await?;
        let (pipeline, jobs, progress) = self.collect(&provider, target, "Writing chart").await?;

        let options = GanttOptions {
            sort: sort.unwrap_or(config.gantt.sort),
            deploy_environments: config.gantt.deploy_environments.clone(),
        };
        let document = render_gantt(&jobs, &pipeline, &options);

        let dir = output_dir.unwrap_or_else(|| config.gantt.output_dir.clone());
        let files = MermaidRenderer::new(config.gantt.mermaid_cli.as_str())
            .write_chart(&document, &dir, pipeline.id, svg)
            .await
            .context("Failed to write Gantt chart")?;

        progress.finish_output("Chart written");
        output::print_job_summary(&jobs);

        let outputs: Vec<String> = std::iter::once(&files.source)
            .chain(&files.svg)
            .map(|path| path.display().to_string())
            .collect();
        output::print_outputs(&pipeline, &outputs);
        Ok(())
    }

    async fn execute_trace(
        &self,
        config: &Config,
        target: &Target,
        dest: Option<TraceDestination>,
        swo_token: Option<&str>,
    ) -> Result<()> {
        let destination = dest.unwrap_or(config.trace.destination);
        let export_target = config.trace.target(destination, swo_token)?;

        let provider = self.provider(config).await?;
        let (pipeline, jobs, progress) = self.collect(&provider, target, "Exporting trace").await?;

        let scope = format!("project #{}", pipeline.project_id);
        let mut exporter = OtlpExporter::new(export_target, &config.trace.service_name, &scope)?;
        let summary = emit_trace(&mut exporter, &ZeroPaddedIds, &pipeline, &jobs);
        let viewer = exporter.target().viewer_url(&summary.trace_id);

        info!(
            "Sending trace {} ({} spans over {}s) to {:?}",
            summary.trace_id,
            summary.span_count,
            (summary.end - summary.start).num_seconds(),
            destination
        );
        let exported = exporter
            .shutdown()
            .await
            .context("Failed to export trace")?;

        progress.finish_output(&format!("Exported {exported} spans"));
        output::print_job_summary(&jobs);

        let mut outputs = vec![format!("trace {}", summary.trace_id)];
        outputs.extend(viewer);
        output::print_outputs(&pipeline, &outputs);
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Gantt {
                target,
                sort,
                svg,
                no_svg,
                output_dir,
            } => {
                let svg = if *no_svg {
                    false
                } else {
                    *svg || config.gantt.svg
                };
                self.execute_gantt(&config, target, *sort, svg, output_dir.clone())
                    .await
            }
            Commands::Trace {
                target,
                dest,
                swo_token,
            } => {
                self.execute_trace(&config, target, *dest, swo_token.as_deref())
                    .await
            }
        }
    }
}
