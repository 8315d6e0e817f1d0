use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::auth::{Token, DEFAULT_OP_ITEM};
use crate::output::mermaid::DEFAULT_MERMAID_CLI;
use crate::providers::gitlab::RetryPolicy;
use crate::output::otlp::{
    ExportTarget, TraceDestination, DEFAULT_SERVICE_NAME, LOCAL_ENDPOINT, LOCAL_VIEWER,
    SWO_ENDPOINT, SWO_VIEWER,
};
use crate::timeline::gantt::{SortKey, DEFAULT_DEPLOY_ENVIRONMENTS};

/// Configuration file structure for pipespan.
///
/// Every value has a default; command-line flags override file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub gantt: GanttConfig,

    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab instance base URL. Unset means "ask 1Password".
    pub base_url: Option<String>,

    /// GitLab personal access token
    pub token: Option<String>,

    /// 1Password item holding `host` and `token` fields
    #[serde(default = "default_op_item")]
    pub op_item: String,

    /// Upper bound on GitLab requests in flight
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,

    /// Retries for throttled (429), failed (5xx) or timed-out requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds to wait between retries
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl GitLabConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GanttConfig {
    #[serde(default)]
    pub sort: SortKey,

    /// Render the chart to SVG
    #[serde(default = "default_true")]
    pub svg: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Mermaid CLI executable
    #[serde(default = "default_mermaid_cli")]
    pub mermaid_cli: String,

    /// Job name prefixes that get a deploy marker
    #[serde(default = "default_deploy_environments")]
    pub deploy_environments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TraceConfig {
    #[serde(default)]
    pub destination: TraceDestination,

    #[serde(default = "default_local_endpoint")]
    pub local_endpoint: String,

    #[serde(default = "default_local_viewer")]
    pub local_viewer: String,

    #[serde(default = "default_swo_endpoint")]
    pub swo_endpoint: String,

    /// SolarWinds ingestion token; `SWO_TELEMETRY_AUTH_TOKEN` takes precedence
    pub swo_token: Option<String>,

    /// SolarWinds organization id, used to link to the exported trace
    pub swo_organization: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            op_item: default_op_item(),
            max_concurrent_requests: default_max_concurrent_requests(),
            cache_dir: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for GanttConfig {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            svg: true,
            output_dir: default_output_dir(),
            mermaid_cli: default_mermaid_cli(),
            deploy_environments: default_deploy_environments(),
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            destination: TraceDestination::default(),
            local_endpoint: default_local_endpoint(),
            local_viewer: default_local_viewer(),
            swo_endpoint: default_swo_endpoint(),
            swo_token: None,
            swo_organization: None,
            service_name: default_service_name(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_op_item() -> String {
    DEFAULT_OP_ITEM.to_string()
}

fn default_max_concurrent_requests() -> usize {
    16
}

fn default_max_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_retry_delay_secs() -> u64 {
    RetryPolicy::default().delay.as_secs()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_mermaid_cli() -> String {
    DEFAULT_MERMAID_CLI.to_string()
}

fn default_deploy_environments() -> Vec<String> {
    DEFAULT_DEPLOY_ENVIRONMENTS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_local_endpoint() -> String {
    LOCAL_ENDPOINT.to_string()
}

fn default_local_viewer() -> String {
    LOCAL_VIEWER.to_string()
}

fn default_swo_endpoint() -> String {
    SWO_ENDPOINT.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl TraceConfig {
    /// Resolves the endpoint, credentials and viewer link for `destination`.
    ///
    /// `swo_token` (usually from the environment) wins over the configured
    /// token.
    pub fn target(
        &self,
        destination: TraceDestination,
        swo_token: Option<&str>,
    ) -> Result<ExportTarget> {
        match destination {
            TraceDestination::Local => Ok(ExportTarget {
                destination,
                endpoint: parse_endpoint(&self.local_endpoint)?,
                bearer: None,
                viewer: Some(self.local_viewer.clone()),
            }),
            TraceDestination::Swo => {
                let Some(token) = swo_token.or(self.swo_token.as_deref()) else {
                    bail!("Exporting to SolarWinds needs SWO_TELEMETRY_AUTH_TOKEN or trace.swo-token");
                };
                Ok(ExportTarget {
                    destination,
                    endpoint: parse_endpoint(&self.swo_endpoint)?,
                    bearer: Some(Token::from(token)),
                    viewer: self
                        .swo_organization
                        .as_ref()
                        .map(|org| format!("{SWO_VIEWER}{org}/traces/")),
                })
            }
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).with_context(|| format!("Invalid trace endpoint: {endpoint}"))
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./pipespan.toml
    /// 3. ./pipespan.json
    /// 4. ./pipespan.yaml
    /// 5. ./pipespan.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["pipespan.toml", "pipespan.json", "pipespan.yaml", "pipespan.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gitlab.base_url, None);
        assert_eq!(config.gitlab.op_item, "GitLab Personal Access Token");
        assert_eq!(config.gitlab.max_concurrent_requests, 16);
        assert_eq!(config.gitlab.max_retries, 5);
        assert_eq!(config.gitlab.retry_policy().delay, Duration::from_secs(10));
        assert_eq!(config.gantt.sort, SortKey::Name);
        assert!(config.gantt.svg);
        assert_eq!(config.gantt.deploy_environments, vec!["dev", "qfnq", "prod"]);
        assert_eq!(config.trace.destination, TraceDestination::Local);
        assert_eq!(config.trace.service_name, "gitlab pipelines");
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[gitlab]
token = "glpat-test-token"
base-url = "https://gitlab.example.com"
max-concurrent-requests = 4
max-retries = 1
retry-delay-secs = 2

[gantt]
sort = "runner"
svg = false
deploy-environments = ["staging"]

[trace]
destination = "swo"
swo-organization = "1234"
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.gitlab.token, Some("glpat-test-token".to_string()));
        assert_eq!(config.gitlab.base_url.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(config.gitlab.max_concurrent_requests, 4);
        let retry = config.gitlab.retry_policy();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.delay, Duration::from_secs(2));
        assert_eq!(config.gantt.sort, SortKey::Runner);
        assert!(!config.gantt.svg);
        assert_eq!(config.gantt.deploy_environments, vec!["staging"]);
        assert_eq!(config.gantt.mermaid_cli, "mmdc");
        assert_eq!(config.trace.destination, TraceDestination::Swo);
        assert_eq!(config.trace.swo_organization.as_deref(), Some("1234"));
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "gitlab": {
    "token": "glpat-json-token",
    "cache-dir": "/tmp/pipespan-cache"
  },
  "gantt": {
    "sort": "time",
    "output-dir": "charts"
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.gitlab.token, Some("glpat-json-token".to_string()));
        assert_eq!(config.gitlab.cache_dir, Some(PathBuf::from("/tmp/pipespan-cache")));
        assert_eq!(config.gantt.sort, SortKey::Time);
        assert_eq!(config.gantt.output_dir, PathBuf::from("charts"));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "trace:\n  destination: local\n  local-endpoint: http://otel:4318/v1/traces\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.trace.local_endpoint, "http://otel:4318/v1/traces");
        assert_eq!(config.gitlab.max_concurrent_requests, 16);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        assert!(Config::load(Some(Path::new("nonexistent-pipespan.toml"))).is_err());
    }

    #[test]
    fn test_invalid_sort_key_is_rejected() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[gantt]\nsort = \"duration\"\n").unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_local_target() {
        let target = TraceConfig::default()
            .target(TraceDestination::Local, None)
            .unwrap();
        assert_eq!(target.endpoint.as_str(), "http://localhost:4318/v1/traces");
        assert!(target.bearer.is_none());
        assert_eq!(target.viewer.as_deref(), Some("http://localhost:16686/trace/"));
    }

    #[test]
    fn test_swo_target_requires_token() {
        let config = TraceConfig::default();
        assert!(config.target(TraceDestination::Swo, None).is_err());

        let target = config.target(TraceDestination::Swo, Some("swo-secret")).unwrap();
        assert_eq!(target.bearer, Some(Token::from("swo-secret")));
        assert!(target.viewer.is_none());
    }

    #[test]
    fn test_swo_target_prefers_environment_token() {
        let config = TraceConfig {
            swo_token: Some("from-config".to_string()),
            swo_organization: Some("42".to_string()),
            ..TraceConfig::default()
        };

        let target = config.target(TraceDestination::Swo, Some("from-env")).unwrap();
        assert_eq!(target.bearer, Some(Token::from("from-env")));
        assert_eq!(
            target.viewer.as_deref(),
            Some("https://my.na-01.cloud.solarwinds.com/42/traces/")
        );
    }
}
