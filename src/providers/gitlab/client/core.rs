use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{PipeSpanError, Result};

pub(super) const PAGE_SIZE: usize = 100;

/// How often and how patiently to retry throttled or failed requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(10),
        }
    }
}

/// GitLab REST v4 client.
///
/// Bounds the number of in-flight requests with a semaphore so concurrent
/// log fetches for large pipelines do not overwhelm the instance.
pub struct GitLabClient {
    client: Client,
    pub(super) api_url: Url,
    token: Option<Token>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl GitLabClient {
    /// Creates a client for the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the URL is invalid.
    pub fn new(base_url: &str, token: Option<Token>, max_concurrent_requests: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pipespan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipeSpanError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = format!("{}/", base_url.trim_end_matches('/'));
        let api_url = Url::parse(&base)
            .map_err(|e| PipeSpanError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| PipeSpanError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.header("PRIVATE-TOKEN", token.as_str())
        } else {
            request
        }
    }

    /// Construct project base URL
    pub(super) fn project_url(&self, project: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project)))
            .map_err(|e| PipeSpanError::Config(format!("Invalid project URL: {e}")))
    }

    pub(super) fn join(base: &Url, path: &str) -> Result<Url> {
        base.join(path)
            .map_err(|e| PipeSpanError::Config(format!("Invalid API URL: {e}")))
    }

    /// GET a JSON document, returning the response headers alongside it.
    pub(super) async fn get_json<T>(&self, url: Url) -> Result<(T, HeaderMap)>
    where
        T: DeserializeOwned,
    {
        let response = self.get(url).await?;
        let headers = response.headers().clone();
        let body = response.json().await?;
        Ok((body, headers))
    }

    pub(super) async fn get_text(&self, url: Url) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }

    /// Execute a GET with automatic retry on network errors, rate limits and
    /// server errors. Any other non-success status is returned as an error.
    async fn get(&self, url: Url) -> Result<Response> {
        // One permit per logical request, held across retries
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PipeSpanError::Config(format!("Request limiter closed: {e}")))?;

        let mut retry_count = 0;
        loop {
            debug!("GET {url}");
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= self.retry.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {:?} ({}/{})...",
                        e,
                        self.retry.delay,
                        retry_count + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= self.retry.max_retries {
                    return Err(PipeSpanError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.retry.max_retries,
                    });
                }

                warn!(
                    "GitLab API error (status {status}). Waiting {:?} before retry {}/{}...",
                    self.retry.delay,
                    retry_count + 1,
                    self.retry.max_retries
                );

                tokio::time::sleep(self.retry.delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(PipeSpanError::Api {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    pub(crate) fn test_client(server: &mockito::Server) -> GitLabClient {
        GitLabClient::new(&server.url(), Some(Token::from("glpat-test")), 4)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(1),
            })
    }

    #[test]
    fn test_project_url_encodes_path() {
        let client = GitLabClient::new("https://gitlab.com", None, 1).unwrap();
        let url = client.project_url("group/project").unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.com/api/v4/projects/group%2Fproject/"
        );
    }

    #[test]
    fn test_base_url_with_subpath() {
        let client = GitLabClient::new("https://example.com/gitlab", None, 1).unwrap();
        let url = client.project_url("42").unwrap();
        assert_eq!(url.as_str(), "https://example.com/gitlab/api/v4/projects/42/");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            GitLabClient::new("not a url", None, 1),
            Err(PipeSpanError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_get_retries_server_errors_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects/1/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server);
        let url = client.project_url("1").unwrap();
        let result = client.get_text(url).await;

        assert!(matches!(
            result,
            Err(PipeSpanError::ApiErrorAfterRetries {
                status: 503,
                retries: 2
            })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_sends_private_token_and_reports_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects/1/")
            .match_header("PRIVATE-TOKEN", "glpat-test")
            .with_status(404)
            .with_body(r#"{"message":"404 Project Not Found"}"#)
            .create_async()
            .await;

        let client = test_client(&server);
        let url = client.project_url("1").unwrap();

        match client.get_text(url).await {
            Err(PipeSpanError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("Project Not Found"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
        mock.assert_async().await;
    }
}
