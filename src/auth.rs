use std::fmt;

use log::{debug, info, warn};
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{PipeSpanError, Result};

pub const DEFAULT_HOST: &str = "https://gitlab.com";
pub const DEFAULT_OP_ITEM: &str = "GitLab Personal Access Token";

/// Error text the 1Password CLI prints when no desktop session can be
/// delegated. Treated as "no credentials available" rather than a failure.
const NO_SESSION_MARKER: &str = "RequestDelegatedSession: cannot setup session.";

/// A secret API token (GitLab or trace collector). Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Resolved GitLab host and (optional) token.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub token: Option<Token>,
}

/// Where credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Host and token supplied on the command line, environment or config.
    Explicit { host: String, token: Option<Token> },
    /// Look up `host` and `token` fields of a 1Password item via `op`.
    OnePassword { item: String },
}

#[derive(Debug, Deserialize)]
struct OpField {
    label: String,
    #[serde(default)]
    value: Option<String>,
}

/// Resolves credentials for the GitLab API.
///
/// # Errors
///
/// Returns [`PipeSpanError::Credential`] if the 1Password CLI cannot be
/// executed or fails with anything other than a missing session.
pub async fn resolve(source: CredentialSource) -> Result<Credentials> {
    match source {
        CredentialSource::Explicit { host, token } => Ok(Credentials {
            host: normalize_host(&host),
            token,
        }),
        CredentialSource::OnePassword { item } => resolve_one_password(&item).await,
    }
}

async fn resolve_one_password(item: &str) -> Result<Credentials> {
    debug!("Looking up GitLab credentials in 1Password item '{item}'");

    let output = Command::new("op")
        .args(["item", "get", item, "--fields", "label=host,label=token"])
        .args(["--reveal", "--format", "json"])
        .output()
        .await
        .map_err(|e| {
            PipeSpanError::Credential(format!(
                "failed to run 1Password CLI `op` ({e}); pass --token or set GITLAB_TOKEN"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_session(&stderr) {
            warn!("No 1Password session available, using anonymous access to {DEFAULT_HOST}");
            return Ok(Credentials {
                host: DEFAULT_HOST.to_string(),
                token: None,
            });
        }
        return Err(PipeSpanError::Credential(stderr.trim().to_string()));
    }

    let credentials = parse_op_fields(&output.stdout)?;
    info!("Using GitLab credentials for {}", credentials.host);
    Ok(credentials)
}

fn parse_op_fields(stdout: &[u8]) -> Result<Credentials> {
    let fields: Vec<OpField> = serde_json::from_slice(stdout)?;

    let field = |label: &str| {
        fields
            .iter()
            .find(|f| f.label == label)
            .and_then(|f| f.value.clone())
            .filter(|v| !v.is_empty())
    };

    let host = field("host").ok_or_else(|| {
        PipeSpanError::Credential("1Password item has no 'host' field".to_string())
    })?;

    Ok(Credentials {
        host: normalize_host(&host),
        token: field("token").map(Token::from),
    })
}

fn is_missing_session(stderr: &str) -> bool {
    stderr.contains(NO_SESSION_MARKER)
}

/// Prefixes `https://` when the host carries no scheme.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host_adds_scheme() {
        assert_eq!(normalize_host("gitlab.example.com"), "https://gitlab.example.com");
        assert_eq!(normalize_host("http://localhost:8080/"), "http://localhost:8080");
        assert_eq!(normalize_host("https://gitlab.com"), "https://gitlab.com");
    }

    #[test]
    fn test_missing_session_is_detected() {
        let stderr = "[ERROR] 2024/01/01 10:00:00 RequestDelegatedSession: cannot setup session.";
        assert!(is_missing_session(stderr));
        assert!(!is_missing_session("[ERROR] item not found"));
    }

    #[test]
    fn test_parse_op_fields() {
        let stdout = br#"[
            {"id": "host", "label": "host", "value": "gitlab.example.com"},
            {"id": "token", "label": "token", "value": "glpat-secret"}
        ]"#;

        let credentials = parse_op_fields(stdout).unwrap();
        assert_eq!(credentials.host, "https://gitlab.example.com");
        assert_eq!(credentials.token, Some(Token::from("glpat-secret")));
    }

    #[test]
    fn test_parse_op_fields_without_host_fails() {
        let stdout = br#"[{"id": "token", "label": "token", "value": "glpat-secret"}]"#;
        assert!(matches!(
            parse_op_fields(stdout),
            Err(PipeSpanError::Credential(_))
        ));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::from("glpat-secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
    }

    #[tokio::test]
    async fn test_explicit_source_is_normalized() {
        let credentials = resolve(CredentialSource::Explicit {
            host: "gitlab.example.com/".to_string(),
            token: None,
        })
        .await
        .unwrap();
        assert_eq!(credentials.host, "https://gitlab.example.com");
        assert!(credentials.token.is_none());
    }
}
