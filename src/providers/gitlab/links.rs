use url::Url;

/// Builds the runner admin page URL from a pipeline web URL.
///
/// `https://host/group/project/-/pipelines/123` with runner `45` becomes
/// `https://host/groups/group/project/-/runners/45`.
///
/// Returns `None` when the URL does not end in `/-/pipelines/<id>`, so callers
/// can skip the attribute instead of failing.
pub fn runner_url(pipeline_url: &str, runner_id: u64) -> Option<String> {
    let url = Url::parse(pipeline_url).ok()?;
    let path = url.path().trim_end_matches('/');

    let (project_path, pipeline_id) = path.rsplit_once("/-/pipelines/")?;
    if pipeline_id.is_empty() || !pipeline_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let project_path = project_path.trim_start_matches('/');
    if project_path.is_empty() {
        return None;
    }

    let runner_path = format!("groups/{project_path}/-/runners/{runner_id}");
    let mut runner = url.clone();
    runner.set_path(&runner_path);
    runner.set_query(None);
    runner.set_fragment(None);

    Some(runner.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_url_from_pipeline_url() {
        let url = runner_url("https://gitlab.com/group/project/-/pipelines/123456", 45);
        assert_eq!(
            url.as_deref(),
            Some("https://gitlab.com/groups/group/project/-/runners/45")
        );
    }

    #[test]
    fn test_runner_url_keeps_port_and_nested_groups() {
        let url = runner_url(
            "http://gitlab.local:8080/a/b/c/-/pipelines/9/",
            1,
        );
        assert_eq!(
            url.as_deref(),
            Some("http://gitlab.local:8080/groups/a/b/c/-/runners/1")
        );
    }

    #[test]
    fn test_runner_url_rejects_unexpected_shapes() {
        assert!(runner_url("https://gitlab.com/group/project/-/jobs/1", 1).is_none());
        assert!(runner_url("https://gitlab.com/-/pipelines/1", 1).is_none());
        assert!(runner_url("https://gitlab.com/group/-/pipelines/abc", 1).is_none());
        assert!(runner_url("not a url", 1).is_none());
    }
}
