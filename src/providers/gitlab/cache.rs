use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PipeSpanError, Result};

/// Identifies one cached GitLab API response.
///
/// Pipeline and job ids are unique per GitLab instance, so the key carries
/// no project dimension; the instance is encoded in the cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    Project(String),
    Pipeline(u64),
    PipelineJobs(u64),
    Job(u64),
    JobLog(u64),
}

impl CacheKey {
    fn relative_path(&self) -> PathBuf {
        match self {
            Self::Project(id_or_path) => Path::new("projects")
                .join(format!("{}.json", id_or_path.replace('/', "+"))),
            Self::Pipeline(id) => Path::new("pipelines").join(format!("{id}.json")),
            Self::PipelineJobs(id) => Path::new("pipelines").join(format!("{id}-jobs.json")),
            Self::Job(id) => Path::new("jobs").join(format!("{id}.json")),
            Self::JobLog(id) => Path::new("jobs").join(format!("{id}.log")),
        }
    }
}

/// On-disk cache of GitLab API responses.
///
/// Sits transparently beneath the GitLab client. Files live under a
/// per-instance directory in the platform cache dir:
/// - Linux: `~/.cache/pipespan/gitlab/{host}/`
/// - macOS: `~/Library/Caches/pipespan/gitlab/{host}/`
///
/// With `bypass` set, reads always miss but fresh responses are still written.
pub struct ResponseCache {
    root: PathBuf,
    bypass: bool,
}

impl ResponseCache {
    /// Creates a cache for the given GitLab host.
    ///
    /// # Errors
    ///
    /// Returns an error if no cache directory can be determined.
    pub fn for_host(host: &str, cache_dir: Option<&Path>, bypass: bool) -> Result<Self> {
        let base = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::cache_dir()
                .ok_or_else(|| PipeSpanError::Cache("No cache directory found".into()))?
                .join("pipespan")
                .join("gitlab"),
        };

        let root = base.join(host_slug(host));
        if bypass {
            info!("Response cache bypassed, refreshing: {}", root.display());
        } else {
            debug!("Response cache at: {}", root.display());
        }

        Ok(Self::at(root, bypass))
    }

    pub fn at(root: PathBuf, bypass: bool) -> Self {
        Self { root, bypass }
    }

    /// Removes every cached response for this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            info!("Cache cleared: {}", self.root.display());
        } else {
            info!("No cache found at: {}", self.root.display());
        }
        Ok(())
    }

    /// Returns the cached JSON value for `key`, or fetches and stores it.
    ///
    /// A corrupt cache entry counts as a miss.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and failures to write the cache entry.
    pub async fn json<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(contents) = self.read(&key) {
            match serde_json::from_str(&contents) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Ignoring corrupt cache entry {key:?}: {e}"),
            }
        }

        let value = fetch().await?;
        self.write(&key, &serde_json::to_string_pretty(&value)?)?;
        Ok(value)
    }

    /// Returns the cached text for `key`, or fetches and stores it.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and failures to write the cache entry.
    pub async fn text<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(contents) = self.read(&key) {
            return Ok(contents);
        }

        let value = fetch().await?;
        self.write(&key, &value)?;
        Ok(value)
    }

    fn read(&self, key: &CacheKey) -> Option<String> {
        if self.bypass {
            return None;
        }

        let path = self.root.join(key.relative_path());
        let contents = fs::read_to_string(&path).ok()?;
        debug!("Cache hit: {}", path.display());
        Some(contents)
    }

    fn write(&self, key: &CacheKey, contents: &str) -> Result<()> {
        let path = self.root.join(key.relative_path());
        let dir = path
            .parent()
            .ok_or_else(|| PipeSpanError::Cache(format!("Invalid cache path: {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.persist(&path)
            .map_err(|e| PipeSpanError::Cache(format!("{}: {}", path.display(), e.error)))?;

        debug!("Cached: {}", path.display());
        Ok(())
    }
}

/// Directory name for a GitLab host, e.g. "https://gitlab.com" → "gitlab.com".
fn host_slug(host: &str) -> String {
    host.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .replace(['/', ':'], "+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_paths() {
        assert_eq!(
            CacheKey::Project("group/project".into()).relative_path(),
            Path::new("projects/group+project.json")
        );
        assert_eq!(
            CacheKey::PipelineJobs(12).relative_path(),
            Path::new("pipelines/12-jobs.json")
        );
        assert_eq!(CacheKey::JobLog(7).relative_path(), Path::new("jobs/7.log"));
    }

    #[test]
    fn test_host_slug() {
        assert_eq!(host_slug("https://gitlab.com"), "gitlab.com");
        assert_eq!(host_slug("http://localhost:8080/"), "localhost+8080");
    }

    #[tokio::test]
    async fn test_json_fetches_once_then_hits_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResponseCache::at(temp_dir.path().to_path_buf(), false);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<u64> = cache
                .json(CacheKey::PipelineJobs(1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(temp_dir.path().join("pipelines/1-jobs.json").exists());
    }

    #[tokio::test]
    async fn test_bypass_refetches_and_rewrites() {
        let temp_dir = TempDir::new().unwrap();
        let warm = ResponseCache::at(temp_dir.path().to_path_buf(), false);
        warm.text(CacheKey::JobLog(5), || async { Ok("old".to_string()) })
            .await
            .unwrap();

        let bypass = ResponseCache::at(temp_dir.path().to_path_buf(), true);
        let log = bypass
            .text(CacheKey::JobLog(5), || async { Ok("new".to_string()) })
            .await
            .unwrap();
        assert_eq!(log, "new");

        let reread = warm
            .text(CacheKey::JobLog(5), || async { Ok("unused".to_string()) })
            .await
            .unwrap();
        assert_eq!(reread, "new");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs/9.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let cache = ResponseCache::at(temp_dir.path().to_path_buf(), false);
        let value: u64 = cache
            .json(CacheKey::Job(9), || async { Ok(9) })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(fs::read_to_string(&path).unwrap(), "9");
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_no_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResponseCache::at(temp_dir.path().to_path_buf(), false);

        let result = cache
            .text(CacheKey::JobLog(3), || async {
                Err(PipeSpanError::Api {
                    status: 404,
                    message: "not found".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert!(!temp_dir.path().join("jobs/3.log").exists());
    }

    #[test]
    fn test_clear_removes_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("gitlab.com");
        fs::create_dir_all(root.join("jobs")).unwrap();
        fs::write(root.join("jobs/1.log"), "log").unwrap();

        let cache = ResponseCache::at(root.clone(), false);
        cache.clear().unwrap();
        assert!(!root.exists());

        // Clearing a missing cache is not an error
        cache.clear().unwrap();
    }
}
