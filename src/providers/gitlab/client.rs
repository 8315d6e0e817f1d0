mod core;
mod jobs;
mod pipelines;

pub use self::core::{GitLabClient, RetryPolicy};

#[cfg(test)]
pub(super) use self::core::tests::test_client;
