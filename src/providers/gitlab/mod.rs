pub mod cache;
mod client;
pub mod links;
mod provider;
pub mod types;

pub use cache::ResponseCache;
pub use client::{GitLabClient, RetryPolicy};
pub use provider::GitLabProvider;
