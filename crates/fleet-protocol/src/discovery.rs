//! Name-completion capability used by the addon's discovery scan.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// No completion source is wired in.
    #[error("player discovery is not supported by this client")]
    Unsupported,

    #[error("completion query for '{prefix}' failed: {reason}")]
    Query { prefix: String, reason: String },
}

/// Answers "which online players start with this prefix".
#[async_trait]
pub trait PlayerDiscovery: Send + Sync {
    async fn query_completions(&self, prefix: &str) -> Result<Vec<String>, DiscoveryError>;
}

/// Default source: every query fails with [`DiscoveryError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscovery;

#[async_trait]
impl PlayerDiscovery for NoDiscovery {
    async fn query_completions(&self, _prefix: &str) -> Result<Vec<String>, DiscoveryError> {
        Err(DiscoveryError::Unsupported)
    }
}

/// A fixed roster of names, matched case-insensitively by prefix.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    names: Vec<String>,
}

impl StaticRoster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[async_trait]
impl PlayerDiscovery for StaticRoster {
    async fn query_completions(&self, prefix: &str) -> Result<Vec<String>, DiscoveryError> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .names
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_roster_prefix_match() {
        let roster = StaticRoster::new(["Alex1", "alice", "Steve2"]);
        let mut names = roster.query_completions("a").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["Alex1".to_string(), "alice".to_string()]);
        assert!(roster.query_completions("z").await.unwrap().is_empty());
        assert_eq!(roster.len(), 3);
    }

    #[tokio::test]
    async fn test_no_discovery_is_unsupported() {
        let result = NoDiscovery.query_completions("a").await;
        assert_eq!(result, Err(DiscoveryError::Unsupported));
    }
}
