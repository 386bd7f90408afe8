//! Caller identity: the authorization boundary for tool execution.
//!
//! An inbound credential is resolved to an opaque [`UserIdentity`] by an
//! [`IdentityResolver`]. The orchestrator never interprets the value; it only
//! binds it to every tool call server side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque identifier of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves an inbound credential (e.g. a bearer token) to a user.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns `None` when the credential is unknown.
    async fn resolve(&self, credential: &str) -> Option<UserIdentity>;
}

/// Resolver backed by a fixed token → user table from configuration.
pub struct StaticTokenResolver {
    tokens: HashMap<String, UserIdentity>,
}

impl StaticTokenResolver {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, user)| (token, UserIdentity::new(user)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, credential: &str) -> Option<UserIdentity> {
        if credential.is_empty() {
            return None;
        }
        self.tokens.get(credential).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_maps_known_tokens() {
        let resolver = StaticTokenResolver::new([("tok-a".to_string(), "alice".to_string())]);
        assert_eq!(resolver.resolve("tok-a").await, Some(UserIdentity::from("alice")));
        assert_eq!(resolver.resolve("tok-b").await, None);
        assert_eq!(resolver.resolve("").await, None);
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserIdentity::from("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
