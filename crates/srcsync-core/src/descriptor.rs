//! Source descriptor for a single build request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Identifies the repository, branch, credentials and tenant/service scope
/// of one build.
///
/// Descriptors are created per build request and never persisted. Empty
/// strings mean "not set": an empty branch selects the remote's default
/// branch and empty credentials select anonymous access.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Kind of code server (e.g. "git"). Informational.
    #[serde(default)]
    server_type: String,

    /// Repository URL, in any form accepted by [`Endpoint::parse`].
    repository_url: String,

    /// Branch to build. Empty means the remote default branch.
    #[serde(default)]
    branch: String,

    /// Username for basic auth.
    #[serde(default)]
    user: String,

    /// Password or token for basic auth.
    #[serde(default)]
    password: String,

    /// Tenant owning the build; also the SSH key identity.
    #[serde(default)]
    tenant_id: String,

    /// Service being built.
    #[serde(default)]
    service_id: String,
}

impl SourceDescriptor {
    /// Creates a descriptor for the given repository URL.
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            ..Self::default()
        }
    }

    /// Sets the server type.
    pub fn with_server_type(mut self, server_type: impl Into<String>) -> Self {
        self.server_type = server_type.into();
        self
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets basic authentication credentials.
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Sets the tenant and service scope.
    pub fn with_scope(mut self, tenant_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self.service_id = service_id.into();
        self
    }

    /// Returns the server type.
    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    /// Returns the repository URL.
    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// Returns the requested branch, if any.
    pub fn branch(&self) -> Option<&str> {
        non_empty(&self.branch)
    }

    /// Returns the basic auth pair when both halves are present.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.user), non_empty(&self.password)) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }

    /// Returns the tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the service id.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Parses the repository URL into a transport endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.repository_url)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("server_type", &self.server_type)
            .field("repository_url", &self.repository_url)
            .field("branch", &self.branch)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("tenant_id", &self.tenant_id)
            .field("service_id", &self.service_id)
            .finish()
    }
}
