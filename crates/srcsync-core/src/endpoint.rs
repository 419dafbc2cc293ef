//! Transport endpoint parsing.

use std::fmt;

use url::Url;

use crate::error::{CoreError, Result};

/// Transport protocol of a repository endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// SSH, either `ssh://` or scp-like `user@host:path`.
    Ssh,
    /// Plain HTTP.
    Http,
    /// HTTPS.
    Https,
    /// Local filesystem path or `file://` URL.
    File,
}

impl Protocol {
    /// Returns the scheme name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Http => "http",
            Self::Https => "https",
            Self::File => "file",
        }
    }

    /// Returns true for HTTP and HTTPS.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed repository location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    protocol: Protocol,
    user: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
}

impl Endpoint {
    /// Parses a repository URL.
    ///
    /// Accepted forms:
    /// - `ssh://[user@]host[:port]/path` and `git+ssh://...`
    /// - `http://...` and `https://...`
    /// - `file:///path`
    /// - scp-like `[user@]host:path`
    /// - a bare local path
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::invalid_endpoint(raw, "url is empty"));
        }

        if raw.contains("://") {
            return Self::parse_url(raw);
        }

        if let Some(endpoint) = Self::parse_scp_like(raw) {
            return Ok(endpoint);
        }

        Ok(Self {
            protocol: Protocol::File,
            user: None,
            host: None,
            port: None,
            path: raw.to_string(),
        })
    }

    fn parse_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| CoreError::invalid_endpoint(raw, e.to_string()))?;

        let protocol = match url.scheme() {
            "ssh" | "git+ssh" | "ssh+git" => Protocol::Ssh,
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            "file" => Protocol::File,
            other => return Err(CoreError::UnsupportedProtocol(other.to_string())),
        };

        let host = url.host_str().filter(|h| !h.is_empty()).map(str::to_string);
        if protocol != Protocol::File && host.is_none() {
            return Err(CoreError::invalid_endpoint(raw, "missing host"));
        }

        let user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            protocol,
            user,
            host,
            port: url.port(),
            path: url.path().to_string(),
        })
    }

    fn parse_scp_like(raw: &str) -> Option<Self> {
        let (authority, path) = raw.split_once(':')?;
        if authority.is_empty() || path.is_empty() || authority.contains('/') {
            return None;
        }

        let (user, host) = match authority.rsplit_once('@') {
            Some((user, host)) => (Some(user.to_string()), host),
            None => (None, authority),
        };
        if host.is_empty() {
            return None;
        }

        Some(Self {
            protocol: Protocol::Ssh,
            user: user.filter(|u| !u.is_empty()),
            host: Some(host.to_string()),
            port: None,
            path: path.to_string(),
        })
    }

    /// Returns the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the user embedded in the URL, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the host; `None` for local endpoints.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the repository path on the host.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if the host equals `domain` or is a subdomain of it.
    pub fn host_matches(&self, domain: &str) -> bool {
        let domain = domain.trim().trim_start_matches('.');
        if domain.is_empty() {
            return false;
        }
        match self.host() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                let domain = domain.to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{}", domain))
            },
            None => false,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.protocol, &self.host) {
            (Protocol::File, _) | (_, None) => write!(f, "file://{}", self.path),
            (protocol, Some(host)) => {
                write!(f, "{}://", protocol)?;
                if let Some(user) = &self.user {
                    write!(f, "{}@", user)?;
                }
                write!(f, "{}", host)?;
                if let Some(port) = self.port {
                    write!(f, ":{}", port)?;
                }
                if !self.path.starts_with('/') {
                    f.write_str("/")?;
                }
                f.write_str(&self.path)
            },
        }
    }
}
