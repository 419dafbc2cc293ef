//! Credential and transport access resolution.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use srcsync_core::{Endpoint, Protocol, Settings, SourceDescriptor};

use crate::keys::{KeyIdentity, KeyProvisioner};

/// SSH user used when the URL names none.
pub const DEFAULT_SSH_USER: &str = "git";

/// Credential offered to the remote for one attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthCredential {
    /// Public key authentication with a private key file.
    SshIdentity {
        /// SSH login user
        user: String,
        /// Private key file
        key_path: PathBuf,
    },
    /// HTTP basic authentication.
    BasicAuth {
        /// Username
        user: String,
        /// Password or token
        password: String,
    },
    /// No credentials.
    Anonymous,
}

impl std::fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SshIdentity { user, key_path } => f
                .debug_struct("SshIdentity")
                .field("user", user)
                .field("key_path", key_path)
                .finish(),
            Self::BasicAuth { user, .. } => f
                .debug_struct("BasicAuth")
                .field("user", user)
                .field("password", &"***")
                .finish(),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// How SSH host keys are checked.
///
/// `AcceptAny` skips known-hosts verification for SSH host keys. TLS
/// certificates are always left to libgit2. Set
/// `STRICT_HOST_KEY_CHECKING=true` to switch to [`HostKeyPolicy::Verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept any host key.
    #[default]
    AcceptAny,
    /// Let libgit2 verify the host key.
    Verify,
}

/// Proxy for one call's outbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    url: String,
}

impl ProxyConfig {
    /// Returns the proxy URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Everything the transport needs to reach the remote for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccess {
    /// Credential to offer.
    pub credential: AuthCredential,
    /// Proxy for this call only.
    pub proxy: Option<ProxyConfig>,
    /// Host key verification policy.
    pub host_keys: HostKeyPolicy,
}

impl RemoteAccess {
    /// Anonymous, unproxied access.
    pub fn anonymous() -> Self {
        Self {
            credential: AuthCredential::Anonymous,
            proxy: None,
            host_keys: HostKeyPolicy::default(),
        }
    }
}

/// Chooses credentials and proxying per endpoint.
///
/// Holds no mutable state: every resolution produces a fresh value that
/// travels with the call, so concurrent syncs cannot see each other's
/// proxy or credential.
#[derive(Debug, Clone)]
pub struct AuthResolver {
    keys: Arc<KeyProvisioner>,
    proxy: Option<ProxyConfig>,
    proxy_hosts: Vec<String>,
    host_keys: HostKeyPolicy,
}

impl AuthResolver {
    /// Creates a resolver from settings.
    pub fn new(settings: &Settings, keys: Arc<KeyProvisioner>) -> Self {
        let proxy = settings.proxy().and_then(|raw| match Endpoint::parse(raw) {
            Ok(ep) if ep.protocol().is_http() => Some(ProxyConfig {
                url: raw.to_string(),
            }),
            Ok(ep) => {
                warn!("ignoring proxy {}: unsupported protocol {}", raw, ep.protocol());
                None
            },
            Err(e) => {
                warn!("ignoring proxy {}: {}", raw, e);
                None
            },
        });

        Self {
            keys,
            proxy,
            proxy_hosts: settings.proxy_hosts().to_vec(),
            host_keys: if settings.strict_host_keys() {
                HostKeyPolicy::Verify
            } else {
                HostKeyPolicy::AcceptAny
            },
        }
    }

    /// Returns the key provisioner backing SSH identities.
    pub fn keys(&self) -> &KeyProvisioner {
        &self.keys
    }

    /// Chooses the credential for `endpoint` and `identity`.
    pub fn resolve(
        &self,
        endpoint: &Endpoint,
        descriptor: &SourceDescriptor,
        identity: &KeyIdentity,
    ) -> AuthCredential {
        match endpoint.protocol() {
            Protocol::Ssh => AuthCredential::SshIdentity {
                user: endpoint.user().unwrap_or(DEFAULT_SSH_USER).to_string(),
                key_path: self.keys.private_key_path(identity),
            },
            Protocol::Http | Protocol::Https => match descriptor.basic_auth() {
                Some((user, password)) => AuthCredential::BasicAuth {
                    user: user.to_string(),
                    password: password.to_string(),
                },
                None => AuthCredential::Anonymous,
            },
            Protocol::File => AuthCredential::Anonymous,
        }
    }

    /// Returns the proxy for `endpoint`, if it applies.
    ///
    /// Only HTTP(S) endpoints on a recognized hosting domain are proxied.
    pub fn proxy_for(&self, endpoint: &Endpoint) -> Option<ProxyConfig> {
        let proxy = self.proxy.as_ref()?;
        if !endpoint.protocol().is_http() {
            return None;
        }
        self.proxy_hosts
            .iter()
            .any(|domain| endpoint.host_matches(domain))
            .then(|| proxy.clone())
    }

    /// Resolves the complete access description for one attempt.
    pub fn access(
        &self,
        endpoint: &Endpoint,
        descriptor: &SourceDescriptor,
        identity: &KeyIdentity,
    ) -> RemoteAccess {
        RemoteAccess {
            credential: self.resolve(endpoint, descriptor, identity),
            proxy: self.proxy_for(endpoint),
            host_keys: self.host_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn resolver(settings: &Settings) -> AuthResolver {
        AuthResolver::new(settings, Arc::new(KeyProvisioner::new(settings)))
    }

    fn settings(home: &std::path::Path) -> Settings {
        Settings::builder()
            .home(home)
            .proxy("http://proxy.internal:3128")
            .build()
    }

    #[test]
    fn test_ssh_uses_tenant_key_then_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let ssh = settings.ssh_dir();
        fs::create_dir_all(&ssh).unwrap();
        fs::write(ssh.join("t1"), "k").unwrap();
        fs::write(ssh.join("builder_rsa"), "k").unwrap();

        let resolver = resolver(&settings);
        let endpoint = Endpoint::parse("git@github.com:acme/app.git").unwrap();
        let descriptor = SourceDescriptor::new("git@github.com:acme/app.git").with_scope("t1", "s1");

        let primary = resolver.resolve(&endpoint, &descriptor, &KeyIdentity::Tenant("t1".into()));
        assert_eq!(
            primary,
            AuthCredential::SshIdentity {
                user: "git".into(),
                key_path: ssh.join("t1"),
            }
        );

        let fallback = resolver.resolve(&endpoint, &descriptor, &KeyIdentity::Fallback);
        assert_eq!(
            fallback,
            AuthCredential::SshIdentity {
                user: "git".into(),
                key_path: ssh.join("builder_rsa"),
            }
        );
    }

    #[test]
    fn test_http_basic_or_anonymous() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = resolver(&settings(tmp.path()));
        let endpoint = Endpoint::parse("https://gitlab.example.com/a/b.git").unwrap();
        let identity = KeyIdentity::Tenant("t".into());

        let descriptor = SourceDescriptor::new("https://gitlab.example.com/a/b.git");
        assert_eq!(
            resolver.resolve(&endpoint, &descriptor, &identity),
            AuthCredential::Anonymous
        );

        let descriptor = descriptor.with_basic_auth("bob", "secret");
        assert_eq!(
            resolver.resolve(&endpoint, &descriptor, &identity),
            AuthCredential::BasicAuth {
                user: "bob".into(),
                password: "secret".into(),
            }
        );
    }

    #[test]
    fn test_proxy_only_for_hosting_domains() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = resolver(&settings(tmp.path()));

        let github = Endpoint::parse("https://github.com/acme/app").unwrap();
        assert_eq!(
            resolver.proxy_for(&github).map(|p| p.url().to_string()),
            Some("http://proxy.internal:3128".to_string())
        );

        let other = Endpoint::parse("https://git.example.org/acme/app").unwrap();
        assert_eq!(resolver.proxy_for(&other), None);

        let ssh = Endpoint::parse("git@github.com:acme/app.git").unwrap();
        assert_eq!(resolver.proxy_for(&ssh), None);
    }

    #[test]
    fn test_invalid_proxy_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::builder()
            .home(tmp.path())
            .proxy("socks5://proxy:1080")
            .build();
        let resolver = resolver(&settings);
        let github = Endpoint::parse("https://github.com/acme/app").unwrap();
        assert_eq!(resolver.proxy_for(&github), None);
    }

    #[test]
    fn test_host_key_policy_follows_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::parse("ssh://git@example.com/r.git").unwrap();
        let descriptor = SourceDescriptor::new("ssh://git@example.com/r.git");

        let lax = resolver(&Settings::builder().home(tmp.path()).build());
        assert_eq!(
            lax.access(&endpoint, &descriptor, &KeyIdentity::Fallback).host_keys,
            HostKeyPolicy::AcceptAny
        );

        let strict = resolver(
            &Settings::builder()
                .home(tmp.path())
                .strict_host_keys(true)
                .build(),
        );
        assert_eq!(
            strict.access(&endpoint, &descriptor, &KeyIdentity::Fallback).host_keys,
            HostKeyPolicy::Verify
        );
    }
}
