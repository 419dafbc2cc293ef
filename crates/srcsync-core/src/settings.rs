//! Environment-sourced engine settings.

use std::path::{Path, PathBuf};

/// Default root for build caches.
pub const DEFAULT_CACHE_ROOT: &str = "/cache";

/// Default root for checked-out sources.
pub const DEFAULT_SOURCE_ROOT: &str = "/grdata/source";

/// Home directory used when none can be determined.
pub const DEFAULT_HOME: &str = "/root";

/// Hosting domains routed through the configured proxy by default.
pub const DEFAULT_PROXY_HOSTS: &[&str] = &["github.com"];

/// Settings shared by every sync performed by one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    cache_root: PathBuf,
    source_root: PathBuf,
    proxy: Option<String>,
    proxy_hosts: Vec<String>,
    home: PathBuf,
    strict_host_keys: bool,
}

impl Settings {
    /// Creates a new builder for Settings.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Reads settings from the process environment.
    ///
    /// | variable                  | setting            |
    /// |---------------------------|--------------------|
    /// | `CACHE_DIR`               | cache root         |
    /// | `SOURCE_DIR`              | source root        |
    /// | `GITHUB_PROXY`            | proxy URL          |
    /// | `PROXY_HOSTS`             | proxied domains    |
    /// | `HOME`                    | key storage home   |
    /// | `STRICT_HOST_KEY_CHECKING`| verify host keys   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut builder = Settings::builder();
        if let Some(cache_root) = var("CACHE_DIR") {
            builder = builder.cache_root(cache_root);
        }
        if let Some(source_root) = var("SOURCE_DIR") {
            builder = builder.source_root(source_root);
        }
        if let Some(proxy) = var("GITHUB_PROXY") {
            builder = builder.proxy(proxy);
        }
        if let Some(hosts) = var("PROXY_HOSTS") {
            builder = builder.proxy_hosts(
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .collect(),
            );
        }
        if let Some(home) = var("HOME") {
            builder = builder.home(home);
        }
        if let Some(strict) = var("STRICT_HOST_KEY_CHECKING") {
            builder = builder.strict_host_keys(matches!(
                strict.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }
        builder.build()
    }

    /// Returns the cache root directory.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Returns the source root directory.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Returns the proxy URL, if configured.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Returns the hosting domains eligible for proxying.
    pub fn proxy_hosts(&self) -> &[String] {
        &self.proxy_hosts
    }

    /// Returns the home directory holding `.ssh/`.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Returns the directory holding SSH key files.
    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// Returns whether SSH host keys are verified against known hosts.
    pub fn strict_host_keys(&self) -> bool {
        self.strict_host_keys
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::builder().build()
    }
}

/// Builder for Settings.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    cache_root: Option<PathBuf>,
    source_root: Option<PathBuf>,
    proxy: Option<String>,
    proxy_hosts: Option<Vec<String>>,
    home: Option<PathBuf>,
    strict_host_keys: bool,
}

impl SettingsBuilder {
    /// Sets the cache root.
    pub fn cache_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(path.into());
        self
    }

    /// Sets the source root.
    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = Some(path.into());
        self
    }

    /// Sets the proxy URL.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the hosting domains eligible for proxying.
    pub fn proxy_hosts(mut self, hosts: Vec<impl Into<String>>) -> Self {
        self.proxy_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the home directory.
    pub fn home(mut self, path: impl Into<PathBuf>) -> Self {
        self.home = Some(path.into());
        self
    }

    /// Sets whether to verify SSH host keys.
    pub fn strict_host_keys(mut self, strict: bool) -> Self {
        self.strict_host_keys = strict;
        self
    }

    /// Builds the settings, filling defaults.
    pub fn build(self) -> Settings {
        Settings {
            cache_root: self
                .cache_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT)),
            source_root: self
                .source_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_ROOT)),
            proxy: self.proxy,
            proxy_hosts: self.proxy_hosts.unwrap_or_else(|| {
                DEFAULT_PROXY_HOSTS.iter().map(|h| h.to_string()).collect()
            }),
            home: self
                .home
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME)),
            strict_host_keys: self.strict_host_keys,
        }
    }
}
