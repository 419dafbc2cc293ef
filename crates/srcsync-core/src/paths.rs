//! Tenant-scoped directory layout and filesystem helpers.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::descriptor::SourceDescriptor;
use crate::error::{CoreError, Result};
use crate::settings::Settings;

/// Derives cache and source directories for a descriptor.
///
/// Both are namespaced by tenant and service so concurrent builds of
/// different services never share a directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    cache_root: PathBuf,
    source_root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver from settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            cache_root: settings.cache_root().to_path_buf(),
            source_root: settings.source_root().to_path_buf(),
        }
    }

    /// Returns `<cache_root>/build/<tenant>/<service>`.
    pub fn cache_dir(&self, descriptor: &SourceDescriptor) -> PathBuf {
        let dir = scoped(&self.cache_root, descriptor);
        debug!("code cache dir is {}", dir.display());
        dir
    }

    /// Returns `<source_root>/build/<tenant>/<service>`.
    pub fn source_dir(&self, descriptor: &SourceDescriptor) -> PathBuf {
        scoped(&self.source_root, descriptor)
    }
}

fn scoped(root: &Path, descriptor: &SourceDescriptor) -> PathBuf {
    root.join("build")
        .join(descriptor.tenant_id())
        .join(descriptor.service_id())
}

/// Returns true if something exists at `path`.
pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().symlink_metadata().is_ok()
}

/// Removes a directory tree.
///
/// A missing directory is not an error. The filesystem root is refused;
/// no other location is guarded.
pub fn remove_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || path.parent().is_none() {
        return Err(CoreError::RefuseRemoveRoot(path.to_path_buf()));
    }

    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_dirs() {
        let settings = Settings::builder()
            .cache_root("/cache")
            .source_root("/grdata/source")
            .home("/root")
            .build();
        let resolver = PathResolver::new(&settings);
        let descriptor = SourceDescriptor::new("https://github.com/acme/app").with_scope("t1", "s1");

        assert_eq!(
            resolver.cache_dir(&descriptor),
            PathBuf::from("/cache/build/t1/s1")
        );
        assert_eq!(
            resolver.source_dir(&descriptor),
            PathBuf::from("/grdata/source/build/t1/s1")
        );
    }

    #[test]
    fn test_remove_dir_refuses_root() {
        assert!(matches!(
            remove_dir("/"),
            Err(CoreError::RefuseRemoveRoot(_))
        ));
        assert!(remove_dir("").is_err());
    }

    #[test]
    fn test_remove_dir_missing_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(remove_dir(tmp.path().join("nope")).is_ok());
    }

    #[test]
    fn test_remove_dir_and_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("f.txt"), "x").unwrap();

        assert!(file_exists(&dir));
        remove_dir(tmp.path().join("a")).unwrap();
        assert!(!file_exists(tmp.path().join("a")));
    }
}
