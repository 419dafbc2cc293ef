//! srcsync Core - Domain types
//!
//! This crate provides the foundational types shared by the srcsync engine:
//! the per-build [`SourceDescriptor`], transport [`Endpoint`] parsing,
//! environment-sourced [`Settings`] and the tenant-scoped [`PathResolver`].

pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod paths;
pub mod settings;

pub use descriptor::SourceDescriptor;
pub use endpoint::{Endpoint, Protocol};
pub use error::{CoreError, Result};
pub use paths::{PathResolver, file_exists, remove_dir};
pub use settings::{Settings, SettingsBuilder};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_defined() {
        assert!(!version().is_empty());
    }
}
