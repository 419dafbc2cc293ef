//! Authentication retry state.

use crate::keys::KeyIdentity;

/// Which key the next attempt uses.
///
/// An SSH key rejection moves `Primary` to `Fallback` and `Fallback` to
/// `Exhausted`. Nothing leaves `Exhausted`, so one sync retries at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthAttempt {
    /// The tenant's own key.
    #[default]
    Primary,
    /// The shared fallback key.
    Fallback,
    /// Both keys were rejected.
    Exhausted,
}

impl AuthAttempt {
    /// Returns the key identity for this attempt, `None` once exhausted.
    pub fn identity(self, tenant: &str) -> Option<KeyIdentity> {
        match self {
            Self::Primary => Some(KeyIdentity::Tenant(tenant.to_string())),
            Self::Fallback => Some(KeyIdentity::Fallback),
            Self::Exhausted => None,
        }
    }

    /// Transition taken when the remote rejected the offered key.
    pub fn after_rejection(self) -> Self {
        match self {
            Self::Primary => Self::Fallback,
            Self::Fallback | Self::Exhausted => Self::Exhausted,
        }
    }

    /// Returns true once no key is left to try.
    pub fn is_exhausted(self) -> bool {
        self == Self::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_retry() {
        let attempt = AuthAttempt::default();
        assert_eq!(attempt.identity("t1"), Some(KeyIdentity::Tenant("t1".into())));

        let attempt = attempt.after_rejection();
        assert_eq!(attempt, AuthAttempt::Fallback);
        assert_eq!(attempt.identity("t1"), Some(KeyIdentity::Fallback));

        let attempt = attempt.after_rejection();
        assert!(attempt.is_exhausted());
        assert_eq!(attempt.identity("t1"), None);
        assert!(attempt.after_rejection().is_exhausted());
    }
}
