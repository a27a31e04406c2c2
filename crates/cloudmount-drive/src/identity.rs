//! Caller identity check.
//!
//! Only the user who created the mount, and the system account, may use it.
//! Resolving a process id to its owner is platform specific and supplied by
//! the embedder through [`IdentityResolver`].

use std::sync::Arc;
use tracing::warn;

/// Identity of the operating system account, always allowed.
pub const SYSTEM_IDENTITY: &str = "NT AUTHORITY\\SYSTEM";

/// Resolves the owning user of a process.
pub trait IdentityResolver: Send + Sync {
    /// Owner of `process_id`, or `None` when it cannot be determined.
    fn process_owner(&self, process_id: u32) -> Option<String>;
}

/// Resolver that reports the same owner for every process.
///
/// Suitable for single-user hosts where the driver already restricts access.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub String);

impl IdentityResolver for FixedIdentity {
    fn process_owner(&self, _process_id: u32) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Admits callers whose owner matches the mount creator or the system account.
pub struct AccessPolicy {
    creator: Option<String>,
    resolver: Arc<dyn IdentityResolver>,
}

impl AccessPolicy {
    /// Captures the creator identity from `creator_pid`.
    pub fn capture(resolver: Arc<dyn IdentityResolver>, creator_pid: u32) -> Self {
        let creator = resolver.process_owner(creator_pid);
        if creator.is_none() {
            warn!(pid = creator_pid, "Could not resolve mount creator, only the system account has access");
        }
        Self { creator, resolver }
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    pub fn allows(&self, process_id: u32) -> bool {
        let identity = self.resolver.process_owner(process_id);
        match identity.as_deref() {
            Some(SYSTEM_IDENTITY) => true,
            Some(id) if self.creator.as_deref() == Some(id) => true,
            _ => {
                warn!(
                    pid = process_id,
                    identity = identity.as_deref().unwrap_or("<unknown>"),
                    creator = self.creator.as_deref().unwrap_or("<unknown>"),
                    "Caller has no access to the drive"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("creator", &self.creator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Table(HashMap<u32, &'static str>);

    impl IdentityResolver for Table {
        fn process_owner(&self, process_id: u32) -> Option<String> {
            self.0.get(&process_id).map(|s| (*s).to_string())
        }
    }

    fn policy() -> AccessPolicy {
        let table = Table(HashMap::from([
            (1, "HOST\\alice"),
            (2, "HOST\\bob"),
            (4, SYSTEM_IDENTITY),
        ]));
        AccessPolicy::capture(Arc::new(table), 1)
    }

    #[test]
    fn test_creator_and_system_allowed() {
        let policy = policy();
        assert_eq!(policy.creator(), Some("HOST\\alice"));
        assert!(policy.allows(1));
        assert!(policy.allows(4));
    }

    #[test]
    fn test_other_users_denied() {
        let policy = policy();
        assert!(!policy.allows(2));
        assert!(!policy.allows(99));
    }

    #[test]
    fn test_unresolved_creator_only_admits_system() {
        let table = Table(HashMap::from([(4, SYSTEM_IDENTITY)]));
        let policy = AccessPolicy::capture(Arc::new(table), 1);
        assert!(policy.creator().is_none());
        assert!(!policy.allows(1));
        assert!(policy.allows(4));
    }

    #[test]
    fn test_fixed_identity() {
        let policy = AccessPolicy::capture(Arc::new(FixedIdentity("me".into())), 10);
        assert!(policy.allows(11));
    }
}
