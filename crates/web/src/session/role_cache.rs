//! Local fast-access copy of durable roles.

use std::time::Duration;

use moka::future::Cache;

use golibre_core::{Role, SubjectId};

/// Process-wide role cache keyed by subject id.
///
/// The durable `users/{uid}.role` field is the source of truth; this cache is
/// only consulted when reading it fails.
#[derive(Clone)]
pub struct RoleCache {
    roles: Cache<SubjectId, Role>,
}

impl RoleCache {
    #[must_use]
    pub fn new() -> Self {
        let roles = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(24 * 60 * 60))
            .build();
        Self { roles }
    }

    pub async fn get(&self, subject: &SubjectId) -> Option<Role> {
        self.roles.get(subject).await
    }

    /// Mirror a role, or clear the entry when the role is absent.
    pub async fn set(&self, subject: &SubjectId, role: Option<&Role>) {
        match role {
            Some(role) => self.roles.insert(subject.clone(), role.clone()).await,
            None => self.roles.invalidate(subject).await,
        }
    }
}

impl Default for RoleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_clear() {
        let cache = RoleCache::new();
        let subject = SubjectId::new("u1");
        assert_eq!(cache.get(&subject).await, None);

        cache.set(&subject, Some(&Role::Driver)).await;
        assert_eq!(cache.get(&subject).await, Some(Role::Driver));

        cache.set(&subject, None).await;
        assert_eq!(cache.get(&subject).await, None);
    }
}
