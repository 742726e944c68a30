//! Per-browser-session controllers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;
use tracing::debug;
use uuid::Uuid;

use super::{RoleCache, SessionController};
use crate::backend::Backend;
use crate::upload::RetryPolicy;

/// Owns one [`SessionController`] per client id.
///
/// Controllers idle out with the browser session; eviction shuts the
/// controller down.
#[derive(Clone)]
pub struct SessionRegistry {
    backend: Arc<dyn Backend>,
    controllers: Cache<Uuid, Arc<SessionController>>,
    roles: RoleCache,
    retry: RetryPolicy,
    init_timeout: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        idle: Duration,
        init_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let controllers = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(idle)
            .eviction_listener(
                |client: Arc<Uuid>, controller: Arc<SessionController>, cause: RemovalCause| {
                    debug!(client = %client, ?cause, "session controller evicted");
                    controller.shutdown();
                },
            )
            .build();

        Self {
            backend,
            controllers,
            roles: RoleCache::new(),
            retry,
            init_timeout,
        }
    }

    /// The controller for `client`, starting one on first use.
    pub async fn controller_for(&self, client: Uuid) -> Arc<SessionController> {
        self.controllers
            .get_with(client, async {
                debug!(client = %client, "starting session controller");
                Arc::new(SessionController::start(
                    self.backend.connect(),
                    self.roles.clone(),
                    self.retry,
                    self.init_timeout,
                ))
            })
            .await
    }
}
