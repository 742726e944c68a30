//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::WebConfig;
use crate::session::SessionRegistry;
use crate::upload::RetryPolicy;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; holds the configuration and the registry of
/// per-browser session controllers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WebConfig,
    registry: SessionRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Web configuration
    /// * `backend` - Source of per-session platform collaborators
    #[must_use]
    pub fn new(config: WebConfig, backend: Arc<dyn Backend>) -> Self {
        let registry = SessionRegistry::new(
            backend,
            config.session_idle,
            config.init_timeout,
            RetryPolicy::default(),
        );

        Self {
            inner: Arc::new(AppStateInner { config, registry }),
        }
    }

    /// Get a reference to the web configuration.
    #[must_use]
    pub fn config(&self) -> &WebConfig {
        &self.inner.config
    }

    /// Get a reference to the session controller registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }
}
