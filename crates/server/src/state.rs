use std::sync::Arc;

use herald_core::{Config, SanitizedConfig, TrackerService};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<TrackerService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<TrackerService>) -> Self {
        Self { config, service }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn service(&self) -> &TrackerService {
        self.service.as_ref()
    }
}
