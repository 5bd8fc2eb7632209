use std::path::PathBuf;
use std::sync::Arc;

use services::AppServices;

/// Server settings that handlers need at request time.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// Directory holding the built SPA (`index.html` plus assets).
    pub static_dir: Option<PathBuf>,
    /// Shared secret accepted by the seed endpoint in place of an admin token.
    pub seed_token: Option<String>,
}

#[derive(Clone)]
pub struct ApiState {
    pub services: AppServices,
    pub config: Arc<ApiConfig>,
}

impl ApiState {
    #[must_use]
    pub fn new(services: AppServices, config: ApiConfig) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }
}
