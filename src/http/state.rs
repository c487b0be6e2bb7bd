use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::Engine;

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<ServerConfig>,
}
