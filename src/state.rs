use crate::services::{access_guard::AccessGuard, object_store::ObjectStore};
use std::sync::Arc;

/// Everything a handler may touch: the backend handle and the token gate.
/// Both are fixed at start-up and shared read-only between requests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub guard: AccessGuard,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, token: Option<String>) -> Self {
        Self {
            store,
            guard: AccessGuard::new(token),
        }
    }
}
