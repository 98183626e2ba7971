//! Server state

use std::sync::Arc;

use crate::flash::orchestrator::FlashOrchestrator;
use crate::storage::uploads::UploadStore;

/// Server state shared across handlers. Read-only after startup.
pub struct ServerState {
    pub uploads: UploadStore,
    pub orchestrator: Arc<FlashOrchestrator>,
}

impl ServerState {
    pub fn new(uploads: UploadStore, orchestrator: Arc<FlashOrchestrator>) -> Self {
        Self {
            uploads,
            orchestrator,
        }
    }
}
