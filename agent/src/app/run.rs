//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::errors::AgentError;
use crate::flash::orchestrator::FlashOrchestrator;
use crate::flash::programmer::Avrdude;
use crate::hardware::serial::SystemPortScanner;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::uploads::UploadStore;

/// Run the flashing agent until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing flashing agent...");

    let state = init_state(&options).await?;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let mut server_handle = serve(&options.server, state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
        result = &mut server_handle => {
            error!("HTTP server stopped unexpectedly");
            return result.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(options.max_shutdown_delay, server_handle).await {
        Ok(result) => {
            result.map_err(|e| AgentError::ShutdownError(e.to_string()))??;
            info!("Shutdown complete");
            Ok(())
        }
        Err(_) => {
            error!(
                "Shutdown timed out after {:?}, abandoning in-flight requests",
                options.max_shutdown_delay
            );
            Err(AgentError::ShutdownError("graceful shutdown timed out".to_string()))
        }
    }
}

/// Build the shared server state backed by avrdude and the OS port list
pub async fn init_state(options: &AppOptions) -> Result<Arc<ServerState>, AgentError> {
    let uploads = UploadStore::open(&options.upload_dir).await?;
    info!("Storing uploads in {}", uploads.dir().path().display());

    let orchestrator = FlashOrchestrator::new(
        options.programmer.clone(),
        options.detection.clone(),
        Arc::new(Avrdude),
        Arc::new(SystemPortScanner),
    );

    Ok(Arc::new(ServerState::new(uploads, Arc::new(orchestrator))))
}
