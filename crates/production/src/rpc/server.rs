//! Ingress server.

use super::handlers::IngressState;
use super::routes::create_router;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum IngressServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),
}

/// Configuration for the ingress server.
#[derive(Debug, Clone)]
pub struct IngressServerConfig {
    pub listen_addr: SocketAddr,
}

/// HTTP ingress for one committee node.
pub struct IngressServer {
    config: IngressServerConfig,
    state: IngressState,
}

impl IngressServer {
    pub fn new(config: IngressServerConfig, state: IngressState) -> Self {
        Self { config, state }
    }

    /// Bind and serve in a background task.
    pub async fn start(self) -> Result<JoinHandle<()>, IngressServerError> {
        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "ingress listening");

        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = ?e, "ingress server error");
            }
        }))
    }
}
