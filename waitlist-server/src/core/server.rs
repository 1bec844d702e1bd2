//! Server Implementation
//!
//! HTTP / WebSocket listener and graceful shutdown

use std::time::Duration;

use crate::api;
use crate::core::tasks::BackgroundTasks;
use crate::core::{Config, Result, ServerError, ServerState};

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await?,
        };

        let mut tasks = BackgroundTasks::new();
        state.start_background_tasks(&mut tasks);
        tasks.log_summary();

        let app = api::build_app(state.clone());

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Waitlist server listening on {}", addr);

        // Workers keep running while connections drain; `tasks.shutdown` cancels them
        let signal = async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(e.into()))?;

        let exited = tasks.check_health();
        if exited > 0 {
            tracing::warn!(exited, "Background tasks stopped before shutdown was requested");
        }
        tasks
            .shutdown(Duration::from_millis(self.config.shutdown_timeout_ms))
            .await;
        Ok(())
    }
}
