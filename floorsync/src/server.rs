//! Server lifecycle management
//!
//! Manages the startup and shutdown of the server components:
//! - HTTP server (WebSocket endpoint plus internal ingress)
//! - Background sweeper for stale locks and idle connections

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use floorsync_api::auth::HttpSessionVerifier;
use floorsync_api::http::create_router;
use floorsync_core::coordinator::sweeper;
use floorsync_core::{Config, Coordinator};

/// `FloorSync` server - manages the HTTP listener and background tasks
pub struct FloorSyncServer {
    config: Config,
    coordinator: Coordinator,
}

impl FloorSyncServer {
    /// Create a new server instance
    pub const fn new(config: Config, coordinator: Coordinator) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Start all components and wait for shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting FloorSync server...");

        // Create shutdown signal channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Spawn the staleness sweeper
        let sweeper_handle = tokio::spawn(sweeper::run(
            self.coordinator.clone(),
            shutdown_rx.clone(),
        ));

        // Start HTTP server with graceful shutdown
        let http_handle = self.start_http_server(shutdown_rx).await?;

        info!("All components started successfully");

        // Wait for either the server to stop or a shutdown signal
        tokio::select! {
            _ = http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        // Signal all components to shut down
        let _ = shutdown_tx.send(true);
        let _ = sweeper_handle.await;

        // Run graceful shutdown
        self.shutdown().await;

        Ok(())
    }

    /// Gracefully shut down, waiting for active connections to drain
    async fn shutdown(&self) {
        info!("Shutting down FloorSync server...");

        let drain_timeout = Duration::from_secs(30);
        let drain_poll_interval = Duration::from_millis(500);
        let active = self.coordinator.metrics().active_connections;
        if active > 0 {
            info!(
                "Waiting up to {}s for {} active connection(s) to drain...",
                drain_timeout.as_secs(),
                active
            );
            let deadline = tokio::time::Instant::now() + drain_timeout;
            loop {
                let remaining = self.coordinator.metrics().active_connections;
                if remaining == 0 {
                    info!("All connections drained");
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!(
                        "Drain timeout reached with {} connection(s) still active, proceeding with shutdown",
                        remaining
                    );
                    break;
                }
                tokio::time::sleep(drain_poll_interval).await;
            }
        }

        info!("FloorSync server shut down complete");
    }

    /// Start HTTP server with graceful shutdown support
    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let verifier = HttpSessionVerifier::new(
            &self.config.auth.introspection_url,
            Duration::from_secs(self.config.auth.request_timeout_seconds),
        )?;

        let router = create_router(
            self.coordinator.clone(),
            Arc::new(verifier),
            Arc::new(self.config.clone()),
        );

        let http_address = self.config.http_address();

        let handle = tokio::spawn(async move {
            let http_addr: std::net::SocketAddr = match http_address.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    error!("Invalid HTTP address '{}': {}", http_address, e);
                    return;
                }
            };

            let listener = match tokio::net::TcpListener::bind(http_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind HTTP address {}: {}", http_addr, e);
                    return;
                }
            };

            info!("HTTP server listening on {}", http_addr);

            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
