use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Turns SIGINT/SIGTERM into cancellation of in-flight waits
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to waiters. Cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested, cancelling in-flight waits");
        }
        self.token.cancel();
    }

    /// Install signal handlers for graceful shutdown
    pub fn install_signal_handlers(&self) -> Result<()> {
        info!("Installing signal handlers for graceful shutdown");

        let coordinator = self.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(signal) => {
                    warn!(signal, "Received shutdown signal");
                    coordinator.shutdown();
                }
                Err(e) => warn!("Failed to listen for shutdown signals: {}", e),
            }
        });

        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT").map_err(Into::into),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
