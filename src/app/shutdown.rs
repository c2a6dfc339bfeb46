use super::logging_system::InitializationError;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels a token on SIGINT or SIGTERM.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    token: CancellationToken,
}

impl SignalHandler {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Installs the handlers and returns once they are armed.
    pub fn install(self) -> Result<(), InitializationError> {
        #[cfg(unix)]
        {
            let mut sigterm =
                unix_signal(SignalKind::terminate()).map_err(InitializationError::SignalHandler)?;
            let token = self.token;

            tokio::spawn(async move {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                        Err(err) => {
                            error!("Failed to listen for SIGINT: {}", err);
                            return;
                        }
                    },
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    () = token.cancelled() => return,
                }
                token.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            let token = self.token;
            tokio::spawn(async move {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                        Err(err) => {
                            error!("Failed to listen for SIGINT: {}", err);
                            return;
                        }
                    },
                    () = token.cancelled() => return,
                }
                token.cancel();
            });
        }

        Ok(())
    }
}
