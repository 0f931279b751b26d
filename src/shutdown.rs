//! OS signal → cancellation.
//!
//! The supervisor never looks at a global stop flag. A listener task waits for
//! a termination signal and cancels the supervisor's [`CancellationToken`].

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Completes on SIGINT, SIGTERM or SIGQUIT (Ctrl-C elsewhere).
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token` on the first termination signal.
///
/// The listener exits quietly if the token is cancelled some other way.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_shutdown_signal() => match result {
                Ok(()) => {
                    tracing::info!("shutdown_signal_received");
                    token.cancel();
                }
                Err(e) => tracing::error!("signal_listener_failed: {}", e),
            },
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled() {
        let token = CancellationToken::new();
        let listener = spawn_signal_listener(token.clone());
        token.cancel();
        listener.await.unwrap();
    }
}
