use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(windows)]
use tokio::signal::windows::{ctrl_break, ctrl_c};

/// Cancel `token` on the first termination signal
pub fn listen_for_signals(token: CancellationToken) {
    tokio::spawn(async move {
        if wait_for_signal().await {
            token.cancel();
        }
    });
}

/// Platform-specific signal handling implementation.
/// Returns false when the handlers could not be installed.
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    // Handle SIGTERM (sent by the container runtime on stop)
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create SIGTERM signal handler: {}", e);
            return false;
        }
    };
    // Handle SIGINT (Ctrl+C)
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create SIGINT signal handler: {}", e);
            return false;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal, stopping after the current run");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal, stopping after the current run");
        }
    }
    true
}

/// Platform-specific signal handling implementation.
/// Returns false when the handlers could not be installed.
#[cfg(windows)]
async fn wait_for_signal() -> bool {
    let (mut ctrlc, mut ctrlbreak) = match (ctrl_c(), ctrl_break()) {
        (Ok(c), Ok(b)) => (c, b),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to create console signal handler: {}", e);
            return false;
        }
    };

    tokio::select! {
        _ = ctrlc.recv() => {
            info!("Received Ctrl+C signal, stopping after the current run");
        }
        _ = ctrlbreak.recv() => {
            info!("Received Ctrl+Break signal, stopping after the current run");
        }
    }
    true
}
