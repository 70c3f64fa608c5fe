//! vault-keeper: keeps a Vault token alive until the process is told to stop.

use anyhow::Context;
use keeper_common::{TracingConfig, init_tracing};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vault_keeper::{Termination, VaultClient, VaultConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing(&TracingConfig::from_env()).context("failed to initialise tracing")?;

    let config = VaultConfig::from_env().context("invalid Vault configuration")?;
    let client = VaultClient::open(config).context("failed to open Vault session")?;

    let cancel = CancellationToken::new();
    let mut manager = client.lifecycle_manager().spawn(cancel.clone());

    let outcome = tokio::select! {
        joined = &mut manager => joined,
        () = wait_for_signal() => {
            cancel.cancel();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut manager).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Shutdown timeout reached, aborting token renewal");
                    manager.abort();
                    return Ok(());
                }
            }
        }
    };

    match outcome.context("token renewal task panicked")? {
        Ok(Termination::Cancelled) => info!("Shutdown complete"),
        Ok(Termination::NotRenewable) => {
            info!("Token is not renewable; nothing to keep alive");
        }
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "Token renewal stopped");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Waits for SIGTERM or SIGINT.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}
