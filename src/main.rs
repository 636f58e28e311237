// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use cloak_server::{
    api::router,
    config::{Config, ConfigError},
    crypto::{CryptoError, RecipientKeyPair},
    error::CloakError,
    logging,
    state::AppState,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Prints a fresh recipient key (PKCS#8 PEM) to stdout and exits.
const GENERATE_KEY_COMMAND: &str = "generate-recipient-key";

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("recipient key: {0}")]
    RecipientKey(#[from] CryptoError),

    #[error(transparent)]
    State(#[from] CloakError),

    #[error("server I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    if std::env::args().nth(1).as_deref() == Some(GENERATE_KEY_COMMAND) {
        let key = RecipientKeyPair::generate();
        print!("{}", key.to_pkcs8_pem()?.as_str());
        eprintln!("public key: {}", key.public_key().to_base64()?);
        return Ok(());
    }

    let config = Config::from_env()?;
    logging::init(config.log_format);

    let recipient = RecipientKeyPair::from_pkcs8_pem(&config.read_recipient_key()?)?;
    let state = AppState::open(&config, Arc::new(recipient))?;

    if let Err(e) = state.content.health_check().await {
        error!(error = %e, "Blob store health check failed");
        return Err(CloakError::from(e).into());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Cloak server listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
