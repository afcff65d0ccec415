// wa-gateway — single-account WhatsApp HTTP gateway over Evolution API
//
//   atoms  — constants, error and data types (no I/O)
//   engine — session core, Evolution transport, HTTP server

pub mod atoms;
pub mod engine;

use atoms::error::{GatewayError, GatewayResult};
use engine::server::{self, AppState};
use engine::whatsapp::{event_channel, AutoReplyEngine, Bridge, EvolutionTransport, GatewayConfig};
use log::{info, warn};
use std::sync::Arc;

/// Build the gateway from `config`, bring up the transport and serve HTTP
/// until Ctrl-C. An `initialize()` failure is fatal only when
/// `exit_on_init_failure` is set; otherwise the server keeps answering in
/// `UNINITIALIZED`.
pub async fn run(mut config: GatewayConfig, exit_on_init_failure: bool) -> GatewayResult<()> {
    config.validate()?;
    config.ensure_webhook_token();
    let auto_reply = AutoReplyEngine::from_config(&config.auto_reply)?;

    let (tx, rx) = event_channel(config.event_channel_capacity);
    let transport = Arc::new(EvolutionTransport::new(
        config.evolution.clone(),
        config.webhook_url(),
        tx.clone(),
    )?);
    let bridge = Bridge::start(transport, tx, rx, config.send_gate, auto_reply);

    info!(
        "[gateway] Evolution API at {} (instance '{}')",
        config.evolution.api_url, config.evolution.instance_name
    );
    if let Err(e) = bridge.initialize().await {
        if exit_on_init_failure {
            bridge.shutdown();
            return Err(e);
        }
        warn!("[gateway] Continuing without a session; /status reports UNINITIALIZED");
    }

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    let state = AppState::new(
        bridge.gateway.clone(),
        bridge.events.clone(),
        &config.evolution.webhook_token,
    );
    server::serve(listener, state, shutdown_signal()).await?;

    info!("[gateway] Server stopped");
    bridge.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[gateway] Ctrl-C handler failed: {}", e);
        std::future::pending::<()>().await;
    }
    info!("[gateway] Shutdown requested");
}
