// Casino sandbox server - in-memory backend for local play

use casino_play_core::config::SandboxConfig;
use casino_play_core::sandbox::{self, SandboxState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SandboxConfig::from_env();
    let bind_addr = config.bind_addr;

    let mut state = SandboxState::new(config);
    let tokens = sandbox::seed_demo(&mut state);

    info!("═══════════════════════════════════════════════");
    info!("     Casino Sandbox");
    info!("═══════════════════════════════════════════════");
    info!(email = sandbox::DEMO_PLAYER, token = %tokens.player, "player (KYC approved)");
    info!(email = sandbox::DEMO_UNVERIFIED_PLAYER, token = %tokens.unverified_player, "player (KYC pending)");
    info!(email = sandbox::DEMO_STAFF, token = %tokens.staff, "staff");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "sandbox listening");

    axum::serve(listener, sandbox::router(state.shared()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
