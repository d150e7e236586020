//! Sandbox Casino Backend
//!
//! An in-memory stand-in for the remote casino API. It serves the same
//! routes and JSON shapes the client speaks, so the whole play flow can be
//! driven end to end locally and in integration tests. Engine outcomes can
//! be scripted for deterministic runs.

pub mod handlers;
pub mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{Days, Utc};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::{Game, GameType, KycStatus};
pub use state::{ApiError, Principal, SandboxState, ScriptedOutcome, SharedState};

use handlers::*;

pub fn router(state: SharedState) -> Router {
    Router::new()
        // ===== PLAYER =====
        .route("/players/dashboard", get(get_dashboard))
        .route("/players/game/:game_id", get(get_game_details))
        .route("/players/session/start", post(start_session))
        .route("/players/session/end", post(end_session))
        // ===== ENGINE =====
        .route("/engine/play/:game_id", post(play))
        // ===== JACKPOTS =====
        .route("/players/jackpots", get(get_jackpots))
        .route("/players/jackpots/enter", post(enter_jackpot))
        .route("/players/jackpots/latest-winner", get(latest_winner))
        // ===== STAFF =====
        .route("/staff/lookup", get(lookup_player))
        .route("/staff/:kind/initiate", post(initiate_transaction))
        .route("/staff/:kind/verify", post(verify_transaction))
        // ===== HEALTH =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bearer tokens handed out by [`seed_demo`].
#[derive(Debug, Clone)]
pub struct DemoTokens {
    pub player: String,
    pub unverified_player: String,
    pub staff: String,
}

pub const DEMO_PLAYER: &str = "alice@casino.test";
pub const DEMO_UNVERIFIED_PLAYER: &str = "bob@casino.test";
pub const DEMO_STAFF: &str = "cashier@casino.test";
pub const DEMO_JACKPOT: &str = "jackpot-weekly";

/// Seed one game per type, a verified and an unverified player, a staff
/// account and an open jackpot.
pub fn seed_demo(state: &mut SandboxState) -> DemoTokens {
    let games = [
        ("slot-classic", "Classic Slots", GameType::Slot),
        ("dice-six", "Lucky Dice", GameType::Dice),
        ("coin-flip", "Coin Flip", GameType::Coin),
        ("wheel-twenty", "Fortune Wheel", GameType::Wheel),
        ("high-low", "High Low", GameType::HighLow),
    ];
    for (game_id, title, game_type) in games {
        state.add_game(
            Game {
                game_id: game_id.to_string(),
                title: title.to_string(),
                game_type,
                min_bet: dec!(1),
                max_bet: dec!(100),
                default_thumbnail_url: None,
                video_url: None,
            },
            Some("sandbox"),
        );
    }

    let player = state.add_player("alice", DEMO_PLAYER, KycStatus::Approved, dec!(100), dec!(25));
    let unverified_player = state.add_player("bob", DEMO_UNVERIFIED_PLAYER, KycStatus::Pending, dec!(40), dec!(0));
    let staff = state.add_staff(DEMO_STAFF);

    let draw_date = Utc::now().date_naive() + Days::new(7);
    state.add_jackpot(DEMO_JACKPOT, draw_date, dec!(10));

    DemoTokens {
        player,
        unverified_player,
        staff,
    }
}

/// A sandbox bound to a local socket.
pub struct RunningSandbox {
    pub addr: SocketAddr,
    pub state: SharedState,
    pub task: JoinHandle<()>,
}

impl RunningSandbox {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RunningSandbox {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind `addr` and serve the sandbox in a background task.
///
/// Use port 0 to let the OS pick a free port.
pub async fn spawn(addr: SocketAddr, state: SharedState) -> std::io::Result<RunningSandbox> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = router(state.clone());

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "sandbox server stopped");
        }
    });
    info!(%addr, "sandbox listening");

    Ok(RunningSandbox { addr, state, task })
}
