// End-to-end play flow against the in-memory sandbox backend.
// Each test binds its own sandbox on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use casino_play_core::sandbox::{self, state::lock, RunningSandbox, SandboxState, ScriptedOutcome};
use casino_play_core::{
    ApiClient, AuthContext, BalanceHold, CashierDesk, ClientConfig, CoreError, DashboardAggregator,
    GameSessionController, JackpotCoordinator, OtpErrorCode, RoundState, RoundStatus, SandboxConfig, SessionDeps,
    TicketStage, ValidationError, WalletLedger,
};
use casino_play_core::models::{Game, GameType, Outcome, Prediction, TransactionKind, WalletKind};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

const HIGH_ROLLER: &str = "dice-high-roller";

struct Harness {
    server: RunningSandbox,
    player_token: String,
    unverified_token: String,
    staff_token: String,
}

async fn start_sandbox() -> Harness {
    let mut state = SandboxState::new(SandboxConfig::default());
    let tokens = sandbox::seed_demo(&mut state);
    state.add_game(
        Game {
            game_id: HIGH_ROLLER.to_string(),
            title: "High Roller Dice".to_string(),
            game_type: GameType::Dice,
            min_bet: dec!(1),
            max_bet: dec!(1000),
            default_thumbnail_url: None,
            video_url: None,
        },
        None,
    );

    let server = sandbox::spawn("127.0.0.1:0".parse().unwrap(), state.shared())
        .await
        .expect("sandbox binds");

    Harness {
        server,
        player_token: tokens.player,
        unverified_token: tokens.unverified_player,
        staff_token: tokens.staff,
    }
}

fn client(harness: &Harness, token: &str, principal: &str) -> ApiClient {
    let config = ClientConfig::new(harness.server.base_url())
        .with_presentation_window(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(200));
    ApiClient::new(config, AuthContext::logged_in(token, principal))
}

fn dashboard(client: &ApiClient, ledger: &WalletLedger, hold: &BalanceHold, principal: &str) -> Arc<DashboardAggregator> {
    Arc::new(DashboardAggregator::new(
        Arc::new(client.clone()),
        ledger.clone(),
        hold.clone(),
        principal,
        client.config().poll_interval,
    ))
}

#[tokio::test]
async fn test_fifty_dollar_round_settles_from_engine_balance() {
    let harness = start_sandbox().await;
    lock(&harness.server.state).script_outcomes([ScriptedOutcome::Loss]);

    let player = client(&harness, &harness.player_token, sandbox::DEMO_PLAYER);
    let ledger = WalletLedger::new();
    let hold = BalanceHold::new();
    let deps = SessionDeps::from_client(&player, ledger.clone(), hold.clone()).unwrap();

    let session = assert_ok!(GameSessionController::open(deps, "dice-six").await);
    assert!(session.session_id().is_some());
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(100)));

    let round = assert_ok!(session.submit_round("50", Some(Prediction::Number(3)), WalletKind::Real));
    let outcome = assert_ok!(round.outcome().await);

    assert_eq!(outcome.outcome, Outcome::Loss);
    assert_eq!(outcome.balance_after, dec!(50));
    assert!(matches!(session.state(), RoundState::ResultShown { .. }));
    assert!(hold.is_held());
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(50)));

    assert!(session.acknowledge());
    assert!(session.state().is_idle());
    assert!(!hold.is_held());
    assert_eq!(session.history()[0].status, RoundStatus::Settled);

    let server_balance = lock(&harness.server.state).player(sandbox::DEMO_PLAYER).unwrap().balance;
    assert_eq!(server_balance, dec!(50));

    session.leave().await;
    assert_eq!(lock(&harness.server.state).open_sessions(sandbox::DEMO_PLAYER), 0);
}

#[tokio::test]
async fn test_overdrawn_bet_never_reaches_engine() {
    let harness = start_sandbox().await;
    let player = client(&harness, &harness.player_token, sandbox::DEMO_PLAYER);
    let ledger = WalletLedger::new();
    let deps = SessionDeps::from_client(&player, ledger.clone(), BalanceHold::new()).unwrap();

    let session = assert_ok!(GameSessionController::open(deps, HIGH_ROLLER).await);
    let err = assert_err!(session.submit_round("150", Some(Prediction::Number(2)), WalletKind::Real));

    assert_eq!(
        err,
        CoreError::Validation(ValidationError::InsufficientFunds { wallet: "REAL".into() })
    );
    assert!(session.state().is_idle());
    assert_eq!(lock(&harness.server.state).engine_calls(), 0);
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(100)));
}

#[tokio::test]
async fn test_cancelled_deposit_then_verified_deposit() {
    let harness = start_sandbox().await;
    let staff = client(&harness, &harness.staff_token, sandbox::DEMO_STAFF);
    let player = client(&harness, &harness.player_token, sandbox::DEMO_PLAYER);
    let ledger = WalletLedger::new();
    let desk = CashierDesk::new(Arc::new(staff), ledger.clone());

    let found = assert_ok!(desk.lookup(sandbox::DEMO_PLAYER).await);
    assert_eq!(found.balance, dec!(100));

    assert_ok!(desk.initiate(TransactionKind::Deposit, sandbox::DEMO_PLAYER, "100").await);
    let cancelled = assert_ok!(desk.cancel(TransactionKind::Deposit, sandbox::DEMO_PLAYER));
    assert_eq!(cancelled.stage, TicketStage::Cancelled);

    assert_ok!(desk.initiate(TransactionKind::Deposit, sandbox::DEMO_PLAYER, "50").await);

    // The player reads the code off their own dashboard.
    let code = player
        .get_dashboard()
        .await
        .unwrap()
        .active_otp
        .expect("player sees a pending code")
        .otp_code;

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let err = assert_err!(desk.verify(TransactionKind::Deposit, sandbox::DEMO_PLAYER, wrong).await);
    assert_eq!(err.otp_code(), Some(OtpErrorCode::OtpMismatch));
    assert_eq!(desk.stage(TransactionKind::Deposit, sandbox::DEMO_PLAYER), TicketStage::Initiated);

    let new_balance = assert_ok!(desk.verify(TransactionKind::Deposit, sandbox::DEMO_PLAYER, &code).await);
    assert_eq!(new_balance, dec!(150));
    assert_eq!(desk.stage(TransactionKind::Deposit, sandbox::DEMO_PLAYER), TicketStage::Verified);
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(150)));
    assert!(player.get_dashboard().await.unwrap().active_otp.is_none());
}

#[tokio::test]
async fn test_unverified_player_cannot_enter_jackpot() {
    let harness = start_sandbox().await;
    let bob = client(&harness, &harness.unverified_token, sandbox::DEMO_UNVERIFIED_PLAYER);
    let ledger = WalletLedger::new();
    let feed = dashboard(&bob, &ledger, &BalanceHold::new(), sandbox::DEMO_UNVERIFIED_PLAYER);
    let coordinator = JackpotCoordinator::new(Arc::new(bob.clone()), feed);

    let err = assert_err!(coordinator.enter(sandbox::DEMO_JACKPOT, WalletKind::Real, true).await);
    assert_eq!(err, CoreError::Validation(ValidationError::KycRequired));

    let state = lock(&harness.server.state);
    assert_eq!(state.player(sandbox::DEMO_UNVERIFIED_PLAYER).unwrap().balance, dec!(40));
    assert_eq!(state.open_jackpots()[0].participant_count, 0);
}

#[tokio::test]
async fn test_jackpot_entry_rereads_balance_and_event() {
    let harness = start_sandbox().await;
    let alice = client(&harness, &harness.player_token, sandbox::DEMO_PLAYER);
    let ledger = WalletLedger::new();
    let feed = dashboard(&alice, &ledger, &BalanceHold::new(), sandbox::DEMO_PLAYER);
    let coordinator = JackpotCoordinator::new(Arc::new(alice.clone()), feed);

    let entry = assert_ok!(coordinator.enter(sandbox::DEMO_JACKPOT, WalletKind::Real, true).await);
    assert_eq!(entry.balances.unwrap().real, dec!(90));
    let event = entry.event.unwrap();
    assert_eq!(event.participant_count, 1);
    assert_eq!(event.total_pool_amount, dec!(10));

    let err = assert_err!(coordinator.enter(sandbox::DEMO_JACKPOT, WalletKind::Real, true).await);
    assert_eq!(err.user_message(), "Already entered");
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(90)));
}

#[tokio::test]
async fn test_revoked_token_logs_out_and_halts_polling() {
    let harness = start_sandbox().await;
    let alice = client(&harness, &harness.player_token, sandbox::DEMO_PLAYER);
    let ledger = WalletLedger::new();
    let feed = dashboard(&alice, &ledger, &BalanceHold::new(), sandbox::DEMO_PLAYER);
    let cleanup = ledger.clear_on_logout(alice.auth());

    assert_ok!(feed.refresh_now().await);
    assert_eq!(feed.snapshot().unwrap().games.len(), 6);
    assert_eq!(ledger.balance(sandbox::DEMO_PLAYER, WalletKind::Real), Some(dec!(100)));

    lock(&harness.server.state).revoke_token(&harness.player_token);
    let mut logins = alice.auth().subscribe();
    let poller = feed.spawn_polling();

    tokio::time::timeout(Duration::from_secs(5), logins.wait_for(|c| c.is_none()))
        .await
        .expect("logout observed")
        .unwrap();
    assert!(!alice.auth().is_authenticated());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !feed.is_halted() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("polling halts");

    let err = assert_err!(alice.get_dashboard().await);
    assert_eq!(err, CoreError::Unauthenticated);

    tokio::time::timeout(Duration::from_secs(5), async {
        while ledger.get_balances(sandbox::DEMO_PLAYER).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("balances cleared on logout");

    poller.stop();
    cleanup.abort();
}
