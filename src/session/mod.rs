//! Game Session Controller
//!
//! Owns one player's session on one game: bet admission, the single engine
//! call, the presentation window, and the wallet update that follows.
//!
//! State machine:
//!   IDLE -> SUBMITTING -> PRESENTING -> RESULT_SHOWN -> IDLE
//!   SUBMITTING -> IDLE on engine failure
//!   any -> CLOSED on leave
//!
//! The state lives in a `watch` channel and admission is a single
//! `send_if_modified` call, so check-then-set never spans an await.

pub mod presentation;
pub mod round;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api_client::ApiClient;
use crate::dashboard::BalanceHold;
use crate::engine::{EngineGateway, RoundEngine, SessionGateway};
use crate::error::{CoreError, Result};
use crate::models::{BetRequest, Game, Prediction, RoundOutcome, WalletKind};
use crate::wallet::{ConfirmedUpdate, WalletLedger};

pub use presentation::PresentationWindow;
pub use round::{Round, RoundState, RoundStatus, ValidBet};

/// Collaborators a session needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub engine: Arc<dyn RoundEngine>,
    pub sessions: Arc<dyn SessionGateway>,
    pub ledger: WalletLedger,
    pub hold: BalanceHold,
    pub principal: String,
    pub window: PresentationWindow,
}

impl SessionDeps {
    /// Wire every gateway to one API client; the principal comes from its
    /// auth context.
    pub fn from_client(client: &ApiClient, ledger: WalletLedger, hold: BalanceHold) -> Result<Self> {
        let principal = client.auth().principal().ok_or(CoreError::Unauthenticated)?;
        let shared = Arc::new(client.clone());
        Ok(Self {
            engine: shared.clone(),
            sessions: shared,
            ledger,
            hold,
            principal,
            window: PresentationWindow::new(client.config().presentation_window),
        })
    }
}

#[derive(Debug, Default)]
struct SessionBook {
    session_id: Option<String>,
    history: Vec<Round>,
    last_error: Option<CoreError>,
}

struct Shared {
    game: Game,
    principal: String,
    engine: EngineGateway,
    sessions: Arc<dyn SessionGateway>,
    ledger: WalletLedger,
    hold: BalanceHold,
    window: PresentationWindow,
    next_round: AtomicU64,
    state: watch::Sender<RoundState>,
    book: Mutex<SessionBook>,
}

/// Handle to one game session. Clones share the session.
#[derive(Clone)]
pub struct GameSessionController {
    shared: Arc<Shared>,
}

/// Completion of a submitted round (resolves at RESULT_SHOWN or on failure).
///
/// Dropping it does not cancel the round.
#[derive(Debug)]
pub struct RoundHandle {
    round_id: u64,
    task: JoinHandle<Result<RoundOutcome>>,
}

impl RoundHandle {
    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub async fn outcome(self) -> Result<RoundOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(CoreError::SessionClosed),
            Err(err) => Err(CoreError::InvalidResponse(format!("round task failed: {err}"))),
        }
    }
}

impl GameSessionController {
    /// Load the game, seed the ledger from the returned balances and
    /// bracket a server session (best effort).
    pub async fn open(deps: SessionDeps, game_id: &str) -> Result<Self> {
        let details = deps.sessions.game_details(game_id).await?;
        deps.ledger.apply_confirmed(
            &deps.principal,
            ConfirmedUpdate::profile_snapshot(details.balance, details.bonus_balance),
        )?;

        let controller = Self::with_game(deps, details.game);
        match controller.shared.sessions.start_session(game_id).await {
            Ok(started) => {
                info!(game_id, session_id = %started.session_id, status = %started.status, "session opened");
                controller.book().session_id = Some(started.session_id);
            }
            Err(err) if err.is_unauthenticated() => return Err(err),
            Err(err) => warn!(game_id, error = %err, "session start failed, continuing without one"),
        }
        Ok(controller)
    }

    /// Controller over an already loaded game; no network calls.
    pub fn with_game(deps: SessionDeps, game: Game) -> Self {
        let (state, _) = watch::channel(RoundState::Idle);
        Self {
            shared: Arc::new(Shared {
                game,
                principal: deps.principal,
                engine: EngineGateway::new(deps.engine),
                sessions: deps.sessions,
                ledger: deps.ledger,
                hold: deps.hold,
                window: deps.window,
                next_round: AtomicU64::new(0),
                state,
                book: Mutex::new(SessionBook::default()),
            }),
        }
    }

    fn book(&self) -> MutexGuard<'_, SessionBook> {
        self.shared.lock_book()
    }

    pub fn game(&self) -> &Game {
        &self.shared.game
    }

    pub fn state(&self) -> RoundState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoundState> {
        self.shared.state.subscribe()
    }

    pub fn session_id(&self) -> Option<String> {
        self.book().session_id.clone()
    }

    pub fn history(&self) -> Vec<Round> {
        self.book().history.clone()
    }

    pub fn last_error(&self) -> Option<CoreError> {
        self.book().last_error.clone()
    }

    /// Default prediction for this game's type
    pub fn default_prediction(&self) -> Option<Prediction> {
        Prediction::default_for(self.shared.game.game_type)
    }

    /// Validate and submit one round.
    ///
    /// Synchronous on purpose: admission happens before this returns, so two
    /// calls in the same tick can never both reach the engine. Validation
    /// failures never leave the process.
    pub fn submit_round(
        &self,
        bet_amount: &str,
        prediction: Option<Prediction>,
        wallet: WalletKind,
    ) -> Result<RoundHandle> {
        let shared = &self.shared;
        {
            let state = shared.state.borrow();
            match &*state {
                RoundState::Closed => return Err(CoreError::SessionClosed),
                RoundState::Idle => {}
                _ => return Err(CoreError::RoundInFlight),
            }
        }

        let balance = shared.ledger.balance(&shared.principal, wallet);
        let bet = round::validate_bet(&shared.game, bet_amount, prediction, wallet, balance)?;

        let round_id = shared.next_round.fetch_add(1, Ordering::SeqCst) + 1;
        let mut rejection = None;
        let admitted = shared.state.send_if_modified(|state| match state {
            RoundState::Idle => {
                *state = RoundState::Submitting { round_id };
                true
            }
            RoundState::Closed => {
                rejection = Some(CoreError::SessionClosed);
                false
            }
            _ => {
                rejection = Some(CoreError::RoundInFlight);
                false
            }
        });
        if !admitted {
            return Err(rejection.unwrap_or(CoreError::RoundInFlight));
        }

        {
            let mut book = self.book();
            book.last_error = None;
            book.history.push(Round::requested(round_id, &bet));
        }
        info!(
            game_id = %shared.game.game_id,
            round_id,
            amount = %bet.amount,
            wallet = %bet.wallet,
            "round submitted"
        );

        let task = tokio::spawn(Arc::clone(shared).run_round(round_id, bet));
        Ok(RoundHandle { round_id, task })
    }

    /// "Continue": RESULT_SHOWN -> IDLE. No-op in any other state.
    pub fn acknowledge(&self) -> bool {
        let shared = &self.shared;
        let moved = shared.state.send_if_modified(|state| {
            if matches!(state, RoundState::ResultShown { .. }) {
                *state = RoundState::Idle;
                true
            } else {
                false
            }
        });
        if moved {
            shared.hold.release();
        }
        moved
    }

    /// Close the session.
    ///
    /// Stops any presentation window, then tries `session/end`; failure is
    /// logged and ignored. An engine call already sent keeps running but its
    /// answer no longer touches the ledger.
    pub async fn leave(&self) {
        let shared = &self.shared;
        let previous = shared.state.send_replace(RoundState::Closed);
        if previous.is_closed() {
            return;
        }
        shared.hold.release();
        info!(game_id = %shared.game.game_id, from = previous.name(), "leaving game session");

        let Some(session_id) = self.session_id() else {
            return;
        };
        if let Err(err) = shared.sessions.end_session(&session_id).await {
            warn!(session_id = %session_id, error = %err, "session end failed, server will expire it");
        }
    }
}

impl Shared {
    fn lock_book(&self) -> MutexGuard<'_, SessionBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_round(&self, round_id: u64, status: RoundStatus, outcome: Option<RoundOutcome>, error: Option<&CoreError>) {
        let mut book = self.lock_book();
        if let Some(round) = book.history.iter_mut().find(|r| r.round_id == round_id) {
            round.status = status;
            if outcome.is_some() {
                round.outcome = outcome;
            }
            round.error = error.map(CoreError::user_message);
        }
        if let Some(err) = error {
            book.last_error = Some(err.clone());
        }
    }

    /// Move between two states of the same round; refused once closed or
    /// superseded.
    fn advance(&self, round_id: u64, next: RoundState) -> bool {
        self.state.send_if_modified(|state| {
            let current = match state {
                RoundState::Submitting { round_id: id }
                | RoundState::Presenting { round_id: id }
                | RoundState::ResultShown { round_id: id, .. } => *id,
                RoundState::Idle | RoundState::Closed => return false,
            };
            if current != round_id {
                return false;
            }
            *state = next;
            true
        })
    }

    async fn run_round(self: Arc<Self>, round_id: u64, bet: ValidBet) -> Result<RoundOutcome> {
        let request = BetRequest::new(bet.amount, bet.wallet, bet.prediction.as_ref());
        let result = self.engine.submit(&self.game.game_id, &request).await;
        let responded_at = Instant::now();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail(round_id, err)),
        };

        if let Some(session_id) = &outcome.session_id {
            let mut book = self.lock_book();
            if book.session_id.as_deref() != Some(session_id.as_str()) {
                book.session_id = Some(session_id.clone());
            }
        }

        // Hold first so a poll landing between the two calls cannot write.
        self.hold.hold();
        if !self.advance(round_id, RoundState::Presenting { round_id }) {
            return Err(self.abandon(round_id, outcome));
        }

        if !self.window.wait(responded_at, self.state.subscribe()).await {
            return Err(self.abandon(round_id, outcome));
        }

        self.settle(bet.wallet, &outcome).await;
        if self.state.borrow().is_closed() {
            return Err(self.abandon(round_id, outcome));
        }

        self.update_round(round_id, RoundStatus::Settled, Some(outcome.clone()), None);
        if !self.advance(
            round_id,
            RoundState::ResultShown {
                round_id,
                outcome: outcome.clone(),
            },
        ) {
            return Err(CoreError::SessionClosed);
        }
        info!(
            game_id = %self.game.game_id,
            round_id,
            outcome = ?outcome.outcome,
            win_amount = %outcome.win_amount,
            "round result shown"
        );
        Ok(outcome)
    }

    /// Write the settled balance. REAL trusts `balance_after`; BONUS
    /// re-reads both balances from the server.
    async fn settle(&self, wallet: WalletKind, outcome: &RoundOutcome) {
        let applied = match wallet {
            WalletKind::Real => self.ledger.apply_confirmed(
                &self.principal,
                ConfirmedUpdate::round_settled(WalletKind::Real, outcome.balance_after, outcome.session_id.clone()),
            ),
            WalletKind::Bonus => match self.sessions.game_details(&self.game.game_id).await {
                Ok(details) if !self.state.borrow().is_closed() => self.ledger.apply_confirmed(
                    &self.principal,
                    ConfirmedUpdate::profile_snapshot(details.balance, details.bonus_balance),
                ),
                Ok(_) => return,
                Err(err) => Err(err),
            },
        };

        if let Err(err) = applied {
            warn!(game_id = %self.game.game_id, error = %err, "settled balance not applied, awaiting reconcile");
            self.ledger.mark_needs_reconcile(&self.principal);
        }
    }

    fn fail(&self, round_id: u64, err: CoreError) -> CoreError {
        // An unusable 2xx body still means the engine committed the bet.
        let committed = matches!(err, CoreError::InvalidResponse(_));
        let status = if err.is_ambiguous() || committed {
            self.ledger.mark_needs_reconcile(&self.principal);
            RoundStatus::Unresolved
        } else {
            RoundStatus::Failed
        };
        self.update_round(round_id, status, None, Some(&err));

        if self.advance(round_id, RoundState::Idle) {
            warn!(game_id = %self.game.game_id, round_id, status = ?status, error = %err, "round failed");
        }
        err
    }

    /// The session closed under a settled round: record it, leave the ledger
    /// to the next snapshot.
    fn abandon(&self, round_id: u64, outcome: RoundOutcome) -> CoreError {
        self.hold.release();
        self.ledger.mark_needs_reconcile(&self.principal);
        self.update_round(round_id, RoundStatus::Settled, Some(outcome), None);
        info!(game_id = %self.game.game_id, round_id, "session closed, settled round not applied");
        CoreError::SessionClosed
    }
}
