//! Player Dashboard Aggregator
//!
//! Combines profile, lobby games, the pending OTP, open jackpots and the
//! latest jackpot winner into one snapshot. Refreshes happen on a fixed
//! interval and on demand (`refresh_now`); snapshots are published on a
//! `watch` channel.
//!
//! Rules:
//! - every request gets a sequence number; a response older than the last
//!   applied one is dropped (last-response-wins, no queueing)
//! - wallet balances from a snapshot are not written while a round result is
//!   being presented (`BalanceHold`), nor when the ledger changed after the
//!   request went out
//! - a 401 stops polling

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::models::{ActiveOtp, DashboardPayload, GameSummary, JackpotEvent, LatestWinner, PlayerProfile};
use crate::wallet::{ConfirmedUpdate, WalletLedger};

/// Read side of the player API the dashboard needs.
#[async_trait]
pub trait PlayerFeed: Send + Sync {
    async fn dashboard(&self) -> Result<DashboardPayload>;
    async fn jackpots(&self) -> Result<Vec<JackpotEvent>>;
    async fn latest_winner(&self) -> Result<Option<LatestWinner>>;
}

// ============================================================================
// BALANCE HOLD
// ============================================================================

/// Set by the game session while a settled result is on screen.
#[derive(Debug, Clone, Default)]
pub struct BalanceHold {
    held: Arc<AtomicBool>,
}

impl BalanceHold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
    pub profile: PlayerProfile,
    pub tenant_contact_email: Option<String>,
    pub games: Vec<GameSummary>,
    pub active_otp: Option<ActiveOtp>,
    pub jackpots: Vec<JackpotEvent>,
    pub latest_winner: Option<LatestWinner>,
}

impl DashboardSnapshot {
    /// A staff OTP is waiting for the player
    pub fn has_active_notification(&self) -> bool {
        self.active_otp.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot published; `balances_applied` tells whether the ledger moved
    Applied { balances_applied: bool },
    /// A newer response already landed
    Stale,
}

#[derive(Debug, Default)]
struct AggregatorState {
    last_applied: u64,
    celebrated: HashSet<String>,
    pending_celebration: Option<LatestWinner>,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct DashboardAggregator {
    feed: Arc<dyn PlayerFeed>,
    ledger: WalletLedger,
    hold: BalanceHold,
    principal: String,
    poll_interval: Duration,
    next_sequence: AtomicU64,
    halted: AtomicBool,
    state: Mutex<AggregatorState>,
    snapshots: watch::Sender<Option<DashboardSnapshot>>,
}

impl DashboardAggregator {
    pub fn new(
        feed: Arc<dyn PlayerFeed>,
        ledger: WalletLedger,
        hold: BalanceHold,
        principal: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            feed,
            ledger,
            hold,
            principal: principal.into(),
            poll_interval,
            next_sequence: AtomicU64::new(0),
            halted: AtomicBool::new(false),
            state: Mutex::new(AggregatorState::default()),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn has_active_notification(&self) -> bool {
        self.snapshots
            .borrow()
            .as_ref()
            .map(DashboardSnapshot::has_active_notification)
            .unwrap_or(false)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// One-shot: the latest jackpot winner is this player and it was not shown yet.
    pub fn take_celebration(&self) -> Option<LatestWinner> {
        self.lock().pending_celebration.take()
    }

    /// Fetch everything now.
    ///
    /// The dashboard read must succeed; jackpots and latest winner are best
    /// effort and fall back to what the previous snapshot had.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let ledger_revision = self.ledger.revision();

        let payload = match self.feed.dashboard().await {
            Ok(payload) => payload,
            Err(err) => {
                if err.is_unauthenticated() {
                    self.halted.store(true, Ordering::SeqCst);
                }
                return Err(err);
            }
        };

        let previous = self.snapshot();
        let jackpots = match self.feed.jackpots().await {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "failed to load jackpots");
                previous.as_ref().map(|s| s.jackpots.clone()).unwrap_or_default()
            }
        };
        let latest_winner = match self.feed.latest_winner().await {
            Ok(winner) => winner,
            Err(err) => {
                warn!(error = %err, "failed to load latest winner");
                previous.and_then(|s| s.latest_winner)
            }
        };

        Ok(self.apply(sequence, ledger_revision, payload, jackpots, latest_winner))
    }

    fn apply(
        &self,
        sequence: u64,
        ledger_revision: u64,
        payload: DashboardPayload,
        jackpots: Vec<JackpotEvent>,
        latest_winner: Option<LatestWinner>,
    ) -> RefreshOutcome {
        let mut state = self.lock();
        if sequence <= state.last_applied {
            debug!(sequence, last_applied = state.last_applied, "discarding stale dashboard response");
            return RefreshOutcome::Stale;
        }
        state.last_applied = sequence;

        let balances_applied = if self.hold.is_held() {
            debug!(sequence, "round result on screen, leaving balances alone");
            false
        } else if self.ledger.revision() != ledger_revision {
            debug!(sequence, "ledger moved while request was in flight, leaving balances alone");
            false
        } else {
            let update = ConfirmedUpdate::profile_snapshot(payload.profile.balance, payload.profile.bonus_balance);
            match self.ledger.apply_confirmed(&self.principal, update) {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "dashboard balances rejected by ledger");
                    false
                }
            }
        };

        if let Some(winner) = &latest_winner {
            if winner.username == payload.profile.username
                && state.celebrated.insert(winner.jackpot_event_id.clone())
            {
                info!(event = %winner.jackpot_event_id, "player won the latest jackpot");
                state.pending_celebration = Some(winner.clone());
            }
        }
        drop(state);

        self.snapshots.send_replace(Some(DashboardSnapshot {
            sequence,
            fetched_at: Utc::now(),
            profile: payload.profile,
            tenant_contact_email: payload.tenant_contact_email,
            games: payload.games,
            active_otp: payload.active_otp,
            jackpots,
            latest_winner,
        }));

        RefreshOutcome::Applied { balances_applied }
    }

    /// Poll on the configured interval until stopped or a 401 arrives.
    ///
    /// Each tick runs in its own task so a slow response never delays the
    /// next request; ordering is settled by sequence numbers.
    pub fn spawn_polling(self: &Arc<Self>) -> PollHandle {
        let aggregator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(aggregator.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if aggregator.is_halted() {
                    info!("dashboard polling stopped: unauthenticated");
                    break;
                }
                let worker = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    if let Err(err) = worker.refresh_now().await {
                        match err {
                            CoreError::Unauthenticated => {}
                            other => warn!(error = %other, "dashboard refresh failed"),
                        }
                    }
                });
            }
        });
        PollHandle { task }
    }
}

/// Stops polling when dropped.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JackpotStatus, KycStatus};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const PRINCIPAL: &str = "player@x.com";

    /// Scripted responses: (delay, real balance, otp)
    struct ScriptedFeed {
        script: Mutex<VecDeque<(Duration, Result<(Decimal, Option<&'static str>)>)>>,
        winner: Option<LatestWinner>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(script: Vec<(Duration, Result<(Decimal, Option<&'static str>)>)>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                winner: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn payload(real: Decimal, otp: Option<&str>) -> DashboardPayload {
        DashboardPayload {
            profile: PlayerProfile {
                username: "alice".into(),
                email: PRINCIPAL.into(),
                kyc_status: KycStatus::Approved,
                balance: real,
                bonus_balance: dec!(5),
                currency_code: "USD".into(),
            },
            tenant_contact_email: Some("support@platform.com".into()),
            games: Vec::new(),
            active_otp: otp.map(|code| ActiveOtp { otp_code: code.into() }),
        }
    }

    #[async_trait]
    impl PlayerFeed for ScriptedFeed {
        async fn dashboard(&self) -> Result<DashboardPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or((Duration::ZERO, Ok((dec!(0), None))));
            tokio::time::sleep(delay).await;
            result.map(|(real, otp)| payload(real, otp))
        }

        async fn jackpots(&self) -> Result<Vec<JackpotEvent>> {
            Ok(vec![JackpotEvent {
                jackpot_event_id: "j-1".into(),
                game_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                entry_amount: dec!(10),
                currency_code: "USD".into(),
                status: JackpotStatus::Open,
                total_pool_amount: dec!(100),
                participant_count: 10,
            }])
        }

        async fn latest_winner(&self) -> Result<Option<LatestWinner>> {
            Ok(self.winner.clone())
        }
    }

    fn aggregator(feed: Arc<ScriptedFeed>, ledger: WalletLedger, hold: BalanceHold) -> Arc<DashboardAggregator> {
        Arc::new(DashboardAggregator::new(feed, ledger, hold, PRINCIPAL, Duration::from_secs(10)))
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot_and_balances() {
        let feed = Arc::new(ScriptedFeed::new(vec![(Duration::ZERO, Ok((dec!(200), Some("123456"))))]));
        let ledger = WalletLedger::new();
        let agg = aggregator(feed, ledger.clone(), BalanceHold::new());

        let outcome = agg.refresh_now().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Applied { balances_applied: true });
        assert!(agg.has_active_notification());
        assert_eq!(ledger.get_balances(PRINCIPAL).unwrap().real, dec!(200));
        assert_eq!(agg.snapshot().unwrap().jackpots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_discarded() {
        let feed = Arc::new(ScriptedFeed::new(vec![
            (Duration::from_secs(5), Ok((dec!(100), None))),
            (Duration::from_millis(10), Ok((dec!(300), None))),
        ]));
        let ledger = WalletLedger::new();
        let agg = aggregator(feed, ledger.clone(), BalanceHold::new());

        let (slow, fast) = tokio::join!(agg.refresh_now(), async {
            tokio::task::yield_now().await;
            agg.refresh_now().await
        });

        assert_eq!(fast.unwrap(), RefreshOutcome::Applied { balances_applied: true });
        assert_eq!(slow.unwrap(), RefreshOutcome::Stale);
        assert_eq!(ledger.get_balances(PRINCIPAL).unwrap().real, dec!(300));
        assert_eq!(agg.snapshot().unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_hold_keeps_settled_balance() {
        let feed = Arc::new(ScriptedFeed::new(vec![(Duration::ZERO, Ok((dec!(999), Some("654321"))))]));
        let ledger = WalletLedger::new();
        ledger
            .apply_confirmed(PRINCIPAL, ConfirmedUpdate::profile_snapshot(dec!(250), dec!(0)))
            .unwrap();
        let hold = BalanceHold::new();
        hold.hold();
        let agg = aggregator(feed, ledger.clone(), hold);

        let outcome = agg.refresh_now().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Applied { balances_applied: false });
        assert_eq!(ledger.get_balances(PRINCIPAL).unwrap().real, dec!(250));
        // Everything else still updates.
        assert!(agg.has_active_notification());
    }

    #[tokio::test]
    async fn test_unauthenticated_halts() {
        let feed = Arc::new(ScriptedFeed::new(vec![(Duration::ZERO, Err(CoreError::Unauthenticated))]));
        let agg = aggregator(feed, WalletLedger::new(), BalanceHold::new());

        assert_eq!(agg.refresh_now().await, Err(CoreError::Unauthenticated));
        assert!(agg.is_halted());
        assert!(agg.snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_cadence() {
        let feed = Arc::new(ScriptedFeed::new(Vec::new()));
        let agg = aggregator(feed.clone(), WalletLedger::new(), BalanceHold::new());

        let handle = agg.spawn_polling();
        // First tick fires immediately, then every 10s.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);

        handle.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_celebration_fires_once_per_event() {
        let mut feed = ScriptedFeed::new(vec![
            (Duration::ZERO, Ok((dec!(10), None))),
            (Duration::ZERO, Ok((dec!(10), None))),
        ]);
        feed.winner = Some(LatestWinner {
            username: "alice".into(),
            total_pool_amount: dec!(500),
            game_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            jackpot_event_id: "j-0".into(),
        });
        let agg = aggregator(Arc::new(feed), WalletLedger::new(), BalanceHold::new());

        agg.refresh_now().await.unwrap();
        assert_eq!(agg.take_celebration().unwrap().jackpot_event_id, "j-0");
        assert!(agg.take_celebration().is_none());

        agg.refresh_now().await.unwrap();
        assert!(agg.take_celebration().is_none());
    }
}
