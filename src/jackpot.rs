//! Jackpot Entry Coordinator
//!
//! Entry is a one-way debit plus enrollment. The client checks KYC and
//! explicit confirmation locally, lets the server decide everything else
//! (duplicates, funds, event state) and then re-reads balances and the
//! event from the server instead of doing arithmetic.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::dashboard::DashboardAggregator;
use crate::error::{CoreError, Result, ValidationError};
use crate::models::{JackpotEvent, WalletKind};
use crate::wallet::Balances;

#[async_trait]
pub trait JackpotGateway: Send + Sync {
    async fn enter(&self, event_id: &str, wallet: WalletKind) -> Result<()>;
}

/// What the server reported after a successful entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JackpotEntry {
    pub event_id: String,
    pub wallet: WalletKind,
    /// The event as re-read after entry (participant count, pool)
    pub event: Option<JackpotEvent>,
    pub balances: Option<Balances>,
}

pub struct JackpotCoordinator {
    gateway: Arc<dyn JackpotGateway>,
    dashboard: Arc<DashboardAggregator>,
}

impl JackpotCoordinator {
    pub fn new(gateway: Arc<dyn JackpotGateway>, dashboard: Arc<DashboardAggregator>) -> Self {
        Self { gateway, dashboard }
    }

    /// Enter `event_id` paying from `wallet`.
    ///
    /// `confirmed` is the player's answer to the irreversible-debit prompt.
    pub async fn enter(&self, event_id: &str, wallet: WalletKind, confirmed: bool) -> Result<JackpotEntry> {
        let snapshot = match self.dashboard.snapshot() {
            Some(snapshot) => snapshot,
            None => {
                self.dashboard.refresh_now().await?;
                self.dashboard
                    .snapshot()
                    .ok_or_else(|| CoreError::InvalidResponse("no player profile loaded".into()))?
            }
        };

        if !snapshot.profile.kyc_status.is_approved() {
            info!(event_id, kyc = ?snapshot.profile.kyc_status, "jackpot entry blocked on kyc");
            return Err(ValidationError::KycRequired.into());
        }
        if !confirmed {
            return Err(ValidationError::NotConfirmed.into());
        }

        self.gateway.enter(event_id, wallet).await?;
        info!(event_id, wallet = %wallet, "entered jackpot");

        if let Err(err) = self.dashboard.refresh_now().await {
            warn!(event_id, error = %err, "refresh after jackpot entry failed");
        }
        let refreshed = self.dashboard.snapshot();
        Ok(JackpotEntry {
            event_id: event_id.to_string(),
            wallet,
            event: refreshed
                .as_ref()
                .and_then(|s| s.jackpots.iter().find(|e| e.jackpot_event_id == event_id).cloned()),
            balances: refreshed.map(|s| Balances::new(s.profile.balance, s.profile.bonus_balance)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{BalanceHold, PlayerFeed};
    use crate::models::{DashboardPayload, JackpotStatus, KycStatus, LatestWinner, PlayerProfile};
    use crate::wallet::WalletLedger;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const PLAYER: &str = "player@x.com";

    /// Shared fake backend: entering debits 10 and bumps the count.
    struct FakeBackend {
        kyc: KycStatus,
        state: Mutex<(Decimal, u32, bool)>,
        dashboard_calls: AtomicUsize,
        enter_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(kyc: KycStatus) -> Arc<Self> {
            Arc::new(Self {
                kyc,
                state: Mutex::new((dec!(100), 4, false)),
                dashboard_calls: AtomicUsize::new(0),
                enter_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PlayerFeed for FakeBackend {
        async fn dashboard(&self) -> Result<DashboardPayload> {
            self.dashboard_calls.fetch_add(1, Ordering::SeqCst);
            let (balance, _, _) = *self.state.lock().unwrap();
            Ok(DashboardPayload {
                profile: PlayerProfile {
                    username: "player".into(),
                    email: PLAYER.into(),
                    kyc_status: self.kyc,
                    balance,
                    bonus_balance: dec!(0),
                    currency_code: "USD".into(),
                },
                tenant_contact_email: None,
                games: Vec::new(),
                active_otp: None,
            })
        }

        async fn jackpots(&self) -> Result<Vec<JackpotEvent>> {
            let (_, participants, _) = *self.state.lock().unwrap();
            Ok(vec![JackpotEvent {
                jackpot_event_id: "j-1".into(),
                game_date: NaiveDate::from_ymd_opt(2026, 12, 24).unwrap(),
                entry_amount: dec!(10),
                currency_code: "USD".into(),
                status: JackpotStatus::Open,
                total_pool_amount: dec!(10) * Decimal::from(participants),
                participant_count: participants,
            }])
        }

        async fn latest_winner(&self) -> Result<Option<LatestWinner>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl JackpotGateway for FakeBackend {
        async fn enter(&self, event_id: &str, wallet: WalletKind) -> Result<()> {
            self.enter_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!((event_id, wallet), ("j-1", WalletKind::Real));
            let mut state = self.state.lock().unwrap();
            if state.2 {
                return Err(CoreError::business(reqwest::StatusCode::BAD_REQUEST, None, "Already entered"));
            }
            *state = (state.0 - dec!(10), state.1 + 1, true);
            Ok(())
        }
    }

    fn coordinator(backend: &Arc<FakeBackend>) -> (JackpotCoordinator, WalletLedger) {
        let ledger = WalletLedger::new();
        let dashboard = Arc::new(DashboardAggregator::new(
            backend.clone(),
            ledger.clone(),
            BalanceHold::new(),
            PLAYER,
            Duration::from_secs(10),
        ));
        (JackpotCoordinator::new(backend.clone(), dashboard), ledger)
    }

    #[tokio::test]
    async fn test_entry_refreshes_from_server() {
        let backend = FakeBackend::new(KycStatus::Approved);
        let (coordinator, ledger) = coordinator(&backend);

        let entry = assert_ok!(coordinator.enter("j-1", WalletKind::Real, true).await);
        assert_eq!(entry.event.unwrap().participant_count, 5);
        assert_eq!(entry.balances.unwrap().real, dec!(90));
        assert_eq!(ledger.balance(PLAYER, WalletKind::Real), Some(dec!(90)));
        assert_eq!(backend.enter_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_kyc_blocks_before_entry_call() {
        let backend = FakeBackend::new(KycStatus::Pending);
        let (coordinator, _) = coordinator(&backend);
        coordinator.dashboard.refresh_now().await.unwrap();
        let reads = backend.dashboard_calls.load(Ordering::SeqCst);

        let err = assert_err!(coordinator.enter("j-1", WalletKind::Real, true).await);
        assert_eq!(err.user_message(), "Please verify identity first.");
        assert_eq!(backend.enter_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.dashboard_calls.load(Ordering::SeqCst), reads);
    }

    #[tokio::test]
    async fn test_unconfirmed_entry_is_not_sent() {
        let backend = FakeBackend::new(KycStatus::Approved);
        let (coordinator, _) = coordinator(&backend);

        let err = assert_err!(coordinator.enter("j-1", WalletKind::Real, false).await);
        assert_eq!(err, CoreError::Validation(ValidationError::NotConfirmed));
        assert_eq!(backend.enter_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_entry_surfaces_server_message() {
        let backend = FakeBackend::new(KycStatus::Approved);
        let (coordinator, ledger) = coordinator(&backend);

        assert_ok!(coordinator.enter("j-1", WalletKind::Real, true).await);
        let err = assert_err!(coordinator.enter("j-1", WalletKind::Real, true).await);
        assert_eq!(err.user_message(), "Already entered");
        assert_eq!(ledger.balance(PLAYER, WalletKind::Real), Some(dec!(90)));
    }
}
