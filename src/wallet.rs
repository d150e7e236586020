//! Wallet Ledger Client
//!
//! Mirrors the two server-side balances (REAL, BONUS) of each principal.
//! It never computes business rules and never predicts: every write is a
//! `ConfirmedUpdate`, built only from a server response.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::AuthContext;
use crate::error::{CoreError, Result};
use crate::models::WalletKind;

/// Applied-update history kept per ledger
pub const HISTORY_LIMIT: usize = 1000;

// ============================================================================
// BALANCES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balances {
    pub real: Decimal,
    pub bonus: Decimal,
}

impl Balances {
    pub fn new(real: Decimal, bonus: Decimal) -> Self {
        Self { real, bonus }
    }

    pub fn get(&self, wallet: WalletKind) -> Decimal {
        match wallet {
            WalletKind::Real => self.real,
            WalletKind::Bonus => self.bonus,
        }
    }

    fn slot(&mut self, wallet: WalletKind) -> &mut Decimal {
        match wallet {
            WalletKind::Real => &mut self.real,
            WalletKind::Bonus => &mut self.bonus,
        }
    }
}

// ============================================================================
// CONFIRMED UPDATES
// ============================================================================

/// Which server answer vouches for an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    /// `balance_after` from a settled engine round
    RoundSettlement { session_id: Option<String> },
    /// Full profile read (dashboard poll, game details, targeted refetch)
    ProfileSnapshot,
    /// `new_balance` from a verified staff OTP transaction
    StaffTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerChange {
    /// Set one wallet to a server-reported value
    Absolute { wallet: WalletKind, value: Decimal },
    /// Shift one wallet by a server-reported amount
    Delta { wallet: WalletKind, delta: Decimal },
    /// Replace both wallets
    Snapshot(Balances),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedUpdate {
    pub change: LedgerChange,
    pub confirmation: Confirmation,
}

impl ConfirmedUpdate {
    pub fn round_settled(wallet: WalletKind, balance_after: Decimal, session_id: Option<String>) -> Self {
        Self {
            change: LedgerChange::Absolute { wallet, value: balance_after },
            confirmation: Confirmation::RoundSettlement { session_id },
        }
    }

    pub fn profile_snapshot(real: Decimal, bonus: Decimal) -> Self {
        Self {
            change: LedgerChange::Snapshot(Balances::new(real, bonus)),
            confirmation: Confirmation::ProfileSnapshot,
        }
    }

    pub fn staff_transaction(new_real_balance: Decimal) -> Self {
        Self {
            change: LedgerChange::Absolute {
                wallet: WalletKind::Real,
                value: new_real_balance,
            },
            confirmation: Confirmation::StaffTransaction,
        }
    }

    pub fn delta(wallet: WalletKind, delta: Decimal, confirmation: Confirmation) -> Self {
        Self {
            change: LedgerChange::Delta { wallet, delta },
            confirmation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedUpdate {
    pub principal: String,
    pub before: Balances,
    pub after: Balances,
    pub confirmation: Confirmation,
    pub applied_at: DateTime<Utc>,
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Default)]
struct LedgerInner {
    balances: HashMap<String, Balances>,
    needs_reconcile: HashSet<String>,
    history: VecDeque<AppliedUpdate>,
}

/// Shared handle; clones see the same balances.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    inner: Arc<Mutex<LedgerInner>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletLedger {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(LedgerInner::default())),
            revision: Arc::new(revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_balances(&self, principal: &str) -> Option<Balances> {
        self.lock().balances.get(principal).copied()
    }

    pub fn balance(&self, principal: &str, wallet: WalletKind) -> Option<Decimal> {
        self.get_balances(principal).map(|b| b.get(wallet))
    }

    /// Apply a server-confirmed change.
    ///
    /// A delta needs a known starting point, and no change may leave a wallet
    /// negative; either case means the server answer is unusable.
    pub fn apply_confirmed(&self, principal: &str, update: ConfirmedUpdate) -> Result<Balances> {
        let mut inner = self.lock();
        let before = inner.balances.get(principal).copied();

        let after = match &update.change {
            LedgerChange::Snapshot(balances) => *balances,
            LedgerChange::Absolute { wallet, value } => {
                let mut next = before.unwrap_or_default();
                *next.slot(*wallet) = *value;
                next
            }
            LedgerChange::Delta { wallet, delta } => {
                let mut next = before.ok_or_else(|| {
                    CoreError::InvalidResponse(format!("no confirmed balance for {principal} to shift"))
                })?;
                *next.slot(*wallet) += *delta;
                next
            }
        };

        if after.real < Decimal::ZERO || after.bonus < Decimal::ZERO {
            return Err(CoreError::InvalidResponse(format!(
                "confirmed update would leave {principal} negative (real {}, bonus {})",
                after.real, after.bonus
            )));
        }

        inner.balances.insert(principal.to_string(), after);
        if matches!(update.change, LedgerChange::Snapshot(_)) && inner.needs_reconcile.remove(principal) {
            info!(principal, "balances reconciled from snapshot");
        }

        inner.history.push_back(AppliedUpdate {
            principal: principal.to_string(),
            before: before.unwrap_or_default(),
            after,
            confirmation: update.confirmation,
            applied_at: Utc::now(),
        });
        if inner.history.len() > HISTORY_LIMIT {
            inner.history.pop_front();
        }
        drop(inner);

        debug!(principal, real = %after.real, bonus = %after.bonus, "ledger updated");
        self.revision.send_modify(|rev| *rev += 1);
        Ok(after)
    }

    /// Flag that the displayed balances may be stale (a round ended ambiguously).
    pub fn mark_needs_reconcile(&self, principal: &str) {
        self.lock().needs_reconcile.insert(principal.to_string());
    }

    pub fn needs_reconcile(&self, principal: &str) -> bool {
        self.lock().needs_reconcile.contains(principal)
    }

    pub fn history(&self, principal: &str) -> Vec<AppliedUpdate> {
        self.lock()
            .history
            .iter()
            .filter(|u| u.principal == principal)
            .cloned()
            .collect()
    }

    /// Forget a principal entirely (logout).
    pub fn clear(&self, principal: &str) {
        let mut inner = self.lock();
        inner.balances.remove(principal);
        inner.needs_reconcile.remove(principal);
    }

    /// Clear a principal's balances once its credential goes away (logout,
    /// 401 teardown or a switch to another principal).
    ///
    /// Runs until every handle to `auth` is dropped.
    pub fn clear_on_logout(&self, auth: &AuthContext) -> JoinHandle<()> {
        let ledger = self.clone();
        let mut credentials = auth.subscribe();
        tokio::spawn(async move {
            let mut current = credentials.borrow_and_update().as_ref().map(|c| c.principal.clone());
            while credentials.changed().await.is_ok() {
                let next = credentials.borrow_and_update().as_ref().map(|c| c.principal.clone());
                if let Some(previous) = current.take().filter(|p| next.as_deref() != Some(p.as_str())) {
                    info!(principal = %previous, "credential gone, clearing balances");
                    ledger.clear(&previous);
                }
                current = next;
            }
        })
    }

    /// Number of updates applied so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Bumped on every applied update
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
