//! Staff Cashier Desk: OTP-gated deposits and withdrawals
//!
//! Flow (identical for DEPOSIT and WITHDRAW):
//! 1. staff looks the player up by email
//! 2. `initiate` asks the server to issue a 6-digit code to the player
//! 3. the player reads the code off their own dashboard and tells staff
//! 4. `verify` submits it; only a successful verify moves money
//!
//! Staff never receives the code from the server. Each initiate supersedes
//! the pending ticket for that player and type; cancel is local and has no
//! financial effect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_OTP_TTL_SECS;
use crate::error::{CoreError, OtpErrorCode, Result, ValidationError};
use crate::models::{PlayerLookup, TransactionKind};
use crate::wallet::{ConfirmedUpdate, WalletLedger};

/// Digits in an issued code
pub const OTP_DIGITS: usize = 6;

/// Staff endpoints of the cashier protocol.
#[async_trait]
pub trait CashierGateway: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<PlayerLookup>;
    async fn initiate(&self, kind: TransactionKind, email: &str, amount: Decimal) -> Result<()>;
    /// Returns the player's new REAL balance
    async fn verify(&self, kind: TransactionKind, email: &str, otp_code: &str) -> Result<Decimal>;
}

// ============================================================================
// TICKET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStage {
    Idle,
    Initiated,
    Verified,
    Cancelled,
    Expired,
}

impl TicketStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStage::Idle => "IDLE",
            TicketStage::Initiated => "INITIATED",
            TicketStage::Verified => "VERIFIED",
            TicketStage::Cancelled => "CANCELLED",
            TicketStage::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStage::Verified | TicketStage::Cancelled | TicketStage::Expired)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtpTicket {
    pub ticket_id: Uuid,
    pub target_email: String,
    pub transaction_type: TransactionKind,
    pub amount: Decimal,
    pub stage: TicketStage,
    pub initiated_at: DateTime<Utc>,
    /// Advisory; the server enforces its own expiry
    pub expires_at: Instant,
    pub failed_attempts: u32,
    pub new_balance: Option<Decimal>,
}

impl OtpTicket {
    fn new(kind: TransactionKind, email: &str, amount: Decimal, ttl: Duration) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            target_email: email.to_string(),
            transaction_type: kind,
            amount,
            stage: TicketStage::Initiated,
            initiated_at: Utc::now(),
            expires_at: Instant::now() + ttl,
            failed_attempts: 0,
            new_balance: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// ============================================================================
// INPUT CHECKS
// ============================================================================

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"))
}

pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if !email_pattern().is_match(&email) {
        return Err(ValidationError::Email(raw.trim().to_string()).into());
    }
    Ok(email)
}

/// Positive decimal, else `INVALID_AMOUNT`
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    match raw.trim().parse::<Decimal>() {
        Ok(amount) if amount > Decimal::ZERO => Ok(amount),
        _ => Err(CoreError::otp(OtpErrorCode::InvalidAmount)),
    }
}

pub fn check_code(raw: &str) -> Result<String> {
    let code = raw.trim();
    if code.len() != OTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::OtpFormat.into());
    }
    Ok(code.to_string())
}

// ============================================================================
// DESK
// ============================================================================

#[derive(Debug, Default)]
struct DeskState {
    player: Option<PlayerLookup>,
    tickets: HashMap<(String, TransactionKind), OtpTicket>,
    closed: Vec<OtpTicket>,
}

pub struct CashierDesk {
    gateway: Arc<dyn CashierGateway>,
    ledger: WalletLedger,
    ttl: Duration,
    state: Mutex<DeskState>,
}

impl CashierDesk {
    pub fn new(gateway: Arc<dyn CashierGateway>, ledger: WalletLedger) -> Self {
        Self::with_ttl(gateway, ledger, Duration::from_secs(DEFAULT_OTP_TTL_SECS))
    }

    pub fn with_ttl(gateway: Arc<dyn CashierGateway>, ledger: WalletLedger, ttl: Duration) -> Self {
        Self {
            gateway,
            ledger,
            ttl,
            state: Mutex::new(DeskState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeskState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current player snapshot; dropped after every verified transaction.
    pub fn player(&self) -> Option<PlayerLookup> {
        self.lock().player.clone()
    }

    pub fn ticket(&self, kind: TransactionKind, email: &str) -> Option<OtpTicket> {
        let email = email.trim().to_lowercase();
        self.lock().tickets.get(&(email, kind)).cloned()
    }

    pub fn stage(&self, kind: TransactionKind, email: &str) -> TicketStage {
        self.ticket(kind, email).map(|t| t.stage).unwrap_or(TicketStage::Idle)
    }

    /// Tickets that were superseded, cancelled, expired or verified
    pub fn closed_tickets(&self) -> Vec<OtpTicket> {
        self.lock().closed.clone()
    }

    pub async fn lookup(&self, email: &str) -> Result<PlayerLookup> {
        let email = normalize_email(email)?;
        self.lock().player = None;
        let player = self.gateway.lookup(&email).await?;
        self.lock().player = Some(player.clone());
        Ok(player)
    }

    /// Ask the server to issue a code to the player.
    ///
    /// On success every pending ticket for the player is replaced (marked
    /// CANCELLED), whatever its type: the server keeps one code per player.
    /// On failure the previous tickets are kept.
    pub async fn initiate(&self, kind: TransactionKind, email: &str, amount: &str) -> Result<OtpTicket> {
        let amount = parse_amount(amount)?;
        let email = normalize_email(email)?;

        self.gateway.initiate(kind, &email, amount).await?;

        let ticket = OtpTicket::new(kind, &email, amount, self.ttl);
        let mut state = self.lock();
        let other = match kind {
            TransactionKind::Deposit => TransactionKind::Withdraw,
            TransactionKind::Withdraw => TransactionKind::Deposit,
        };
        let other_key = (email.clone(), other);
        if state.tickets.get(&other_key).is_some_and(|t| t.stage == TicketStage::Initiated) {
            if let Some(mut pending) = state.tickets.remove(&other_key) {
                info!(email = %email, kind = %other, superseded_by = %kind, "pending ticket superseded");
                pending.stage = TicketStage::Cancelled;
                state.closed.push(pending);
            }
        }
        if let Some(mut previous) = state.tickets.insert((email.clone(), kind), ticket.clone()) {
            if previous.stage == TicketStage::Initiated {
                info!(email = %email, kind = %kind, "pending ticket superseded");
                previous.stage = TicketStage::Cancelled;
            }
            state.closed.push(previous);
        }
        drop(state);

        info!(email = %email, kind = %kind, amount = %amount, ticket = %ticket.ticket_id, "otp issued to player");
        Ok(ticket)
    }

    /// Submit the code the player read out.
    ///
    /// A mismatch keeps the ticket INITIATED so staff can retry. Local expiry
    /// is checked first and costs no network call.
    pub async fn verify(&self, kind: TransactionKind, email: &str, otp_code: &str) -> Result<Decimal> {
        let code = check_code(otp_code)?;
        let email = normalize_email(email)?;
        let key = (email.clone(), kind);

        {
            let mut state = self.lock();
            let ticket = state
                .tickets
                .get_mut(&key)
                .filter(|t| t.stage == TicketStage::Initiated)
                .ok_or(CoreError::otp(OtpErrorCode::NoPendingTicket))?;
            if ticket.is_expired() {
                ticket.stage = TicketStage::Expired;
                warn!(email = %email, kind = %kind, "otp ticket expired before verify");
                return Err(CoreError::otp(OtpErrorCode::OtpExpired));
            }
        }

        let new_balance = match self.gateway.verify(kind, &email, &code).await {
            Ok(balance) => balance,
            Err(err) => {
                self.record_failure(&key, &err);
                return Err(err);
            }
        };

        let amount = self.record_verified(&key, new_balance);
        if let Err(err) = self.ledger.apply_confirmed(&email, ConfirmedUpdate::staff_transaction(new_balance)) {
            warn!(email = %email, error = %err, "verified balance not applied");
            self.ledger.mark_needs_reconcile(&email);
        }
        info!(email = %email, kind = %kind, amount = %amount, new_balance = %new_balance, "transaction verified");

        if let Err(err) = self.lookup(&email).await {
            warn!(email = %email, error = %err, "player refresh after verify failed");
        }
        Ok(new_balance)
    }

    fn record_verified(&self, key: &(String, TransactionKind), new_balance: Decimal) -> Decimal {
        let mut state = self.lock();
        state.player = None;
        match state.tickets.get_mut(key) {
            Some(ticket) => {
                ticket.stage = TicketStage::Verified;
                ticket.new_balance = Some(new_balance);
                ticket.amount
            }
            None => Decimal::ZERO,
        }
    }

    fn record_failure(&self, key: &(String, TransactionKind), err: &CoreError) {
        if err.is_ambiguous() {
            self.ledger.mark_needs_reconcile(&key.0);
        }
        let mut state = self.lock();
        let Some(ticket) = state.tickets.get_mut(key) else {
            return;
        };
        match err.otp_code() {
            Some(OtpErrorCode::OtpExpired) => ticket.stage = TicketStage::Expired,
            Some(OtpErrorCode::OtpMismatch) => ticket.failed_attempts += 1,
            _ => {}
        }
        warn!(email = %key.0, kind = %key.1, stage = ticket.stage.as_str(), error = %err, "verify failed");
    }

    /// Abandon the pending ticket. Nothing is sent; the server's code simply
    /// goes unused.
    pub fn cancel(&self, kind: TransactionKind, email: &str) -> Result<OtpTicket> {
        let key = (email.trim().to_lowercase(), kind);
        let mut state = self.lock();
        let ticket = state
            .tickets
            .get_mut(&key)
            .filter(|t| t.stage == TicketStage::Initiated)
            .ok_or(CoreError::otp(OtpErrorCode::NoPendingTicket))?;
        ticket.stage = TicketStage::Cancelled;
        let cancelled = ticket.clone();
        info!(email = %key.0, kind = %kind, "otp ticket cancelled");
        Ok(cancelled)
    }
}
