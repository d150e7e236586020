//! Round engine boundary.
//!
//! The engine that decides outcomes is remote and opaque: a bet goes in, an
//! outcome record with the wallet's new balance comes out. It may be slow and
//! it may fail. Nothing here retries.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::models::{BetRequest, GameDetails, RoundOutcome, SessionStartResponse};

/// Settles one round.
#[async_trait]
pub trait RoundEngine: Send + Sync {
    async fn play(&self, game_id: &str, request: &BetRequest) -> Result<RoundOutcome>;
}

/// Game descriptor loading and best-effort session bracketing.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn game_details(&self, game_id: &str) -> Result<GameDetails>;
    async fn start_session(&self, game_id: &str) -> Result<SessionStartResponse>;
    async fn end_session(&self, session_id: &str) -> Result<()>;
}

// ============================================================================
// ENGINE GATEWAY
// ============================================================================

/// Wraps an engine with call accounting and response sanity checks.
#[derive(Clone)]
pub struct EngineGateway {
    engine: Arc<dyn RoundEngine>,
}

impl EngineGateway {
    pub fn new(engine: Arc<dyn RoundEngine>) -> Self {
        Self { engine }
    }

    /// Exactly one remote call; the outcome is checked before it is returned.
    pub async fn submit(&self, game_id: &str, request: &BetRequest) -> Result<RoundOutcome> {
        let started = Instant::now();
        let result = self.engine.play(game_id, request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                debug!(game_id, latency_ms, outcome = ?outcome.outcome, "engine settled round");
                check_outcome(&outcome)?;
                Ok(outcome)
            }
            Err(err) => {
                warn!(game_id, latency_ms, error = %err, "engine call failed");
                Err(err)
            }
        }
    }
}

fn check_outcome(outcome: &RoundOutcome) -> Result<()> {
    if outcome.balance_after < Decimal::ZERO {
        return Err(CoreError::InvalidResponse(format!(
            "engine reported negative balance {}",
            outcome.balance_after
        )));
    }
    if matches!(outcome.session_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(CoreError::InvalidResponse("engine returned an empty session id".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, WalletKind};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEngine {
        calls: AtomicUsize,
        balance_after: Decimal,
        session_id: Option<String>,
    }

    #[async_trait]
    impl RoundEngine for FixedEngine {
        async fn play(&self, _game_id: &str, _request: &BetRequest) -> Result<RoundOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RoundOutcome {
                session_id: self.session_id.clone(),
                outcome: Outcome::Loss,
                win_amount: dec!(-10),
                balance_after: self.balance_after,
                game_data: serde_json::Value::Null,
                bet_amount: Some(dec!(10)),
                game_id: None,
                game_name: None,
            })
        }
    }

    fn engine(balance_after: Decimal, session_id: Option<&str>) -> Arc<FixedEngine> {
        Arc::new(FixedEngine {
            calls: AtomicUsize::new(0),
            balance_after,
            session_id: session_id.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_single_call_per_submit() {
        let fixed = engine(dec!(90), Some("s-1"));
        let gateway = EngineGateway::new(fixed.clone());
        let request = BetRequest::new(dec!(10), WalletKind::Real, None);

        let outcome = gateway.submit("g-1", &request).await.unwrap();
        assert_eq!(outcome.balance_after, dec!(90));
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_impossible_outcomes() {
        let request = BetRequest::new(dec!(10), WalletKind::Real, None);

        let negative = EngineGateway::new(engine(dec!(-1), None));
        assert!(matches!(
            negative.submit("g-1", &request).await,
            Err(CoreError::InvalidResponse(_))
        ));

        let blank_session = EngineGateway::new(engine(dec!(5), Some("  ")));
        assert!(matches!(
            blank_session.submit("g-1", &request).await,
            Err(CoreError::InvalidResponse(_))
        ));
    }
}
