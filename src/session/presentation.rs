//! Fixed-length presentation window that follows every settled round.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use super::round::RoundState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationWindow {
    minimum: Duration,
}

impl PresentationWindow {
    pub fn new(minimum: Duration) -> Self {
        Self { minimum }
    }

    pub fn minimum(&self) -> Duration {
        self.minimum
    }

    /// Earliest moment the result may be revealed.
    pub fn deadline(&self, responded_at: Instant) -> Instant {
        responded_at + self.minimum
    }

    /// Sleep out the window measured from the engine response.
    ///
    /// Returns `false` if the session closed first. Nothing else ends the
    /// window early.
    pub async fn wait(&self, responded_at: Instant, mut state: watch::Receiver<RoundState>) -> bool {
        tokio::select! {
            _ = sleep_until(self.deadline(responded_at)) => true,
            _ = closed(&mut state) => false,
        }
    }
}

async fn closed(state: &mut watch::Receiver<RoundState>) {
    loop {
        let is_closed = state.borrow_and_update().is_closed();
        if is_closed {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_runs_full_length() {
        let (_tx, rx) = watch::channel(RoundState::Presenting { round_id: 1 });
        let window = PresentationWindow::new(Duration::from_millis(6500));
        let start = Instant::now();

        assert!(window.wait(start, rx).await);
        assert!(start.elapsed() >= Duration::from_millis(6500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cuts_window_short() {
        let (tx, rx) = watch::channel(RoundState::Presenting { round_id: 1 });
        let window = PresentationWindow::new(Duration::from_millis(6500));
        let start = Instant::now();

        let waiter = tokio::spawn(async move { window.wait(start, rx).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send_replace(RoundState::Closed);

        assert!(!waiter.await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(6500));
    }
}
