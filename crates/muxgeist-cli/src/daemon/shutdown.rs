//! Whole-daemon cancellation.

use tokio::sync::watch;

/// Cancellation flag shared between the signal listener and the daemon loop.
///
/// Clones observe the same flag. Cancelling is idempotent and can not be
/// undone.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the token is cancelled. Returns immediately if it already is.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // Only fails once every sender is gone; `self` holds one.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}
