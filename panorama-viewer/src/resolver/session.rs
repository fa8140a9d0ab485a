//! Viewing-session epochs
//!
//! Every new panorama (or a dismissal) starts a new epoch and cancels the
//! previous session's token. Results carry the epoch they were started under
//! and are dropped on arrival if it is no longer current.

use std::fmt;

use tokio_util::sync::CancellationToken;

/// Monotonically increasing session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionEpoch(u64);

impl SessionEpoch {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owner of the current epoch and its cancellation token.
///
/// Lives on the render thread; only the token is shared with workers.
#[derive(Debug)]
pub struct SessionTracker {
    epoch: SessionEpoch,
    token: CancellationToken,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            epoch: SessionEpoch::default(),
            token: CancellationToken::new(),
        }
    }

    /// Start a new session, cancelling whatever the previous one had in flight
    pub fn begin(&mut self) -> (SessionEpoch, CancellationToken) {
        self.advance();
        (self.epoch, self.token.clone())
    }

    /// End the current session without starting a new one
    pub fn end(&mut self) {
        self.advance();
    }

    pub fn current(&self) -> SessionEpoch {
        self.epoch
    }

    pub fn is_current(&self, epoch: SessionEpoch) -> bool {
        self.epoch == epoch
    }

    fn advance(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.epoch = SessionEpoch(self.epoch.0 + 1);
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
