use tokio_util::sync::CancellationToken;

/// Shared shutdown signal.
///
/// Clones observe the same underlying token, so any holder can cancel and
/// every task can await the cancellation cooperatively.
#[derive(Debug, Clone)]
pub struct SignalOfStop {
    token: CancellationToken,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait_cancellation(&self) {
        self.token.cancelled().await;
    }
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}
