use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::gatt::GattPeripheral;

/// Bounded retry with a fixed back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero behaves as one.
    pub attempts: u32,
    /// Delay between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no back-off.
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `attempt` until it returns `true` or the budget is spent.
    ///
    /// Returns the number of attempts used on success.
    pub async fn run<F>(&self, mut attempt: F) -> std::result::Result<u32, u32>
    where
        F: FnMut() -> bool,
    {
        let attempts = self.attempts.max(1);
        for n in 1..=attempts {
            if attempt() {
                return Ok(n);
            }
            if n < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(attempts)
    }
}

/// Push `data` on a characteristic, retrying while the platform queue is full.
///
/// Fails fast with [`TransportError::NoSubscribers`] when nobody listens.
pub async fn notify_with_retry(
    peripheral: &dyn GattPeripheral,
    characteristic: &Uuid,
    data: &[u8],
    policy: RetryPolicy,
) -> Result<()> {
    if peripheral.subscribed_centrals(characteristic) == 0 {
        return Err(TransportError::NoSubscribers);
    }

    let outcome = policy
        .run(|| peripheral.update_value(characteristic, data))
        .await;

    match outcome {
        Ok(1) => Ok(()),
        Ok(n) => {
            debug!(%characteristic, attempts = n, "notify accepted after retry");
            Ok(())
        }
        Err(attempts) => Err(TransportError::NotifyRejected { attempts }),
    }
}
