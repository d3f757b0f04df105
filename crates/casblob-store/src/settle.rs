use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::Backend;

/// What to wait for between closing a staged object and moving it.
///
/// Eventually consistent object stores may not serve a freshly written object
/// to the move operation straight away. The wait is a heuristic for such
/// backends; strongly consistent ones can use [`SettlePolicy::None`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Move immediately.
    None,
    /// Sleep for a fixed time.
    Delay { millis: u64 },
    /// Poll `exists` on the staged key, doubling the interval after each miss,
    /// and move after the object shows up or `max_attempts` polls.
    PollExists { interval_millis: u64, max_attempts: u32 },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::Delay { millis: 1000 }
    }
}

impl SettlePolicy {
    /// Wait according to the policy for `key` to become visible on `backend`.
    pub async fn wait(&self, backend: &dyn Backend, key: &str) {
        match *self {
            Self::None => {}
            Self::Delay { millis } => {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
            Self::PollExists {
                interval_millis,
                max_attempts,
            } => {
                let mut interval = Duration::from_millis(interval_millis);
                for attempt in 1..=max_attempts {
                    match backend.exists(key).await {
                        Ok(true) => {
                            debug!(key, attempt, "staged object visible");
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => debug!(key, attempt, error = %e, "settle poll failed"),
                    }
                    if attempt < max_attempts {
                        tokio::time::sleep(interval).await;
                        interval = interval.saturating_mul(2);
                    }
                }
                warn!(key, max_attempts, "staged object not visible, moving anyway");
            }
        }
    }
}
