//! CSRF state tokens for the authorization redirect.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Length of every generated state token
pub const STATE_LENGTH: usize = 32;

/// A fresh random state token: [`STATE_LENGTH`] alphanumeric characters
/// drawn from the OS RNG.
pub fn generate_state() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Clone, Debug)]
pub struct StateEntry {
    pub company_id: String,
    pub created_at: DateTime<Utc>,
}

/// Remembers issued state tokens until the callback consumes them.
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry: Duration,
}

impl StateManager {
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// The map only holds plain entries, so a panic elsewhere while the lock
    /// was held cannot leave it half-updated. Recover instead of dropping
    /// states.
    fn states(&self) -> MutexGuard<'_, HashMap<String, StateEntry>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("OAuth state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Track a state issued for `company_id`.
    pub fn remember(&self, state: &str, company_id: &str) {
        let entry = StateEntry {
            company_id: company_id.to_string(),
            created_at: Utc::now(),
        };
        self.states().insert(state.to_string(), entry);
    }

    /// Single use: the state is removed whether or not it has expired.
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let entry = self.states().remove(state)?;
        if Utc::now() - entry.created_at > self.expiry {
            return None;
        }
        Some(entry)
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.states()
            .retain(|_, entry| now - entry.created_at <= self.expiry);
    }

    pub fn count(&self) -> usize {
        self.states().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!("OAuth state cleanup complete, {} states remaining", manager.count());
    }
}
