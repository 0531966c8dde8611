//! Login session lifecycle.
//!
//! A session is written at login and considered stale after a fixed expiry;
//! loading a stale session clears it so the user is asked to sign in again.
//! The PKCE verifier stashed between the two halves of the login flow lives
//! here too, since it has to survive a host restart mid-flow.

use crate::store::KvStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const SESSION_KEY: &str = "session";
const VERIFIER_KEY: &str = "pkce_code_verifier";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub username: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub login_timestamp_ms: i64,
}

pub struct SessionService {
    store: Arc<dyn KvStore>,
    expiry_ms: i64,
}

impl SessionService {
    pub fn new(store: Arc<dyn KvStore>, expiry_ms: i64) -> Self {
        Self { store, expiry_ms }
    }

    /// Current session, or `None` when absent, unreadable, or expired.
    /// Expired and unreadable sessions are cleared on the way out.
    pub fn load(&self) -> Option<SessionRecord> {
        let raw = self.store.get(SESSION_KEY)?;
        let record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "discarding unreadable session record");
                let _ = self.store.remove(SESSION_KEY);
                return None;
            }
        };
        let age_ms = now_ms() - record.login_timestamp_ms;
        if age_ms > self.expiry_ms {
            info!(username = %record.username, "session expired");
            let _ = self.store.remove(SESSION_KEY);
            return None;
        }
        Some(record)
    }

    pub fn save(&self, username: &str, auth_token: Option<String>) -> Result<SessionRecord> {
        let record = SessionRecord {
            username: username.to_string(),
            auth_token,
            login_timestamp_ms: now_ms(),
        };
        let raw = serde_json::to_string(&record).context("failed to serialize session")?;
        self.store.set(SESSION_KEY, &raw)?;
        Ok(record)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(SESSION_KEY)
    }

    /// Stash the PKCE verifier at the start of the login flow.
    pub fn stash_verifier(&self, verifier: &str) -> Result<()> {
        self.store.set(VERIFIER_KEY, verifier)
    }

    /// Take the stashed verifier, removing it so it cannot be replayed.
    pub fn take_verifier(&self) -> Option<String> {
        let verifier = self.store.get(VERIFIER_KEY)?;
        let _ = self.store.remove(VERIFIER_KEY);
        Some(verifier)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
