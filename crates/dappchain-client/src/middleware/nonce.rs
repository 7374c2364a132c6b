//! # Nonce Stage
//!
//! Wraps the payload in a `NonceTx` carrying the account's next sequence
//! number.
//!
//! The node accepts only the exact next sequence number, so assignment is
//! serialized per account: the stage takes the account's lock before the
//! fetch-increment-assign sequence and keeps it (inside a [`NonceLease`])
//! until the commit is settled. Commits from different accounts never wait
//! on each other.
//!
//! | Settlement | Cache effect |
//! |------------|--------------|
//! | accepted | sequence recorded as last known |
//! | rejected | invalidated |
//! | transport failed / cancelled while transmitting | invalidated |
//! | cancelled before transmitting | untouched (rolled back) |
//!
//! When a commit settles and leaves its account with nothing cached and no
//! other commit waiting, the account's entry is evicted.

use super::{MiddlewareContext, TxLease, TxMiddleware, TxOutcome};
use crate::domain::errors::MiddlewareError;
use crate::ports::NonceSource;
use async_trait::async_trait;
use dappchain_types::{stamp_nonce, Address};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Where the stage takes the current sequence number from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoncePolicy {
    /// Ask the node before every commit.
    #[default]
    Refetch,
    /// Ask the node on first use, then count locally.
    LocalIncrement,
}

#[derive(Debug, Default)]
struct AccountNonce {
    last_known: Option<u64>,
}

/// Nonce middleware stage.
pub struct NonceTxMiddleware {
    source: Arc<dyn NonceSource>,
    policy: NoncePolicy,
    accounts: Arc<AccountTable>,
}

type AccountTable = DashMap<Address, Arc<Mutex<AccountNonce>>>;

impl NonceTxMiddleware {
    pub fn new(source: Arc<dyn NonceSource>) -> Self {
        Self::with_policy(source, NoncePolicy::default())
    }

    pub fn with_policy(source: Arc<dyn NonceSource>, policy: NoncePolicy) -> Self {
        Self {
            source,
            policy,
            accounts: Arc::new(DashMap::new()),
        }
    }

    pub fn policy(&self) -> NoncePolicy {
        self.policy
    }

    /// Last sequence number recorded for `account`, if any.
    ///
    /// Waits for an in-flight commit from `account` to settle.
    pub async fn cached_nonce(&self, account: &Address) -> Option<u64> {
        let slot = self.accounts.get(account).map(|entry| Arc::clone(entry.value()))?;
        let cached = slot.lock().await.last_known;
        cached
    }

    /// Forget the cached sequence number for `account`.
    pub async fn invalidate(&self, account: &Address) {
        let slot = self.accounts.get(account).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            let mut guard = slot.lock_owned().await;
            guard.last_known = None;
            release(&self.accounts, account, guard);
        }
    }

    /// Accounts currently holding a cache entry.
    pub fn tracked_accounts(&self) -> usize {
        self.accounts.len()
    }

    fn slot(&self, account: &Address) -> Arc<Mutex<AccountNonce>> {
        Arc::clone(
            self.accounts
                .entry(account.clone())
                .or_default()
                .value(),
        )
    }
}

#[async_trait]
impl TxMiddleware for NonceTxMiddleware {
    fn name(&self) -> &'static str {
        "nonce"
    }

    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Result<Vec<u8>, MiddlewareError> {
        let account = ctx.account().clone();
        let guard = self.slot(&account).lock_owned().await;

        let current = match (self.policy, guard.last_known) {
            (NoncePolicy::LocalIncrement, Some(last)) => last,
            _ => match self.source.current_nonce(&account).await {
                Ok(current) => current,
                Err(source) => {
                    release(&self.accounts, &account, guard);
                    return Err(MiddlewareError::NonceUnavailable { account, source });
                }
            },
        };

        let Some(sequence) = current.checked_add(1) else {
            release(&self.accounts, &account, guard);
            return Err(MiddlewareError::NonceOverflow(account));
        };

        debug!(account = %account, sequence, "Assigned nonce");

        ctx.hold(Box::new(NonceLease {
            guard: Some(guard),
            accounts: Arc::clone(&self.accounts),
            account,
            sequence,
            transmitting: false,
        }));
        Ok(stamp_nonce(payload, sequence))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Unlock an account and evict its entry if it caches nothing and no
/// other task holds it.
fn release(accounts: &AccountTable, account: &Address, guard: OwnedMutexGuard<AccountNonce>) {
    let empty = guard.last_known.is_none();
    drop(guard);
    if !empty {
        return;
    }

    let evicted = accounts.remove_if(account, |_, slot| {
        Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|s| s.last_known.is_none())
    });
    if evicted.is_some() {
        debug!(account = %account, "Evicted idle nonce entry");
    }
}

/// Holds an account's nonce lock for one commit.
struct NonceLease {
    guard: Option<OwnedMutexGuard<AccountNonce>>,
    accounts: Arc<AccountTable>,
    account: Address,
    sequence: u64,
    transmitting: bool,
}

impl TxLease for NonceLease {
    fn transmitting(&mut self) {
        self.transmitting = true;
    }

    fn settle(mut self: Box<Self>, outcome: &TxOutcome) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };

        match outcome {
            TxOutcome::Accepted => {
                guard.last_known = Some(self.sequence);
            }
            TxOutcome::Rejected { nonce_mismatch } => {
                debug!(
                    account = %self.account,
                    sequence = self.sequence,
                    nonce_mismatch,
                    "Commit rejected, invalidating cached nonce"
                );
                guard.last_known = None;
            }
            TxOutcome::Uncertain => {
                warn!(
                    account = %self.account,
                    sequence = self.sequence,
                    "Commit outcome unknown, invalidating cached nonce"
                );
                guard.last_known = None;
            }
        }
        release(&self.accounts, &self.account, guard);
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };

        if self.transmitting {
            warn!(
                account = %self.account,
                sequence = self.sequence,
                "Commit cancelled during transmission, invalidating cached nonce"
            );
            guard.last_known = None;
        } else {
            debug!(
                account = %self.account,
                sequence = self.sequence,
                "Commit cancelled before transmission, nonce released"
            );
        }
        release(&self.accounts, &self.account, guard);
    }
}
