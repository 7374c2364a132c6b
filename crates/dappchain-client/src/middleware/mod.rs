//! # Transaction Middleware
//!
//! Ordered stages that turn an encoded `Transaction` into the envelope that
//! is broadcast.
//!
//! Stage order: Transaction → Nonce → Signing → broadcast
//!
//! Each stage receives the previous stage's output as opaque bytes. The
//! signing stage must come last, since any later change would invalidate the
//! signature; [`MiddlewareChain::new`] rejects any other layout.
//!
//! ## Reservations
//!
//! A stage that reserves something for the duration of a commit (the nonce
//! stage holds the account's sequence number) parks a [`TxLease`] in the
//! [`MiddlewareContext`]. The client marks leases as transmitting right
//! before the broadcast and settles them with the [`TxOutcome`]. A lease
//! dropped without being settled means the commit was cancelled.

pub mod nonce;
pub mod signing;

pub use nonce::{NoncePolicy, NonceTxMiddleware};
pub use signing::SignedTxMiddleware;

use crate::domain::errors::{ConfigError, MiddlewareError};
use async_trait::async_trait;
use dappchain_types::Address;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// One transform stage of the chain.
#[async_trait]
pub trait TxMiddleware: Send + Sync + 'static {
    /// Short stage name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transform `payload` into the next layer.
    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Result<Vec<u8>, MiddlewareError>;

    /// Upcast used by [`MiddlewareContext::find`].
    fn as_any(&self) -> &dyn Any;
}

/// How a transmitted commit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The node included the transaction.
    Accepted,
    /// The node rejected the transaction.
    Rejected {
        /// The rejection named the sequence number.
        nonce_mismatch: bool,
    },
    /// The transport failed after the envelope may have left the client.
    Uncertain,
}

/// Resource reserved by a stage for one commit.
pub trait TxLease: Send {
    /// The envelope is about to be transmitted.
    fn transmitting(&mut self);

    /// Release the reservation with the commit's outcome.
    fn settle(self: Box<Self>, outcome: &TxOutcome);
}

/// Per-commit state handed to every stage.
pub struct MiddlewareContext<'a> {
    account: &'a Address,
    stages: &'a [Arc<dyn TxMiddleware>],
    leases: Vec<Box<dyn TxLease>>,
}

impl<'a> MiddlewareContext<'a> {
    fn new(account: &'a Address, stages: &'a [Arc<dyn TxMiddleware>]) -> Self {
        Self {
            account,
            stages,
            leases: Vec::new(),
        }
    }

    /// Account the commit is sent from.
    pub fn account(&self) -> &Address {
        self.account
    }

    /// All configured stages, in order.
    pub fn stages(&self) -> &[Arc<dyn TxMiddleware>] {
        self.stages
    }

    /// Find a sibling stage by concrete type.
    pub fn find<T: TxMiddleware>(&self) -> Option<&T> {
        self.stages
            .iter()
            .find_map(|stage| stage.as_any().downcast_ref::<T>())
    }

    /// Keep `lease` alive until the commit is settled.
    pub fn hold(&mut self, lease: Box<dyn TxLease>) {
        self.leases.push(lease);
    }
}

/// Leases collected while running the chain for one commit.
///
/// Dropping this without calling [`Reservations::settle`] releases every
/// lease as cancelled.
#[must_use = "dropping reservations cancels the commit's leases"]
pub struct Reservations {
    leases: Vec<Box<dyn TxLease>>,
}

impl Reservations {
    /// Mark every lease as transmitting.
    pub fn transmitting(&mut self) {
        for lease in &mut self.leases {
            lease.transmitting();
        }
    }

    /// Settle every lease with `outcome`.
    pub fn settle(self, outcome: TxOutcome) {
        for lease in self.leases {
            lease.settle(&outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

/// Fixed ordered pipeline applied to every commit.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Arc<[Arc<dyn TxMiddleware>]>,
}

impl MiddlewareChain {
    /// Build a chain, rejecting layouts where signing is not the last stage.
    pub fn new(stages: Vec<Arc<dyn TxMiddleware>>) -> Result<Self, ConfigError> {
        let len = stages.len();
        if let Some(position) = stages
            .iter()
            .position(|stage| stage.as_any().is::<SignedTxMiddleware>())
            .filter(|&position| position + 1 != len)
        {
            return Err(ConfigError::SigningNotLast { position, len });
        }

        Ok(Self {
            stages: stages.into(),
        })
    }

    /// Stage names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Find a stage by concrete type.
    pub fn find<T: TxMiddleware>(&self) -> Option<&T> {
        self.stages
            .iter()
            .find_map(|stage| stage.as_any().downcast_ref::<T>())
    }

    /// Run every stage in order on `payload`, sent from `account`.
    ///
    /// On failure the chain stops and every lease taken so far is released
    /// as cancelled.
    pub async fn apply(
        &self,
        account: &Address,
        payload: Vec<u8>,
    ) -> Result<(Vec<u8>, Reservations), MiddlewareError> {
        let mut ctx = MiddlewareContext::new(account, &self.stages);
        let mut payload = payload;

        for stage in self.stages.iter() {
            payload = match stage.handle(payload, &mut ctx).await {
                Ok(next) => next,
                Err(e) => {
                    debug!(stage = stage.name(), account = %account, error = %e, "Middleware stage failed");
                    return Err(e);
                }
            };
        }

        Ok((payload, Reservations { leases: ctx.leases }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dappchain_crypto::Ed25519KeyPair;
    use dappchain_types::LocalAddress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tag(u8);

    #[async_trait]
    impl TxMiddleware for Tag {
        fn name(&self) -> &'static str {
            "tag"
        }

        async fn handle(
            &self,
            mut payload: Vec<u8>,
            _ctx: &mut MiddlewareContext<'_>,
        ) -> Result<Vec<u8>, MiddlewareError> {
            payload.push(self.0);
            Ok(payload)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Fail;

    #[async_trait]
    impl TxMiddleware for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn handle(
            &self,
            _payload: Vec<u8>,
            _ctx: &mut MiddlewareContext<'_>,
        ) -> Result<Vec<u8>, MiddlewareError> {
            Err(MiddlewareError::Stage {
                stage: "fail",
                reason: "boom".into(),
            })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Clone, Default)]
    struct Counters {
        transmitted: Arc<AtomicUsize>,
        settled: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    struct CountingLease(Counters, bool);

    impl TxLease for CountingLease {
        fn transmitting(&mut self) {
            self.0.transmitted.fetch_add(1, Ordering::SeqCst);
        }

        fn settle(mut self: Box<Self>, _outcome: &TxOutcome) {
            self.1 = true;
            self.0.settled.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for CountingLease {
        fn drop(&mut self) {
            if !self.1 {
                self.0.dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Leasing(Counters);

    #[async_trait]
    impl TxMiddleware for Leasing {
        fn name(&self) -> &'static str {
            "leasing"
        }

        async fn handle(
            &self,
            payload: Vec<u8>,
            ctx: &mut MiddlewareContext<'_>,
        ) -> Result<Vec<u8>, MiddlewareError> {
            assert!(ctx.find::<Tag>().is_some());
            ctx.hold(Box::new(CountingLease(self.0.clone(), false)));
            Ok(payload)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn account() -> Address {
        Address::new("default", LocalAddress::new([1; 20]))
    }

    fn signing() -> Arc<dyn TxMiddleware> {
        Arc::new(SignedTxMiddleware::new(Arc::new(Ed25519KeyPair::generate())))
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let chain = MiddlewareChain::new(vec![Arc::new(Tag(1)), Arc::new(Tag(2))]).unwrap();
        let (out, reservations) = chain.apply(&account(), vec![0]).await.unwrap();
        assert_eq!(out, vec![0, 1, 2]);
        assert!(reservations.is_empty());
    }

    #[test]
    fn test_signing_must_be_last() {
        let err = MiddlewareChain::new(vec![signing(), Arc::new(Tag(1))])
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::SigningNotLast { position: 0, len: 2 });

        let chain = MiddlewareChain::new(vec![Arc::new(Tag(1)), signing()]).unwrap();
        assert_eq!(chain.names(), vec!["tag", "signing"]);
        assert!(chain.find::<SignedTxMiddleware>().is_some());
    }

    #[tokio::test]
    async fn test_failure_aborts_and_releases_leases() {
        let counters = Counters::default();
        let chain = MiddlewareChain::new(vec![
            Arc::new(Tag(1)),
            Arc::new(Leasing(counters.clone())),
            Arc::new(Fail),
            Arc::new(Tag(2)),
        ])
        .unwrap();

        let err = chain.apply(&account(), vec![]).await.err().unwrap();
        assert!(matches!(err, MiddlewareError::Stage { stage: "fail", .. }));
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(counters.settled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reservations_settle() {
        let counters = Counters::default();
        let chain = MiddlewareChain::new(vec![
            Arc::new(Tag(1)),
            Arc::new(Leasing(counters.clone())),
        ])
        .unwrap();

        let (_, mut reservations) = chain.apply(&account(), vec![]).await.unwrap();
        assert_eq!(reservations.len(), 1);
        reservations.transmitting();
        reservations.settle(TxOutcome::Accepted);

        assert_eq!(counters.transmitted.load(Ordering::SeqCst), 1);
        assert_eq!(counters.settled.load(Ordering::SeqCst), 1);
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 0);
    }
}
