//! Signing stage: wraps the payload in a `SignedTx`.

use super::{MiddlewareContext, TxMiddleware};
use crate::domain::errors::MiddlewareError;
use async_trait::async_trait;
use dappchain_crypto::{address_from_public_key, Signer};
use dappchain_types::{wrap_signed, Address};
use std::any::Any;
use std::sync::Arc;
use tracing::trace;

/// Signs the incoming payload byte-for-byte.
pub struct SignedTxMiddleware {
    signer: Arc<dyn Signer>,
}

impl SignedTxMiddleware {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signer.public_key()
    }

    /// Account address controlled by this stage's key on `chain_id`.
    pub fn address(&self, chain_id: &str) -> Address {
        address_from_public_key(chain_id, &self.signer.public_key())
    }
}

#[async_trait]
impl TxMiddleware for SignedTxMiddleware {
    fn name(&self) -> &'static str {
        "signing"
    }

    async fn handle(
        &self,
        payload: Vec<u8>,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Result<Vec<u8>, MiddlewareError> {
        let signature = self.signer.sign(&payload).await?;
        trace!(account = %ctx.account(), len = payload.len(), "Signed payload");
        Ok(wrap_signed(payload, signature, self.signer.public_key()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
