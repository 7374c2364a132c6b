//! Request and result shapes exchanged with the node ports.

use crate::domain::errors::{TxPhase, TxRejectedError};
use dappchain_types::{Address, VmType};

/// Outcome of one processing phase as reported by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxPhaseResult {
    /// Zero on success.
    pub code: u32,
    /// Node log message.
    pub log: String,
    /// Application-layer return data.
    pub data: Vec<u8>,
}

impl TxPhaseResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Raw deliver-confirmation returned by the write endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastTxResponse {
    pub check_tx: TxPhaseResult,
    pub deliver_tx: TxPhaseResult,
    /// Hex transaction hash.
    pub hash: String,
    /// Inclusion height.
    pub height: u64,
}

impl BroadcastTxResponse {
    /// Classify the response as success or application-level rejection.
    pub fn into_result(self) -> Result<BroadcastResult, TxRejectedError> {
        let hash = (!self.hash.is_empty()).then(|| self.hash.clone());

        for (phase, result) in [
            (TxPhase::CheckTx, &self.check_tx),
            (TxPhase::DeliverTx, &self.deliver_tx),
        ] {
            if !result.is_ok() {
                return Err(TxRejectedError {
                    phase,
                    code: result.code,
                    log: result.log.clone(),
                    hash,
                });
            }
        }

        Ok(BroadcastResult {
            height: self.height,
            hash: self.hash,
            data: self.deliver_tx.data,
            log: self.deliver_tx.log,
        })
    }
}

/// Successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Inclusion height.
    pub height: u64,
    /// Hex transaction hash.
    pub hash: String,
    /// Application-layer return data of the deliver phase.
    pub data: Vec<u8>,
    /// Deliver-phase log.
    pub log: String,
}

/// Successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    /// Commit confirmation.
    pub broadcast: BroadcastResult,
    /// Address of the new contract.
    pub contract: Address,
    /// VM-specific deployment output.
    pub output: Vec<u8>,
}

/// Read request sent to the query endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub contract: Address,
    pub caller: Address,
    pub vm: VmType,
    pub input: Vec<u8>,
}
