//! In-memory node doubles shared by the integration tests.
//!
//! [`MockNode`] behaves like a strict node: it verifies the signature over
//! the signed bytes, checks that the signing key owns the sender address,
//! and only accepts the exact next sequence number per account.

#![allow(dead_code)]

use async_trait::async_trait;
use dappchain_client::{
    BroadcastTxResponse, ChainClient, EventSource, NodeTransport, NoncePolicy, NonceSource,
    QueryRequest, RawEvent, RawEventStream, ReconnectConfig, SubscriptionError, TransportError,
    TxPhaseResult,
};
use dappchain_crypto::{
    address_from_public_key, sha256_digest, verify, CryptoError, Ed25519KeyPair, Signer,
};
use dappchain_types::{
    decode_message, wire, Address, ChainEvent, LocalAddress, TxEnvelope, TxPayload,
};
use parking_lot::Mutex;
use prost::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Barrier};

pub const CHAIN_ID: &str = "default";

pub type QueryHandler = Arc<dyn Fn(&QueryRequest) -> Option<Vec<u8>> + Send + Sync>;

/// Transaction accepted by the mock node.
#[derive(Debug, Clone)]
pub struct AcceptedTx {
    pub sender: Address,
    pub sequence: u64,
    pub height: u64,
    pub envelope: TxEnvelope,
    pub public_key: Vec<u8>,
}

#[derive(Default)]
struct NodeState {
    nonces: HashMap<Address, u64>,
    height: u64,
    accepted: Vec<AcceptedTx>,
    rejected: usize,
    queries: HashMap<Address, QueryHandler>,
    names: HashMap<String, Address>,
    receipts: HashMap<Vec<u8>, wire::EvmTxReceipt>,
}

/// Strict in-memory node.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
    nonce_barrier: Mutex<Option<Arc<Barrier>>>,
    broadcast_delay_ms: AtomicU64,
    read_delay_ms: AtomicU64,
    fail_nonce: AtomicBool,
    fail_broadcast: AtomicBool,
    rpc_error_broadcast: Mutex<Option<(i64, String)>>,
    pub nonce_queries: AtomicUsize,
    pub broadcasts: AtomicUsize,
    pub reads: AtomicUsize,
}

fn ok_phase(data: Vec<u8>) -> TxPhaseResult {
    TxPhaseResult {
        code: 0,
        log: String::new(),
        data,
    }
}

fn reject(code: u32, log: &str) -> BroadcastTxResponse {
    BroadcastTxResponse {
        check_tx: TxPhaseResult {
            code,
            log: log.to_string(),
            data: Vec::new(),
        },
        deliver_tx: TxPhaseResult::default(),
        hash: String::new(),
        height: 0,
    }
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `parties` nonce lookups wait for each other.
    pub fn set_nonce_barrier(&self, parties: usize) {
        *self.nonce_barrier.lock() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn clear_nonce_barrier(&self) {
        *self.nonce_barrier.lock() = None;
    }

    pub fn set_broadcast_delay(&self, delay: Duration) {
        self.broadcast_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Slow down queries, name lookups and nonce lookups.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn read_delay(&self) {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Answer broadcasts with a JSON-RPC error object instead of a result.
    pub fn set_rpc_error_broadcast(&self, error: Option<(i64, &str)>) {
        *self.rpc_error_broadcast.lock() =
            error.map(|(code, message)| (code, message.to_string()));
    }

    pub fn set_fail_nonce(&self, fail: bool) {
        self.fail_nonce.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_broadcast(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    pub fn set_nonce(&self, account: &Address, nonce: u64) {
        self.state.lock().nonces.insert(account.clone(), nonce);
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.state.lock().nonces.get(account).copied().unwrap_or(0)
    }

    pub fn accepted(&self) -> Vec<AcceptedTx> {
        self.state.lock().accepted.clone()
    }

    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }

    pub fn sequences_of(&self, account: &Address) -> Vec<u64> {
        self.accepted()
            .into_iter()
            .filter(|tx| &tx.sender == account)
            .map(|tx| tx.sequence)
            .collect()
    }

    pub fn on_query(&self, contract: &Address, handler: QueryHandler) {
        self.state.lock().queries.insert(contract.clone(), handler);
    }

    pub fn register_name(&self, name: &str, contract: &Address) {
        self.state
            .lock()
            .names
            .insert(name.to_string(), contract.clone());
    }

    pub fn add_receipt(&self, receipt: wire::EvmTxReceipt) {
        self.state
            .lock()
            .receipts
            .insert(receipt.tx_hash.clone(), receipt);
    }

    /// Address a deployment named `name` by `owner` lands at.
    pub fn deployed_address(owner: &Address, name: &str) -> Address {
        let mut seed = owner.local().as_bytes().to_vec();
        seed.extend_from_slice(name.as_bytes());
        let digest = sha256_digest(&seed);
        let mut local = [0u8; 20];
        local.copy_from_slice(&digest[..20]);
        Address::new(owner.chain_id(), LocalAddress::new(local))
    }

    fn process(&self, tx: &[u8]) -> BroadcastTxResponse {
        let mut state = self.state.lock();

        let Ok(signed) = wire::SignedTx::decode(tx) else {
            state.rejected += 1;
            return reject(1, "malformed SignedTx");
        };
        if verify(&signed.public_key, &signed.inner, &signed.signature).is_err() {
            state.rejected += 1;
            return reject(2, "invalid signature");
        }
        let Ok(nonce_tx) = wire::NonceTx::decode(signed.inner.as_slice()) else {
            state.rejected += 1;
            return reject(1, "malformed NonceTx");
        };
        let envelope = match decode_message::<wire::Transaction>("Transaction", &nonce_tx.inner)
            .and_then(|t| TxEnvelope::from_transaction(&t))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                state.rejected += 1;
                return reject(1, &e.to_string());
            }
        };

        let sender = address_from_public_key(CHAIN_ID, &signed.public_key);
        if &sender != envelope.from() {
            state.rejected += 1;
            return reject(3, "origin does not match signer");
        }

        let expected = state.nonces.get(&sender).copied().unwrap_or(0) + 1;
        if nonce_tx.sequence != expected {
            state.rejected += 1;
            return reject(
                4,
                &format!(
                    "sequence number does not match: expected {expected}, got {}",
                    nonce_tx.sequence
                ),
            );
        }

        state.nonces.insert(sender.clone(), nonce_tx.sequence);
        state.height += 1;
        let height = state.height;

        let data = match envelope.payload() {
            TxPayload::Call { input, .. } => input.clone(),
            TxPayload::Deploy { name, code, .. } => wire::DeployResponse {
                contract: Some(Self::deployed_address(&sender, name).to_wire()),
                output: sha256_digest(code).to_vec(),
            }
            .encode_to_vec(),
        };

        state.accepted.push(AcceptedTx {
            sender,
            sequence: nonce_tx.sequence,
            height,
            envelope,
            public_key: signed.public_key,
        });

        BroadcastTxResponse {
            check_tx: ok_phase(Vec::new()),
            deliver_tx: ok_phase(data),
            hash: hex::encode_upper(sha256_digest(tx)),
            height,
        }
    }
}

#[async_trait]
impl NonceSource for MockNode {
    async fn current_nonce(&self, account: &Address) -> Result<u64, TransportError> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await;
        if self.fail_nonce.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("node unreachable".into()));
        }

        let barrier = self.nonce_barrier.lock().clone();
        let nonce = self.nonce_of(account);
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(nonce)
    }
}

#[async_trait]
impl NodeTransport for MockNode {
    async fn broadcast_tx_commit(&self, tx: &[u8]) -> Result<BroadcastTxResponse, TransportError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let delay = self.broadcast_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        if let Some((code, message)) = self.rpc_error_broadcast.lock().clone() {
            self.state.lock().rejected += 1;
            return Err(TransportError::Rpc { code, message });
        }
        Ok(self.process(tx))
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<Vec<u8>>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await;
        let handler = self.state.lock().queries.get(&request.contract).cloned();
        Ok(handler.and_then(|handler| handler(request)))
    }

    async fn resolve(&self, name: &str) -> Result<Option<Address>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.read_delay().await;
        Ok(self.state.lock().names.get(name).cloned())
    }

    async fn evm_tx_receipt(&self, tx_hash: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .receipts
            .get(tx_hash)
            .map(|receipt| receipt.encode_to_vec()))
    }
}

/// Signer that can be slowed down to open a cancellation window.
pub struct SlowSigner {
    key: Ed25519KeyPair,
    delay_ms: AtomicU64,
}

impl SlowSigner {
    pub fn new(key: Ed25519KeyPair) -> Arc<Self> {
        Arc::new(Self {
            key,
            delay_ms: AtomicU64::new(0),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Signer for SlowSigner {
    fn public_key(&self) -> Vec<u8> {
        self.key.public_key()
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.key.sign(message).await
    }
}

/// Event source fed by the test.
#[derive(Default)]
pub struct MockEventSource {
    feeds: Mutex<Vec<mpsc::Sender<Result<RawEvent, SubscriptionError>>>>,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    pub connects: AtomicUsize,
}

impl MockEventSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn current(&self) -> Option<mpsc::Sender<Result<RawEvent, SubscriptionError>>> {
        self.feeds.lock().last().cloned()
    }

    /// True while the most recent connection's receiver is alive.
    pub fn is_live(&self) -> bool {
        self.current().is_some_and(|feed| !feed.is_closed())
    }

    pub async fn push(&self, raw: RawEvent) {
        if let Some(feed) = self.current() {
            let _ = feed.send(Ok(raw)).await;
        }
    }

    pub async fn emit(&self, event: &ChainEvent) {
        self.push(RawEvent::Binary(event.encode())).await;
    }

    /// Fail the current connection as the socket would.
    pub async fn drop_connection(&self) {
        let feed = self.feeds.lock().pop();
        if let Some(feed) = feed {
            let _ = feed
                .send(Err(SubscriptionError::Disconnected("reset by peer".into())))
                .await;
        }
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn connect(&self) -> Result<RawEventStream, SubscriptionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Connect("connection refused".into()));
        }
        let (tx, rx) = mpsc::channel(64);
        self.feeds.lock().push(tx);
        Ok(rx)
    }
}

pub fn key(seed: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed([seed; 32])
}

pub fn account_of(key: &Ed25519KeyPair) -> Address {
    address_from_public_key(CHAIN_ID, &key.public_key_bytes())
}

pub fn addr(byte: u8) -> Address {
    Address::new(CHAIN_ID, LocalAddress::new([byte; 20]))
}

pub fn client(node: &Arc<MockNode>, signer: Arc<dyn Signer>, policy: NoncePolicy) -> ChainClient {
    ChainClient::with_signer(CHAIN_ID, Arc::clone(node), signer, policy)
        .build()
        .unwrap()
}

pub fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        base_delay_ms: 1,
        max_delay_ms: 10,
        max_attempts: 5,
    }
}

pub fn event_from(contract: &Address, height: u64) -> ChainEvent {
    ChainEvent {
        topics: vec!["event".into()],
        contract: contract.clone(),
        caller: None,
        plugin_name: String::new(),
        block_height: height,
        body: height.to_be_bytes().to_vec(),
        tx_hash: Vec::new(),
    }
}

/// Poll `cond` until it holds or a second passes.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
