//! Transaction signing, broadcast and finalization.
//!
//! `TxSender` is the only holder of the signing key and the sequence
//! cache. After broadcast it polls the account's sequence counter with
//! bounded exponential backoff until it advances past the value used,
//! which signals confirmation. Failures are classified: an on-chain
//! revert is re-executed as a read-only simulation to capture the reason
//! and is never retried; every other failure invalidates the sequence
//! cache. Jobs themselves are not retried; losing one submission or
//! reveal slot is an accepted, bounded loss per epoch.

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::Mutex;
use tracing::{error, info};
use zeroize::Zeroizing;

use crate::contracts;
use crate::error::{ChainError, ChainResult};
use crate::rpc::ChainRpc;
use crate::sequence::SequenceCache;
use voter_core::EpochId;

/// Finalization polling configuration.
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 1.5,
            max_retries: 8,
        }
    }
}

/// Signs and broadcasts transactions for one account, strictly one at a
/// time (enforced by the action queue draining jobs sequentially).
pub struct TxSender {
    rpc: Arc<dyn ChainRpc>,
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    gas_price: u128,
    sequence: Mutex<SequenceCache>,
    finalize: FinalizeConfig,
}

impl TxSender {
    /// Construct from raw key bytes. The key material is zeroized after
    /// the signer takes ownership.
    ///
    /// # Errors
    /// Fails when the key is not a valid secp256k1 secret.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        key_bytes: Zeroizing<Vec<u8>>,
        chain_id: u64,
        gas_price: u128,
        sequence_refresh_every: u32,
        finalize: FinalizeConfig,
    ) -> ChainResult<Self> {
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| ChainError::Signing(format!("invalid account key: {e}")))?;
        let address = signer.address();
        Ok(Self {
            rpc,
            signer,
            address,
            chain_id,
            gas_price,
            sequence: Mutex::new(SequenceCache::new(sequence_refresh_every)),
            finalize,
        })
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign, broadcast and await finalization of one contract call.
    ///
    /// # Errors
    /// - `ChainError::Reverted` when the contract rejected the call
    /// - `ChainError::FinalizeTimeout` when confirmation never arrived
    /// - `ChainError::Rpc` for transport failures
    pub async fn execute(
        &self,
        label: &str,
        to: Address,
        calldata: Vec<u8>,
        gas_limit: u64,
    ) -> ChainResult<()> {
        let mut sequence = self.sequence.lock().await;
        let nonce = sequence.next(self.rpc.as_ref(), self.address).await?;

        let raw = self.sign_legacy(nonce, to, calldata.clone(), gas_limit)?;

        match self.broadcast_and_finalize(nonce, raw).await {
            Ok(()) => {
                info!(label, nonce, "transaction finalized");
                voter_telemetry::metrics::TX_FINALIZED_TOTAL
                    .with_label_values(&[label])
                    .inc();
                Ok(())
            }
            Err(e) if matches!(e, ChainError::Reverted { .. }) => {
                // Benign rejection; capture the reason via simulation.
                let reason = self.simulate_revert_reason(to, calldata).await;
                error!(label, nonce, reason = %reason, "transaction reverted");
                voter_telemetry::metrics::TX_FAILURES_TOTAL
                    .with_label_values(&["revert"])
                    .inc();
                Err(ChainError::Reverted { reason })
            }
            Err(e) => {
                error!(label, nonce, error = %e, "transaction failed");
                voter_telemetry::metrics::TX_FAILURES_TOTAL
                    .with_label_values(&[failure_class(&e)])
                    .inc();
                if e.invalidates_sequence() {
                    sequence.invalidate();
                }
                Err(e)
            }
        }
    }

    async fn broadcast_and_finalize(&self, nonce: u64, raw: Vec<u8>) -> ChainResult<()> {
        let hash = match self.rpc.send_raw_transaction(raw).await {
            Ok(hash) => hash,
            Err(ChainError::Rpc(msg)) if is_revert_message(&msg) => {
                return Err(ChainError::Reverted { reason: msg });
            }
            Err(e) => return Err(e),
        };
        self.wait_finalize(nonce, hash).await
    }

    /// Poll the account sequence counter until it advances past `nonce`,
    /// then confirm via the receipt. The counter advances for mined
    /// reverts too, so status decides success.
    async fn wait_finalize(&self, nonce: u64, hash: B256) -> ChainResult<()> {
        let mut delay = Duration::from_millis(self.finalize.base_delay_ms);
        for attempt in 0..=self.finalize.max_retries {
            let count = self.rpc.transaction_count(self.address).await?;
            if count > nonce {
                return match self.rpc.transaction_receipt(hash).await? {
                    Some(false) => Err(ChainError::Reverted {
                        reason: "receipt status 0".to_string(),
                    }),
                    _ => Ok(()),
                };
            }
            if attempt == self.finalize.max_retries {
                break;
            }
            tokio::time::sleep(delay).await;
            delay = Duration::from_millis(
                (delay.as_millis() as f64 * self.finalize.multiplier) as u64,
            );
        }
        Err(ChainError::FinalizeTimeout {
            nonce,
            attempts: self.finalize.max_retries + 1,
        })
    }

    async fn simulate_revert_reason(&self, to: Address, calldata: Vec<u8>) -> String {
        match self.rpc.call(to, calldata).await {
            // Unlikely: simulation of a reverted call succeeded.
            Ok(result) => format!("simulation succeeded unexpectedly: 0x{}", hex::encode(result)),
            Err(ChainError::Rpc(msg)) => msg,
            Err(e) => e.to_string(),
        }
    }

    fn sign_legacy(
        &self,
        nonce: u64,
        to: Address,
        calldata: Vec<u8>,
        gas_limit: u64,
    ) -> ChainResult<Vec<u8>> {
        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: self.gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input: Bytes::from(calldata),
        };
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }

    /// Number of sequence network reads so far (observability/tests).
    pub async fn sequence_reads(&self) -> u64 {
        self.sequence.lock().await.network_reads()
    }
}

/// Convenience wrappers for the submitter wire contract.
impl TxSender {
    pub async fn submit_price_hashes(
        &self,
        submitter: Address,
        epoch: EpochId,
        indices: &[u32],
        hashes: &[B256],
        gas_limit: u64,
    ) -> ChainResult<()> {
        let calldata = contracts::encode_submit_price_hashes(epoch, indices, hashes);
        self.execute("submit_price_hashes", submitter, calldata, gas_limit)
            .await
    }

    pub async fn reveal_prices(
        &self,
        submitter: Address,
        epoch: EpochId,
        indices: &[u32],
        prices: &[u128],
        random_nonce: u64,
        gas_limit: u64,
    ) -> ChainResult<()> {
        let calldata = contracts::encode_reveal_prices(epoch, indices, prices, random_nonce);
        self.execute("reveal_prices", submitter, calldata, gas_limit)
            .await
    }
}

/// Node error strings that indicate an EVM-level rejection.
fn is_revert_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("revert") || lower.contains("execution reverted")
}

fn failure_class(e: &ChainError) -> &'static str {
    match e {
        ChainError::Reverted { .. } => "revert",
        ChainError::FinalizeTimeout { .. } => "finalize_timeout",
        ChainError::Rpc(_) | ChainError::Http(_) | ChainError::Json(_) => "transport",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{BoxFuture, LogEntry};
    use alloy::primitives::B256;
    use parking_lot::Mutex as PlMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Test key (well-known Hardhat account 0).
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn key_bytes() -> Zeroizing<Vec<u8>> {
        Zeroizing::new(hex::decode(TEST_KEY).unwrap())
    }

    /// Mock node: scripted send results, count advances on successful send.
    struct MockRpc {
        count: AtomicU64,
        reads: AtomicU64,
        send_results: PlMutex<VecDeque<Result<(), String>>>,
        call_error: Option<String>,
        advance_on_send: bool,
        receipt_status: PlMutex<Option<bool>>,
    }

    impl MockRpc {
        fn new(count: u64) -> Self {
            Self {
                count: AtomicU64::new(count),
                reads: AtomicU64::new(0),
                send_results: PlMutex::new(VecDeque::new()),
                call_error: None,
                advance_on_send: true,
                receipt_status: PlMutex::new(Some(true)),
            }
        }

        fn script_send(&self, result: Result<(), String>) {
            self.send_results.lock().push_back(result);
        }

        fn set_receipt(&self, status: Option<bool>) {
            *self.receipt_status.lock() = status;
        }
    }

    impl ChainRpc for MockRpc {
        fn transaction_count(&self, _address: Address) -> BoxFuture<'_, ChainResult<u64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let count = self.count.load(Ordering::SeqCst);
            Box::pin(async move { Ok(count) })
        }

        fn send_raw_transaction(&self, _raw: Vec<u8>) -> BoxFuture<'_, ChainResult<B256>> {
            let scripted = self.send_results.lock().pop_front();
            let result = match scripted {
                Some(Ok(())) | None => {
                    // Successful broadcast advances the chain counter.
                    if self.advance_on_send {
                        self.count.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(B256::repeat_byte(1))
                }
                Some(Err(msg)) => Err(ChainError::Rpc(msg)),
            };
            Box::pin(async move { result })
        }

        fn transaction_receipt(&self, _hash: B256) -> BoxFuture<'_, ChainResult<Option<bool>>> {
            let status = *self.receipt_status.lock();
            Box::pin(async move { Ok(status) })
        }

        fn call(&self, _to: Address, _data: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
            let err = self.call_error.clone();
            Box::pin(async move {
                match err {
                    Some(msg) => Err(ChainError::Rpc(msg)),
                    None => Ok(Vec::new()),
                }
            })
        }

        fn get_logs(
            &self,
            _address: Address,
            _from: u64,
            _to: u64,
        ) -> BoxFuture<'_, ChainResult<Vec<LogEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(0) })
        }

        fn chain_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
            Box::pin(async { Ok(31337) })
        }
    }

    fn sender(rpc: Arc<MockRpc>) -> TxSender {
        TxSender::new(
            rpc,
            key_bytes(),
            31337,
            225_000_000_000,
            100,
            FinalizeConfig {
                base_delay_ms: 1,
                multiplier: 1.5,
                max_retries: 3,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_happy_path() {
        let rpc = Arc::new(MockRpc::new(5));
        let tx = sender(Arc::clone(&rpc));
        tx.execute("test", Address::ZERO, vec![1, 2, 3], 400_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_revert_is_classified_and_keeps_sequence() {
        let rpc = Arc::new(MockRpc::new(5));
        rpc.script_send(Err("execution reverted".to_string()));
        let tx = sender(Arc::clone(&rpc));

        let err = tx
            .execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Reverted { .. }));

        // Next job uses the local increment: still only the initial
        // sequence read plus finalization polls from this next call.
        let reads_after_revert = tx.sequence_reads().await;
        tx.execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap();
        assert_eq!(tx.sequence_reads().await, reads_after_revert);
    }

    #[tokio::test]
    async fn test_transport_failure_invalidates_sequence() {
        let rpc = Arc::new(MockRpc::new(5));
        rpc.script_send(Err("connection reset by peer".to_string()));
        let tx = sender(Arc::clone(&rpc));

        let err = tx
            .execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rpc(_)));
        assert_eq!(tx.sequence_reads().await, 1);

        // Cache was invalidated: the next execute re-reads the network.
        tx.execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap();
        assert_eq!(tx.sequence_reads().await, 2);
    }

    #[tokio::test]
    async fn test_mined_revert_detected_via_receipt() {
        // The broadcast is accepted and the counter advances, but the
        // transaction reverted on-chain.
        let mut mock = MockRpc::new(5);
        mock.call_error = Some("execution reverted: epoch closed".to_string());
        let rpc = Arc::new(mock);
        rpc.set_receipt(Some(false));
        let tx = sender(Arc::clone(&rpc));

        let err = tx
            .execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap_err();
        match err {
            ChainError::Reverted { reason } => assert!(reason.contains("epoch closed")),
            other => panic!("expected revert, got {other}"),
        }

        // The nonce was consumed on-chain: the cache stays valid and the
        // next job succeeds without a fresh network read.
        rpc.set_receipt(Some(true));
        let reads_after_revert = tx.sequence_reads().await;
        tx.execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap();
        assert_eq!(tx.sequence_reads().await, reads_after_revert);
    }

    #[tokio::test]
    async fn test_finalize_timeout_is_bounded() {
        let mut mock = MockRpc::new(5);
        mock.advance_on_send = false;
        let rpc = Arc::new(mock);
        let tx = sender(Arc::clone(&rpc));

        // Broadcast succeeds but the counter never moves past the nonce.
        let err = tx
            .execute("test", Address::ZERO, vec![1], 400_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::FinalizeTimeout { nonce: 5, attempts: 4 }
        ));
    }

    #[tokio::test]
    async fn test_address_derived_from_key() {
        let rpc = Arc::new(MockRpc::new(0));
        let tx = sender(rpc);
        assert_eq!(
            format!("{:?}", tx.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }
}
