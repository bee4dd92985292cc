//! Ledger recorder
//!
//! Optional side channel that writes each transaction to an append-only
//! contract and reads a counterparty's history back. The contract is the
//! only source of truth for ledger entries; nothing here caches them.

pub mod contract;
pub mod units;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{LedgerEntry, LedgerReceipt, RiskLevel};

pub use contract::EthersContract;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid wallet address format: {0}")]
    InvalidAddress(String),

    #[error("amount conversion failed: {0}")]
    Conversion(String),

    #[error("ledger is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("ledger call failed: {0}")]
    Rpc(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid signing key: {0}")]
    Signer(String),
}

/// Private key used to sign ledger writes
#[derive(Clone)]
pub struct LedgerSigner {
    wallet: LocalWallet,
}

impl LedgerSigner {
    pub fn from_hex(key: &str) -> Result<Self, LedgerError> {
        let wallet = LocalWallet::from_str(key.trim()).map_err(|e| LedgerError::Signer(e.to_string()))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerSigner({:#x})", self.address())
    }
}

/// Entry exactly as the contract returns it
#[derive(Debug, Clone)]
pub struct RawLedgerEntry {
    pub amount: U256,
    pub recipient: String,
    pub timestamp: U256,
    pub verified: bool,
    pub risk_level: String,
}

#[async_trait]
pub trait LedgerContract: Send + Sync {
    /// Sign and submit a write; resolves once the transaction is finalized
    /// and returns its hash.
    async fn submit(
        &self,
        amount: U256,
        recipient: &str,
        risk_level: &str,
        signer: &LedgerSigner,
    ) -> Result<String, LedgerError>;

    async fn count(&self, owner: Address) -> Result<U256, LedgerError>;

    async fn entry_at(&self, owner: Address, index: U256) -> Result<RawLedgerEntry, LedgerError>;
}

/// `0x`-prefixed 20-byte hex address
pub fn parse_address(raw: &str) -> Result<Address, LedgerError> {
    let raw = raw.trim();
    if !raw.starts_with("0x") {
        return Err(LedgerError::InvalidAddress(raw.to_string()));
    }
    raw.parse::<Address>()
        .map_err(|_| LedgerError::InvalidAddress(raw.to_string()))
}

fn convert_entry(raw: RawLedgerEntry) -> Result<LedgerEntry, LedgerError> {
    let amount: Decimal = units::from_base_units(raw.amount)?;

    if raw.timestamp > U256::from(i64::MAX as u64) {
        return Err(LedgerError::Rpc(format!("timestamp {} out of range", raw.timestamp)));
    }
    let timestamp = DateTime::from_timestamp(raw.timestamp.as_u64() as i64, 0)
        .ok_or_else(|| LedgerError::Rpc(format!("timestamp {} out of range", raw.timestamp)))?;

    let risk_level = if raw.risk_level.trim().is_empty() {
        "Unknown".to_string()
    } else {
        raw.risk_level
    };

    Ok(LedgerEntry {
        amount,
        recipient: raw.recipient,
        timestamp,
        verified: raw.verified,
        risk_level,
    })
}

pub struct LedgerRecorder {
    contract: Option<Arc<dyn LedgerContract>>,
    timeout: Duration,
}

impl LedgerRecorder {
    pub fn new(contract: Option<Arc<dyn LedgerContract>>, timeout: Duration) -> Self {
        Self { contract, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.contract.is_some()
    }

    fn contract(&self) -> Result<&Arc<dyn LedgerContract>, LedgerError> {
        self.contract
            .as_ref()
            .ok_or(LedgerError::NotConfigured("LEDGER_RPC_URL / LEDGER_CONTRACT_ADDRESS"))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LedgerError::Timeout(self.timeout))?
    }

    /// Write one transaction to the ledger. Errors come back as values with
    /// a readable reason; whether they are fatal is the caller's call.
    pub async fn record(
        &self,
        amount: Decimal,
        recipient: &str,
        risk_level: RiskLevel,
        signer: &LedgerSigner,
    ) -> Result<LedgerReceipt, LedgerError> {
        let contract = self.contract()?;
        let base_units = units::to_base_units(amount)?;

        tracing::info!(
            "Submitting {} to {} (risk {}) from {:#x}",
            amount,
            recipient,
            risk_level,
            signer.address()
        );

        let ledger_hash = self
            .bounded(contract.submit(base_units, recipient, risk_level.as_str(), signer))
            .await?;

        tracing::info!("Ledger write finalized: {}", ledger_hash);
        Ok(LedgerReceipt { ledger_hash })
    }

    /// All entries recorded for `address`, in contract index order.
    ///
    /// An index that fails to load is skipped; the rest still come back.
    pub async fn history(&self, address: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let owner = parse_address(address)?;
        let contract = self.contract()?;

        let count = self.bounded(contract.count(owner)).await?;
        if count > U256::from(u64::MAX) {
            return Err(LedgerError::Rpc(format!("implausible entry count {}", count)));
        }
        let count = count.as_u64();
        tracing::debug!("Ledger reports {} entries for {:#x}", count, owner);

        let mut entries = Vec::new();
        for index in 0..count {
            let fetched = self
                .bounded(contract.entry_at(owner, U256::from(index)))
                .await
                .and_then(convert_entry);

            match fetched {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping ledger entry {} for {:#x}: {}", index, owner, e),
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    /// Hardhat's first default account
    pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    /// In-memory contract. Indexes listed in `broken` fail on read.
    #[derive(Default)]
    pub struct FakeContract {
        pub entries: Mutex<Vec<RawLedgerEntry>>,
        pub broken: Vec<u64>,
        pub reject_writes: Option<String>,
    }

    #[async_trait]
    impl LedgerContract for FakeContract {
        async fn submit(
            &self,
            amount: U256,
            recipient: &str,
            risk_level: &str,
            _signer: &LedgerSigner,
        ) -> Result<String, LedgerError> {
            if let Some(reason) = &self.reject_writes {
                return Err(LedgerError::Rpc(reason.clone()));
            }
            let mut entries = self.entries.lock();
            entries.push(RawLedgerEntry {
                amount,
                recipient: recipient.to_string(),
                timestamp: U256::from(1_700_000_000u64),
                verified: true,
                risk_level: risk_level.to_string(),
            });
            Ok(format!("0x{:064x}", entries.len()))
        }

        async fn count(&self, _owner: Address) -> Result<U256, LedgerError> {
            Ok(U256::from(self.entries.lock().len()))
        }

        async fn entry_at(&self, _owner: Address, index: U256) -> Result<RawLedgerEntry, LedgerError> {
            let index = index.as_u64();
            if self.broken.contains(&index) {
                return Err(LedgerError::Rpc(format!("index {} reverted", index)));
            }
            self.entries
                .lock()
                .get(index as usize)
                .cloned()
                .ok_or_else(|| LedgerError::Rpc("index out of bounds".to_string()))
        }
    }

    fn recorder(contract: FakeContract) -> LedgerRecorder {
        LedgerRecorder::new(Some(Arc::new(contract)), Duration::from_secs(1))
    }

    #[test]
    fn test_signer_from_hex() {
        let signer = LedgerSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(format!("{:#x}", signer.address()), TEST_ADDRESS);
        assert!(format!("{:?}", signer).contains(TEST_ADDRESS));

        assert!(matches!(LedgerSigner::from_hex("0x1234"), Err(LedgerError::Signer(_))));
    }

    #[test]
    fn test_parse_address_requires_prefix() {
        assert!(parse_address(TEST_ADDRESS).is_ok());
        assert!(parse_address(&TEST_ADDRESS[2..]).is_err());
        assert!(parse_address("0xnothex").is_err());
    }

    #[tokio::test]
    async fn test_record_then_history() {
        let recorder = recorder(FakeContract::default());
        let signer = LedgerSigner::from_hex(TEST_KEY).unwrap();

        let receipt = recorder
            .record(dec!(2500.25), "0xrecipient", RiskLevel::Medium, &signer)
            .await
            .unwrap();
        assert!(receipt.ledger_hash.starts_with("0x"));

        let history = recorder.history(TEST_ADDRESS).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, dec!(2500.25));
        assert_eq!(history[0].risk_level, "Medium");
        assert_eq!(history[0].timestamp.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_large_whole_amount_survives_history() {
        let recorder = recorder(FakeContract::default());
        let signer = LedgerSigner::from_hex(TEST_KEY).unwrap();

        recorder
            .record(dec!(100000000000), "0xrecipient", RiskLevel::High, &signer)
            .await
            .unwrap();

        let history = recorder.history(TEST_ADDRESS).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, dec!(100000000000));
    }

    #[tokio::test]
    async fn test_empty_history_is_success() {
        let recorder = recorder(FakeContract::default());
        let history = recorder.history(TEST_ADDRESS).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_history_skips_broken_entries() {
        let raw = |n: u64| RawLedgerEntry {
            amount: U256::exp10(18) * U256::from(n),
            recipient: format!("0xr{}", n),
            timestamp: U256::from(1_700_000_000u64 + n),
            verified: true,
            risk_level: String::new(),
        };
        let contract = FakeContract {
            entries: Mutex::new(vec![raw(1), raw(2), raw(3)]),
            broken: vec![1],
            reject_writes: None,
        };

        let history = recorder(contract).history(TEST_ADDRESS).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, dec!(1));
        assert_eq!(history[1].amount, dec!(3));
        assert_eq!(history[0].risk_level, "Unknown");
    }

    #[tokio::test]
    async fn test_record_failure_carries_reason() {
        let recorder = recorder(FakeContract {
            reject_writes: Some("insufficient funds for gas".to_string()),
            ..Default::default()
        });
        let signer = LedgerSigner::from_hex(TEST_KEY).unwrap();

        let err = recorder
            .record(dec!(1), "0xrecipient", RiskLevel::Low, &signer)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_disabled_recorder() {
        let recorder = LedgerRecorder::new(None, Duration::from_secs(1));
        assert!(!recorder.is_enabled());

        let err = recorder.history(TEST_ADDRESS).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotConfigured(_)));

        let err = recorder.history("not-an-address").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
    }
}
