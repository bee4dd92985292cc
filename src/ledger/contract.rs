//! Ethereum binding for the transaction validator contract

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::Signer;
use ethers::types::{Address, U256, U64};

use super::{parse_address, LedgerContract, LedgerError, LedgerSigner, RawLedgerEntry};

abigen!(
    TransactionValidator,
    r#"[
        function validateTransaction(uint256 _amount, string _recipientAddress, string _riskLevel) external
        function getTransactionCount(address _user) external view returns (uint256)
        function getTransaction(address _user, uint256 _index) external view returns (uint256, string, uint256, bool, string)
    ]"#
);

pub struct EthersContract {
    provider: Provider<Http>,
    address: Address,
    chain_id: u64,
}

impl EthersContract {
    pub fn connect(rpc_url: &str, contract_address: &str, chain_id: u64) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Rpc(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        let address = parse_address(contract_address)?;

        Ok(Self { provider, address, chain_id })
    }

    fn reader(&self) -> TransactionValidator<Provider<Http>> {
        TransactionValidator::new(self.address, Arc::new(self.provider.clone()))
    }
}

#[async_trait]
impl LedgerContract for EthersContract {
    async fn submit(
        &self,
        amount: U256,
        recipient: &str,
        risk_level: &str,
        signer: &LedgerSigner,
    ) -> Result<String, LedgerError> {
        let wallet = signer.wallet().clone().with_chain_id(self.chain_id);
        let client = Arc::new(SignerMiddleware::new(self.provider.clone(), wallet));
        let contract = TransactionValidator::new(self.address, client);

        let call = contract.validate_transaction(amount, recipient.to_string(), risk_level.to_string());
        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        let tx_hash = pending.tx_hash();

        let receipt = pending
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?
            .ok_or_else(|| LedgerError::Rpc(format!("transaction {:#x} dropped before finalization", tx_hash)))?;

        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::Rpc(format!("transaction {:#x} reverted", tx_hash)));
        }

        Ok(format!("{:#x}", tx_hash))
    }

    async fn count(&self, owner: Address) -> Result<U256, LedgerError> {
        self.reader()
            .get_transaction_count(owner)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(format!("Contract error: {}", e)))
    }

    async fn entry_at(&self, owner: Address, index: U256) -> Result<RawLedgerEntry, LedgerError> {
        let (amount, recipient, timestamp, verified, risk_level) = self
            .reader()
            .get_transaction(owner, index)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(format!("Contract error: {}", e)))?;

        Ok(RawLedgerEntry { amount, recipient, timestamp, verified, risk_level })
    }
}
