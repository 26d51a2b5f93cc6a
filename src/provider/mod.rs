//! Blockchain data provider integration.
//!
//! The wallet core only talks to the chain through the [`BlockchainDataProvider`]
//! trait. Each explorer backend lives in its own submodule and translates its
//! wire format into the types defined in [`types`].

/// BlockCypher REST backend
mod blockcypher;
/// Esplora (Blockstream / mempool.space) REST backend
mod esplora;
/// Shared HTTP plumbing for the REST backends
mod http;
/// Type definitions for provider data structures
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use blockcypher::BlockCypherClient;
pub use esplora::EsploraClient;
pub use types::*;

/// Default page size used when walking an address's transaction history.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Capability set every blockchain data backend must provide.
///
/// All operations may fail; callers decide whether a failure is recoverable.
#[async_trait::async_trait]
pub trait BlockchainDataProvider: Send + Sync {
	/// Current chain tip.
	async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError>;

	/// Confirmed plus unconfirmed balance of an address, in satoshis.
	async fn get_address_balance(&self, address: &str) -> Result<u64, ProviderError>;

	/// One page of an address's history, newest first.
	///
	/// When `after_block_height` is set, confirmed transactions mined below that
	/// height are left out. Callers paginate by increasing `offset` until a page
	/// shorter than `limit` comes back.
	async fn get_transactions(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TransactionHistoryEntry>, ProviderError>;

	/// Current unspent outputs of an address.
	async fn get_utxos(&self, address: &str) -> Result<Vec<UTxO>, ProviderError>;

	/// Broadcast a raw transaction, returning the id the provider accepted.
	async fn submit_transaction(&self, raw_transaction_hex: &str) -> Result<String, ProviderError>;

	/// Status of a transaction. Unknown transactions report [`TransactionStatus::Dropped`].
	async fn get_transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, ProviderError>;
}

#[async_trait::async_trait]
impl<P: BlockchainDataProvider + ?Sized> BlockchainDataProvider for std::sync::Arc<P> {
	async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
		(**self).get_last_known_block().await
	}

	async fn get_address_balance(&self, address: &str) -> Result<u64, ProviderError> {
		(**self).get_address_balance(address).await
	}

	async fn get_transactions(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
		(**self)
			.get_transactions(address, after_block_height, limit, offset)
			.await
	}

	async fn get_utxos(&self, address: &str) -> Result<Vec<UTxO>, ProviderError> {
		(**self).get_utxos(address).await
	}

	async fn submit_transaction(&self, raw_transaction_hex: &str) -> Result<String, ProviderError> {
		(**self).submit_transaction(raw_transaction_hex).await
	}

	async fn get_transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, ProviderError> {
		(**self).get_transaction_status(transaction_hash).await
	}
}
