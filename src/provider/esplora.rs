//!
//! REST client for Esplora explorers (Blockstream, mempool.space).
//!
//! Esplora pages an address's confirmed history by "last seen txid" in chunks
//! of 25, with unconfirmed transactions served from a separate endpoint. This
//! client hides that behind the offset/limit contract of
//! [`BlockchainDataProvider::get_transactions`].
//!
//! A history walk is kept per address between calls, so paging through
//! offsets `0, limit, 2 * limit, ...` resumes from the last seen txid and
//! costs one request per 25 transactions. A call at offset 0 starts a new walk
//! with a fresh tip height and mempool snapshot.

use super::http::RestClient;
use super::*;
use crate::config::ProviderConfig;
use bitcoin::Network;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Esplora serves confirmed history 25 transactions at a time.
const ESPLORA_CHAIN_PAGE: usize = 25;

/// Esplora REST client
#[derive(Clone)]
pub struct EsploraClient {
	rest: RestClient,
	walks: Arc<Mutex<HashMap<String, HistoryWalk>>>,
}

/// History of one address collected so far, mempool first then newest confirmed.
#[derive(Debug, Clone)]
struct HistoryWalk {
	after_block_height: Option<u64>,
	tip_height: u64,
	transactions: Vec<EsploraTransaction>,
	last_seen: Option<String>,
	exhausted: bool,
}

impl EsploraClient {
	/// Create a new Esplora client.
	///
	/// # Arguments
	/// * `config` - Provider configuration; `base_url` overrides the network default.
	/// * `network` - Network used to pick the default Blockstream endpoint.
	pub fn new(config: &ProviderConfig, network: Network) -> Result<Self, ProviderError> {
		let base_url = match &config.base_url {
			Some(url) => url.clone(),
			None => Self::default_url(network)?.to_string(),
		};
		info!("Using Esplora provider at {}", base_url);

		Ok(Self {
			rest: RestClient::new(&base_url, config.timeout, config.max_retry_elapsed)?,
			walks: Arc::new(Mutex::new(HashMap::new())),
		})
	}

	/// Default public endpoint for a network.
	pub fn default_url(network: Network) -> Result<&'static str, ProviderError> {
		match network {
			Network::Bitcoin => Ok("https://blockstream.info/api"),
			Network::Testnet => Ok("https://blockstream.info/testnet/api"),
			Network::Signet => Ok("https://mempool.space/signet/api"),
			other => Err(ProviderError::ApiError(format!(
				"no public Esplora endpoint for network {}",
				other
			))),
		}
	}

	async fn tip_height(&self) -> Result<u64, ProviderError> {
		let height = self.rest.get_text("/blocks/tip/height").await?;
		height
			.trim()
			.parse::<u64>()
			.map_err(|e| ProviderError::InvalidResponse(format!("tip height {:?}: {}", height, e)))
	}

	/// Take the stored walk for `address` if this call continues it.
	fn resume_walk(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		offset: usize,
	) -> Option<HistoryWalk> {
		let walk = self
			.walks
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(address)?;
		(offset > 0 && walk.after_block_height == after_block_height).then_some(walk)
	}

	fn store_walk(&self, address: &str, walk: HistoryWalk) {
		self.walks
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(address.to_string(), walk);
	}

	async fn start_walk(
		&self,
		address: &str,
		after_block_height: Option<u64>,
	) -> Result<HistoryWalk, ProviderError> {
		let tip_height = self.tip_height().await?;
		let transactions: Vec<EsploraTransaction> = self
			.rest
			.get_json(&format!("/address/{}/txs/mempool", address))
			.await?;

		Ok(HistoryWalk {
			after_block_height,
			tip_height,
			transactions,
			last_seen: None,
			exhausted: false,
		})
	}

	/// Walk confirmed history pages until `wanted` transactions are collected,
	/// the history is exhausted, or the walk goes below `after_block_height`.
	async fn extend_walk(
		&self,
		address: &str,
		walk: &mut HistoryWalk,
		wanted: usize,
	) -> Result<(), ProviderError> {
		while !walk.exhausted && walk.transactions.len() < wanted {
			let path = match &walk.last_seen {
				Some(txid) => format!("/address/{}/txs/chain/{}", address, txid),
				None => format!("/address/{}/txs/chain", address),
			};
			let page: Vec<EsploraTransaction> = self.rest.get_json(&path).await?;
			let page_len = page.len();

			let reached_window_end = match (walk.after_block_height, page.last()) {
				(Some(after), Some(tx)) => tx.status.block_height.unwrap_or(u64::MAX) < after,
				_ => false,
			};
			if let Some(tx) = page.last() {
				walk.last_seen = Some(tx.txid.clone());
			}
			walk.transactions.extend(page);
			walk.exhausted = page_len < ESPLORA_CHAIN_PAGE || reached_window_end;
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl BlockchainDataProvider for EsploraClient {
	async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
		let height = self.tip_height().await?;
		let hash = self.rest.get_text("/blocks/tip/hash").await?;
		Ok(BlockInfo {
			height,
			hash: hash.trim().to_string(),
		})
	}

	async fn get_address_balance(&self, address: &str) -> Result<u64, ProviderError> {
		let stats: EsploraAddress = self.rest.get_json(&format!("/address/{}", address)).await?;
		Ok(stats.balance())
	}

	async fn get_transactions(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
		let wanted = offset + limit;
		let mut walk = match self.resume_walk(address, after_block_height, offset) {
			Some(walk) => walk,
			None => self.start_walk(address, after_block_height).await?,
		};
		self.extend_walk(address, &mut walk, wanted).await?;

		let entries: Vec<TransactionHistoryEntry> = walk
			.transactions
			.iter()
			.filter(|tx| match (after_block_height, tx.status.block_height) {
				(Some(after), Some(height)) => height >= after,
				_ => true,
			})
			.skip(offset)
			.take(limit)
			.map(|tx| history_entry_from_esplora(tx, address, walk.tip_height))
			.collect();

		if entries.len() == limit {
			self.store_walk(address, walk);
		}

		debug!(
			"Esplora history for {}: {} entries at offset {}",
			address,
			entries.len(),
			offset
		);
		Ok(entries)
	}

	async fn get_utxos(&self, address: &str) -> Result<Vec<UTxO>, ProviderError> {
		let outputs: Vec<EsploraUtxo> = self
			.rest
			.get_json(&format!("/address/{}/utxo", address))
			.await?;

		Ok(outputs
			.into_iter()
			.map(|output| UTxO {
				tx_id: output.txid,
				index: output.vout,
				amount: output.value,
				address: address.to_string(),
			})
			.collect())
	}

	async fn submit_transaction(&self, raw_transaction_hex: &str) -> Result<String, ProviderError> {
		let txid = self
			.rest
			.post_text("/tx", raw_transaction_hex.to_string())
			.await?;
		Ok(txid.trim().to_string())
	}

	async fn get_transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, ProviderError> {
		let result: Result<EsploraTxStatus, ProviderError> = self
			.rest
			.get_json(&format!("/tx/{}/status", transaction_hash))
			.await;

		match result {
			Ok(status) if status.confirmed => Ok(TransactionStatus::Confirmed),
			Ok(_) => Ok(TransactionStatus::Pending),
			Err(e) if e.is_not_found() => Ok(TransactionStatus::Dropped),
			Err(e) => Err(e),
		}
	}
}

/// Transaction as returned by `/address/:address/txs*`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraTransaction {
	pub txid: String,
	#[serde(default)]
	pub vin: Vec<EsploraInput>,
	#[serde(default)]
	pub vout: Vec<EsploraOutput>,
	pub status: EsploraTxStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraInput {
	/// Missing for coinbase inputs.
	pub prevout: Option<EsploraOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraOutput {
	/// Missing for non-standard scripts such as OP_RETURN.
	pub scriptpubkey_address: Option<String>,
	pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EsploraTxStatus {
	pub confirmed: bool,
	pub block_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraUtxo {
	txid: String,
	vout: u32,
	value: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraAddress {
	chain_stats: EsploraAddressStats,
	mempool_stats: EsploraAddressStats,
}

#[derive(Debug, Clone, Deserialize)]
struct EsploraAddressStats {
	funded_txo_sum: u64,
	spent_txo_sum: u64,
}

impl EsploraAddress {
	fn balance(&self) -> u64 {
		(self.chain_stats.funded_txo_sum + self.mempool_stats.funded_txo_sum).saturating_sub(
			self.chain_stats.spent_txo_sum + self.mempool_stats.spent_txo_sum,
		)
	}
}

/// Convert an Esplora transaction into a history row for `address`.
pub(crate) fn history_entry_from_esplora(
	tx: &EsploraTransaction,
	address: &str,
	tip_height: u64,
) -> TransactionHistoryEntry {
	let received: u64 = tx
		.vout
		.iter()
		.filter(|output| output.scriptpubkey_address.as_deref() == Some(address))
		.map(|output| output.value)
		.sum();
	let spent: u64 = tx
		.vin
		.iter()
		.filter_map(|input| input.prevout.as_ref())
		.filter(|prevout| prevout.scriptpubkey_address.as_deref() == Some(address))
		.map(|prevout| prevout.value)
		.sum();

	let (block_height, confirmations) = match (tx.status.confirmed, tx.status.block_height) {
		(true, Some(height)) => (height, tip_height.saturating_sub(height) + 1),
		_ => (0, 0),
	};

	TransactionHistoryEntry {
		delta: received as i64 - spent as i64,
		transaction_hash: tx.txid.clone(),
		confirmations,
		status: TransactionStatus::from_confirmations(confirmations),
		block_height,
	}
}
