//!
//! REST client for the BlockCypher API.
//!
//! BlockCypher pages full transactions with a `before` block-height cursor
//! (at most 50 per request). Offsets are emulated by walking pages from the
//! newest transaction. Both `before` and `after` are exclusive bounds.

use super::http::RestClient;
use super::*;
use crate::config::ProviderConfig;
use bitcoin::Network;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// BlockCypher returns at most 50 full transactions per request.
const BLOCKCYPHER_MAX_PAGE: usize = 50;

/// BlockCypher REST client
#[derive(Clone)]
pub struct BlockCypherClient {
	rest: RestClient,
	api_token: Option<String>,
}

impl BlockCypherClient {
	/// Create a new BlockCypher client for the given network.
	pub fn new(config: &ProviderConfig, network: Network) -> Result<Self, ProviderError> {
		let base_url = match &config.base_url {
			Some(url) => url.clone(),
			None => Self::default_url(network)?.to_string(),
		};
		info!("Using BlockCypher provider at {}", base_url);

		Ok(Self {
			rest: RestClient::new(&base_url, config.timeout, config.max_retry_elapsed)?,
			api_token: config.api_token.clone(),
		})
	}

	/// Default public endpoint for a network.
	pub fn default_url(network: Network) -> Result<&'static str, ProviderError> {
		match network {
			Network::Bitcoin => Ok("https://api.blockcypher.com/v1/btc/main"),
			Network::Testnet => Ok("https://api.blockcypher.com/v1/btc/test3"),
			other => Err(ProviderError::ApiError(format!(
				"no public BlockCypher endpoint for network {}",
				other
			))),
		}
	}

	/// Append the API token, if any, to a path that may already carry a query.
	fn with_token(&self, path: String) -> String {
		match &self.api_token {
			Some(token) if path.contains('?') => format!("{}&token={}", path, token),
			Some(token) => format!("{}?token={}", path, token),
			None => path,
		}
	}
}

#[async_trait::async_trait]
impl BlockchainDataProvider for BlockCypherClient {
	async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
		let chain: BlockCypherChain = self.rest.get_json(&self.with_token(String::new())).await?;
		Ok(BlockInfo {
			height: chain.height,
			hash: chain.hash,
		})
	}

	async fn get_address_balance(&self, address: &str) -> Result<u64, ProviderError> {
		let balance: BlockCypherBalance = self
			.rest
			.get_json(&self.with_token(format!("/addrs/{}/balance", address)))
			.await?;
		u64::try_from(balance.final_balance).map_err(|_| {
			ProviderError::InvalidResponse(format!(
				"negative final balance {} for {}",
				balance.final_balance, address
			))
		})
	}

	async fn get_transactions(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
		let wanted = offset + limit;
		let mut collected: Vec<BlockCypherTransaction> = Vec::new();
		let mut seen: HashSet<String> = HashSet::new();
		let mut before: Option<u64> = None;

		loop {
			let path = full_history_path(address, after_block_height, before);
			let page: BlockCypherAddressFull = self.rest.get_json(&self.with_token(path)).await?;

			// The next page restarts at the last block seen, so rows already
			// collected from that block come back and are skipped.
			let oldest_height = page.txs.last().map(|tx| tx.block_height);
			let before_len = collected.len();
			for tx in page.txs {
				if seen.insert(tx.hash.clone()) {
					collected.push(tx);
				}
			}

			let next_before = oldest_height
				.and_then(|height| u64::try_from(height).ok())
				.filter(|height| *height > 0)
				.map(|height| height + 1);
			if collected.len() == before_len && page.has_more {
				warn!(
					"BlockCypher history for {} did not advance past block {:?}",
					address, before
				);
			}

			if !page.has_more
				|| next_before.is_none()
				|| collected.len() == before_len
				|| collected.len() >= wanted
			{
				break;
			}
			before = next_before;
		}

		let entries: Vec<TransactionHistoryEntry> = collected
			.iter()
			.skip(offset)
			.take(limit)
			.map(|tx| history_entry_from_blockcypher(tx, address))
			.collect();

		debug!(
			"BlockCypher history for {}: {} entries at offset {}",
			address,
			entries.len(),
			offset
		);
		Ok(entries)
	}

	async fn get_utxos(&self, address: &str) -> Result<Vec<UTxO>, ProviderError> {
		let refs: BlockCypherAddressRefs = self
			.rest
			.get_json(&self.with_token(format!(
				"/addrs/{}?unspentOnly=true&includeScript=false",
				address
			)))
			.await?;

		Ok(refs
			.txrefs
			.into_iter()
			.chain(refs.unconfirmed_txrefs)
			.map(|txref| UTxO {
				tx_id: txref.tx_hash,
				index: txref.tx_output_n,
				amount: txref.value,
				address: address.to_string(),
			})
			.collect())
	}

	async fn submit_transaction(&self, raw_transaction_hex: &str) -> Result<String, ProviderError> {
		let response: BlockCypherPushResponse = self
			.rest
			.post_json(
				&self.with_token("/txs/push".to_string()),
				&json!({ "tx": raw_transaction_hex }),
			)
			.await?;
		Ok(response.tx.hash)
	}

	async fn get_transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, ProviderError> {
		let result: Result<BlockCypherTransaction, ProviderError> = self
			.rest
			.get_json(&self.with_token(format!("/txs/{}", transaction_hash)))
			.await;

		match result {
			Ok(tx) => Ok(TransactionStatus::from_confirmations(tx.confirmations)),
			Err(e) if e.is_not_found() => Ok(TransactionStatus::Dropped),
			Err(e) => Err(e),
		}
	}
}

#[derive(Debug, Deserialize)]
struct BlockCypherChain {
	height: u64,
	hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockCypherBalance {
	final_balance: i64,
}

#[derive(Debug, Deserialize)]
struct BlockCypherAddressFull {
	#[serde(default)]
	txs: Vec<BlockCypherTransaction>,
	#[serde(default, rename = "hasMore")]
	has_more: bool,
}

#[derive(Debug, Deserialize)]
struct BlockCypherAddressRefs {
	#[serde(default)]
	txrefs: Vec<BlockCypherTxRef>,
	#[serde(default)]
	unconfirmed_txrefs: Vec<BlockCypherTxRef>,
}

#[derive(Debug, Deserialize)]
struct BlockCypherTxRef {
	tx_hash: String,
	tx_output_n: u32,
	value: u64,
}

#[derive(Debug, Deserialize)]
struct BlockCypherPushResponse {
	tx: BlockCypherPushedTx,
}

#[derive(Debug, Deserialize)]
struct BlockCypherPushedTx {
	hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BlockCypherTransaction {
	pub hash: String,
	/// -1 while unconfirmed.
	#[serde(default = "unconfirmed_height")]
	pub block_height: i64,
	#[serde(default)]
	pub confirmations: u64,
	#[serde(default)]
	pub inputs: Vec<BlockCypherIo>,
	#[serde(default)]
	pub outputs: Vec<BlockCypherIo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BlockCypherIo {
	#[serde(default)]
	pub addresses: Option<Vec<String>>,
	#[serde(default, alias = "output_value")]
	pub value: u64,
}

/// `/addrs/:address/full` query for one page of history.
///
/// `after_block_height` is inclusive here, `before` is passed through as is.
fn full_history_path(address: &str, after_block_height: Option<u64>, before: Option<u64>) -> String {
	let mut path = format!("/addrs/{}/full?limit={}", address, BLOCKCYPHER_MAX_PAGE);
	if let Some(after) = after_block_height.filter(|height| *height > 0) {
		path.push_str(&format!("&after={}", after - 1));
	}
	if let Some(before) = before {
		path.push_str(&format!("&before={}", before));
	}
	path
}

fn unconfirmed_height() -> i64 {
	-1
}

impl BlockCypherIo {
	fn pays(&self, address: &str) -> bool {
		self.addresses
			.as_ref()
			.is_some_and(|addresses| addresses.iter().any(|a| a == address))
	}
}

/// Convert a BlockCypher transaction into a history row for `address`.
pub(crate) fn history_entry_from_blockcypher(
	tx: &BlockCypherTransaction,
	address: &str,
) -> TransactionHistoryEntry {
	let received: u64 = tx
		.outputs
		.iter()
		.filter(|output| output.pays(address))
		.map(|output| output.value)
		.sum();
	let spent: u64 = tx
		.inputs
		.iter()
		.filter(|input| input.pays(address))
		.map(|input| input.value)
		.sum();

	TransactionHistoryEntry {
		delta: received as i64 - spent as i64,
		transaction_hash: tx.hash.clone(),
		confirmations: tx.confirmations,
		status: TransactionStatus::from_confirmations(tx.confirmations),
		block_height: u64::try_from(tx.block_height).unwrap_or(0),
	}
}
