//! Scripted in-memory provider and a local explorer server used by unit tests.

use super::{
	BlockInfo, BlockchainDataProvider, ProviderError, TransactionHistoryEntry, TransactionStatus,
	UTxO,
};
use axum::Router;
use axum::http::{StatusCode, Uri};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A history request as received by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryRequest {
	pub address: String,
	pub after_block_height: Option<u64>,
	pub limit: usize,
	pub offset: usize,
}

#[derive(Default)]
pub(crate) struct StubProvider {
	tip: Mutex<Option<Result<BlockInfo, String>>>,
	history: Mutex<HashMap<String, Result<Vec<TransactionHistoryEntry>, String>>>,
	utxos: Mutex<HashMap<String, Result<Vec<UTxO>, String>>>,
	statuses: Mutex<HashMap<String, TransactionStatus>>,
	submit_result: Mutex<Option<Result<String, String>>>,

	tip_calls: Mutex<usize>,
	history_calls: Mutex<Vec<HistoryRequest>>,
	utxo_calls: Mutex<Vec<String>>,
	submitted: Mutex<Vec<String>>,
}

impl StubProvider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_tip(&self, height: u64, hash: &str) {
		*self.tip.lock().unwrap() = Some(Ok(BlockInfo {
			height,
			hash: hash.to_string(),
		}));
	}

	pub fn fail_tip(&self, message: &str) {
		*self.tip.lock().unwrap() = Some(Err(message.to_string()));
	}

	pub fn set_history(&self, address: &str, entries: Vec<TransactionHistoryEntry>) {
		self.history
			.lock()
			.unwrap()
			.insert(address.to_string(), Ok(entries));
	}

	pub fn fail_history(&self, address: &str, message: &str) {
		self.history
			.lock()
			.unwrap()
			.insert(address.to_string(), Err(message.to_string()));
	}

	pub fn set_utxos(&self, address: &str, utxos: Vec<UTxO>) {
		self.utxos
			.lock()
			.unwrap()
			.insert(address.to_string(), Ok(utxos));
	}

	pub fn fail_utxos(&self, address: &str, message: &str) {
		self.utxos
			.lock()
			.unwrap()
			.insert(address.to_string(), Err(message.to_string()));
	}

	pub fn set_status(&self, hash: &str, status: TransactionStatus) {
		self.statuses
			.lock()
			.unwrap()
			.insert(hash.to_string(), status);
	}

	pub fn set_submit_result(&self, result: Result<&str, &str>) {
		*self.submit_result.lock().unwrap() =
			Some(result.map(str::to_string).map_err(str::to_string));
	}

	pub fn tip_calls(&self) -> usize {
		*self.tip_calls.lock().unwrap()
	}

	pub fn history_calls(&self) -> Vec<HistoryRequest> {
		self.history_calls.lock().unwrap().clone()
	}

	pub fn utxo_calls(&self) -> Vec<String> {
		self.utxo_calls.lock().unwrap().clone()
	}

	pub fn submitted(&self) -> Vec<String> {
		self.submitted.lock().unwrap().clone()
	}
}

/// Build a confirmed history entry with a recognisable hash.
pub(crate) fn history_entry(n: usize) -> TransactionHistoryEntry {
	TransactionHistoryEntry {
		delta: 1_000 + n as i64,
		transaction_hash: format!("{:064x}", n),
		confirmations: 1,
		status: TransactionStatus::Confirmed,
		block_height: 100,
	}
}

/// Build a UTXO with a recognisable outpoint.
pub(crate) fn utxo(n: u8, amount: u64, address: &str) -> UTxO {
	UTxO {
		tx_id: hex::encode([n; 32]),
		index: n as u32,
		amount,
		address: address.to_string(),
	}
}

#[async_trait::async_trait]
impl BlockchainDataProvider for StubProvider {
	async fn get_last_known_block(&self) -> Result<BlockInfo, ProviderError> {
		*self.tip_calls.lock().unwrap() += 1;
		match self.tip.lock().unwrap().clone() {
			Some(Ok(block)) => Ok(block),
			Some(Err(message)) => Err(ProviderError::ApiError(message)),
			None => Err(ProviderError::ApiError("no tip scripted".to_string())),
		}
	}

	async fn get_address_balance(&self, address: &str) -> Result<u64, ProviderError> {
		let utxos = self.get_utxos(address).await?;
		Ok(utxos.iter().map(|utxo| utxo.amount).sum())
	}

	async fn get_transactions(
		&self,
		address: &str,
		after_block_height: Option<u64>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
		self.history_calls.lock().unwrap().push(HistoryRequest {
			address: address.to_string(),
			after_block_height,
			limit,
			offset,
		});
		match self.history.lock().unwrap().get(address).cloned() {
			Some(Ok(entries)) => Ok(entries.into_iter().skip(offset).take(limit).collect()),
			Some(Err(message)) => Err(ProviderError::ApiError(message)),
			None => Ok(Vec::new()),
		}
	}

	async fn get_utxos(&self, address: &str) -> Result<Vec<UTxO>, ProviderError> {
		self.utxo_calls.lock().unwrap().push(address.to_string());
		match self.utxos.lock().unwrap().get(address).cloned() {
			Some(Ok(utxos)) => Ok(utxos),
			Some(Err(message)) => Err(ProviderError::ApiError(message)),
			None => Ok(Vec::new()),
		}
	}

	async fn submit_transaction(&self, raw_transaction_hex: &str) -> Result<String, ProviderError> {
		self.submitted
			.lock()
			.unwrap()
			.push(raw_transaction_hex.to_string());
		match self.submit_result.lock().unwrap().clone() {
			Some(Ok(txid)) => Ok(txid),
			Some(Err(message)) => Err(ProviderError::ApiError(message)),
			None => Err(ProviderError::ApiError("no submit result scripted".to_string())),
		}
	}

	async fn get_transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, ProviderError> {
		Ok(self
			.statuses
			.lock()
			.unwrap()
			.get(transaction_hash)
			.copied()
			.unwrap_or(TransactionStatus::Dropped))
	}
}

/// Parsed query string of a request received by [`MockExplorer`].
pub(crate) type Query = HashMap<String, String>;

type Responder = dyn Fn(&str, &Query) -> (StatusCode, String) + Send + Sync;

/// HTTP server on a loopback port answering every request through `respond`.
pub(crate) struct MockExplorer {
	pub base_url: String,
	requests: Arc<Mutex<Vec<String>>>,
}

impl MockExplorer {
	pub async fn start<F>(respond: F) -> Self
	where
		F: Fn(&str, &Query) -> (StatusCode, String) + Send + Sync + 'static,
	{
		let respond: Arc<Responder> = Arc::new(respond);
		let requests = Arc::new(Mutex::new(Vec::new()));

		let log = requests.clone();
		let router = Router::new().fallback(move |uri: Uri| {
			let respond = respond.clone();
			let log = log.clone();
			async move {
				log.lock().unwrap().push(uri.to_string());
				let query = parse_query(uri.query().unwrap_or_default());
				respond(uri.path(), &query)
			}
		});

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let base_url = format!("http://{}", listener.local_addr().unwrap());
		tokio::spawn(async move {
			axum::serve(listener, router).await.unwrap();
		});

		Self { base_url, requests }
	}

	/// Request targets received so far (path and query), in arrival order.
	pub fn requests(&self) -> Vec<String> {
		self.requests.lock().unwrap().clone()
	}

	/// Number of requests whose path equals `path`, ignoring the query.
	pub fn count(&self, path: &str) -> usize {
		self.requests()
			.iter()
			.filter(|target| target.split('?').next() == Some(path))
			.count()
	}
}

fn parse_query(query: &str) -> Query {
	query
		.split('&')
		.filter(|pair| !pair.is_empty())
		.map(|pair| match pair.split_once('=') {
			Some((key, value)) => (key.to_string(), value.to_string()),
			None => (pair.to_string(), String::new()),
		})
		.collect()
}
