//! Types shared by every blockchain data provider backend.

/// The chain tip as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
	pub height: u64,
	pub hash: String,
}

/// Confirmation state of a transaction from the wallet's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
	/// Transaction is known to the network but not yet mined
	Pending,
	/// Transaction is included in a block
	Confirmed,
	/// Transaction is unknown to the provider (evicted, replaced or never relayed)
	Dropped,
}

impl TransactionStatus {
	/// Status implied by a confirmation count.
	pub fn from_confirmations(confirmations: u64) -> Self {
		if confirmations > 0 {
			TransactionStatus::Confirmed
		} else {
			TransactionStatus::Pending
		}
	}
}

impl std::fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let label = match self {
			TransactionStatus::Pending => "pending",
			TransactionStatus::Confirmed => "confirmed",
			TransactionStatus::Dropped => "dropped",
		};
		f.write_str(label)
	}
}

/// One row of an address's transaction history.
///
/// `delta` is the net effect of the transaction on the address in satoshis:
/// positive for incoming value, negative for spends (fees included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHistoryEntry {
	pub delta: i64,
	pub transaction_hash: String,
	pub confirmations: u64,
	pub status: TransactionStatus,
	/// Height of the including block, 0 while unconfirmed.
	pub block_height: u64,
}

/// An unspent output owned by one of the wallet's addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UTxO {
	pub tx_id: String,
	pub index: u32,
	/// Value in satoshis.
	pub amount: u64,
	pub address: String,
}

/// Error types for provider requests
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("Unexpected HTTP status {status}: {body}")]
	StatusError { status: u16, body: String },

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("API error: {0}")]
	ApiError(String),

	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

impl ProviderError {
	/// True when the provider answered that the requested object does not exist.
	pub fn is_not_found(&self) -> bool {
		matches!(self, ProviderError::StatusError { status: 404, .. })
	}
}
