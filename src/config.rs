//! Configuration for the wallet, its sync engine and its data provider.
//!
//! Everything has a usable `Default`; the binary overrides a few fields from
//! environment variables. Nothing here is read from or written to disk.

use crate::keys::AddressType;
use bitcoin::Network;
use std::time::Duration;

/// Flat transaction fee in satoshis, independent of size and network conditions.
pub const DEFAULT_FIXED_FEE: u64 = 500;

/// Configuration for the polling sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Time between two tip polls
	pub poll_interval: Duration,
	/// Number of blocks below the tip that are re-fetched on every new block
	pub reorg_safe_depth: u64,
	/// Page size used when walking an address's history
	pub page_size: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(30),
			reorg_safe_depth: 6,
			page_size: crate::provider::DEFAULT_PAGE_SIZE,
		}
	}
}

impl SyncConfig {
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_reorg_safe_depth(mut self, depth: u64) -> Self {
		self.reorg_safe_depth = depth;
		self
	}
}

/// Which explorer backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	Esplora,
	BlockCypher,
}

impl std::str::FromStr for ProviderKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"esplora" | "blockstream" => Ok(ProviderKind::Esplora),
			"blockcypher" => Ok(ProviderKind::BlockCypher),
			other => Err(format!("unknown provider '{}'", other)),
		}
	}
}

/// Configuration for the HTTP data providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
	pub kind: ProviderKind,
	/// Overrides the backend's public endpoint for the configured network
	pub base_url: Option<String>,
	/// Per-request timeout
	pub timeout: Duration,
	/// Upper bound on time spent retrying a single GET request
	pub max_retry_elapsed: Duration,
	/// BlockCypher API token, if any
	pub api_token: Option<String>,
}

impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			kind: ProviderKind::Esplora,
			base_url: None,
			timeout: Duration::from_secs(30),
			max_retry_elapsed: Duration::from_secs(10),
			api_token: None,
		}
	}
}

impl ProviderConfig {
	pub fn with_kind(mut self, kind: ProviderKind) -> Self {
		self.kind = kind;
		self
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
		self.api_token = Some(token.into());
		self
	}
}

/// Top-level wallet configuration
#[derive(Debug, Clone)]
pub struct WalletConfig {
	pub network: Network,
	/// Address types derived and tracked by the wallet, in tracking order
	pub tracked_address_types: Vec<AddressType>,
	pub fixed_fee: u64,
	pub sync: SyncConfig,
	pub provider: ProviderConfig,
}

impl Default for WalletConfig {
	fn default() -> Self {
		Self {
			network: Network::Bitcoin,
			tracked_address_types: vec![AddressType::ElectrumNativeSegWit],
			fixed_fee: DEFAULT_FIXED_FEE,
			sync: SyncConfig::default(),
			provider: ProviderConfig::default(),
		}
	}
}

impl WalletConfig {
	pub fn with_network(mut self, network: Network) -> Self {
		self.network = network;
		self
	}

	pub fn with_sync(mut self, sync: SyncConfig) -> Self {
		self.sync = sync;
		self
	}

	pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
		self.provider = provider;
		self
	}

	pub fn with_fixed_fee(mut self, fee: u64) -> Self {
		self.fixed_fee = fee;
		self
	}
}
