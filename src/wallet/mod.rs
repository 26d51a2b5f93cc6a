//! The wallet facade.
//!
//! [`BitcoinWallet`] owns the seed, the data provider, the sync engine and the
//! sender, and exposes the wallet's state as read-only channels.

pub mod sync;
pub mod types;

pub use sync::{
	Channel, EngineState, SubscriptionId, SyncHandle, SyncOutcome, SyncReport, WalletState,
	WalletSyncEngine,
};
pub use types::*;

use crate::config::{ProviderKind, WalletConfig};
use crate::keys::{AddressType, ChainType, DerivedAddress, Seed, derive_address};
use crate::provider::{
	BlockCypherClient, BlockInfo, BlockchainDataProvider, EsploraClient, TransactionHistoryEntry,
	TransactionStatus, UTxO,
};
use crate::transaction::{TransactionError, TransactionSender};

use std::sync::Arc;
use tracing::info;

/// Build the provider selected by `config`.
pub fn provider_from_config(
	config: &WalletConfig,
) -> Result<Arc<dyn BlockchainDataProvider>, WalletSyncError> {
	let provider: Arc<dyn BlockchainDataProvider> = match config.provider.kind {
		ProviderKind::Esplora => Arc::new(EsploraClient::new(&config.provider, config.network)?),
		ProviderKind::BlockCypher => {
			Arc::new(BlockCypherClient::new(&config.provider, config.network)?)
		}
	};
	Ok(provider)
}

pub struct BitcoinWallet {
	config: WalletConfig,
	provider: Arc<dyn BlockchainDataProvider>,
	addresses: Vec<DerivedAddress>,
	receive_address: DerivedAddress,
	state: WalletState,
	engine: Arc<WalletSyncEngine>,
	sender: TransactionSender,
}

impl BitcoinWallet {
	pub fn new(
		seed: Seed,
		provider: Arc<dyn BlockchainDataProvider>,
		config: WalletConfig,
	) -> Result<Self, WalletSyncError> {
		let network = config.network;

		let addresses = config
			.tracked_address_types
			.iter()
			.map(|address_type| {
				derive_address(
					seed.as_bytes(),
					*address_type,
					ChainType::External,
					0,
					network,
				)
			})
			.collect::<Result<Vec<_>, _>>()?;
		let receive_address = derive_address(
			seed.as_bytes(),
			AddressType::ElectrumNativeSegWit,
			ChainType::External,
			0,
			network,
		)?;

		for address in &addresses {
			info!("Tracking {} address {}", address.address_type, address.address);
		}

		let state = WalletState::new();
		let engine = Arc::new(WalletSyncEngine::new(
			provider.clone(),
			addresses.iter().map(|a| a.address.clone()).collect(),
			config.sync.clone(),
			state.clone(),
		));
		let sender = TransactionSender::new(provider.clone(), seed, network, config.fixed_fee);

		Ok(Self {
			config,
			provider,
			addresses,
			receive_address,
			state,
			engine,
			sender,
		})
	}

	/// Wallet seeded with Electrum's PBKDF2 scheme, using the configured provider.
	pub fn from_electrum_mnemonic(
		mnemonic: &str,
		password: &str,
		config: WalletConfig,
	) -> Result<Self, WalletSyncError> {
		let provider = provider_from_config(&config)?;
		Self::new(Seed::from_electrum_mnemonic(mnemonic, password), provider, config)
	}

	/// Wallet seeded from a BIP39 mnemonic, using the configured provider.
	pub fn from_bip39_mnemonic(
		mnemonic: &str,
		passphrase: &str,
		config: WalletConfig,
	) -> Result<Self, WalletSyncError> {
		let provider = provider_from_config(&config)?;
		Self::new(Seed::from_bip39_mnemonic(mnemonic, passphrase)?, provider, config)
	}

	pub fn network(&self) -> bitcoin::Network {
		self.config.network
	}

	/// Tracked addresses, in tracking order.
	pub fn addresses(&self) -> &[DerivedAddress] {
		&self.addresses
	}

	/// The address payments and change go to.
	pub fn receive_address(&self) -> &str {
		&self.receive_address.address
	}

	pub fn history(&self) -> &Channel<Vec<TransactionHistoryEntry>> {
		&self.state.history
	}

	pub fn utxos(&self) -> &Channel<Vec<UTxO>> {
		&self.state.utxos
	}

	pub fn balance(&self) -> &Channel<u64> {
		&self.state.balance
	}

	pub fn progress(&self) -> &Channel<u8> {
		&self.state.progress
	}

	pub fn engine_state(&self) -> EngineState {
		self.engine.state()
	}

	pub fn last_known_block(&self) -> Option<BlockInfo> {
		self.engine.last_known_block()
	}

	/// Start background polling. Stop it through the returned handle.
	pub fn start_sync(&self) -> SyncHandle {
		self.engine.start()
	}

	/// Run a single sync pass now.
	pub async fn sync_once(&self) -> SyncReport {
		self.engine.poll_once().await
	}

	/// Pay `amount` sats to `address` from the current UTXO snapshot.
	pub async fn send(&self, address: &str, amount: u64) -> Result<String, TransactionError> {
		let utxos = self.state.utxos.get();
		self.sender.send(&utxos, address, amount).await
	}

	pub async fn transaction_status(
		&self,
		transaction_hash: &str,
	) -> Result<TransactionStatus, WalletSyncError> {
		Ok(self.provider.get_transaction_status(transaction_hash).await?)
	}
}
