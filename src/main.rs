use btc_wallet_sync::utils::{format_btc_amount, format_btc_delta};
use btc_wallet_sync::{BitcoinWallet, ProviderKind, SyncConfig, WalletConfig};

use bitcoin::Network;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Build the wallet configuration from `WALLET_*` environment variables.
fn config_from_env() -> Result<WalletConfig, String> {
	let mut config = WalletConfig::default();

	if let Ok(network) = std::env::var("WALLET_NETWORK") {
		let network = Network::from_str(&network)
			.map_err(|e| format!("invalid WALLET_NETWORK '{}': {}", network, e))?;
		config = config.with_network(network);
	}

	if let Ok(kind) = std::env::var("WALLET_PROVIDER") {
		let kind = ProviderKind::from_str(&kind)?;
		config.provider = config.provider.with_kind(kind);
	}

	if let Ok(secs) = std::env::var("WALLET_POLL_SECS") {
		let secs: u64 = secs
			.parse()
			.map_err(|e| format!("invalid WALLET_POLL_SECS '{}': {}", secs, e))?;
		config = config.with_sync(SyncConfig::default().with_poll_interval(Duration::from_secs(secs)));
	}

	Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info,btc_wallet_sync=debug")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet sync service");

	let config = match config_from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};

	let Ok(mnemonic) = std::env::var("WALLET_MNEMONIC") else {
		error!("WALLET_MNEMONIC is not set");
		return;
	};

	let wallet = match BitcoinWallet::from_electrum_mnemonic(&mnemonic, "", config) {
		Ok(wallet) => wallet,
		Err(e) => {
			error!("Failed to create wallet: {}", e);
			return;
		}
	};

	info!(
		"Wallet on {} receiving at {}",
		wallet.network(),
		wallet.receive_address()
	);

	wallet
		.balance()
		.subscribe(|balance| info!("Balance: {}", format_btc_amount(*balance)));
	wallet
		.progress()
		.subscribe(|progress| info!("Sync progress: {}%", progress));
	wallet.history().subscribe(|history| {
		for entry in history.iter().take(5) {
			info!(
				"  {} {} ({}, {} confirmations)",
				entry.transaction_hash,
				format_btc_delta(entry.delta),
				entry.status,
				entry.confirmations
			);
		}
	});

	let handle = wallet.start_sync();

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	handle.stop();
	info!("Wallet sync service stopped");
}
