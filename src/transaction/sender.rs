//!
//! Transaction sender.
//!
//! Re-derives the spending key, builds and signs the payment over a UTXO
//! snapshot, and hands the raw transaction to the provider. Submission is
//! attempted exactly once; the result surfaces through the next sync pass.

use super::{TransactionBuilder, TransactionError};
use crate::keys::Seed;
use crate::provider::{BlockchainDataProvider, UTxO};
use crate::utils::format_btc_amount;

use bitcoin::Network;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct TransactionSender {
	provider: Arc<dyn BlockchainDataProvider>,
	seed: Seed,
	network: Network,
	fee: u64,
}

impl TransactionSender {
	pub fn new(
		provider: Arc<dyn BlockchainDataProvider>,
		seed: Seed,
		network: Network,
		fee: u64,
	) -> Self {
		Self {
			provider,
			seed,
			network,
			fee,
		}
	}

	/// Send `amount` sats to `recipient`, returning the provider's txid.
	pub async fn send(
		&self,
		utxos: &[UTxO],
		recipient: &str,
		amount: u64,
	) -> Result<String, TransactionError> {
		info!(
			"Sending {} to {} from {} UTXOs",
			format_btc_amount(amount),
			recipient,
			utxos.len()
		);

		match self.build_and_submit(utxos, recipient, amount).await {
			Ok(txid) => {
				info!("Transaction {} submitted", txid);
				Ok(txid)
			}
			Err(e) => {
				error!("Failed to send {} sats to {}: {}", amount, recipient, e);
				Err(e)
			}
		}
	}

	async fn build_and_submit(
		&self,
		utxos: &[UTxO],
		recipient: &str,
		amount: u64,
	) -> Result<String, TransactionError> {
		let signed = TransactionBuilder::from_seed(&self.seed, self.network)?
			.with_fee(self.fee)
			.build(utxos, recipient, amount)?;

		debug!(
			"Built transaction {} with {} inputs, fee {} sats, change {} sats",
			signed.txid, signed.inputs, signed.fee, signed.change
		);

		Ok(self.provider.submit_transaction(&signed.hex).await?)
	}
}
