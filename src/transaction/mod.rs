//! Spending from the wallet: coin selection, PSBT assembly, signing and
//! submission.

/// Coin selection and signed transaction assembly
pub mod builder;
/// Submits built transactions through a provider
pub mod sender;

pub use builder::{CoinSelection, SignedTransaction, TransactionBuilder, select_utxos};
pub use sender::TransactionSender;

use crate::keys::{DerivationError, SignerError};
use crate::provider::ProviderError;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
	#[error("No funds available")]
	NoFundsAvailable,

	#[error("Insufficient funds: {required} sats required, {available} sats available")]
	InsufficientFunds { required: u64, available: u64 },

	#[error("Invalid recipient address: {0}")]
	InvalidRecipient(String),

	#[error("Invalid amount: {0}")]
	InvalidAmount(String),

	#[error("Key derivation error: {0}")]
	DerivationError(#[from] DerivationError),

	#[error("Signing error: {0}")]
	SigningError(#[from] SignerError),

	#[error("Transaction build error: {0}")]
	BuildError(String),

	#[error("Provider error: {0}")]
	ProviderError(#[from] ProviderError),
}
