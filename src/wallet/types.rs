use crate::keys::DerivationError;
use crate::provider::ProviderError;

/// Errors raised while setting up or querying the wallet
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Provider error: {0}")]
	ProviderError(#[from] ProviderError),

	#[error("Derivation error: {0}")]
	DerivationError(#[from] DerivationError),
}
