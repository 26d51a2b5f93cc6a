//! Core of a single-address HD Bitcoin wallet.
//!
//! - [`keys`]: BIP32 key derivation, BIP39 and Electrum seeds, address
//!   encoding and signing.
//! - [`provider`]: the blockchain data interface and its REST backends.
//! - [`wallet`]: the polling sync engine and the [`BitcoinWallet`] facade.
//! - [`transaction`]: coin selection, PSBT assembly, signing and submission.

pub mod config;
pub mod keys;
pub mod provider;
pub mod transaction;
pub mod utils;
pub mod wallet;

pub use config::{ProviderConfig, ProviderKind, SyncConfig, WalletConfig};
pub use wallet::BitcoinWallet;
