//!
//! Deterministic key derivation for the wallet.
//!
//! Keys are derived with BIP32 from a seed along a fixed path per
//! [`AddressType`]. Two seed schemes are supported:
//!
//! - BIP39: PBKDF2-HMAC-SHA512 over the mnemonic with salt `"mnemonic" + passphrase`,
//!   validated against the BIP39 word list and checksum;
//! - Electrum: PBKDF2-HMAC-SHA512 over the mnemonic with salt `"electrum" + password`,
//!   2048 rounds, no word list or checksum. Wallets spending from
//!   [`AddressType::ElectrumNativeSegWit`] must be seeded this way.
//!
//! Nothing in this module is random except [`generate_mnemonic`]; the same
//! inputs always produce byte-identical keys.

/// Address encoding for derived public keys
pub mod address;
/// Deterministic ECDSA signing
pub mod signer;

pub use address::{DerivedAddress, derive_address, derive_address_by_type, p2wpkh_script};
pub use signer::{Signer, SignerError};

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{CompressedPublicKey, Network};
use rand::Rng;
use sha2::Sha512;
use std::str::FromStr;
use std::sync::LazyLock;
use zeroize::Zeroizing;

/// Shared secp256k1 context; building one is expensive.
pub(crate) static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

/// PBKDF2 rounds used by Electrum's seed derivation.
pub const ELECTRUM_PBKDF2_ROUNDS: u32 = 2048;

/// Errors raised while deriving seeds, keys or addresses
#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
	#[error("Derivation error: {0}")]
	Derivation(String),

	#[error("Derived key has no private component")]
	MissingPrivateKey,

	#[error("Unsupported address type: {0}")]
	UnsupportedAddressType(String),

	#[error("Invalid public key: {0}")]
	InvalidPublicKey(String),

	#[error("Invalid mnemonic: {0}")]
	InvalidMnemonic(String),
}

/// Address scheme, selecting both the derivation path and the output script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
	/// P2PKH on `m/44'/0'/0'`
	Legacy,
	/// P2SH-wrapped P2WPKH on `m/49'/0'/0'`
	SegWit,
	/// P2WPKH on `m/84'/0'/0'`
	NativeSegWit,
	/// P2TR key-path on `m/86'/0'/0'`
	Taproot,
	/// P2WPKH on Electrum's `m/0'`
	ElectrumNativeSegWit,
}

impl AddressType {
	pub const ALL: [AddressType; 5] = [
		AddressType::Legacy,
		AddressType::SegWit,
		AddressType::NativeSegWit,
		AddressType::Taproot,
		AddressType::ElectrumNativeSegWit,
	];

	/// Hardened account-level path prefix.
	pub fn path_prefix(&self) -> &'static str {
		match self {
			AddressType::Legacy => "m/44'/0'/0'",
			AddressType::SegWit => "m/49'/0'/0'",
			AddressType::NativeSegWit => "m/84'/0'/0'",
			AddressType::Taproot => "m/86'/0'/0'",
			AddressType::ElectrumNativeSegWit => "m/0'",
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			AddressType::Legacy => "legacy",
			AddressType::SegWit => "segwit",
			AddressType::NativeSegWit => "native-segwit",
			AddressType::Taproot => "taproot",
			AddressType::ElectrumNativeSegWit => "electrum-native-segwit",
		}
	}
}

impl std::fmt::Display for AddressType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for AddressType {
	type Err = DerivationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"legacy" | "p2pkh" => Ok(AddressType::Legacy),
			"segwit" | "p2sh-p2wpkh" => Ok(AddressType::SegWit),
			"native-segwit" | "p2wpkh" => Ok(AddressType::NativeSegWit),
			"taproot" | "p2tr" => Ok(AddressType::Taproot),
			"electrum-native-segwit" | "electrum" => Ok(AddressType::ElectrumNativeSegWit),
			other => Err(DerivationError::UnsupportedAddressType(other.to_string())),
		}
	}
}

/// Receiving or change sub-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainType {
	External,
	Internal,
}

impl ChainType {
	/// Path component selecting the sub-chain.
	pub fn index(&self) -> u32 {
		match self {
			ChainType::External => 0,
			ChainType::Internal => 1,
		}
	}
}

/// Wallet seed bytes, wiped from memory on drop.
#[derive(Clone)]
pub struct Seed(Zeroizing<Vec<u8>>);

impl Seed {
	pub fn from_bytes(bytes: &[u8]) -> Self {
		Self(Zeroizing::new(bytes.to_vec()))
	}

	/// Electrum-style seed from a mnemonic and optional password.
	pub fn from_electrum_mnemonic(mnemonic: &str, password: &str) -> Self {
		let seed = derive_electrum_seed(mnemonic, password);
		Self::from_bytes(&seed[..])
	}

	/// Standard BIP39 seed; fails if the mnemonic is not a valid BIP39 phrase.
	pub fn from_bip39_mnemonic(mnemonic: &str, passphrase: &str) -> Result<Self, DerivationError> {
		let seed = derive_bip39_seed(mnemonic, passphrase)?;
		Ok(Self::from_bytes(&seed[..]))
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl std::fmt::Debug for Seed {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("Seed(<redacted>)")
	}
}

/// A derived key pair. The private half is wiped from memory on drop.
#[derive(Clone)]
pub struct KeyPair {
	public_key: CompressedPublicKey,
	private_key: Option<Zeroizing<[u8; 32]>>,
}

impl KeyPair {
	/// A key pair that can verify but not sign.
	pub fn public_only(public_key: CompressedPublicKey) -> Self {
		Self {
			public_key,
			private_key: None,
		}
	}

	pub fn public_key(&self) -> &CompressedPublicKey {
		&self.public_key
	}

	/// 33-byte SEC1 compressed encoding of the public key.
	pub fn public_key_bytes(&self) -> [u8; 33] {
		self.public_key.to_bytes()
	}

	/// 32-byte private scalar, if this pair carries one.
	pub fn private_key(&self) -> Option<&[u8; 32]> {
		self.private_key.as_deref()
	}
}

impl std::fmt::Debug for KeyPair {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyPair")
			.field("public_key", &self.public_key)
			.field("has_private_key", &self.private_key.is_some())
			.finish()
	}
}

/// Full BIP32 path for an address type, sub-chain and index.
pub fn derivation_path(
	address_type: AddressType,
	chain: ChainType,
	index: u32,
) -> Result<DerivationPath, DerivationError> {
	let path = format!("{}/{}/{}", address_type.path_prefix(), chain.index(), index);
	DerivationPath::from_str(&path)
		.map_err(|e| DerivationError::Derivation(format!("invalid path {}: {}", path, e)))
}

/// Derive the key pair at `(address_type, chain, index)` from `seed`.
pub fn derive_key_pair(
	seed: &[u8],
	address_type: AddressType,
	chain: ChainType,
	index: u32,
) -> Result<KeyPair, DerivationError> {
	let path = derivation_path(address_type, chain, index)?;

	// The network only affects xpriv serialization, never the derived keys.
	let master = Xpriv::new_master(Network::Bitcoin, seed)
		.map_err(|e| DerivationError::Derivation(format!("master key: {}", e)))?;
	let child = master
		.derive_priv(&*SECP, &path)
		.map_err(|e| DerivationError::Derivation(format!("{}: {}", path, e)))?;

	let secret_key = child.private_key;
	Ok(KeyPair {
		public_key: CompressedPublicKey(secret_key.public_key(&*SECP)),
		private_key: Some(Zeroizing::new(secret_key.secret_bytes())),
	})
}

pub fn derive_public_key(
	seed: &[u8],
	address_type: AddressType,
	chain: ChainType,
	index: u32,
) -> Result<[u8; 33], DerivationError> {
	Ok(derive_key_pair(seed, address_type, chain, index)?.public_key_bytes())
}

pub fn derive_private_key(
	seed: &[u8],
	address_type: AddressType,
	chain: ChainType,
	index: u32,
) -> Result<Zeroizing<[u8; 32]>, DerivationError> {
	let key_pair = derive_key_pair(seed, address_type, chain, index)?;
	key_pair
		.private_key()
		.map(|key| Zeroizing::new(*key))
		.ok_or(DerivationError::MissingPrivateKey)
}

/// Electrum seed: PBKDF2-HMAC-SHA512, 2048 rounds, salt `"electrum" + password`.
///
/// This is not BIP39. The mnemonic is used verbatim and is not checked against
/// any word list.
pub fn derive_electrum_seed(mnemonic: &str, password: &str) -> Zeroizing<[u8; 64]> {
	let salt = format!("electrum{}", password);
	let mut seed = Zeroizing::new([0u8; 64]);
	pbkdf2::pbkdf2_hmac::<Sha512>(
		mnemonic.as_bytes(),
		salt.as_bytes(),
		ELECTRUM_PBKDF2_ROUNDS,
		&mut seed[..],
	);
	seed
}

/// Standard BIP39 seed for a valid mnemonic.
pub fn derive_bip39_seed(
	mnemonic: &str,
	passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, DerivationError> {
	let mnemonic = Mnemonic::parse_normalized(mnemonic)
		.map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
	Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

/// Generate a fresh BIP39 mnemonic of 12, 15, 18, 21 or 24 words.
pub fn generate_mnemonic(word_count: usize) -> Result<String, DerivationError> {
	if !(12..=24).contains(&word_count) || word_count % 3 != 0 {
		return Err(DerivationError::InvalidMnemonic(format!(
			"unsupported word count {}",
			word_count
		)));
	}

	let mut entropy = Zeroizing::new(vec![0u8; word_count / 3 * 4]);
	rand::rng().fill(entropy.as_mut_slice());

	let mnemonic = Mnemonic::from_entropy(&entropy)
		.map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
	Ok(mnemonic.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	pub(crate) const TEST_MNEMONIC: &str =
		"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

	const ELECTRUM_SEED_HEX: &str = "b24af40d049942cb7e7ea70ce919f5e665782a751ee51fb372bb13b76b1bbca307bc4c12dca4baa037e7cfe915ff7bc02167abe97a5bdc2766f8878c54c59fc4";

	#[test]
	fn test_electrum_seed_known_vector() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "");
		assert_eq!(hex::encode(&seed[..]), ELECTRUM_SEED_HEX);
	}

	#[test]
	fn test_electrum_seed_password_changes_salt() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "TREZOR");
		assert_eq!(
			hex::encode(&seed[..]),
			"317b7687986a4565c9903dbddad9bd89fcf206f75863f2d15948b16e6568f65149e2d70b675c0a31157228da05a2a50f8dd1c00cf541dff120e8867904beac05"
		);
	}

	#[test]
	fn test_electrum_seed_differs_from_bip39() {
		let electrum = derive_electrum_seed(TEST_MNEMONIC, "");
		let bip39 = derive_bip39_seed(TEST_MNEMONIC, "").unwrap();
		assert_eq!(
			hex::encode(&bip39[..]),
			"5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
		);
		assert_ne!(&electrum[..], &bip39[..]);
	}

	#[test]
	fn test_derivation_is_deterministic() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "");
		for address_type in AddressType::ALL {
			for chain in [ChainType::External, ChainType::Internal] {
				let first = derive_key_pair(&seed[..], address_type, chain, 3).unwrap();
				let second = derive_key_pair(&seed[..], address_type, chain, 3).unwrap();
				assert_eq!(first.public_key_bytes(), second.public_key_bytes());
				assert_eq!(first.private_key(), second.private_key());
			}
		}
	}

	#[test]
	fn test_known_bip84_key() {
		let seed = derive_bip39_seed(TEST_MNEMONIC, "").unwrap();
		let key_pair =
			derive_key_pair(&seed[..], AddressType::NativeSegWit, ChainType::External, 0).unwrap();
		assert_eq!(
			hex::encode(key_pair.public_key_bytes()),
			"0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
		);
		assert_eq!(
			hex::encode(key_pair.private_key().unwrap()),
			"4604b4b710fe91f584fff084e1a9159fe4f8408fff380596a604948474ce4fa3"
		);
	}

	#[test]
	fn test_known_electrum_key() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "");
		let public_key = derive_public_key(
			&seed[..],
			AddressType::ElectrumNativeSegWit,
			ChainType::External,
			0,
		)
		.unwrap();
		let private_key = derive_private_key(
			&seed[..],
			AddressType::ElectrumNativeSegWit,
			ChainType::External,
			0,
		)
		.unwrap();
		assert_eq!(
			hex::encode(public_key),
			"02167a18bb28e3e700cbfd9b520d1857f6a379f2d9b24d24d9bf7928876f31db59"
		);
		assert_eq!(
			hex::encode(&private_key[..]),
			"3136ee67e3724e3178a445cd7c75770030e9a4a25e52ea4734869060a68f98b6"
		);
	}

	#[test]
	fn test_chain_selects_distinct_keys() {
		let seed = derive_bip39_seed(TEST_MNEMONIC, "").unwrap();
		let external =
			derive_public_key(&seed[..], AddressType::NativeSegWit, ChainType::External, 0).unwrap();
		let internal =
			derive_public_key(&seed[..], AddressType::NativeSegWit, ChainType::Internal, 0).unwrap();
		assert_eq!(
			hex::encode(internal),
			"03025324888e429ab8e3dbaf1f7802648b9cd01e9b418485c5fa4c1b9b5700e1a6"
		);
		assert_ne!(external, internal);
	}

	#[test]
	fn test_derivation_paths() {
		assert_eq!(
			derivation_path(AddressType::Taproot, ChainType::Internal, 7).unwrap(),
			DerivationPath::from_str("m/86'/0'/0'/1/7").unwrap()
		);
		assert_eq!(
			derivation_path(AddressType::ElectrumNativeSegWit, ChainType::External, 0).unwrap(),
			DerivationPath::from_str("m/0'/0/0").unwrap()
		);
	}

	#[test]
	fn test_hardened_range_index_is_rejected() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "");
		let result = derive_key_pair(&seed[..], AddressType::Legacy, ChainType::External, 1 << 31);
		assert!(matches!(result, Err(DerivationError::Derivation(_))));
	}

	#[test]
	fn test_address_type_parsing() {
		assert_eq!("p2tr".parse::<AddressType>().unwrap(), AddressType::Taproot);
		assert_eq!(
			"Native-SegWit".parse::<AddressType>().unwrap(),
			AddressType::NativeSegWit
		);
		assert!(matches!(
			"p2wsh".parse::<AddressType>(),
			Err(DerivationError::UnsupportedAddressType(_))
		));
		for address_type in AddressType::ALL {
			assert_eq!(
				address_type.to_string().parse::<AddressType>().unwrap(),
				address_type
			);
		}
	}

	#[test]
	fn test_generated_mnemonic_is_valid_bip39() {
		let mnemonic = generate_mnemonic(12).unwrap();
		assert_eq!(mnemonic.split_whitespace().count(), 12);
		assert!(derive_bip39_seed(&mnemonic, "").is_ok());
		assert!(generate_mnemonic(13).is_err());
	}

	#[test]
	fn test_invalid_bip39_mnemonic() {
		let result = Seed::from_bip39_mnemonic("abandon abandon abandon", "");
		assert!(matches!(result, Err(DerivationError::InvalidMnemonic(_))));
	}

	#[test]
	fn test_public_only_key_pair_has_no_private_key() {
		let seed = derive_electrum_seed(TEST_MNEMONIC, "");
		let key_pair =
			derive_key_pair(&seed[..], AddressType::Legacy, ChainType::External, 0).unwrap();
		let public_only = KeyPair::public_only(*key_pair.public_key());
		assert!(public_only.private_key().is_none());
		assert!(format!("{:?}", key_pair).contains("has_private_key: true"));
	}
}
