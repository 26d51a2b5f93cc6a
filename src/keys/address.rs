use super::{AddressType, ChainType, DerivationError, SECP, derivation_path, derive_key_pair};
use bitcoin::bip32::DerivationPath;
use bitcoin::{Address, CompressedPublicKey, Network, ScriptBuf};

/// An address together with how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
	pub address: String,
	pub address_type: AddressType,
	pub derivation_path: DerivationPath,
}

fn parse_public_key(public_key: &[u8]) -> Result<CompressedPublicKey, DerivationError> {
	CompressedPublicKey::from_slice(public_key)
		.map_err(|e| DerivationError::InvalidPublicKey(e.to_string()))
}

/// Encode a compressed public key as an address of the given type.
pub fn derive_address_by_type(
	public_key: &[u8],
	address_type: AddressType,
	network: Network,
) -> Result<String, DerivationError> {
	let public_key = parse_public_key(public_key)?;

	let address = match address_type {
		AddressType::Legacy => Address::p2pkh(public_key.pubkey_hash(), network),
		AddressType::SegWit => Address::p2shwpkh(&public_key, network),
		AddressType::NativeSegWit | AddressType::ElectrumNativeSegWit => {
			Address::p2wpkh(&public_key, network)
		}
		AddressType::Taproot => {
			let (internal_key, _parity) = public_key.0.x_only_public_key();
			Address::p2tr(&*SECP, internal_key, None, network)
		}
	};

	Ok(address.to_string())
}

/// Derive the key at `(address_type, chain, index)` and encode its address.
pub fn derive_address(
	seed: &[u8],
	address_type: AddressType,
	chain: ChainType,
	index: u32,
	network: Network,
) -> Result<DerivedAddress, DerivationError> {
	let key_pair = derive_key_pair(seed, address_type, chain, index)?;
	let address = derive_address_by_type(&key_pair.public_key_bytes(), address_type, network)?;

	Ok(DerivedAddress {
		address,
		address_type,
		derivation_path: derivation_path(address_type, chain, index)?,
	})
}

/// P2WPKH output script paying to `public_key`.
pub fn p2wpkh_script(public_key: &CompressedPublicKey) -> ScriptBuf {
	ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash())
}
