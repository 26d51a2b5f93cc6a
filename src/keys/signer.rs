use super::{KeyPair, SECP};
use bitcoin::CompressedPublicKey;
use bitcoin::secp256k1::{Message, SecretKey, ecdsa::Signature};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
	#[error("Digest must be 32 bytes, got {0}")]
	InvalidDigestLength(usize),

	#[error("Key pair has no private key")]
	MissingPrivateKey,

	#[error("Invalid private key: {0}")]
	InvalidPrivateKey(String),
}

/// Deterministic (RFC 6979) ECDSA signer over a single key pair.
pub struct Signer {
	secret_key: SecretKey,
	public_key: CompressedPublicKey,
}

impl Signer {
	pub fn new(key_pair: &KeyPair) -> Result<Self, SignerError> {
		let private_key = key_pair.private_key().ok_or(SignerError::MissingPrivateKey)?;
		let secret_key = SecretKey::from_slice(private_key)
			.map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;

		Ok(Self {
			secret_key,
			public_key: *key_pair.public_key(),
		})
	}

	pub fn public_key(&self) -> &CompressedPublicKey {
		&self.public_key
	}

	/// Sign a 32-byte digest.
	pub fn sign(&self, digest: &[u8]) -> Result<Signature, SignerError> {
		let message = to_message(digest)?;
		Ok(SECP.sign_ecdsa(&message, &self.secret_key))
	}

	/// Check `signature` over `digest` against this signer's public key.
	pub fn verify(&self, digest: &[u8], signature: &Signature) -> Result<bool, SignerError> {
		let message = to_message(digest)?;
		Ok(SECP
			.verify_ecdsa(&message, signature, &self.public_key.0)
			.is_ok())
	}
}

impl Drop for Signer {
	fn drop(&mut self) {
		self.secret_key.non_secure_erase();
	}
}

fn to_message(digest: &[u8]) -> Result<Message, SignerError> {
	let digest: [u8; 32] = digest
		.try_into()
		.map_err(|_| SignerError::InvalidDigestLength(digest.len()))?;
	Ok(Message::from_digest(digest))
}
