//! Transaction builder
//!
//! Assembles a spending transaction from the wallet's UTXO snapshot as a PSBT:
//! greedy coin selection in list order, one output to the recipient, an
//! optional change output back to the wallet's own P2WPKH script, a BIP143
//! SIGHASH_ALL signature per input, finalization and extraction.
//!
//! All inputs are assumed to pay the spending key's P2WPKH script.

use super::TransactionError;
use crate::config::DEFAULT_FIXED_FEE;
use crate::keys::{AddressType, ChainType, KeyPair, Seed, Signer, derive_key_pair, p2wpkh_script};
use crate::provider::UTxO;

use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
	Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
	Witness,
};
use std::str::FromStr;
use tracing::debug;

/// UTXOs chosen to fund a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
	pub selected: Vec<UTxO>,
	pub input_sum: u64,
	/// `input_sum - amount - fee`; no change output is created when zero
	pub change: u64,
}

/// Pick UTXOs in list order until they cover `amount + fee`.
pub fn select_utxos(utxos: &[UTxO], amount: u64, fee: u64) -> Result<CoinSelection, TransactionError> {
	if utxos.is_empty() {
		return Err(TransactionError::NoFundsAvailable);
	}

	let required = amount
		.checked_add(fee)
		.ok_or_else(|| TransactionError::InvalidAmount(format!("{} sats overflows", amount)))?;

	let mut selected = Vec::new();
	let mut input_sum: u64 = 0;
	for utxo in utxos {
		if input_sum >= required {
			break;
		}
		input_sum = input_sum.saturating_add(utxo.amount);
		selected.push(utxo.clone());
	}

	if input_sum < required {
		return Err(TransactionError::InsufficientFunds {
			required,
			available: input_sum,
		});
	}

	Ok(CoinSelection {
		selected,
		input_sum,
		change: input_sum - required,
	})
}

/// A fully signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub txid: String,
	/// Consensus-serialized transaction, hex encoded
	pub hex: String,
	pub fee: u64,
	pub change: u64,
	pub inputs: usize,
}

/// Builds and signs payments from a single P2WPKH key
pub struct TransactionBuilder {
	key_pair: KeyPair,
	network: Network,
	fee: u64,
}

impl TransactionBuilder {
	pub fn new(key_pair: KeyPair, network: Network) -> Self {
		Self {
			key_pair,
			network,
			fee: DEFAULT_FIXED_FEE,
		}
	}

	/// Builder for the wallet's spending key, `m/0'/0/0` on the Electrum path.
	pub fn from_seed(seed: &Seed, network: Network) -> Result<Self, TransactionError> {
		let key_pair = derive_key_pair(
			seed.as_bytes(),
			AddressType::ElectrumNativeSegWit,
			ChainType::External,
			0,
		)?;
		Ok(Self::new(key_pair, network))
	}

	pub fn with_fee(mut self, fee: u64) -> Self {
		self.fee = fee;
		self
	}

	/// Build and sign a payment of `amount` sats to `recipient`.
	pub fn build(
		&self,
		utxos: &[UTxO],
		recipient: &str,
		amount: u64,
	) -> Result<SignedTransaction, TransactionError> {
		if utxos.is_empty() {
			return Err(TransactionError::NoFundsAvailable);
		}
		if amount == 0 {
			return Err(TransactionError::InvalidAmount(
				"amount must be greater than zero".to_string(),
			));
		}
		let recipient = self.parse_recipient(recipient)?;
		let selection = select_utxos(utxos, amount, self.fee)?;

		debug!(
			"Selected {} inputs worth {} sats, change {} sats",
			selection.selected.len(),
			selection.input_sum,
			selection.change
		);

		let own_script = p2wpkh_script(self.key_pair.public_key());
		let unsigned_tx = self.unsigned_transaction(&selection, &recipient, amount, &own_script)?;

		let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
			.map_err(|e| TransactionError::BuildError(e.to_string()))?;
		for (input, utxo) in psbt.inputs.iter_mut().zip(&selection.selected) {
			input.witness_utxo = Some(TxOut {
				value: Amount::from_sat(utxo.amount),
				script_pubkey: own_script.clone(),
			});
		}

		self.sign(&mut psbt, &selection.selected, &own_script)?;
		self.finalize(&mut psbt)?;

		let tx = psbt
			.extract_tx()
			.map_err(|e| TransactionError::BuildError(e.to_string()))?;

		Ok(SignedTransaction {
			txid: tx.compute_txid().to_string(),
			hex: serialize_hex(&tx),
			fee: self.fee,
			change: selection.change,
			inputs: selection.selected.len(),
		})
	}

	fn parse_recipient(&self, recipient: &str) -> Result<Address, TransactionError> {
		recipient
			.parse::<Address<NetworkUnchecked>>()
			.map_err(|e| TransactionError::InvalidRecipient(format!("{}: {}", recipient, e)))?
			.require_network(self.network)
			.map_err(|e| TransactionError::InvalidRecipient(format!("{}: {}", recipient, e)))
	}

	fn unsigned_transaction(
		&self,
		selection: &CoinSelection,
		recipient: &Address,
		amount: u64,
		own_script: &ScriptBuf,
	) -> Result<Transaction, TransactionError> {
		let input = selection
			.selected
			.iter()
			.map(|utxo| {
				let txid = Txid::from_str(&utxo.tx_id).map_err(|e| {
					TransactionError::BuildError(format!("invalid txid {}: {}", utxo.tx_id, e))
				})?;
				Ok(TxIn {
					previous_output: OutPoint::new(txid, utxo.index),
					script_sig: ScriptBuf::new(),
					sequence: Sequence::MAX,
					witness: Witness::new(),
				})
			})
			.collect::<Result<Vec<_>, TransactionError>>()?;

		let mut output = vec![TxOut {
			value: Amount::from_sat(amount),
			script_pubkey: recipient.script_pubkey(),
		}];
		if selection.change > 0 {
			output.push(TxOut {
				value: Amount::from_sat(selection.change),
				script_pubkey: own_script.clone(),
			});
		}

		Ok(Transaction {
			version: Version::TWO,
			lock_time: LockTime::ZERO,
			input,
			output,
		})
	}

	fn sign(
		&self,
		psbt: &mut Psbt,
		selected: &[UTxO],
		own_script: &ScriptBuf,
	) -> Result<(), TransactionError> {
		let signer = Signer::new(&self.key_pair)?;

		let mut signatures = Vec::with_capacity(selected.len());
		let mut cache = SighashCache::new(&psbt.unsigned_tx);
		for (index, utxo) in selected.iter().enumerate() {
			let sighash = cache
				.p2wpkh_signature_hash(
					index,
					own_script,
					Amount::from_sat(utxo.amount),
					EcdsaSighashType::All,
				)
				.map_err(|e| TransactionError::BuildError(format!("sighash {}: {}", index, e)))?;
			let digest = sighash.to_byte_array();

			let signature = signer.sign(&digest)?;
			if !signer.verify(&digest, &signature)? {
				return Err(TransactionError::BuildError(format!(
					"signature for input {} does not verify",
					index
				)));
			}
			signatures.push(bitcoin::ecdsa::Signature {
				signature,
				sighash_type: EcdsaSighashType::All,
			});
		}

		let public_key = bitcoin::PublicKey::new(signer.public_key().0);
		for (input, signature) in psbt.inputs.iter_mut().zip(signatures) {
			input.partial_sigs.insert(public_key, signature);
		}
		Ok(())
	}

	/// Move each input's signature into its final P2WPKH witness.
	fn finalize(&self, psbt: &mut Psbt) -> Result<(), TransactionError> {
		let public_key = self.key_pair.public_key();
		for (index, input) in psbt.inputs.iter_mut().enumerate() {
			let signature = input
				.partial_sigs
				.values()
				.next()
				.copied()
				.ok_or_else(|| {
					TransactionError::BuildError(format!("input {} is not signed", index))
				})?;

			let mut witness = Witness::new();
			witness.push(signature.to_vec());
			witness.push(public_key.to_bytes());
			input.final_script_witness = Some(witness);
			input.partial_sigs.clear();
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::testing::utxo;
	use bitcoin::consensus::encode::deserialize;

	const MNEMONIC: &str =
		"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
	const OWN_ADDRESS: &str = "bc1qffk6g860zrnp2czg3n258v5qp3ls4cx975zpa3";
	const RECIPIENT: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

	fn builder() -> TransactionBuilder {
		TransactionBuilder::from_seed(
			&Seed::from_electrum_mnemonic(MNEMONIC, ""),
			Network::Bitcoin,
		)
		.unwrap()
	}

	fn utxos(amounts: &[u64]) -> Vec<UTxO> {
		amounts
			.iter()
			.enumerate()
			.map(|(i, amount)| utxo(i as u8 + 1, *amount, OWN_ADDRESS))
			.collect()
	}

	fn decode(hex_tx: &str) -> Transaction {
		deserialize(&hex::decode(hex_tx).unwrap()).unwrap()
	}

	#[test]
	fn test_greedy_selection_in_list_order() {
		let funds = utxos(&[10_000, 5_000, 3_000]);

		let selection = select_utxos(&funds, 8_000, 500).unwrap();
		assert_eq!(selection.selected, funds[..1].to_vec());
		assert_eq!(selection.input_sum, 10_000);
		assert_eq!(selection.change, 1_500);

		let selection = select_utxos(&funds, 12_000, 500).unwrap();
		assert_eq!(selection.selected, funds[..2].to_vec());
		assert_eq!(selection.input_sum, 15_000);
		assert_eq!(selection.change, 2_500);

		let selection = select_utxos(&funds, 17_500, 500).unwrap();
		assert_eq!(selection.selected, funds);
		assert_eq!(selection.change, 0);
	}

	#[test]
	fn test_selection_errors() {
		assert!(matches!(
			select_utxos(&[], 1_000, 500),
			Err(TransactionError::NoFundsAvailable)
		));
		assert!(matches!(
			select_utxos(&utxos(&[150, 250]), 500, 500),
			Err(TransactionError::InsufficientFunds {
				required: 1_000,
				available: 400
			})
		));
	}

	#[test]
	fn test_single_input_covers_payment() {
		let signed = builder()
			.build(&utxos(&[10_000, 5_000, 3_000]), RECIPIENT, 8_000)
			.unwrap();

		assert_eq!(signed.inputs, 1);
		assert_eq!(signed.change, 1_500);

		let tx = decode(&signed.hex);
		assert_eq!(tx.input.len(), 1);
		assert_eq!(tx.input[0].previous_output.txid.to_string(), hex::encode([1u8; 32]));
		assert_eq!(tx.output[1].value, Amount::from_sat(1_500));
	}

	#[test]
	fn test_builds_payment_with_change() {
		let signed = builder()
			.build(&utxos(&[10_000, 5_000, 3_000]), RECIPIENT, 12_000)
			.unwrap();

		assert_eq!(signed.inputs, 2);
		assert_eq!(signed.change, 2_500);
		assert_eq!(signed.fee, 500);

		let tx = decode(&signed.hex);
		assert_eq!(tx.compute_txid().to_string(), signed.txid);
		assert_eq!(tx.input.len(), 2);
		assert_eq!(tx.output.len(), 2);

		let recipient = Address::from_str(RECIPIENT).unwrap().assume_checked();
		assert_eq!(tx.output[0].value, Amount::from_sat(12_000));
		assert_eq!(tx.output[0].script_pubkey, recipient.script_pubkey());
		assert_eq!(tx.output[1].value, Amount::from_sat(2_500));
		assert_eq!(
			Address::from_script(&tx.output[1].script_pubkey, Network::Bitcoin)
				.unwrap()
				.to_string(),
			OWN_ADDRESS
		);

		let public_key =
			hex::decode("02167a18bb28e3e700cbfd9b520d1857f6a379f2d9b24d24d9bf7928876f31db59").unwrap();
		for input in &tx.input {
			assert_eq!(input.witness.len(), 2);
			assert_eq!(input.witness.nth(1).unwrap(), public_key.as_slice());
			assert!(input.script_sig.is_empty());
		}
	}

	#[test]
	fn test_exact_amount_has_no_change_output() {
		let signed = builder().build(&utxos(&[8_500]), RECIPIENT, 8_000).unwrap();

		assert_eq!(signed.change, 0);
		assert_eq!(decode(&signed.hex).output.len(), 1);
	}

	#[test]
	fn test_one_sat_left_still_produces_change() {
		let signed = builder().build(&utxos(&[8_501]), RECIPIENT, 8_000).unwrap();

		let tx = decode(&signed.hex);
		assert_eq!(tx.output.len(), 2);
		assert_eq!(tx.output[1].value, Amount::from_sat(1));
	}

	#[test]
	fn test_build_is_deterministic() {
		let funds = utxos(&[20_000, 7_000]);
		let first = builder().build(&funds, RECIPIENT, 21_000).unwrap();
		let second = builder().build(&funds, RECIPIENT, 21_000).unwrap();

		assert_eq!(first, second);
	}

	#[test]
	fn test_rejects_bad_recipient_and_amount() {
		let funds = utxos(&[10_000]);
		let builder = builder();

		assert!(matches!(
			builder.build(&funds, "not-an-address", 1_000),
			Err(TransactionError::InvalidRecipient(_))
		));
		assert!(matches!(
			builder.build(&funds, "tb1qcr8te4kr609gcawutmrza0j4xv80jy8zmfp6l0", 1_000),
			Err(TransactionError::InvalidRecipient(_))
		));
		assert!(matches!(
			builder.build(&funds, RECIPIENT, 0),
			Err(TransactionError::InvalidAmount(_))
		));
	}

	#[test]
	fn test_empty_wallet_reports_no_funds_first() {
		let builder = builder();

		assert!(matches!(
			builder.build(&[], RECIPIENT, 0),
			Err(TransactionError::NoFundsAvailable)
		));
		assert!(matches!(
			builder.build(&[], "not-an-address", 1_000),
			Err(TransactionError::NoFundsAvailable)
		));
	}

	#[test]
	fn test_custom_fee() {
		let signed = builder()
			.with_fee(1_000)
			.build(&utxos(&[10_000]), RECIPIENT, 8_000)
			.unwrap();

		assert_eq!(signed.fee, 1_000);
		assert_eq!(signed.change, 1_000);
	}
}
