//! Operator wallet and legacy transfer signing

use crate::error::ChainError;
use drip_common::{Address, TxHash};
use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use std::fmt;

/// A native-currency transfer from the operator wallet, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub nonce: u64,
    pub to: Address,
    /// Value in wei
    pub value: u128,
    /// Gas price in wei
    pub gas_price: u128,
    pub gas_limit: u64,
}

/// RLP-encoded signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

impl SignedTransfer {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Big-endian bytes without leading zeros, as RLP wants integers.
fn minimal_be(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

impl TransferRequest {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&minimal_be(&self.gas_price.to_be_bytes()));
        stream.append(&self.gas_limit);
        stream.append(&self.to.0.to_vec());
        stream.append(&minimal_be(&self.value.to_be_bytes()));
        stream.append(&Vec::<u8>::new()); // data
    }

    /// EIP-155 signing payload: the six fields followed by (chain_id, 0, 0).
    pub fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        let mut stream = RlpStream::new();
        stream.begin_list(9);
        self.append_fields(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        stream.out().to_vec()
    }
}

/// The faucet's funded account. The key stays in memory for the process lifetime.
pub struct OperatorWallet {
    signing_key: SigningKey,
    address: Address,
}

impl fmt::Debug for OperatorWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl OperatorWallet {
    pub fn from_private_key(private_key: &str) -> Result<Self, ChainError> {
        let trimmed = private_key.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let key_bytes = hex::decode(key_hex)
            .map_err(|e| ChainError::Signing(format!("Invalid private key: {}", e)))?;

        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| ChainError::Signing(format!("Invalid signing key: {}", e)))?;

        // Address is the last 20 bytes of keccak(uncompressed pubkey without 0x04).
        let public_key = signing_key.verifying_key().to_encoded_point(false);
        let hash = keccak_hash::keccak(&public_key.as_bytes()[1..]);
        let mut addr_bytes = [0u8; 20];
        addr_bytes.copy_from_slice(&hash.0[12..]);

        Ok(Self {
            signing_key,
            address: Address(addr_bytes),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `transfer` as an EIP-155 legacy transaction.
    pub fn sign_transfer(&self, transfer: &TransferRequest, chain_id: u64) -> Result<SignedTransfer, ChainError> {
        let sighash = keccak_hash::keccak(transfer.signing_payload(chain_id));

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&sighash.0)
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + recovery_id.to_byte() as u64))
            .ok_or_else(|| ChainError::Signing(format!("chain id {} out of range", chain_id)))?;
        let r: [u8; 32] = signature.r().to_bytes().into();
        let s: [u8; 32] = signature.s().to_bytes().into();

        let mut stream = RlpStream::new();
        stream.begin_list(9);
        transfer.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&minimal_be(&r));
        stream.append(&minimal_be(&s));

        let raw = stream.out().to_vec();
        let hash = TxHash(keccak_hash::keccak(&raw).0);

        Ok(SignedTransfer { raw, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip155_transfer() -> TransferRequest {
        TransferRequest {
            nonce: 9,
            to: "0x3535353535353535353535353535353535353535".parse().unwrap(),
            value: 1_000_000_000_000_000_000,
            gas_price: 20_000_000_000,
            gas_limit: 21000,
        }
    }

    #[test]
    fn test_address_derivation() {
        let wallet = OperatorWallet::from_private_key(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            wallet.address().to_checksum(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(matches!(
            OperatorWallet::from_private_key("0xnothex"),
            Err(ChainError::Signing(_))
        ));
        assert!(matches!(
            OperatorWallet::from_private_key("0x00"),
            Err(ChainError::Signing(_))
        ));
    }

    #[test]
    fn test_eip155_signing_payload() {
        let payload = eip155_transfer().signing_payload(1);
        assert_eq!(
            hex::encode(&payload),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(keccak_hash::keccak(&payload).0),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_transaction() {
        let wallet = OperatorWallet::from_private_key(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        assert_eq!(
            wallet.address().to_checksum(),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"
        );

        let signed = wallet.sign_transfer(&eip155_transfer(), 1).unwrap();
        assert_eq!(
            signed.raw_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.hash, TxHash(keccak_hash::keccak(&signed.raw).0));
    }

    #[test]
    fn test_large_chain_id_fits() {
        let wallet = OperatorWallet::from_private_key(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        // Sepolia
        let signed = wallet.sign_transfer(&eip155_transfer(), 11_155_111).unwrap();
        assert!(!signed.raw.is_empty());
    }

    #[test]
    fn test_debug_hides_key() {
        let wallet = OperatorWallet::from_private_key(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let rendered = format!("{:?}", wallet);
        assert!(!rendered.contains("4646"));
    }
}
