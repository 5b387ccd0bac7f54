//! Quote signing with a secp256k1 key.
//!
//! Signatures are deterministic (RFC 6979), normalized to low-s, and carry a
//! recovery id so the verifier can derive the signer address with
//! `ecrecover`.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use super::encoding::{QuoteParams, keccak256};
use crate::domain::{Address, QuoteSignature};

/// Offset added to the recovery id to form `v`.
const V_OFFSET: u8 = 27;

/// Errors produced while loading keys, signing or recovering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The private key is not 32 bytes of valid hex or not a valid scalar.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The signing primitive failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signature is malformed or does not recover to a key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Holds the quote signing key and the verifier address quotes are bound to.
pub struct QuoteSigner {
    key: SigningKey,
    address: Address,
    verifier: Address,
}

impl fmt::Debug for QuoteSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteSigner")
            .field("address", &self.address)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl QuoteSigner {
    /// Loads a signer from a hex private key (with or without `0x`).
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the key is malformed.
    pub fn from_hex_key(private_key: &str, verifier: Address) -> Result<Self, SignerError> {
        let digits = private_key.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        let bytes = hex::decode(digits).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self {
            key,
            address,
            verifier,
        })
    }

    /// Address derived from the signing key.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Verifier contract quotes are bound to.
    #[must_use]
    pub const fn verifier(&self) -> Address {
        self.verifier
    }

    /// Signs the personal-message hash of `params`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signing`] if the signing primitive fails.
    pub fn sign(&self, params: &QuoteParams) -> Result<QuoteSignature, SignerError> {
        let prehash = params.signing_hash();
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let (r, s) = signature.split_bytes();
        Ok(QuoteSignature {
            v: V_OFFSET + recovery_id.to_byte(),
            r: r.into(),
            s: s.into(),
        })
    }
}

/// Recovers the address that produced `signature` over `params`.
///
/// # Errors
///
/// Returns [`SignerError::InvalidSignature`] if `v` is out of range or the
/// signature does not recover to a valid key.
pub fn recover_signer(
    params: &QuoteParams,
    signature: &QuoteSignature,
) -> Result<Address, SignerError> {
    let recovery_id = signature
        .v
        .checked_sub(V_OFFSET)
        .and_then(RecoveryId::from_byte)
        .ok_or_else(|| SignerError::InvalidSignature(format!("bad v {}", signature.v)))?;
    let sig = Signature::from_scalars(signature.r, signature.s)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    let key = VerifyingKey::recover_from_prehash(&params.signing_hash(), &sig, recovery_id)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Address of a public key: last 20 bytes of keccak-256 over the uncompressed
/// point without its `0x04` tag.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(point.as_bytes().get(1..).unwrap_or_default());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(hash.split_at(12).1);
    Address::from_bytes(bytes)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use crate::signing::encoding::tests::{address, dai_quote, eth_quote};

    const PRIVATE_KEY: &str = "45571723d6f6fa704623beb284eda724459d76cc68e82b754015d6e7af794cc8";
    const SIGNER: &str = "0x51042c4d8936a7764d18370a6a0762b860bb8e07";
    const VERIFIER: &str = "0x1776651f58a17a50098d31ba3c3cd259c1903f7a";

    fn signer() -> QuoteSigner {
        let Ok(signer) = QuoteSigner::from_hex_key(PRIVATE_KEY, address(VERIFIER)) else {
            panic!("valid key");
        };
        signer
    }

    #[test]
    fn derives_signer_address() {
        assert_eq!(signer().address().to_string(), SIGNER);
        let Ok(prefixed) = QuoteSigner::from_hex_key(&format!("0x{PRIVATE_KEY}"), Address::ZERO)
        else {
            panic!("0x prefix accepted");
        };
        assert_eq!(prefixed.address().to_string(), SIGNER);
    }

    #[test]
    fn eth_signature_matches_vector() {
        let Ok(sig) = signer().sign(&eth_quote()) else {
            panic!("signing succeeds");
        };
        assert_eq!(sig.v, 27);
        assert_eq!(
            sig.r_hex(),
            "0x7aba851e2c955f1e76d45a79b442654ff8b09963234d25936f2d021792b8d61a"
        );
        assert_eq!(
            sig.s_hex(),
            "0x357be423ebb28fa1f49e7498dedc6b1f32f8de4d36ecf5b8b49d0015fd870e8e"
        );
    }

    #[test]
    fn dai_signature_matches_vector() {
        let Ok(sig) = signer().sign(&dai_quote()) else {
            panic!("signing succeeds");
        };
        assert_eq!(sig.v, 28);
        assert_eq!(
            sig.r_hex(),
            "0xa438e812e4c00cb59e768d900668092edec11ae7d833cd86147058b5c0a6754c"
        );
        assert_eq!(
            sig.s_hex(),
            "0x15a1f3790790593f8bd5e00f28a864b7c745cb99dd38e278328848c5fcf3c7ed"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = signer();
        assert_eq!(signer.sign(&eth_quote()), signer.sign(&eth_quote()));
    }

    #[test]
    fn recovery_round_trips() {
        let signer = signer();
        for params in [eth_quote(), dai_quote()] {
            let Ok(sig) = signer.sign(&params) else {
                panic!("signing succeeds");
            };
            assert_eq!(recover_signer(&params, &sig), Ok(signer.address()));
        }
    }

    #[test]
    fn tampering_with_any_field_breaks_recovery() {
        let signer = signer();
        let original = eth_quote();
        let Ok(sig) = signer.sign(&original) else {
            panic!("signing succeeds");
        };
        let tampered = [
            QuoteParams { amount: 1001, ..original },
            QuoteParams { currency: Currency::Dai, ..original },
            QuoteParams { period_days: 101, ..original },
            QuoteParams { contract: Address::ZERO, ..original },
            QuoteParams { price: original.price + 1, ..original },
            QuoteParams { price_in_token: original.price_in_token - 1, ..original },
            QuoteParams { expires_at: original.expires_at + 1, ..original },
            QuoteParams { generated_at_ms: original.generated_at_ms + 1, ..original },
            QuoteParams { verifier: Address::ZERO, ..original },
        ];
        for params in tampered {
            assert_ne!(
                recover_signer(&params, &sig).ok(),
                Some(signer.address()),
                "tampered quote still recovers to signer: {params:?}"
            );
        }
    }

    #[test]
    fn rejects_bad_keys_and_v() {
        assert!(QuoteSigner::from_hex_key("zz", Address::ZERO).is_err());
        assert!(QuoteSigner::from_hex_key(&"00".repeat(32), Address::ZERO).is_err());

        let Ok(mut sig) = signer().sign(&eth_quote()) else {
            panic!("signing succeeds");
        };
        sig.v = 3;
        assert!(matches!(
            recover_signer(&eth_quote(), &sig),
            Err(SignerError::InvalidSignature(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains(PRIVATE_KEY));
        assert!(rendered.contains(SIGNER));
    }
}
