//! # Rate-Limited Tokens
//!
//! The rate-limited issuance protocol combines three cryptographic layers
//! that share a single wire message:
//!
//!  - a blind RSA signature over the token authenticator input,
//!  - an ECDSA signature under a blinded P-384 key, from which a mediating
//!    attester can derive a stable per-client, per-origin index, and
//!  - an HPKE envelope that carries the origin name to the issuer, bound to
//!    the issuer configuration through the AAD.
//!
//! [`client`] assembles token requests and finalizes tokens, [`server`]
//! evaluates requests, and [`attester`] computes origin indices from
//! blinded request keys.

use hpke::{
    aead::{Aead, AesGcm128},
    kdf::{HkdfSha256, Kdf},
    kem::X25519HkdfSha256,
    Kem, Serializable,
};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use typenum::U256;

use crate::{auth::authorize::Token, TokenType, TruncatedTokenKeyId};

pub mod attester;
pub mod blinding;
pub mod client;
pub mod server;

mod envelope;
mod request;
mod response;

pub use blind_rsa_signatures::PublicKey;
pub use request::{OriginTokenRequest, RateLimitedTokenRequest};
pub use response::RateLimitedTokenResponse;

/// Size of the authenticator
pub const NK: usize = 256;

/// Rate-Limited Token alias
pub type RateLimitedToken = Token<U256>;

/// Name key ID, the SHA-256 digest of a serialized [`PublicNameKey`].
pub type NameKeyId = [u8; 32];

pub(crate) type NameKem = X25519HkdfSha256;
pub(crate) type NameKdf = HkdfSha256;
pub(crate) type NameAead = AesGcm128;

/// Origin names are padded to a multiple of this stride before encryption,
/// so that the ciphertext length does not leak the name length.
pub const ORIGIN_PADDING_STRIDE: usize = 32;

pub(crate) const KEM_ENC_SIZE: usize = 32;
pub(crate) const AEAD_KEY_SIZE: usize = 16;
pub(crate) const AEAD_NONCE_SIZE: usize = 12;
pub(crate) const AEAD_TAG_SIZE: usize = 16;

/// Length of the nonce prepended to the encrypted token response.
pub const RESPONSE_NONCE_SIZE: usize = if AEAD_KEY_SIZE > AEAD_NONCE_SIZE {
    AEAD_KEY_SIZE
} else {
    AEAD_NONCE_SIZE
};

const NAME_KEY_ID: u8 = 0x00;

/// Issuer HPKE configuration: a key identifier, the HPKE suite and the
/// public KEM key. Clients seal origin names to this key.
#[derive(Clone)]
pub struct PublicNameKey {
    pub(crate) id: u8,
    pub(crate) public_key: <NameKem as Kem>::PublicKey,
}

impl PublicNameKey {
    /// Serializes the name key: key id, the three suite identifiers and the
    /// public KEM key, all big-endian, no length prefixes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let public_key = self.public_key.to_bytes();
        let mut out = Vec::with_capacity(7 + public_key.len());
        out.push(self.id);
        out.extend_from_slice(&<NameKem as Kem>::KEM_ID.to_be_bytes());
        out.extend_from_slice(&<NameKdf as Kdf>::KDF_ID.to_be_bytes());
        out.extend_from_slice(&<NameAead as Aead>::AEAD_ID.to_be_bytes());
        out.extend_from_slice(&public_key);
        out
    }

    /// Returns the name key ID, the SHA-256 digest of the serialized key.
    #[must_use]
    pub fn key_id(&self) -> NameKeyId {
        Sha256::digest(self.serialize()).into()
    }

    // AAD for the origin token request: the issuer configuration and the
    // token key the request is bound to. Both sides must reconstruct the
    // exact same bytes.
    pub(crate) fn request_aad(&self, truncated_token_key_id: TruncatedTokenKeyId) -> Vec<u8> {
        let mut aad = Vec::with_capacity(10 + self.key_id().len());
        aad.push(self.id);
        aad.extend_from_slice(&<NameKem as Kem>::KEM_ID.to_be_bytes());
        aad.extend_from_slice(&<NameKdf as Kdf>::KDF_ID.to_be_bytes());
        aad.extend_from_slice(&<NameAead as Aead>::AEAD_ID.to_be_bytes());
        aad.extend_from_slice(&(TokenType::RateLimited as u16).to_be_bytes());
        aad.push(truncated_token_key_id);
        aad.extend_from_slice(&self.key_id());
        aad
    }
}

impl std::fmt::Debug for PublicNameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicNameKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Issuer HPKE configuration including the private KEM key.
pub struct PrivateNameKey {
    pub(crate) public: PublicNameKey,
    pub(crate) private_key: <NameKem as Kem>::PrivateKey,
}

impl PrivateNameKey {
    /// Generates a fresh name key.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (private_key, public_key) = NameKem::gen_keypair(rng);
        Self {
            public: PublicNameKey {
                id: NAME_KEY_ID,
                public_key,
            },
            private_key,
        }
    }

    /// Returns the public part of the name key.
    #[must_use]
    pub fn public(&self) -> PublicNameKey {
        self.public.clone()
    }
}

impl std::fmt::Debug for PrivateNameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateNameKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Pads an origin name to the next multiple of
/// [`ORIGIN_PADDING_STRIDE`] bytes with zero bytes. The empty name pads to
/// a full stride so that the ciphertext is never empty.
#[must_use]
pub fn pad_origin_name(origin_name: &str) -> Vec<u8> {
    let len = origin_name.len();
    let pad_len = if len == 0 {
        ORIGIN_PADDING_STRIDE
    } else {
        ORIGIN_PADDING_STRIDE - 1 - ((len - 1) % ORIGIN_PADDING_STRIDE)
    };
    let mut padded = Vec::with_capacity(len + pad_len);
    padded.extend_from_slice(origin_name.as_bytes());
    padded.resize(len + pad_len, 0x00);
    padded
}

/// Strips the zero-byte padding from a padded origin name. An all-zero
/// input unpads to the empty name.
#[must_use]
pub fn unpad_origin_name(padded_origin_name: &[u8]) -> &[u8] {
    let end = padded_origin_name
        .iter()
        .rposition(|&byte| byte != 0x00)
        .map_or(0, |pos| pos + 1);
    &padded_origin_name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_name_padding_round_trip() {
        for origin_name in ["a", "example.com", "origin.example.com", "x".repeat(31).as_str()] {
            let padded = pad_origin_name(origin_name);
            assert_eq!(padded.len(), ORIGIN_PADDING_STRIDE);
            assert!(padded.len() > origin_name.len());
            assert_eq!(unpad_origin_name(&padded), origin_name.as_bytes());
        }

        let long_name = "a-rather-long-origin-name.example.com";
        let padded = pad_origin_name(long_name);
        assert_eq!(padded.len(), 2 * ORIGIN_PADDING_STRIDE);
        assert_eq!(unpad_origin_name(&padded), long_name.as_bytes());
    }

    #[test]
    fn empty_origin_name_pads_to_full_stride() {
        let padded = pad_origin_name("");
        assert_eq!(padded, vec![0u8; ORIGIN_PADDING_STRIDE]);
        assert_eq!(unpad_origin_name(&padded), b"");
    }

    #[test]
    fn stride_sized_origin_name_is_not_extended() {
        let origin_name = "x".repeat(ORIGIN_PADDING_STRIDE);
        let padded = pad_origin_name(&origin_name);
        assert_eq!(padded.len(), ORIGIN_PADDING_STRIDE);
        assert_eq!(unpad_origin_name(&padded), origin_name.as_bytes());
    }

    #[test]
    fn name_key_serialization_is_deterministic() {
        let mut rng = rand::rngs::OsRng;
        let name_key = PrivateNameKey::new(&mut rng);
        let public = name_key.public();
        assert_eq!(public.serialize(), name_key.public().serialize());
        assert_eq!(public.serialize().len(), 7 + KEM_ENC_SIZE);
        assert_eq!(public.key_id(), name_key.public().key_id());
    }

    #[test]
    fn request_aad_binds_token_key_id() {
        let mut rng = rand::rngs::OsRng;
        let name_key = PrivateNameKey::new(&mut rng).public();
        assert_ne!(name_key.request_aad(1), name_key.request_aad(2));
    }
}
