//! # Privacy Pass Rate-Limited Tokens
//!
//! A Rust implementation of the rate-limited issuance protocol for Privacy
//! Pass, as specified in the Privacy Pass rate-limit tokens IETF
//! [draft](https://datatracker.ietf.org/doc/draft-privacypass-rate-limit-tokens/).
//!
//! The library implements the cryptographic components of the three parties
//! that handle token material:
//!
//!  - The Client, which blinds a token towards an issuer RSA key, encrypts
//!    the origin name to the issuer and signs the request under a blinded
//!    ECDSA key.
//!  - The Issuer, which decrypts the origin name, validates the request
//!    signature, produces a blind RSA signature and blinds the request key
//!    towards the origin.
//!  - The Attester, which turns a blinded request key into a stable
//!    per-client, per-origin index without learning the origin name.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod auth;
pub mod common;
pub mod ratelimited_tokens;

use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

pub use tls_codec::{Deserialize, Serialize};

/// Token type
#[derive(TlsSize, TlsSerialize, TlsDeserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum TokenType {
    /// Privately verifiable token
    Private = 1,
    /// Publicly verifiable token
    Public = 2,
    /// Rate-limited token
    RateLimited = 3,
}

/// Truncated token key ID
pub type TruncatedTokenKeyId = u8;
/// Token key ID
pub type TokenKeyId = [u8; 32];
/// Nonce
pub type Nonce = [u8; 32];
/// Challenge digest
pub type ChallengeDigest = [u8; 32];

pub(crate) fn truncate_token_key_id(token_key_id: &TokenKeyId) -> TruncatedTokenKeyId {
    *token_key_id.iter().last().unwrap_or(&0)
}

#[derive(Debug)]
pub(crate) struct TokenInput {
    token_type: TokenType,
    nonce: Nonce,
    challenge_digest: ChallengeDigest,
    token_key_id: TokenKeyId,
}

impl TokenInput {
    pub(crate) const fn new(
        token_type: TokenType,
        nonce: Nonce,
        challenge_digest: ChallengeDigest,
        token_key_id: TokenKeyId,
    ) -> Self {
        Self {
            token_type,
            nonce,
            challenge_digest,
            token_key_id,
        }
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        // token_input = concat(0xXXXX, nonce, challenge_digest, token_key_id)
        let mut token_input: Vec<u8> = Vec::new();
        token_input.extend_from_slice((self.token_type as u16).to_be_bytes().as_slice());
        token_input.extend_from_slice(self.nonce.as_slice());
        token_input.extend_from_slice(self.challenge_digest.as_slice());
        token_input.extend_from_slice(self.token_key_id.as_slice());
        token_input
    }
}
