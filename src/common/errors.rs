//! Common error types

use blind_rsa_signatures::Error as BlindRsaError;
use thiserror::Error;

use crate::TokenType;

/// Serialization error
#[derive(PartialEq, Eq, Error, Debug)]
pub enum SerializationError {
    #[error("Invalid serialized data")]
    /// Invalid serialized data
    InvalidData,
}

/// Errors that can occur when creating keys.
#[derive(Error, Debug)]
pub enum CreateKeypairError {
    #[error("Invalid key seed")]
    /// Error when the seed is not a valid P-384 scalar.
    InvalidSeed,
    #[error("Key generation failed")]
    /// Error when generating an RSA keypair fails.
    KeyGenerationFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Key serialization failed")]
    /// Error when serializing the public key fails.
    KeySerializationFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
}

/// Errors that can occur during ECDSA key blinding operations.
#[derive(PartialEq, Eq, Error, Debug)]
pub enum KeyBlindingError {
    #[error("Invalid scalar")]
    /// Error when a scalar encoding is not a valid nonzero P-384 scalar.
    InvalidScalar,
    #[error("Invalid curve point")]
    /// Error when a point encoding is off-curve or the point at infinity.
    InvalidPoint,
    #[error("Signing failed")]
    /// Error when producing the blinded signature fails.
    SigningFailed,
}

/// Errors that can occur when issuing token requests.
#[derive(Error, Debug)]
pub enum IssueTokenRequestError {
    #[error("Invalid TokenChallenge")]
    /// Error when the token challenge cannot be serialized.
    InvalidTokenChallenge,
    #[error("Invalid blind key")]
    /// Error when the blind key encoding is not a valid nonzero scalar.
    InvalidBlindKey,
    #[error("Token blinding error")]
    /// Error when blinding the token input fails.
    BlindingError {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Origin name encryption failed")]
    /// Error when sealing the origin token request fails.
    EncryptionFailed,
    #[error("Request signing failed")]
    /// Error when signing the request under the blinded key fails.
    SigningFailed,
}

/// Errors that can occur when issuing tokens.
#[derive(Error, Debug)]
pub enum IssueTokenError {
    #[error("Response key derivation failed")]
    /// Error when deriving the response AEAD key and nonce fails.
    KeyDerivationFailed,
    #[error("Invalid TokenResponse")]
    /// Error when opening the encrypted token response fails.
    AeadOpenFailed,
    #[error("Signature finalization failed")]
    /// Error when finalizing the blind signature fails.
    SignatureFinalizationFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Invalid Token")]
    /// Error when the finalized token cannot be deserialized.
    InvalidToken,
    #[error("Token verification failed")]
    /// Error when the finalized token does not verify under the issuer key.
    TokenVerificationFailed,
}

/// Errors that can occur when issuing the token response.
#[derive(Error, Debug)]
pub enum IssueTokenResponseError {
    #[error("Invalid token type: expected {expected:?}, found {found:?}")]
    /// Error when the token type does not match the expected type.
    InvalidTokenType {
        /// Expected token type for the operation.
        expected: TokenType,
        /// Actual token type found in the request.
        found: TokenType,
    },
    #[error("Decryption failed")]
    /// Error when the encrypted token request cannot be opened.
    DecryptionFailed,
    #[error("Invalid TokenRequest")]
    /// Error when the decrypted origin token request is malformed.
    InvalidTokenRequest,
    #[error("Unknown origin: {origin}")]
    /// Error when the origin name is not registered with the issuer.
    UnknownOrigin {
        /// Origin name recovered from the request.
        origin: String,
    },
    #[error("Invalid request key")]
    /// Error when the request key is off-curve or the point at infinity.
    InvalidRequestKey,
    #[error("Invalid request signature")]
    /// Error when the client signature over the request does not verify.
    InvalidSignature,
    #[error("Blind signature failed")]
    /// Error when the issuer fails to compute a blind signature.
    BlindSignatureFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Response encryption failed")]
    /// Error when sealing the token response fails.
    EncryptionFailed,
}

/// Errors that can occur when finalizing a client-origin index.
#[derive(PartialEq, Eq, Error, Debug)]
pub enum FinalizeIndexError {
    #[error("Invalid blinded request key")]
    /// Error when the blinded request key encoding is not a curve point.
    InvalidBlindedRequestKey,
    #[error("Invalid blind key")]
    /// Error when the blind key encoding is not a valid nonzero scalar.
    InvalidBlindKey,
    #[error("Unblinding failed")]
    /// Error when unblinding the request key fails.
    UnblindingFailed,
    #[error("Index derivation failed")]
    /// Error when expanding the index from the key material fails.
    IndexDerivationFailed,
}
