//! Server-side implementation of the rate-limited token protocol.

use async_trait::async_trait;
use blind_rsa_signatures::{KeyPair, Options, PublicKey};
use log::warn;
use p384::{ecdsa::Signature, SecretKey};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{
    common::errors::{CreateKeypairError, IssueTokenResponseError},
    TokenKeyId, TokenType,
};

use super::{
    blinding, envelope,
    request::{OriginTokenRequest, RateLimitedTokenRequest},
    response::RateLimitedTokenResponse,
    unpad_origin_name, PrivateNameKey, PublicNameKey, AEAD_KEY_SIZE, KEM_ENC_SIZE,
};

const KEYSIZE_IN_BITS: usize = 2048;

/// Key store mapping origin names to per-origin index keys.
///
/// Every evaluation reads from the store while registrations are rare, so
/// implementations should favor concurrent reads. The store requires
/// interior mutability.
#[async_trait]
pub trait OriginKeyStore {
    /// Inserts an index key for the given origin, replacing any previous
    /// key.
    async fn insert(&self, origin_name: String, key: SecretKey);
    /// Returns the index key for the given origin.
    async fn get(&self, origin_name: &str) -> Option<SecretKey>;
}

/// Issuer evaluation output: the sealed response for the client and the
/// blinded request key for the attester.
#[derive(Debug)]
pub struct IssuedTokenResponse {
    /// Encrypted token response, forwarded to the client.
    pub token_response: RateLimitedTokenResponse,
    /// Blinded request key, forwarded to the attester for index
    /// computation.
    pub blinded_request_key: Vec<u8>,
}

/// Issuer side of the rate-limited token protocol. The issuer holds the
/// RSA token key and the HPKE name key for the lifetime of the instance.
pub struct RateLimitedIssuer {
    name_key: PrivateNameKey,
    token_key: KeyPair,
}

impl RateLimitedIssuer {
    /// Creates an issuer with fresh token and name keys.
    ///
    /// # Errors
    /// Returns an error if the RSA keypair cannot be generated.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CreateKeypairError> {
        let token_key = KeyPair::generate(rng, KEYSIZE_IN_BITS)
            .map_err(|source| CreateKeypairError::KeyGenerationFailed { source })?;
        Ok(Self {
            name_key: PrivateNameKey::new(rng),
            token_key,
        })
    }

    /// Returns the public name key clients seal origin names to.
    #[must_use]
    pub fn name_key(&self) -> PublicNameKey {
        self.name_key.public()
    }

    /// Returns the public token key.
    #[must_use]
    pub fn token_key(&self) -> &PublicKey {
        &self.token_key.pk
    }

    /// Returns the token key ID.
    ///
    /// # Errors
    /// Returns an error if the token key cannot be serialized.
    pub fn token_key_id(&self) -> Result<TokenKeyId, CreateKeypairError> {
        public_key_to_token_key_id(&self.token_key.pk)
    }

    /// Registers an origin by generating a fresh index key for it.
    pub async fn add_origin<KS: OriginKeyStore, R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        origin_key_store: &KS,
        origin_name: &str,
    ) {
        let key = SecretKey::random(rng);
        origin_key_store.insert(origin_name.to_string(), key).await;
    }

    /// Evaluates a token request: decrypts the origin token request,
    /// verifies the request signature under the enclosed request key,
    /// blind-signs the token and blinds the request key towards the
    /// origin.
    ///
    /// # Errors
    /// Returns an error if the token request is invalid or the origin is
    /// not registered.
    pub async fn issue_token_response<KS: OriginKeyStore, R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        origin_key_store: &KS,
        token_request: RateLimitedTokenRequest,
    ) -> Result<IssuedTokenResponse, IssueTokenResponseError> {
        check_token_type(&token_request)?;

        let (origin_token_request, secret) = envelope::open_origin_token_request(
            &self.name_key,
            token_request.truncated_token_key_id,
            token_request.encrypted_token_request.as_slice(),
        )?;

        let origin_index_key =
            lookup_origin_index_key(origin_key_store, &origin_token_request).await?;

        let request_key = blinding::decode_public_key(&origin_token_request.request_key)
            .map_err(|_| IssueTokenResponseError::InvalidRequestKey)?;

        // Verify the request signature under the blinded request key.
        let message = token_request.signature_input();
        let signature = Signature::from_slice(&token_request.signature)
            .map_err(|_| IssueTokenResponseError::InvalidSignature)?;
        if !blinding::verify(&request_key, &message, &signature) {
            return Err(IssueTokenResponseError::InvalidSignature);
        }

        self.evaluate(
            rng,
            &origin_token_request,
            &request_key,
            &origin_index_key,
            &token_request,
            &secret,
        )
    }

    /// Evaluates a token request without verifying the request signature.
    ///
    /// This variant exists for deployments where a mediating attester has
    /// already authenticated the client signature over the request; the
    /// response is sealed exactly as in
    /// [`issue_token_response`](Self::issue_token_response).
    ///
    /// # Errors
    /// Returns an error if the token request is invalid or the origin is
    /// not registered.
    pub async fn issue_token_response_unchecked<KS: OriginKeyStore, R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        origin_key_store: &KS,
        token_request: RateLimitedTokenRequest,
    ) -> Result<IssuedTokenResponse, IssueTokenResponseError> {
        check_token_type(&token_request)?;

        let (origin_token_request, secret) = envelope::open_origin_token_request(
            &self.name_key,
            token_request.truncated_token_key_id,
            token_request.encrypted_token_request.as_slice(),
        )?;

        let origin_index_key =
            lookup_origin_index_key(origin_key_store, &origin_token_request).await?;

        let request_key = blinding::decode_public_key(&origin_token_request.request_key)
            .map_err(|_| IssueTokenResponseError::InvalidRequestKey)?;

        self.evaluate(
            rng,
            &origin_token_request,
            &request_key,
            &origin_index_key,
            &token_request,
            &secret,
        )
    }

    // Shared evaluation tail: blind the request key towards the origin,
    // blind-sign the token and seal the response.
    fn evaluate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        origin_token_request: &OriginTokenRequest,
        request_key: &p384::PublicKey,
        origin_index_key: &SecretKey,
        token_request: &RateLimitedTokenRequest,
        secret: &[u8; AEAD_KEY_SIZE],
    ) -> Result<IssuedTokenResponse, IssueTokenResponseError> {
        let blinded_request_key =
            blinding::blind_public_key(request_key, &origin_index_key.to_nonzero_scalar())
                .map_err(|_| IssueTokenResponseError::InvalidRequestKey)?;
        let blinded_request_key = blinding::encode_public_key(&blinded_request_key).to_vec();

        // blind_sig = rsabssa_blind_sign(skI, blinded_msg)
        let options = Options::default();
        let blind_signature = self
            .token_key
            .sk
            .blind_sign(rng, origin_token_request.blinded_msg.as_slice(), &options)
            .inspect_err(|e| warn!(error:% = e; "Failed to compute blind signature"))
            .map_err(|source| IssueTokenResponseError::BlindSignatureFailed { source })?;

        let enc = &token_request.encrypted_token_request.as_slice()[..KEM_ENC_SIZE];
        let token_response = envelope::seal_response(rng, enc, secret, &blind_signature)?;

        Ok(IssuedTokenResponse {
            token_response,
            blinded_request_key,
        })
    }
}

impl std::fmt::Debug for RateLimitedIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedIssuer")
            .field("name_key", &self.name_key)
            .finish_non_exhaustive()
    }
}

fn check_token_type(
    token_request: &RateLimitedTokenRequest,
) -> Result<(), IssueTokenResponseError> {
    if token_request.token_type != TokenType::RateLimited {
        return Err(IssueTokenResponseError::InvalidTokenType {
            expected: TokenType::RateLimited,
            found: token_request.token_type,
        });
    }
    Ok(())
}

async fn lookup_origin_index_key<KS: OriginKeyStore>(
    origin_key_store: &KS,
    origin_token_request: &OriginTokenRequest,
) -> Result<SecretKey, IssueTokenResponseError> {
    let origin_name =
        std::str::from_utf8(unpad_origin_name(origin_token_request.padded_origin.as_slice()))
            .map_err(|_| IssueTokenResponseError::InvalidTokenRequest)?;
    origin_key_store
        .get(origin_name)
        .await
        .ok_or_else(|| IssueTokenResponseError::UnknownOrigin {
            origin: origin_name.to_string(),
        })
}

/// Serializes an issuer token key in RSASSA-PSS SPKI form.
///
/// # Errors
/// Returns an error if the key cannot be serialized.
pub fn serialize_public_key(public_key: &PublicKey) -> Result<Vec<u8>, CreateKeypairError> {
    public_key
        .to_spki(Some(&Options::default()))
        .map_err(|source| CreateKeypairError::KeySerializationFailed { source })
}

/// Converts an issuer token key to a token key ID.
///
/// # Errors
/// Returns an error if the key cannot be serialized.
pub fn public_key_to_token_key_id(
    public_key: &PublicKey,
) -> Result<TokenKeyId, CreateKeypairError> {
    Ok(Sha256::digest(serialize_public_key(public_key)?).into())
}
