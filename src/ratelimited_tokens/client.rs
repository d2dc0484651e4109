//! Client-side implementation of the rate-limited token protocol.

use blind_rsa_signatures::{BlindSignature, BlindingResult, Options, PublicKey};
use log::warn;
use p384::SecretKey;
use rand::{CryptoRng, RngCore};
use tls_codec::Deserialize;

use crate::{
    auth::authenticate::TokenChallenge,
    common::errors::{CreateKeypairError, IssueTokenError, IssueTokenRequestError},
    truncate_token_key_id, Nonce, TokenInput, TokenKeyId, TokenType,
};

use super::{
    blinding::{self, POINT_SIZE, SIGNATURE_SIZE},
    envelope, pad_origin_name,
    request::{OriginTokenRequest, RateLimitedTokenRequest},
    response::RateLimitedTokenResponse,
    PublicNameKey, RateLimitedToken, AEAD_KEY_SIZE, NK,
};

/// State that is kept between the token request and the token response.
///
/// The KEM encapsulation is stored as an owned copy so the state stays
/// self-contained once the request has been sent.
pub struct TokenState {
    token_input: TokenInput,
    blinding_result: BlindingResult,
    blinded_request_key: [u8; POINT_SIZE],
    verification_key: PublicKey,
    encap_secret: [u8; AEAD_KEY_SIZE],
    encap_enc: Vec<u8>,
}

impl TokenState {
    /// Returns the blinded request key. The attester uses it, together
    /// with the blind key, to compute the client-origin index.
    #[must_use]
    pub fn blinded_request_key(&self) -> &[u8] {
        &self.blinded_request_key
    }
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState").finish_non_exhaustive()
    }
}

/// Client side of the rate-limited token protocol. The client secret key
/// is long-lived; each request blinds it with a fresh blind key.
pub struct RateLimitedClient {
    secret_key: SecretKey,
}

impl RateLimitedClient {
    /// Creates a client with a fresh P-384 secret key.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            secret_key: SecretKey::random(rng),
        }
    }

    /// Creates a client from a fixed-length big-endian secret scalar.
    ///
    /// # Errors
    /// Returns an error if the secret is not a valid nonzero P-384 scalar.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CreateKeypairError> {
        let scalar =
            blinding::decode_scalar(secret).map_err(|_| CreateKeypairError::InvalidSeed)?;
        Ok(Self {
            secret_key: SecretKey::from(scalar),
        })
    }

    /// Returns the client public key.
    #[must_use]
    pub fn public_key(&self) -> p384::PublicKey {
        self.secret_key.public_key()
    }

    /// Issues a new token request.
    ///
    /// The token input is blinded towards the issuer RSA key, the origin
    /// name is sealed to the issuer name key and the request is signed
    /// under the client key blinded by `blind_key_enc`.
    ///
    /// # Errors
    /// Returns an error if the challenge, the blind key or one of the
    /// cryptographic operations is invalid.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_token_request<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        challenge: &TokenChallenge,
        blind_key_enc: &[u8],
        token_key_id: TokenKeyId,
        token_key: &PublicKey,
        origin_name: &str,
        name_key: &PublicNameKey,
    ) -> Result<(RateLimitedTokenRequest, TokenState), IssueTokenRequestError> {
        let blind_key = blinding::decode_scalar(blind_key_enc)
            .map_err(|_| IssueTokenRequestError::InvalidBlindKey)?;
        let blinded_public_key = blinding::blind_public_key(&self.public_key(), &blind_key)
            .map_err(|_| IssueTokenRequestError::InvalidBlindKey)?;
        let request_key = blinding::encode_public_key(&blinded_public_key);

        let mut nonce: Nonce = [0u8; 32];
        rng.fill_bytes(&mut nonce);

        let challenge_digest = challenge
            .digest()
            .map_err(|_| IssueTokenRequestError::InvalidTokenChallenge)?;

        // nonce = random(32)
        // challenge_digest = SHA256(challenge)
        // token_input = concat(0x0003, nonce, challenge_digest, token_key_id)
        // blinded_msg, blind_inv = rsabssa_blind(pkI, token_input)

        let token_input =
            TokenInput::new(TokenType::RateLimited, nonce, challenge_digest, token_key_id);

        let options = Options::default();
        let blinding_result = token_key
            .blind(rng, token_input.serialize(), false, &options)
            .inspect_err(|e| warn!(error:% = e; "Failed to blind token input"))
            .map_err(|source| IssueTokenRequestError::BlindingError { source })?;

        debug_assert!(blinding_result.blind_msg.len() == NK);
        let mut blinded_msg = [0u8; NK];
        blinded_msg.copy_from_slice(blinding_result.blind_msg.as_slice());

        let origin_token_request = OriginTokenRequest {
            blinded_msg,
            request_key,
            padded_origin: pad_origin_name(origin_name).into(),
        };

        let truncated_token_key_id = truncate_token_key_id(&token_key_id);
        let sealed = envelope::seal_origin_token_request(
            rng,
            name_key,
            truncated_token_key_id,
            &origin_token_request,
        )?;

        let mut request = RateLimitedTokenRequest {
            token_type: TokenType::RateLimited,
            truncated_token_key_id,
            name_key_id: sealed.name_key_id,
            encrypted_token_request: sealed.encrypted_token_request.into(),
            signature: [0u8; SIGNATURE_SIZE],
        };

        let message = request.signature_input();
        let signature = blinding::blind_key_sign(rng, &self.secret_key, &blind_key, &message)
            .map_err(|_| IssueTokenRequestError::SigningFailed)?;
        request.signature.copy_from_slice(&signature.to_bytes());

        let token_state = TokenState {
            token_input,
            blinding_result,
            blinded_request_key: request_key,
            verification_key: token_key.clone(),
            encap_secret: sealed.secret,
            encap_enc: sealed.enc,
        };

        Ok((request, token_state))
    }

    /// Turns a token response into a token.
    ///
    /// The blind signature is unsealed and finalized, and the resulting
    /// token is verified against the issuer public key before it is
    /// returned.
    ///
    /// # Errors
    /// Returns an error if the token response is invalid.
    pub fn issue_token(
        &self,
        token_response: RateLimitedTokenResponse,
        token_state: &TokenState,
    ) -> Result<RateLimitedToken, IssueTokenError> {
        let blind_signature = envelope::open_response(
            &token_state.encap_enc,
            &token_state.encap_secret,
            &token_response,
        )?;

        // authenticator = rsabssa_finalize(pkI, nonce, blind_sig, blind_inv)
        let token_input = token_state.token_input.serialize();
        let options = Options::default();
        let blind_signature = BlindSignature(blind_signature);
        let signature = token_state
            .verification_key
            .finalize(
                &blind_signature,
                &token_state.blinding_result.secret,
                token_state.blinding_result.msg_randomizer.clone(),
                &token_input,
                &options,
            )
            .inspect_err(|e| warn!(error:% = e; "Failed to finalize blind signature"))
            .map_err(|source| IssueTokenError::SignatureFinalizationFailed { source })?;

        let mut token_data = token_input;
        token_data.extend_from_slice(&signature);
        let token = RateLimitedToken::tls_deserialize(&mut token_data.as_slice())
            .map_err(|_| IssueTokenError::InvalidToken)?;

        // Sanity check: verify the token signature
        signature
            .verify(
                &token_state.verification_key,
                token_state.blinding_result.msg_randomizer.clone(),
                token.authenticator_input(),
                &options,
            )
            .map_err(|_| IssueTokenError::TokenVerificationFailed)?;

        Ok(token)
    }
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient").finish_non_exhaustive()
    }
}
