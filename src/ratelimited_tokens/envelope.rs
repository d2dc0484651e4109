//! HPKE envelope for the origin token request and the encapsulated
//! response.
//!
//! The request direction is HPKE-Base towards the issuer name key, with
//! the issuer configuration bound through the AAD. The response direction
//! reuses the HPKE exporter secret: key and nonce are derived from the KEM
//! encapsulation and a fresh response nonce, so each response is sealed
//! under a one-time key.

use aes_gcm::{aead::Aead, Aes128Gcm, Key, KeyInit};
use generic_array::GenericArray;
use hkdf::Hkdf;
use hpke::{Deserializable, Kem, OpModeR, OpModeS, Serializable};
use log::warn;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use tls_codec::Serialize;

use crate::{
    common::errors::{IssueTokenError, IssueTokenRequestError, IssueTokenResponseError},
    TruncatedTokenKeyId,
};

use super::{
    request::OriginTokenRequest, response::RateLimitedTokenResponse, NameAead, NameKdf, NameKem,
    NameKeyId, PrivateNameKey, PublicNameKey, AEAD_KEY_SIZE, AEAD_NONCE_SIZE, KEM_ENC_SIZE,
    RESPONSE_NONCE_SIZE,
};

const HPKE_INFO: &[u8] = b"TokenRequest";
const EXPORT_INFO: &[u8] = b"OriginTokenResponse";
const LABEL_RESPONSE_KEY: &[u8] = b"key";
const LABEL_RESPONSE_NONCE: &[u8] = b"nonce";

// Output of the client-side sealing step. `enc` is an owned copy of the
// KEM encapsulation; it must stay available until the response is opened.
pub(crate) struct SealedRequest {
    pub(crate) name_key_id: NameKeyId,
    pub(crate) encrypted_token_request: Vec<u8>,
    pub(crate) enc: Vec<u8>,
    pub(crate) secret: [u8; AEAD_KEY_SIZE],
}

pub(crate) fn seal_origin_token_request<R: RngCore + CryptoRng>(
    rng: &mut R,
    name_key: &PublicNameKey,
    truncated_token_key_id: TruncatedTokenKeyId,
    origin_token_request: &OriginTokenRequest,
) -> Result<SealedRequest, IssueTokenRequestError> {
    let (enc, mut context) = hpke::setup_sender::<NameAead, NameKdf, NameKem, _>(
        &OpModeS::Base,
        &name_key.public_key,
        HPKE_INFO,
        rng,
    )
    .inspect_err(|e| warn!(error:% = e; "HPKE sender setup failed"))
    .map_err(|_| IssueTokenRequestError::EncryptionFailed)?;

    let plaintext = origin_token_request
        .tls_serialize_detached()
        .map_err(|_| IssueTokenRequestError::EncryptionFailed)?;
    let aad = name_key.request_aad(truncated_token_key_id);
    let ciphertext = context
        .seal(&plaintext, &aad)
        .map_err(|_| IssueTokenRequestError::EncryptionFailed)?;

    let enc = enc.to_bytes().to_vec();
    let mut encrypted_token_request = Vec::with_capacity(enc.len() + ciphertext.len());
    encrypted_token_request.extend_from_slice(&enc);
    encrypted_token_request.extend_from_slice(&ciphertext);

    let mut secret = [0u8; AEAD_KEY_SIZE];
    context
        .export(EXPORT_INFO, &mut secret)
        .map_err(|_| IssueTokenRequestError::EncryptionFailed)?;

    Ok(SealedRequest {
        name_key_id: name_key.key_id(),
        encrypted_token_request,
        enc,
        secret,
    })
}

pub(crate) fn open_origin_token_request(
    name_key: &PrivateNameKey,
    truncated_token_key_id: TruncatedTokenKeyId,
    encrypted_token_request: &[u8],
) -> Result<(OriginTokenRequest, [u8; AEAD_KEY_SIZE]), IssueTokenResponseError> {
    if encrypted_token_request.len() < KEM_ENC_SIZE {
        return Err(IssueTokenResponseError::InvalidTokenRequest);
    }
    let (enc, ciphertext) = encrypted_token_request.split_at(KEM_ENC_SIZE);
    let enc = <NameKem as Kem>::EncappedKey::from_bytes(enc)
        .map_err(|_| IssueTokenResponseError::DecryptionFailed)?;

    let mut context = hpke::setup_receiver::<NameAead, NameKdf, NameKem>(
        &OpModeR::Base,
        &name_key.private_key,
        &enc,
        HPKE_INFO,
    )
    .map_err(|_| IssueTokenResponseError::DecryptionFailed)?;

    let aad = name_key.public.request_aad(truncated_token_key_id);
    let plaintext = context
        .open(ciphertext, &aad)
        .inspect_err(|e| warn!(error:% = e; "Failed to open encrypted token request"))
        .map_err(|_| IssueTokenResponseError::DecryptionFailed)?;

    let origin_token_request = OriginTokenRequest::try_from_bytes(&plaintext)
        .map_err(|_| IssueTokenResponseError::InvalidTokenRequest)?;

    let mut secret = [0u8; AEAD_KEY_SIZE];
    context
        .export(EXPORT_INFO, &mut secret)
        .map_err(|_| IssueTokenResponseError::DecryptionFailed)?;

    Ok((origin_token_request, secret))
}

fn derive_response_keys(
    enc: &[u8],
    response_nonce: &[u8],
    secret: &[u8],
) -> Result<([u8; AEAD_KEY_SIZE], [u8; AEAD_NONCE_SIZE]), hkdf::InvalidLength> {
    // salt = concat(enc, response_nonce)
    let mut salt = Vec::with_capacity(enc.len() + response_nonce.len());
    salt.extend_from_slice(enc);
    salt.extend_from_slice(response_nonce);

    // prk = Extract(salt, secret)
    let (_, hkdf) = Hkdf::<Sha256>::extract(Some(&salt), secret);

    // aead_key = Expand(prk, "key", Nk)
    let mut key = [0u8; AEAD_KEY_SIZE];
    hkdf.expand(LABEL_RESPONSE_KEY, &mut key)?;

    // aead_nonce = Expand(prk, "nonce", Nn)
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    hkdf.expand(LABEL_RESPONSE_NONCE, &mut nonce)?;

    Ok((key, nonce))
}

pub(crate) fn seal_response<R: RngCore + CryptoRng>(
    rng: &mut R,
    enc: &[u8],
    secret: &[u8; AEAD_KEY_SIZE],
    blind_signature: &[u8],
) -> Result<RateLimitedTokenResponse, IssueTokenResponseError> {
    let mut response_nonce = [0u8; RESPONSE_NONCE_SIZE];
    rng.fill_bytes(&mut response_nonce);

    let (key, nonce) = derive_response_keys(enc, &response_nonce, secret)
        .map_err(|_| IssueTokenResponseError::EncryptionFailed)?;

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), blind_signature)
        .map_err(|_| IssueTokenResponseError::EncryptionFailed)?;
    let encrypted_blind_sig = ciphertext
        .try_into()
        .map_err(|_| IssueTokenResponseError::EncryptionFailed)?;

    Ok(RateLimitedTokenResponse {
        response_nonce,
        encrypted_blind_sig,
    })
}

pub(crate) fn open_response(
    enc: &[u8],
    secret: &[u8; AEAD_KEY_SIZE],
    response: &RateLimitedTokenResponse,
) -> Result<Vec<u8>, IssueTokenError> {
    let (key, nonce) = derive_response_keys(enc, &response.response_nonce, secret)
        .map_err(|_| IssueTokenError::KeyDerivationFailed)?;

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&key));
    cipher
        .decrypt(
            GenericArray::from_slice(&nonce),
            response.encrypted_blind_sig.as_slice(),
        )
        .inspect_err(|e| warn!(error:% = e; "Failed to open encrypted token response"))
        .map_err(|_| IssueTokenError::AeadOpenFailed)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use crate::ratelimited_tokens::{blinding::POINT_SIZE, pad_origin_name, NK};

    use super::*;

    fn sample_origin_token_request() -> OriginTokenRequest {
        OriginTokenRequest {
            blinded_msg: [1u8; NK],
            request_key: [2u8; POINT_SIZE],
            padded_origin: pad_origin_name("example.com").into(),
        }
    }

    #[test]
    fn origin_token_request_seal_open_round_trip() {
        let mut rng = OsRng;
        let name_key = PrivateNameKey::new(&mut rng);
        let request = sample_origin_token_request();

        let sealed =
            seal_origin_token_request(&mut rng, &name_key.public(), 7, &request).unwrap();
        assert_eq!(sealed.enc.len(), KEM_ENC_SIZE);
        assert_eq!(
            &sealed.encrypted_token_request[..KEM_ENC_SIZE],
            sealed.enc.as_slice()
        );

        let (opened, secret) =
            open_origin_token_request(&name_key, 7, &sealed.encrypted_token_request).unwrap();
        assert_eq!(opened, request);
        assert_eq!(secret, sealed.secret);
    }

    #[test]
    fn open_fails_with_different_aad() {
        let mut rng = OsRng;
        let name_key = PrivateNameKey::new(&mut rng);
        let sealed = seal_origin_token_request(
            &mut rng,
            &name_key.public(),
            7,
            &sample_origin_token_request(),
        )
        .unwrap();

        assert!(matches!(
            open_origin_token_request(&name_key, 8, &sealed.encrypted_token_request),
            Err(IssueTokenResponseError::DecryptionFailed)
        ));
    }

    #[test]
    fn open_fails_with_different_name_key() {
        let mut rng = OsRng;
        let name_key = PrivateNameKey::new(&mut rng);
        let other_name_key = PrivateNameKey::new(&mut rng);
        let sealed = seal_origin_token_request(
            &mut rng,
            &name_key.public(),
            7,
            &sample_origin_token_request(),
        )
        .unwrap();

        assert!(matches!(
            open_origin_token_request(&other_name_key, 7, &sealed.encrypted_token_request),
            Err(IssueTokenResponseError::DecryptionFailed)
        ));
    }

    #[test]
    fn open_fails_with_tampered_ciphertext() {
        let mut rng = OsRng;
        let name_key = PrivateNameKey::new(&mut rng);
        let mut sealed = seal_origin_token_request(
            &mut rng,
            &name_key.public(),
            7,
            &sample_origin_token_request(),
        )
        .unwrap();
        let last = sealed.encrypted_token_request.len() - 1;
        sealed.encrypted_token_request[last] ^= 0x01;

        assert!(matches!(
            open_origin_token_request(&name_key, 7, &sealed.encrypted_token_request),
            Err(IssueTokenResponseError::DecryptionFailed)
        ));
    }

    #[test]
    fn response_seal_open_round_trip() {
        let mut rng = OsRng;
        let enc = [5u8; KEM_ENC_SIZE];
        let secret = [6u8; AEAD_KEY_SIZE];
        let blind_signature = [7u8; NK];

        let response = seal_response(&mut rng, &enc, &secret, &blind_signature).unwrap();
        let opened = open_response(&enc, &secret, &response).unwrap();
        assert_eq!(opened, blind_signature);
    }

    #[test]
    fn response_open_fails_after_tampering() {
        let mut rng = OsRng;
        let enc = [5u8; KEM_ENC_SIZE];
        let secret = [6u8; AEAD_KEY_SIZE];
        let blind_signature = [7u8; NK];

        let mut response = seal_response(&mut rng, &enc, &secret, &blind_signature).unwrap();
        response.encrypted_blind_sig[0] ^= 0x01;
        assert!(matches!(
            open_response(&enc, &secret, &response),
            Err(IssueTokenError::AeadOpenFailed)
        ));

        let mut response = seal_response(&mut rng, &enc, &secret, &blind_signature).unwrap();
        response.response_nonce[0] ^= 0x01;
        assert!(matches!(
            open_response(&enc, &secret, &response),
            Err(IssueTokenError::AeadOpenFailed)
        ));
    }
}
