//! Response types for the rate-limited token protocol.

use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

use super::{AEAD_TAG_SIZE, NK, RESPONSE_NONCE_SIZE};

/// Token response as specified in the rate-limit tokens draft:
///
/// ```c
/// struct {
///     uint8_t response_nonce[max(Nn, Nk)];
///     uint8_t encrypted_blind_sig[Nk + Nt];
///  } RateLimitedTokenResponse;
/// ```
///
/// The response nonce salts the derivation of the response AEAD key and
/// nonce; the ciphertext seals the blind RSA signature.
#[derive(Debug, Clone, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct RateLimitedTokenResponse {
    pub(crate) response_nonce: [u8; RESPONSE_NONCE_SIZE],
    pub(crate) encrypted_blind_sig: [u8; NK + AEAD_TAG_SIZE],
}

#[cfg(test)]
mod tests {
    use tls_codec::{Deserialize, Serialize};

    use super::*;

    #[test]
    fn token_response_round_trip() {
        let response = RateLimitedTokenResponse {
            response_nonce: [3u8; RESPONSE_NONCE_SIZE],
            encrypted_blind_sig: [4u8; NK + AEAD_TAG_SIZE],
        };
        let serialized = response.tls_serialize_detached().unwrap();
        assert_eq!(serialized.len(), RESPONSE_NONCE_SIZE + NK + AEAD_TAG_SIZE);
        assert_eq!(
            RateLimitedTokenResponse::tls_deserialize(&mut serialized.as_slice()).unwrap(),
            response
        );
    }
}
