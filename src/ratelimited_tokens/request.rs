//! Request types for the rate-limited token protocol.

use tls_codec::{Deserialize, TlsByteVecU16};
use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{common::errors::SerializationError, TokenType, TruncatedTokenKeyId};

use super::{
    blinding::{POINT_SIZE, SIGNATURE_SIZE},
    NameKeyId, NK, ORIGIN_PADDING_STRIDE,
};

/// The plaintext carried inside the encrypted token request:
///
/// ```c
/// struct {
///     uint8_t blinded_msg[Nk];
///     uint8_t request_key[Npk];
///     opaque padded_origin<0..2^16-1>;
///  } OriginTokenRequest;
/// ```
#[derive(Debug, Clone, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct OriginTokenRequest {
    pub(crate) blinded_msg: [u8; NK],
    pub(crate) request_key: [u8; POINT_SIZE],
    pub(crate) padded_origin: TlsByteVecU16,
}

impl OriginTokenRequest {
    // Strict decoder: trailing bytes and padded origins that are empty or
    // not a multiple of the padding stride are rejected.
    pub(crate) fn try_from_bytes(mut bytes: &[u8]) -> Result<Self, SerializationError> {
        let request =
            Self::tls_deserialize(&mut bytes).map_err(|_| SerializationError::InvalidData)?;
        if !bytes.is_empty() {
            return Err(SerializationError::InvalidData);
        }
        let padded_len = request.padded_origin.len();
        if padded_len == 0 || padded_len % ORIGIN_PADDING_STRIDE != 0 {
            return Err(SerializationError::InvalidData);
        }
        Ok(request)
    }
}

/// Token request as specified in the rate-limit tokens draft:
///
/// ```c
/// struct {
///     uint16_t token_type = 0x0003;
///     uint8_t token_key_id;
///     uint8_t name_key_id[32];
///     opaque encrypted_token_request<1..2^16-1>;
///     uint8_t signature[Ns+Ns];
///  } RateLimitedTokenRequest;
/// ```
#[derive(Debug, Clone, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct RateLimitedTokenRequest {
    pub(crate) token_type: TokenType,
    pub(crate) truncated_token_key_id: TruncatedTokenKeyId,
    pub(crate) name_key_id: NameKeyId,
    pub(crate) encrypted_token_request: TlsByteVecU16,
    pub(crate) signature: [u8; SIGNATURE_SIZE],
}

impl RateLimitedTokenRequest {
    /// Returns the message covered by the request signature: all fields
    /// preceding the signature, concatenated without length prefixes.
    #[must_use]
    pub fn signature_input(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(
            2 + 1 + self.name_key_id.len() + self.encrypted_token_request.len(),
        );
        message.extend_from_slice(&(self.token_type as u16).to_be_bytes());
        message.push(self.truncated_token_key_id);
        message.extend_from_slice(&self.name_key_id);
        message.extend_from_slice(self.encrypted_token_request.as_slice());
        message
    }
}

#[cfg(test)]
mod tests {
    use tls_codec::Serialize;

    use super::*;

    fn sample_request() -> OriginTokenRequest {
        OriginTokenRequest {
            blinded_msg: [7u8; NK],
            request_key: [8u8; POINT_SIZE],
            padded_origin: crate::ratelimited_tokens::pad_origin_name("example.com").into(),
        }
    }

    #[test]
    fn origin_token_request_round_trip() {
        let request = sample_request();
        let serialized = request.tls_serialize_detached().unwrap();
        assert_eq!(serialized.len(), NK + POINT_SIZE + 2 + ORIGIN_PADDING_STRIDE);
        assert_eq!(OriginTokenRequest::try_from_bytes(&serialized).unwrap(), request);
    }

    #[test]
    fn origin_token_request_rejects_trailing_bytes() {
        let mut serialized = sample_request().tls_serialize_detached().unwrap();
        serialized.push(0);
        assert!(OriginTokenRequest::try_from_bytes(&serialized).is_err());
    }

    #[test]
    fn origin_token_request_rejects_short_input() {
        let serialized = sample_request().tls_serialize_detached().unwrap();
        assert!(OriginTokenRequest::try_from_bytes(&serialized[..serialized.len() - 1]).is_err());
    }

    #[test]
    fn origin_token_request_rejects_unpadded_origin() {
        let request = OriginTokenRequest {
            padded_origin: b"example.com".as_slice().into(),
            ..sample_request()
        };
        let serialized = request.tls_serialize_detached().unwrap();
        assert!(OriginTokenRequest::try_from_bytes(&serialized).is_err());
    }

    #[test]
    fn signature_input_skips_length_prefix_and_signature() {
        let request = RateLimitedTokenRequest {
            token_type: TokenType::RateLimited,
            truncated_token_key_id: 5,
            name_key_id: [9u8; 32],
            encrypted_token_request: vec![1, 2, 3, 4].into(),
            signature: [0u8; SIGNATURE_SIZE],
        };
        let message = request.signature_input();
        assert_eq!(&message[..2], &[0x00, 0x03]);
        assert_eq!(message[2], 5);
        assert_eq!(&message[3..35], &[9u8; 32]);
        assert_eq!(&message[35..], &[1, 2, 3, 4]);
    }
}
