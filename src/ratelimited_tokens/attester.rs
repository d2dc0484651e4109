//! Attester-side index computation for the rate-limited token protocol.
//!
//! The attester receives the blinded request key from the issuer and
//! removes the client's request blind from it. The remaining key is the
//! client public key blinded by the per-origin index key alone, so the
//! derived index is stable per client and origin, differs across origins,
//! and reveals the origin name to nobody but the issuer.

use hkdf::Hkdf;
use sha2::Sha384;

use crate::common::errors::FinalizeIndexError;

use super::blinding;

/// Length of a client-origin index in bytes.
pub const INDEX_SIZE: usize = 48;

/// A client-origin index.
pub type ClientOriginIndex = [u8; INDEX_SIZE];

const INDEX_INFO: &[u8] = b"anon_issuer_origin_id";

/// Computes the client-origin index from the blinded request key returned
/// by the issuer.
///
/// `client_key` is the encoding of the client public key and
/// `blind_key_enc` the blind the client used for the request.
///
/// # Errors
/// Returns an error if one of the inputs cannot be decoded or the index
/// cannot be derived.
pub fn finalize_index(
    client_key: &[u8],
    blind_key_enc: &[u8],
    blinded_request_key_enc: &[u8],
) -> Result<ClientOriginIndex, FinalizeIndexError> {
    let blinded_request_key = blinding::decode_public_key(blinded_request_key_enc)
        .map_err(|_| FinalizeIndexError::InvalidBlindedRequestKey)?;
    let blind_key = blinding::decode_scalar(blind_key_enc)
        .map_err(|_| FinalizeIndexError::InvalidBlindKey)?;
    let index_key = blinding::unblind_public_key(&blinded_request_key, &blind_key)
        .map_err(|_| FinalizeIndexError::UnblindingFailed)?;
    let index_key_enc = blinding::encode_public_key(&index_key);
    compute_index(client_key, &index_key_enc)
}

fn compute_index(
    client_key: &[u8],
    index_key_enc: &[u8],
) -> Result<ClientOriginIndex, FinalizeIndexError> {
    let hkdf = Hkdf::<Sha384>::new(Some(index_key_enc), client_key);
    let mut index = [0u8; INDEX_SIZE];
    hkdf.expand(INDEX_INFO, &mut index)
        .map_err(|_| FinalizeIndexError::IndexDerivationFailed)?;
    Ok(index)
}
