//! ECDSA key blinding over P-384.
//!
//! A public key `P` is blinded by a scalar `k` as `k*P`; the holder of `k`
//! recovers `P` from the blinded key as `k^-1*(k*P)`. Signing under a
//! blinded key multiplies the two secret scalars, so the resulting
//! signature verifies under `k*P` and is distributed like any other ECDSA
//! signature under that key.

use p384::{
    ecdsa::{
        signature::{RandomizedSigner, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    FieldBytes, NonZeroScalar, PublicKey, Scalar, SecretKey,
};
use rand::{CryptoRng, RngCore};

use crate::common::errors::KeyBlindingError;

/// Length of a P-384 scalar in bytes.
pub const SCALAR_SIZE: usize = 48;

/// Length of a SEC1 compressed P-384 point in bytes.
pub const POINT_SIZE: usize = 49;

/// Length of a signature encoded as `r || s`, both zero-padded to scalar
/// length.
pub const SIGNATURE_SIZE: usize = 2 * SCALAR_SIZE;

/// Decodes a scalar from its fixed-length big-endian encoding.
///
/// # Errors
/// Returns an error if the input is not [`SCALAR_SIZE`] bytes or encodes
/// zero or a value outside the scalar field.
pub fn decode_scalar(bytes: &[u8]) -> Result<NonZeroScalar, KeyBlindingError> {
    if bytes.len() != SCALAR_SIZE {
        return Err(KeyBlindingError::InvalidScalar);
    }
    Option::from(NonZeroScalar::from_repr(FieldBytes::clone_from_slice(bytes)))
        .ok_or(KeyBlindingError::InvalidScalar)
}

/// Decodes a public key from its SEC1 compressed encoding. Off-curve
/// encodings and the point at infinity are rejected.
///
/// # Errors
/// Returns an error if the input is not a [`POINT_SIZE`]-byte compressed
/// curve point.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, KeyBlindingError> {
    if bytes.len() != POINT_SIZE {
        return Err(KeyBlindingError::InvalidPoint);
    }
    PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyBlindingError::InvalidPoint)
}

/// Encodes a public key as a SEC1 compressed point.
#[must_use]
pub fn encode_public_key(public_key: &PublicKey) -> [u8; POINT_SIZE] {
    let encoded = public_key.to_encoded_point(true);
    let mut bytes = [0u8; POINT_SIZE];
    bytes.copy_from_slice(encoded.as_bytes());
    bytes
}

/// Blinds a public key by a scalar: `blind_key * public_key`.
///
/// # Errors
/// Returns an error if the blinded key is not a valid public key.
pub fn blind_public_key(
    public_key: &PublicKey,
    blind_key: &NonZeroScalar,
) -> Result<PublicKey, KeyBlindingError> {
    let blinded = public_key.to_projective() * *blind_key.as_ref();
    PublicKey::from_affine(blinded.to_affine()).map_err(|_| KeyBlindingError::InvalidPoint)
}

/// Removes a blind from a blinded public key: `blind_key^-1 * blinded_key`.
///
/// # Errors
/// Returns an error if the unblinded key is not a valid public key.
pub fn unblind_public_key(
    blinded_key: &PublicKey,
    blind_key: &NonZeroScalar,
) -> Result<PublicKey, KeyBlindingError> {
    let inverse: Scalar =
        Option::from(blind_key.as_ref().invert()).ok_or(KeyBlindingError::InvalidScalar)?;
    let unblinded = blinded_key.to_projective() * inverse;
    PublicKey::from_affine(unblinded.to_affine()).map_err(|_| KeyBlindingError::InvalidPoint)
}

/// Signs a message under the product of the secret key and the blind key.
/// The signature verifies under
/// [`blind_public_key`]`(secret_key.public_key(), blind_key)` and the
/// message is hashed with SHA-384.
///
/// # Errors
/// Returns an error if the product scalar is zero or signing fails.
pub fn blind_key_sign<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret_key: &SecretKey,
    blind_key: &NonZeroScalar,
    message: &[u8],
) -> Result<Signature, KeyBlindingError> {
    let product = *secret_key.to_nonzero_scalar().as_ref() * *blind_key.as_ref();
    let product: NonZeroScalar =
        Option::from(NonZeroScalar::new(product)).ok_or(KeyBlindingError::InvalidScalar)?;
    let signing_key = SigningKey::from(SecretKey::from(product));
    signing_key
        .try_sign_with_rng(rng, message)
        .map_err(|_| KeyBlindingError::SigningFailed)
}

/// Verifies an ECDSA signature over a message hashed with SHA-384.
#[must_use]
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    VerifyingKey::from(public_key).verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn blind_unblind_round_trip() {
        let mut rng = OsRng;
        let secret_key = SecretKey::random(&mut rng);
        let blind_key = NonZeroScalar::random(&mut rng);

        let blinded = blind_public_key(&secret_key.public_key(), &blind_key).unwrap();
        assert_ne!(blinded, secret_key.public_key());

        let unblinded = unblind_public_key(&blinded, &blind_key).unwrap();
        assert_eq!(unblinded, secret_key.public_key());
    }

    #[test]
    fn blinded_signature_verifies_under_blinded_key() {
        let mut rng = OsRng;
        let secret_key = SecretKey::random(&mut rng);
        let blind_key = NonZeroScalar::random(&mut rng);
        let message = b"attested request bytes";

        let signature = blind_key_sign(&mut rng, &secret_key, &blind_key, message).unwrap();
        let blinded = blind_public_key(&secret_key.public_key(), &blind_key).unwrap();

        assert!(verify(&blinded, message, &signature));
        assert!(!verify(&secret_key.public_key(), message, &signature));
        assert!(!verify(&blinded, b"other message", &signature));
    }

    #[test]
    fn point_codec_round_trip() {
        let mut rng = OsRng;
        let public_key = SecretKey::random(&mut rng).public_key();
        let encoded = encode_public_key(&public_key);
        assert_eq!(decode_public_key(&encoded).unwrap(), public_key);
    }

    #[test]
    fn decode_scalar_rejects_invalid_encodings() {
        // Zero, a truncated encoding and a value above the group order.
        assert!(decode_scalar(&[0u8; SCALAR_SIZE]).is_err());
        assert!(decode_scalar(&[1u8; SCALAR_SIZE - 1]).is_err());
        assert!(decode_scalar(&[0xffu8; SCALAR_SIZE]).is_err());

        let mut two = [0u8; SCALAR_SIZE];
        two[SCALAR_SIZE - 1] = 2;
        assert!(decode_scalar(&two).is_ok());
    }

    #[test]
    fn decode_public_key_rejects_off_curve_points() {
        let mut rng = OsRng;
        let mut bytes = encode_public_key(&SecretKey::random(&mut rng).public_key());
        // Invalid SEC1 tag byte.
        bytes[0] = 0x05;
        assert!(decode_public_key(&bytes).is_err());
        assert!(decode_public_key(&bytes[..POINT_SIZE - 1]).is_err());
    }
}
