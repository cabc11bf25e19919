//! Challenge signing and verification
//!
//! The challenge bytes are hashed with SHA-256 and the digest is signed with
//! RSASSA-PKCS1-v1_5. Signatures travel as standard (padded) base64.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rsa::rand_core::OsRng;
use rsa::sha2::{Digest, Sha256};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::{Error, Result};

/// Sign `challenge` with `key`, returning the base64 signature.
///
/// # Errors
///
/// - [`Error::InvalidKey`] if no key is given or the RSA operation fails
/// - [`Error::EmptyInput`] if `challenge` is empty
pub fn sign_challenge(key: Option<&RsaPrivateKey>, challenge: &str) -> Result<String> {
    let key = key.ok_or_else(|| Error::InvalidKey("private key is missing".to_string()))?;
    if challenge.is_empty() {
        return Err(Error::EmptyInput);
    }

    let digest = Sha256::digest(challenge.as_bytes());
    let signature = key
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| Error::InvalidKey(format!("failed to sign challenge: {e}")))?;

    Ok(STANDARD.encode(signature))
}

/// Verify a base64 `signature` over `challenge` against `key`.
///
/// # Errors
///
/// - [`Error::InvalidKey`] if no key is given
/// - [`Error::EmptyInput`] if `challenge` is empty
/// - [`Error::MalformedSignature`] if `signature` is empty or not base64
/// - [`Error::SignatureMismatch`] if the signature does not verify
pub fn verify_signature(
    key: Option<&RsaPublicKey>,
    challenge: &str,
    signature: &str,
) -> Result<()> {
    let key = key.ok_or_else(|| Error::InvalidKey("public key is missing".to_string()))?;
    if challenge.is_empty() {
        return Err(Error::EmptyInput);
    }
    if signature.is_empty() {
        return Err(Error::MalformedSignature("signature is empty".to_string()));
    }

    let raw = STANDARD
        .decode(signature)
        .map_err(|e| Error::MalformedSignature(e.to_string()))?;

    let digest = Sha256::digest(challenge.as_bytes());
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &raw)
        .map_err(|_| Error::SignatureMismatch)
}
