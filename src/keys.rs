//! RSA key material: generation, PEM encoding and file persistence
//!
//! Private keys are written as PKCS#8 PEM (`PRIVATE KEY`) with owner-only
//! permissions; public keys as SPKI PEM (`PUBLIC KEY`), world-readable.
//! Loading a private key also accepts legacy PKCS#1 (`RSA PRIVATE KEY`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Key sizes accepted by [`generate_key_pair`]
pub const SUPPORTED_KEY_BITS: [usize; 2] = [2048, 4096];

/// Generate a fresh RSA key pair of `bits` (2048 or 4096)
pub fn generate_key_pair(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey)> {
    if !SUPPORTED_KEY_BITS.contains(&bits) {
        return Err(Error::Key(format!(
            "invalid key size: must be 2048 or 4096, got {bits}"
        )));
    }

    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::Key(format!("failed to generate private key: {e}")))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// Encode a private key as PKCS#8 PEM; the buffer is wiped on drop
pub fn encode_private_key_pem(key: &RsaPrivateKey) -> Result<Zeroizing<String>> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Key(format!("failed to encode private key: {e}")))
}

/// Encode a public key as SPKI PEM
pub fn encode_public_key_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::Key(format!("failed to encode public key: {e}")))
}

/// Parse a PKCS#8 or PKCS#1 PEM private key
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::Key(format!("invalid private key PEM: {e}")))
}

/// Parse an SPKI PEM public key
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| Error::Key(format!("invalid public key PEM: {e}")))
}

/// Write a private key to `path` (mode 0600 on unix)
pub fn save_private_key(path: &Path, key: &RsaPrivateKey) -> Result<()> {
    let pem = encode_private_key_pem(key)?;
    write_with_mode(path, pem.as_bytes(), 0o600)?;
    debug!(path = %path.display(), "Saved private key");
    Ok(())
}

/// Write a public key to `path` (mode 0644 on unix)
pub fn save_public_key(path: &Path, key: &RsaPublicKey) -> Result<()> {
    let pem = encode_public_key_pem(key)?;
    write_with_mode(path, pem.as_bytes(), 0o644)?;
    debug!(path = %path.display(), "Saved public key");
    Ok(())
}

/// Generate a key pair and persist both halves
pub fn generate_and_save_key_pair(
    private_path: &Path,
    public_path: &Path,
    bits: usize,
) -> Result<RsaPublicKey> {
    let (private, public) = generate_key_pair(bits)?;
    save_private_key(private_path, &private)?;
    save_public_key(public_path, &public)?;
    info!(
        private = %private_path.display(),
        public = %public_path.display(),
        bits,
        "Generated RSA key pair"
    );
    Ok(public)
}

/// Read and parse a private key file
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = Zeroizing::new(fs::read_to_string(path)?);
    parse_private_key_pem(&pem)
}

/// Read and parse a public key file
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = fs::read_to_string(path)?;
    parse_public_key_pem(&pem)
}

/// Read a public key file as PEM text, validating that it parses
pub fn load_public_key_pem(path: &Path) -> Result<String> {
    let pem = fs::read_to_string(path)?;
    parse_public_key_pem(&pem)?;
    Ok(pem)
}

fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(path)?;

    // `mode` only applies on creation; narrow a pre-existing file too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// Load/save capability for the client's key pair
pub trait KeyStore {
    /// Load the signing (private) key
    fn load_signing_key(&self) -> Result<RsaPrivateKey>;

    /// Load the verification (public) key
    fn load_verification_key(&self) -> Result<RsaPublicKey>;

    /// Persist both halves of a key pair
    fn save_key_pair(&self, private: &RsaPrivateKey, public: &RsaPublicKey) -> Result<()>;
}

/// [`KeyStore`] backed by two PEM files
#[derive(Debug, Clone)]
pub struct PemFileKeyStore {
    private_path: PathBuf,
    public_path: PathBuf,
}

impl PemFileKeyStore {
    /// Create a store over the given file paths
    pub fn new(private_path: impl Into<PathBuf>, public_path: impl Into<PathBuf>) -> Self {
        Self {
            private_path: private_path.into(),
            public_path: public_path.into(),
        }
    }

    /// Path of the private key file
    pub fn private_path(&self) -> &Path {
        &self.private_path
    }

    /// Path of the public key file
    pub fn public_path(&self) -> &Path {
        &self.public_path
    }
}

impl KeyStore for PemFileKeyStore {
    fn load_signing_key(&self) -> Result<RsaPrivateKey> {
        load_private_key(&self.private_path)
    }

    fn load_verification_key(&self) -> Result<RsaPublicKey> {
        load_public_key(&self.public_path)
    }

    fn save_key_pair(&self, private: &RsaPrivateKey, public: &RsaPublicKey) -> Result<()> {
        save_private_key(&self.private_path, private)?;
        save_public_key(&self.public_path, public)
    }
}
