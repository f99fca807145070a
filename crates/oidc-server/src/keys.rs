//! RSA signing key for access tokens

use std::fmt;
use std::path::Path;

use argon2::password_hash::rand_core::OsRng;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEVELOPMENT_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read signing key {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signing key is neither PKCS#8 nor PKCS#1 RSA PEM")]
    UnrecognizedPem,

    #[error("Failed to generate RSA key: {0}")]
    Generate(String),

    #[error("Failed to build JWT key: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// RS256 key pair plus its key id
#[derive(Clone)]
pub struct SigningKey {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    kid: String,
}

impl SigningKey {
    /// Generate an ephemeral RSA-2048 key. Tokens signed with it do not
    /// survive a restart.
    pub fn generate() -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, DEVELOPMENT_KEY_BITS)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        Self::from_private_key(&private_key, pem.as_bytes())
    }

    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| KeyError::UnrecognizedPem)?;
        Self::from_private_key(&private_key, pem.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    fn from_private_key(private_key: &RsaPrivateKey, pem: &[u8]) -> Result<Self, KeyError> {
        let public_key = RsaPublicKey::from(private_key);
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let encoding_key = EncodingKey::from_rsa_pem(pem)?;
        let decoding_key =
            DecodingKey::from_rsa_components(&URL_SAFE_NO_PAD.encode(&n), &URL_SAFE_NO_PAD.encode(&e))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            kid: key_id(&n, &e),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Key id: truncated base64url SHA-256 over the public modulus and exponent
fn key_id(n: &[u8], e: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(n);
    hasher.update(e);
    let digest = URL_SAFE_NO_PAD.encode(hasher.finalize());
    digest[..16].to_string()
}
