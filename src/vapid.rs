//! VAPID application server key.
//!
//! A P-256 key pair that identifies this server to push services. The
//! private half lives in a PKCS#8 PEM file; the public half is what browsers
//! pass as `applicationServerKey` when subscribing.

use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key file io: {0}")]
    Io(#[from] io::Error),

    #[error("invalid VAPID key: {0}")]
    Pkcs8(p256::pkcs8::Error),
}

impl From<p256::pkcs8::Error> for KeyError {
    fn from(e: p256::pkcs8::Error) -> Self {
        Self::Pkcs8(e)
    }
}

/// The server's VAPID signing key.
#[derive(Clone)]
pub struct VapidKey {
    secret: SecretKey,
}

impl VapidKey {
    /// A fresh random key.
    pub fn generate() -> Self {
        Self { secret: SecretKey::random(&mut rand::rngs::OsRng) }
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        Ok(Self { secret: SecretKey::from_pkcs8_pem(pem)? })
    }

    /// PKCS#8 PEM of the private key.
    pub fn to_pem(&self) -> Result<String, KeyError> {
        Ok(self.secret.to_pkcs8_pem(LineEnding::LF)?.to_string())
    }

    /// Reads the key at `path`, or generates one and writes it there.
    pub async fn load_or_generate(path: &Path) -> Result<Self, KeyError> {
        match tokio::fs::read_to_string(path).await {
            Ok(pem) => Self::from_pem(&pem),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no private key found, generating a new one");
                let key = Self::generate();
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, key.to_pem()?).await?;
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Uncompressed public point, base64url without padding.
    pub fn public_key(&self) -> String {
        let point = self.secret.public_key().to_encoded_point(false);
        URL_SAFE_NO_PAD.encode(point.as_bytes())
    }
}

impl std::fmt::Debug for VapidKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKey").field("public_key", &self.public_key()).finish()
    }
}
