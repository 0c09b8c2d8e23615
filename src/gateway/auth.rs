//! Pre-shared credential check
//!
//! The gateway keeps only a SHA-256 digest of the secret. Presented secrets are
//! hashed and compared in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Result, ToolpilotError};

#[derive(Clone)]
pub struct Credential {
    digest: [u8; 32],
}

impl Credential {
    /// Hash a raw secret
    pub fn from_secret(secret: &str) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Self { digest }
    }

    /// Build from a hex-encoded SHA-256 digest
    pub fn from_hex_digest(hex_digest: &str) -> Result<Self> {
        let bytes = hex::decode(hex_digest.trim())
            .map_err(|e| ToolpilotError::Config(format!("Invalid credential digest: {}", e)))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ToolpilotError::Config("Credential digest must be 32 bytes".to_string()))?;
        Ok(Self { digest })
    }

    /// Read a secret from an environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(secret) if !secret.is_empty() => Ok(Self::from_secret(&secret)),
            _ => Err(ToolpilotError::Config(format!("Credential variable {} is not set", var))),
        }
    }

    /// Constant-time comparison
    pub fn matches(&self, presented: &Credential) -> bool {
        self.digest[..].ct_eq(&presented.digest[..]).into()
    }

    /// Short digest prefix, safe to log
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
