use std::fmt;

use sha2::{Digest, Sha256};

use crate::base32;

/// Base32 text of the key handed to the HMAC.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(encoded: impl Into<String>) -> Self {
        Secret(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Maps a seed to the secret used for a subject.
///
/// Implementations must be deterministic: nothing is persisted, the
/// secret is derived again on every issue and verify.
pub trait SecretStrategy {
    fn load(&self, seed: &str) -> Secret;
}

impl<F> SecretStrategy for F
where
    F: Fn(&str) -> Secret,
{
    fn load(&self, seed: &str) -> Secret {
        self(seed)
    }
}

/// SHA-256 of the seed, base32 encoded (52 characters).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Secret;

impl SecretStrategy for Sha256Secret {
    fn load(&self, seed: &str) -> Secret {
        let digest = Sha256::digest(seed.as_bytes());
        Secret(base32::encode(&digest))
    }
}

/// The seed binding a secret to both the subject and the registration
/// attempt it belongs to.
pub fn seed(subject: &str, session_id: &str) -> String {
    format!("{subject}{session_id}")
}
