//! One-time passcodes for gating account registration.
//!
//! A per-subject secret is derived from the subject's email and the
//! registration session, an HOTP code is computed over a moving factor,
//! and [`OtpService`] runs the issue/verify protocol against an ephemeral
//! key/value store and a per-session field store.

pub mod base32;
pub mod config;
pub mod counter;
pub mod hotp;
pub mod notify;
pub mod registration;
pub mod secret;
pub mod store;
pub mod verify;

pub use base32::{Base32, DecodingError, StringEncoding};
pub use config::OtpConfig;
pub use counter::{FixedCounter, MovingFactor, TimeStep};
pub use hotp::{Hotp, HotpParams};
pub use notify::{LogNotifier, Notifier, NotifyError, OtpMessage};
pub use registration::{PendingRegistration, RegistrationSession};
pub use secret::{Secret, SecretStrategy, Sha256Secret};
pub use store::{memory::MemoryStore, EphemeralStore, SessionStore, StoreError};
pub use verify::{Issued, OtpService, Verification};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("malformed secret")]
    Decoding(#[from] DecodingError),
    #[error("error when computing HMAC")]
    Crypto(#[from] hmac::digest::InvalidLength),
    #[error("code length must be between 1 and 8 digits, got {0}")]
    InvalidDigits(u32),
    #[error("store failure")]
    Store(#[from] StoreError),
    #[error("could not deliver the code")]
    Dispatch(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, OtpError>;
