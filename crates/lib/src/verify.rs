//! Issue and verify registration codes.
//!
//! Per (subject, session) the protocol moves from no active code to
//! issued, and from there to verified, expired or blocked. Only the
//! moving factor used at issuance is persisted (under the subject, with
//! the code lifetime as TTL); the remaining-attempts counter lives in the
//! session store under [`ATTEMPTS_FIELD`].

use tracing::{debug, error, info, instrument, warn};

use crate::secret::seed;
use crate::store::{EphemeralStore, SessionStore, StoreError};
use crate::{
    Hotp, MovingFactor, Notifier, OtpConfig, OtpMessage, Result, SecretStrategy, Sha256Secret,
    TimeStep,
};

/// Session field holding the remaining verification attempts.
pub const ATTEMPTS_FIELD: &str = "otp_attempts";

/// Outcome of a successful [`OtpService::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issued {
    /// The code went out through the notifier.
    Dispatched,
    /// Debug mode: the code was not sent and is handed back instead.
    Debug { code: String },
}

/// User-facing outcome of [`OtpService::verify`].
///
/// Failures that are not the subject's fault (store outages, a secret that
/// does not decode) are returned as `Err` and never cost an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// Wrong code; `remaining` attempts are left.
    Invalid { remaining: u32 },
    /// No code is active for the subject. `remaining` is set when the
    /// attempt was charged against a session that still has attempts left.
    Expired { remaining: Option<u32> },
    /// Attempts are exhausted until a new code is issued.
    Blocked,
}

enum Miss {
    Wrong,
    Gone,
}

pub struct OtpService<E, S, N, M = TimeStep, K = Sha256Secret> {
    codes: E,
    sessions: S,
    notifier: N,
    moving_factor: M,
    secrets: K,
    hotp: Hotp,
    config: OtpConfig,
}

impl<E, S, N> OtpService<E, S, N>
where
    E: EphemeralStore,
    S: SessionStore,
    N: Notifier,
{
    /// Service using SHA-256 secrets and a time-step moving factor.
    pub fn new(codes: E, sessions: S, notifier: N, config: OtpConfig) -> Self {
        let moving_factor = TimeStep::from_config(&config);
        OtpService::with_parts(codes, sessions, notifier, moving_factor, Sha256Secret, config)
    }
}

impl<E, S, N, M, K> OtpService<E, S, N, M, K>
where
    E: EphemeralStore,
    S: SessionStore,
    N: Notifier,
    M: MovingFactor,
    K: SecretStrategy,
{
    pub fn with_parts(
        codes: E,
        sessions: S,
        notifier: N,
        moving_factor: M,
        secrets: K,
        config: OtpConfig,
    ) -> Self {
        Self {
            codes,
            sessions,
            notifier,
            moving_factor,
            secrets,
            hotp: Hotp::new(config.params()),
            config,
        }
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Generate a code for `subject`, persist its moving factor, reset the
    /// session's attempts and send the code to `recipient`.
    ///
    /// If the code cannot be delivered nothing stays behind: the stored
    /// moving factor and attempt state are removed again and
    /// [`crate::OtpError::Dispatch`] is returned.
    #[instrument(skip(self, recipient))]
    pub fn issue(&self, subject: &str, session_id: &str, recipient: &str) -> Result<Issued> {
        let secret = self.secrets.load(&seed(subject, session_id));
        let counter = self.moving_factor.current();
        let code = self.hotp.generate(&secret, counter)?;

        self.codes
            .set_with_ttl(subject, &counter.to_string(), self.config.lifetime())?;
        if let Err(err) = self.sessions.set_field(
            session_id,
            ATTEMPTS_FIELD,
            &self.config.max_attempts.to_string(),
            self.config.session_ttl(),
        ) {
            self.rollback(subject, session_id);
            return Err(err.into());
        }

        if self.config.debug {
            debug!(%code, "debug mode, code returned instead of sent");
            return Ok(Issued::Debug { code });
        }

        let message = OtpMessage::new(recipient, &code, &self.config);
        if let Err(err) = self.notifier.send(&message) {
            warn!(error = %err, "could not deliver code, rolling back");
            self.rollback(subject, session_id);
            return Err(err.into());
        }

        info!(
            lifetime_minutes = self.config.lifetime_minutes,
            "code issued"
        );
        Ok(Issued::Dispatched)
    }

    /// Check `candidate` against the code issued to `subject` in
    /// `session_id`.
    ///
    /// The expected code is recomputed from the stored moving factor, never
    /// from a fresh one. A match consumes the code.
    #[instrument(skip(self, candidate))]
    pub fn verify(&self, subject: &str, candidate: &str, session_id: &str) -> Result<Verification> {
        let Some(remaining) = self.remaining_attempts(session_id)? else {
            debug!("no attempt state for session");
            return Ok(Verification::Expired { remaining: None });
        };
        if remaining <= 0 {
            warn!("attempts exhausted");
            return Ok(Verification::Blocked);
        }

        let Some(stored) = self.codes.get(subject)? else {
            return self.charge(session_id, Miss::Gone);
        };
        let counter: u64 = stored.parse().map_err(|_| StoreError::Corrupt {
            key: subject.to_string(),
            value: stored.clone(),
        })?;

        let secret = self.secrets.load(&seed(subject, session_id));
        if !self.hotp.validate(candidate, &secret, counter)? {
            return self.charge(session_id, Miss::Wrong);
        }

        if !self.codes.delete(subject)? {
            // A concurrent verification consumed the code first.
            return Ok(Verification::Expired { remaining: None });
        }
        self.sessions.delete_field(session_id, ATTEMPTS_FIELD)?;
        info!("code verified");
        Ok(Verification::Verified)
    }

    /// Attempts left for the session, `None` when no code was issued in it.
    pub fn remaining_attempts(&self, session_id: &str) -> Result<Option<i64>> {
        match self.sessions.get_field(session_id, ATTEMPTS_FIELD)? {
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                StoreError::Corrupt {
                    key: format!("{session_id}.{ATTEMPTS_FIELD}"),
                    value: raw,
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn charge(&self, session_id: &str, miss: Miss) -> Result<Verification> {
        let remaining = self
            .sessions
            .increment_field(session_id, ATTEMPTS_FIELD, -1)?;
        if remaining < 0 {
            // The field was cleared by a concurrent success, or overdrawn.
            self.sessions.delete_field(session_id, ATTEMPTS_FIELD)?;
            return Ok(match miss {
                Miss::Wrong => {
                    warn!("attempt state overdrawn, session blocked");
                    Verification::Blocked
                }
                Miss::Gone => {
                    debug!("code consumed concurrently");
                    Verification::Expired { remaining: None }
                }
            });
        }
        if remaining == 0 {
            warn!("last attempt used, session blocked");
            return Ok(Verification::Blocked);
        }

        let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
        Ok(match miss {
            Miss::Wrong => {
                info!(remaining, "wrong code");
                Verification::Invalid { remaining }
            }
            Miss::Gone => {
                info!(remaining, "code expired");
                Verification::Expired {
                    remaining: Some(remaining),
                }
            }
        })
    }

    fn rollback(&self, subject: &str, session_id: &str) {
        if let Err(err) = self.codes.delete(subject) {
            error!(error = %err, "could not remove moving factor during rollback");
        }
        if let Err(err) = self.sessions.delete_field(session_id, ATTEMPTS_FIELD) {
            error!(error = %err, "could not remove attempt state during rollback");
        }
    }
}
