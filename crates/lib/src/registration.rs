//! Pending registration data kept in the session store between the
//! first step of sign-up and successful code verification.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::store::SessionStore;
use crate::Result;

const FIELD_EMAIL: &str = "email";
const FIELD_USERNAME: &str = "username";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub email: String,
    pub username: String,
}

pub struct RegistrationSession<S> {
    sessions: S,
    ttl: Duration,
}

impl<S: SessionStore> RegistrationSession<S> {
    pub fn new(sessions: S, ttl: Duration) -> Self {
        Self { sessions, ttl }
    }

    pub fn save_initial(&self, session_id: &str, email: &str, username: &str) -> Result<()> {
        let fields = HashMap::from([
            (FIELD_EMAIL.to_string(), email.to_string()),
            (FIELD_USERNAME.to_string(), username.to_string()),
        ]);
        self.sessions.save(session_id, &fields, self.ttl)?;
        debug!(session_id, "registration data saved");
        Ok(())
    }

    /// `None` unless both email and username are present.
    pub fn load(&self, session_id: &str) -> Result<Option<PendingRegistration>> {
        let mut fields = self.sessions.get_all(session_id)?;
        Ok(fields
            .remove(FIELD_EMAIL)
            .zip(fields.remove(FIELD_USERNAME))
            .map(|(email, username)| PendingRegistration { email, username }))
    }

    pub fn email(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.sessions.get_field(session_id, FIELD_EMAIL)?)
    }

    /// Drop everything stored for the session once sign-up completes.
    pub fn finish(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id)?;
        Ok(())
    }
}
