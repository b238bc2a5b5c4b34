use std::time::Duration;

use serde::Deserialize;

use crate::HotpParams;

/// Settings for issuing and verifying registration codes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OtpConfig {
    /// Code length, excluding the optional check digit.
    #[serde(default = "default_digits")]
    pub digits: u32,

    #[serde(default)]
    pub checksum: bool,

    #[serde(default)]
    pub truncation_offset: Option<usize>,

    /// How long an issued code stays valid.
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: u64,

    /// Failed verifications allowed before the session is blocked.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Hand the code back to the caller instead of sending it.
    #[serde(default)]
    pub debug: bool,

    /// Width of one moving-factor window.
    #[serde(default = "default_counter_step_seconds")]
    pub counter_step_seconds: u64,

    /// TTL of the per-session entries (attempt state, pending registration).
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Front-end address used to build the verification link.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_digits() -> u32 {
    6
}

fn default_lifetime_minutes() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_counter_step_seconds() -> u64 {
    30
}

fn default_session_ttl_seconds() -> u64 {
    30 * 60
}

fn default_app_name() -> String {
    "otp-gate".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5173/".to_string()
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            digits: default_digits(),
            checksum: false,
            truncation_offset: None,
            lifetime_minutes: default_lifetime_minutes(),
            max_attempts: default_max_attempts(),
            debug: false,
            counter_step_seconds: default_counter_step_seconds(),
            session_ttl_seconds: default_session_ttl_seconds(),
            app_name: default_app_name(),
            base_url: default_base_url(),
        }
    }
}

impl OtpConfig {
    /// Load configuration from `OTP_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "OTP_DIGITS", &mut config.digits);
        parse_into(&lookup, "OTP_CHECKSUM", &mut config.checksum);
        parse_into(&lookup, "OTP_LIFETIME_MINUTES", &mut config.lifetime_minutes);
        parse_into(&lookup, "OTP_MAX_ATTEMPTS", &mut config.max_attempts);
        parse_into(&lookup, "OTP_DEBUG", &mut config.debug);
        parse_into(&lookup, "OTP_COUNTER_STEP_SECONDS", &mut config.counter_step_seconds);
        parse_into(&lookup, "OTP_SESSION_TTL_SECONDS", &mut config.session_ttl_seconds);

        if let Some(offset) = lookup("OTP_TRUNCATION_OFFSET") {
            config.truncation_offset = offset.parse().ok();
        }
        if let Some(name) = lookup("OTP_APP_NAME") {
            config.app_name = name;
        }
        if let Some(url) = lookup("OTP_BASE_URL") {
            config.base_url = url;
        }

        config
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_minutes.saturating_mul(60))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn params(&self) -> HotpParams {
        HotpParams {
            digits: self.digits,
            checksum: self.checksum,
            truncation_offset: self.truncation_offset,
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}
