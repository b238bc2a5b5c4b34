use hmac::Mac;
use subtle::ConstantTimeEq;

use crate::{Base32, Result, Secret, StringEncoding};

type Sha1Hmac = hmac::Hmac<sha1::Sha1>;

const DIGITS_POWER: [u64; 9] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
];

// Luhn doubling of a single decimal digit.
const DOUBLE_DIGITS: [u64; 10] = [0, 2, 4, 6, 8, 1, 3, 5, 7, 9];

/// Shape of a generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotpParams {
    /// Number of digits before any checksum, 1 to 8.
    pub digits: u32,
    /// Append a Luhn check digit.
    pub checksum: bool,
    /// Fixed truncation offset. `None`, or an offset that would run past
    /// the digest, selects dynamic truncation.
    pub truncation_offset: Option<usize>,
}

impl Default for HotpParams {
    fn default() -> Self {
        HotpParams {
            digits: 6,
            checksum: false,
            truncation_offset: None,
        }
    }
}

impl HotpParams {
    /// Length of the generated code, including the check digit.
    pub fn width(&self) -> usize {
        self.digits as usize + usize::from(self.checksum)
    }
}

/// HMAC-SHA1 one-time passcodes (RFC 4226) over a textual secret.
#[derive(Debug, Clone, Copy)]
pub struct Hotp<E = Base32> {
    encoding: E,
    params: HotpParams,
}

impl Hotp<Base32> {
    pub fn new(params: HotpParams) -> Self {
        Hotp {
            encoding: Base32,
            params,
        }
    }
}

impl Default for Hotp<Base32> {
    fn default() -> Self {
        Hotp::new(HotpParams::default())
    }
}

impl<E: StringEncoding> Hotp<E> {
    /// Get a generator reading secrets with a different textual encoding.
    pub fn with_encoding(encoding: E, params: HotpParams) -> Self {
        Hotp { encoding, params }
    }

    pub fn params(&self) -> HotpParams {
        self.params
    }

    pub fn generate(&self, secret: &Secret, counter: u64) -> Result<String> {
        self.generate_with(secret, counter, self.params)
    }

    pub fn generate_with(&self, secret: &Secret, counter: u64, params: HotpParams) -> Result<String> {
        let key = self.encoding.decode(secret.as_str())?;
        generate_otp(&key, counter, params)
    }

    /// Recompute the code for `counter` and compare it with `candidate`.
    ///
    /// Only the exact counter is checked; there is no look-ahead window.
    pub fn validate(&self, candidate: &str, secret: &Secret, counter: u64) -> Result<bool> {
        self.validate_with(candidate, secret, counter, self.params)
    }

    pub fn validate_with(
        &self,
        candidate: &str,
        secret: &Secret,
        counter: u64,
        params: HotpParams,
    ) -> Result<bool> {
        let expected = self.generate_with(secret, counter, params)?;
        Ok(expected.as_bytes().ct_eq(candidate.as_bytes()).into())
    }
}

/// Compute the zero-padded code for raw `key` bytes.
pub fn generate_otp(key: &[u8], counter: u64, params: HotpParams) -> Result<String> {
    if !(1..=8).contains(&params.digits) {
        return Err(crate::OtpError::InvalidDigits(params.digits));
    }

    // Step 1: Generate an HMAC-SHA-1 value
    let hs = hmac(key, counter)?;

    // Step 2: Generate a 4-byte string (Dynamic Truncation)
    let offset = params
        .truncation_offset
        .filter(|offset| *offset < hs.len() - 4)
        .unwrap_or_else(|| dt_offset(&hs) as usize);
    let sbits = dt(&hs, offset);

    // Step 3: Compute an HOTP value
    let snum = u64::from(u32::from_be_bytes(sbits));
    let mut otp = snum % DIGITS_POWER[params.digits as usize];
    if params.checksum {
        otp = otp * 10 + checksum(otp, params.digits);
    }

    Ok(format!("{:0width$}", otp, width = params.width()))
}

fn hmac(key: &[u8], counter: u64) -> Result<[u8; 20]> {
    let mut mac = Sha1Hmac::new_from_slice(key)?;
    mac.update(&counter.to_be_bytes());
    Ok(mac.finalize().into_bytes().into())
}

fn dt(hs: &[u8; 20], offset: usize) -> [u8; 4] {
    let mut substr = dt_substr(hs, offset);
    substr[0] &= 0b0111_1111;
    substr
}

fn dt_substr(hs: &[u8; 20], offset: usize) -> [u8; 4] {
    [hs[offset], hs[offset + 1], hs[offset + 2], hs[offset + 3]]
}

fn dt_offset(hs: &[u8; 20]) -> u8 {
    hs[19] & 0b1111
}

/// Luhn check digit over the low `digits` digits of `num`.
fn checksum(mut num: u64, digits: u32) -> u64 {
    let mut double = true;
    let mut total = 0;
    for _ in 0..digits {
        let mut digit = num % 10;
        num /= 10;
        if double {
            digit = DOUBLE_DIGITS[digit as usize];
        }
        total += digit;
        double = !double;
    }
    (10 - total % 10) % 10
}
