//! RFC 4648 base32 without padding.
//!
//! Decoding upper-cases its input first and drops trailing bits that do
//! not fill a whole byte, so any prefix of a valid encoding still decodes.

use base32::Alphabet;

const ALPHABET: Alphabet = Alphabet::Rfc4648 { padding: false };

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodingError {
    #[error("invalid character {character:?} at position {position} in base32 string")]
    InvalidCharacter { character: char, position: usize },
    #[error("malformed base32 string")]
    Malformed,
}

/// A textual encoding for raw key bytes.
pub trait StringEncoding {
    fn encode(&self, data: &[u8]) -> String;
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, DecodingError>;
}

/// The [`StringEncoding`] backed by [`encode`] and [`decode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Base32;

impl StringEncoding for Base32 {
    fn encode(&self, data: &[u8]) -> String {
        encode(data)
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>, DecodingError> {
        decode(encoded)
    }
}

pub fn encode(data: &[u8]) -> String {
    base32::encode(ALPHABET, data)
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, DecodingError> {
    // The crate strips trailing '=' before looking at symbols.
    if let Some((position, character)) = encoded
        .chars()
        .enumerate()
        .find(|(_, c)| !is_symbol(c.to_ascii_uppercase()))
    {
        return Err(DecodingError::InvalidCharacter {
            character,
            position,
        });
    }

    base32::decode(ALPHABET, &encoded.to_ascii_uppercase()).ok_or(DecodingError::Malformed)
}

fn is_symbol(c: char) -> bool {
    matches!(c, 'A'..='Z' | '2'..='7')
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use crate::base32::{decode, encode, Base32, DecodingError, StringEncoding};

    // RFC 4648 section 10, padding stripped
    #[test_case(b"", "")]
    #[test_case(b"f", "MY")]
    #[test_case(b"fo", "MZXQ")]
    #[test_case(b"foo", "MZXW6")]
    #[test_case(b"foob", "MZXW6YQ")]
    #[test_case(b"fooba", "MZXW6YTB")]
    #[test_case(b"foobar", "MZXW6YTBOI")]
    #[test_case(b"12345678901234567890", "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")]
    fn it_encodes_rfc4648_vectors(data: &[u8], expected: &str) {
        assert_eq!(encode(data), expected);
        assert_eq!(decode(expected).unwrap(), data);
    }

    #[test]
    fn it_decodes_lowercase() {
        assert_eq!(decode("mzxw6ytboi").unwrap(), b"foobar");
        assert_eq!(decode("MzXw6YtBoI").unwrap(), b"foobar");
    }

    #[test]
    fn it_drops_incomplete_trailing_bits() {
        assert_eq!(decode("M").unwrap(), b"");
        assert_eq!(decode("MZX").unwrap(), b"f");
        assert_eq!(decode("MZXW6Y").unwrap(), b"foo");
    }

    #[test_case("MY======", '=', 2 ; "padding")]
    #[test_case("MZ1Q", '1', 2 ; "digit outside alphabet")]
    #[test_case("MZ XQ", ' ', 2 ; "whitespace")]
    #[test_case("MZXQ8", '8', 4 ; "eight")]
    #[test_case("ÄMY", 'Ä', 0 ; "non ascii")]
    fn it_rejects_characters_outside_the_alphabet(input: &str, character: char, position: usize) {
        let err = decode(input).unwrap_err();
        assert_eq!(
            err,
            DecodingError::InvalidCharacter {
                character,
                position
            }
        );
    }

    #[test]
    fn it_round_trips_arbitrary_bytes() {
        let mut data = Vec::new();
        for len in 0..=40u8 {
            let encoded = encode(&data);
            assert!(encoded.bytes().all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)));
            assert_eq!(decode(&encoded).unwrap(), data);
            data.push(len.wrapping_mul(37) ^ 0xa5);
        }
    }

    #[test_case("MZXQ=" ; "single trailing pad")]
    #[test_case("MZXW6===" ; "pad run")]
    fn it_rejects_trailing_padding(input: &str) {
        assert!(matches!(
            decode(input),
            Err(DecodingError::InvalidCharacter { character: '=', .. })
        ));
    }

    #[test]
    fn it_decodes_the_rfc4226_secret_in_any_case() {
        let upper = decode("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
        let lower = decode("gezdgnbvgy3tqojqgezdgnbvgy3tqojq").unwrap();
        assert_eq!(upper, b"12345678901234567890");
        assert_eq!(lower, upper);
    }

    #[test]
    fn it_dispatches_through_the_trait() {
        let encoding = Base32;
        let encoded = encoding.encode(&[0xff, 0x00, 0x7f]);
        assert_eq!(encoded, "74AH6");
        assert_eq!(encoding.decode(&encoded).unwrap(), vec![0xff, 0x00, 0x7f]);
    }
}
