//! Shortcode validation, generation and allocation.
//!
//! Generated codes are 7 characters drawn uniformly from a 64-symbol
//! URL-safe alphabet (~4.4e12 codes). Collisions are resolved by appending
//! short random disambiguators a bounded number of times; if the final
//! candidate still collides it is accepted anyway. At this code length the
//! chance of that happening is negligible, and the store's insert path
//! disambiguates once more as a fallback.

use std::collections::HashSet;

use crate::error::ValidationError;

/// URL-safe alphabet; 64 symbols so uniform sampling is unbiased
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
pub const GENERATED_LEN: usize = 7;
pub const MIN_LEN: usize = 3;
pub const MAX_LEN: usize = 30;
/// Disambiguation rounds for a generated code before the candidate is accepted
pub const MAX_ALLOCATION_ATTEMPTS: usize = 6;

const DISAMBIGUATOR_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ALLOCATOR_SUFFIX_LEN: usize = 3;

/// `[A-Za-z0-9_-]{3,30}`
pub fn is_valid_shortcode(code: &str) -> bool {
    (MIN_LEN..=MAX_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Random 7-character shortcode
pub fn generate() -> String {
    random_string(ALPHABET, GENERATED_LEN)
}

/// Lower-case base-36 string of `len` random characters
pub(crate) fn disambiguator(len: usize) -> String {
    random_string(DISAMBIGUATOR_ALPHABET, len)
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rand::random_range(0..alphabet.len())] as char)
        .collect()
}

/// Pick an id for a new record.
///
/// A non-blank `preferred` code is validated and used exactly as given, so
/// surrounding whitespace makes it invalid. A missing or blank one gets a
/// random code, disambiguated against `existing` at most
/// [`MAX_ALLOCATION_ATTEMPTS`] times.
pub fn allocate(
    preferred: Option<&str>,
    existing: &HashSet<String>,
) -> Result<String, ValidationError> {
    match preferred.filter(|p| !p.trim().is_empty()) {
        Some(code) => {
            if !is_valid_shortcode(code) {
                return Err(ValidationError::InvalidShortcode);
            }
            if existing.contains(code) {
                return Err(ValidationError::ShortcodeTaken(code.to_string()));
            }
            Ok(code.to_string())
        }
        None => Ok(allocate_generated(generate(), existing)),
    }
}

fn allocate_generated(mut code: String, existing: &HashSet<String>) -> String {
    let mut attempt = 0;
    while existing.contains(&code) && attempt < MAX_ALLOCATION_ATTEMPTS {
        code.push_str(&disambiguator(ALLOCATOR_SUFFIX_LEN));
        attempt += 1;
    }
    if existing.contains(&code) {
        tracing::warn!(code = %code, "accepting colliding shortcode after {attempt} attempts");
    }
    code
}
