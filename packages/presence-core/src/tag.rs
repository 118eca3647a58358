//! Tag generation for statuses submitted without a caller-assigned tag.

use rand::Rng;

const TAG_LEN: usize = 10;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generates a fresh random 10-character `[A-Za-z]` tag.
///
/// Mirrors `tippresence.utils.random_str(10)` in `original_source` -- used
/// whenever `Put` is called without a caller-supplied tag.
#[must_use]
pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..TAG_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
