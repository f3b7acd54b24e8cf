//! Random listing codes.

use rand::Rng;

/// Characters a listing code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a listing code.
pub const CODE_LENGTH: usize = 5;

/// A random code of `length` characters from [`CODE_ALPHABET`], drawn again
/// until `taken` rejects it no longer.
pub fn random_code<R: Rng + ?Sized>(
    rng: &mut R,
    length: usize,
    taken: impl Fn(&str) -> bool,
) -> String {
    loop {
        let code: String = (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        if !taken(&code) {
            return code;
        }
    }
}
