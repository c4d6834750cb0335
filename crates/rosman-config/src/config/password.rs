//! Password generation for declared users without one of their own.

use rand::seq::SliceRandom;
use rand::Rng;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SPECIAL: &[u8] = b"!@#$%&*";
const DIGITS: &[u8] = b"0123456789";

/// Length used for auto-generated passwords. Nobody types these; they
/// exist so the account never sits without a credential.
pub const GENERATED_PASSWORD_LEN: usize = 512;

/// Random password with at least one special character, one digit and
/// one uppercase letter; the rest is drawn from the full alphabet and
/// the whole thing shuffled so the mandatory classes are not
/// positional.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [LOWER, UPPER, SPECIAL, DIGITS].concat();

    let mut chars: Vec<char> = Vec::with_capacity(length.max(3));
    chars.push(SPECIAL[rng.gen_range(0..SPECIAL.len())] as char);
    chars.push(DIGITS[rng.gen_range(0..DIGITS.len())] as char);
    chars.push(UPPER[rng.gen_range(0..UPPER.len())] as char);
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())] as char);
    }
    chars.truncate(length);
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}
