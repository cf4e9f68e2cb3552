//! Password hashing used by the GS108Ev3 login form.

use md5::{Digest, Md5};

/// Interleaves the characters of `a` and `b`, then appends whatever is left
/// of the longer one.
fn interleave(a: &str, b: &str) -> String {
    let mut merged = String::with_capacity(a.len() + b.len());
    let mut left = a.chars();
    let mut right = b.chars();
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => {
                merged.push(l);
                merged.push(r);
            }
            (Some(l), None) => {
                merged.push(l);
                merged.extend(left.by_ref());
                break;
            }
            (None, Some(r)) => {
                merged.push(r);
                merged.extend(right.by_ref());
                break;
            }
            (None, None) => break,
        }
    }
    merged
}

/// Hash `password` with the per-login random number served in the form.
pub fn password_kdf(password: &str, rand: &str) -> String {
    let digest = Md5::digest(interleave(password, rand).as_bytes());
    hex::encode(digest)
}
