//! Constant-time string comparison.

/// Compare two strings without short-circuiting on the first differing byte.
///
/// For inputs of equal length the running time does not depend on where a
/// mismatch occurs. A length mismatch returns `false` immediately; lengths are
/// not secret for the tokens this guards.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }

    diff == 0
}
