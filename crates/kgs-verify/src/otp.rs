//! One-time code generation and comparison

use rand::Rng;
use subtle::ConstantTimeEq;

use crate::CODE_DIGITS;

/// Generate a zero-padded 6-digit code from the OS CSPRNG.
pub fn generate_code() -> String {
    let n: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
    format!("{n:0width$}", width = CODE_DIGITS)
}

/// Constant-time code comparison.
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(submitted.as_bytes()))
}
