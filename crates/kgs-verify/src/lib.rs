//! kgs-verify: proof of recipient identity before key release
//!
//! One verification session per recipient-access-attempt, driven through
//! `NotStarted → CodeIssued → Verified` or a terminal failure. Two methods:
//! a 6-digit one-time code (always available) and a WebAuthn assertion
//! (offered when the recipient's device supports it). Method choice is an
//! explicit capability flag, never runtime feature sniffing.
//!
//! Every failure — wrong code, expired code, replayed code, over the
//! attempt limit, bad assertion — surfaces as the same `InvalidOrExpired`
//! so callers get no oracle.

pub mod otp;
pub mod session;
pub mod webauthn;

pub use session::{
    ChallengeGate, ChallengeMethod, IssuedChallenge, IssuedCode, SessionState, VerificationSession,
};
pub use webauthn::Assertion;

/// WebAuthn challenge length in bytes (256-bit).
pub const CHALLENGE_SIZE: usize = 32;

/// One-time code length in digits.
pub const CODE_DIGITS: usize = 6;
