//! WebAuthn assertion checks
//!
//! The platform authenticator signs `challenge || authenticator_data` with
//! the passkey's private key; we verify against the registered Ed25519
//! public key. The signature counter must strictly increase whenever either
//! side reports a non-zero counter — a regression means a cloned
//! authenticator.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use kgs_core::{KgsError, KgsResult, Passkey};

use crate::CHALLENGE_SIZE;

/// A public-key assertion produced by the recipient's authenticator.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub credential_id: String,
    /// Authenticator data blob covered by the signature
    pub authenticator_data: Vec<u8>,
    /// Echo of the issued challenge
    pub challenge: [u8; CHALLENGE_SIZE],
    /// Ed25519 signature over `challenge || authenticator_data`
    pub signature: Vec<u8>,
    pub signature_counter: u32,
}

/// Verify the assertion signature against the stored passkey.
pub fn verify_signature(passkey: &Passkey, assertion: &Assertion) -> KgsResult<()> {
    let key =
        VerifyingKey::from_bytes(&passkey.public_key).map_err(|_| KgsError::InvalidOrExpired)?;
    let signature =
        Signature::from_slice(&assertion.signature).map_err(|_| KgsError::InvalidOrExpired)?;

    let mut message = Vec::with_capacity(CHALLENGE_SIZE + assertion.authenticator_data.len());
    message.extend_from_slice(&assertion.challenge);
    message.extend_from_slice(&assertion.authenticator_data);

    key.verify(&message, &signature)
        .map_err(|_| KgsError::InvalidOrExpired)
}

/// Replay defense: the counter must strictly exceed the stored one when
/// either is non-zero. Authenticators that never count report zero on both
/// sides and are accepted as-is.
pub fn check_counter(passkey: &Passkey, reported: u32) -> KgsResult<()> {
    if passkey.signature_counter == 0 && reported == 0 {
        return Ok(());
    }
    if reported <= passkey.signature_counter {
        return Err(KgsError::InvalidOrExpired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, Passkey) {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let passkey = Passkey {
            credential_id: "cred1".into(),
            public_key: signing.verifying_key().to_bytes(),
            signature_counter: 0,
            device_label: "laptop".into(),
        };
        (signing, passkey)
    }

    fn signed_assertion(signing: &SigningKey, challenge: [u8; CHALLENGE_SIZE]) -> Assertion {
        let authenticator_data = vec![0x41u8; 37];
        let mut message = challenge.to_vec();
        message.extend_from_slice(&authenticator_data);
        let signature = signing.sign(&message);

        Assertion {
            credential_id: "cred1".into(),
            authenticator_data,
            challenge,
            signature: signature.to_bytes().to_vec(),
            signature_counter: 1,
        }
    }

    #[test]
    fn test_valid_signature() {
        let (signing, passkey) = keypair();
        let assertion = signed_assertion(&signing, [9u8; CHALLENGE_SIZE]);
        assert!(verify_signature(&passkey, &assertion).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (signing, _) = keypair();
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let passkey = Passkey {
            credential_id: "cred1".into(),
            public_key: other.verifying_key().to_bytes(),
            signature_counter: 0,
            device_label: "laptop".into(),
        };

        let assertion = signed_assertion(&signing, [9u8; CHALLENGE_SIZE]);
        let result = verify_signature(&passkey, &assertion);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_tampered_authenticator_data_rejected() {
        let (signing, passkey) = keypair();
        let mut assertion = signed_assertion(&signing, [9u8; CHALLENGE_SIZE]);
        assertion.authenticator_data[0] ^= 0xFF;

        let result = verify_signature(&passkey, &assertion);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_counter_monotonic() {
        let (_, mut passkey) = keypair();
        passkey.signature_counter = 5;

        assert!(check_counter(&passkey, 6).is_ok());
        assert!(matches!(
            check_counter(&passkey, 5),
            Err(KgsError::InvalidOrExpired)
        ));
        assert!(matches!(
            check_counter(&passkey, 4),
            Err(KgsError::InvalidOrExpired)
        ));
    }

    #[test]
    fn test_counterless_authenticator_accepted() {
        let (_, passkey) = keypair();
        assert!(check_counter(&passkey, 0).is_ok());
    }
}
