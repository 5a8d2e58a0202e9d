//! PKCE (Proof Key for Code Exchange) helpers
//!
//! The verifier is a random alphanumeric string; the challenge is
//! `BASE64URL-NOPAD(SHA256(verifier))` as required by `code_challenge_method=S256`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::spotify::VERIFIER_LENGTH;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Secret half of a PKCE pair, kept client-side until the code exchange
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Generate a fresh verifier from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier = (0..VERIFIER_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(verifier)
    }

    /// Wrap a verifier restored from storage
    pub fn from_string(verifier: impl Into<String>) -> Self {
        Self(verifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the S256 challenge
    pub fn challenge(&self) -> PkceChallenge {
        PkceChallenge::from_verifier(&self.0)
    }
}

// Never print the secret
impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PkceVerifier").field(&"<redacted>").finish()
    }
}

/// Public half of a PKCE pair, sent with the authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    pub fn from_verifier(verifier: &str) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Always `S256`
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let verifier = PkceVerifier::generate();
        assert_eq!(verifier.as_str().len(), VERIFIER_LENGTH);
        assert!(verifier.as_str().len() >= 43);
        assert!(verifier.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(PkceVerifier::generate(), PkceVerifier::generate());
    }

    #[test]
    fn test_challenge_matches_rfc7636_appendix_b() {
        let challenge = PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge.as_str(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(challenge.method(), "S256");
    }

    #[test]
    fn test_challenge_is_deterministic_and_unpadded() {
        let verifier = PkceVerifier::from_string("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJ");
        let a = verifier.challenge();
        let b = verifier.challenge();
        assert_eq!(a, b);
        assert!(!a.as_str().contains('='));
        assert!(!a.as_str().contains('+'));
        assert!(!a.as_str().contains('/'));
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let verifier = PkceVerifier::from_string("super-secret");
        assert!(!format!("{:?}", verifier).contains("super-secret"));
    }
}
