//! HMAC-SHA256 verification of raw request bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::PipelineError;

type HmacSha256 = Hmac<Sha256>;

/// Header the scheduling platform signs its deliveries with.
pub const PLATFORM_SIGNATURE_HEADER: &str = "x-cal-signature-256";
/// Header the transcription worker signs callbacks with, when configured.
pub const WORKER_SIGNATURE_HEADER: &str = "x-worker-signature-256";

/// Verifies hex HMAC-SHA256 signatures over the exact bytes received.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
}

impl SignatureVerifier {
    /// An empty secret yields a verifier that rejects everything.
    pub fn new(secret: &str) -> Self {
        let secret = (!secret.is_empty()).then(|| secret.as_bytes().to_vec());
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, raw_body: &[u8], signature: Option<&str>) -> Result<(), PipelineError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| PipelineError::Authentication("no signing secret configured".into()))?;

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::Authentication("missing signature header".into()))?;

        // Some senders prefix the digest with the algorithm name
        let hex = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = decode_hex(hex)
            .ok_or_else(|| PipelineError::Authentication("malformed signature".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| PipelineError::Authentication("unusable signing secret".into()))?;
        mac.update(raw_body);

        // verify_slice compares in constant time
        mac.verify_slice(&expected)
            .map_err(|_| PipelineError::Authentication("signature mismatch".into()))
    }

    /// Hex signature for `raw_body`, used by tests and local tooling.
    pub fn sign(&self, raw_body: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(raw_body);
        Some(encode_hex(&mac.finalize().into_bytes()))
    }
}

// Hex helpers; the digest is the only thing we ever encode
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"triggerEvent":"BOOKING_CREATED","payload":{"uid":"b1"}}"#;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let verifier = SignatureVerifier::new("Jefe");
        assert_eq!(
            verifier.sign(b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_accepts_valid_signature() {
        let verifier = SignatureVerifier::new("whsec");
        let sig = verifier.sign(BODY).unwrap();
        assert!(verifier.verify(BODY, Some(&sig)).is_ok());
        assert!(verifier.verify(BODY, Some(&sig.to_uppercase())).is_ok());
        assert!(verifier
            .verify(BODY, Some(&format!("sha256={}", sig)))
            .is_ok());
    }

    #[test]
    fn test_rejects_any_body_mutation() {
        let verifier = SignatureVerifier::new("whsec");
        let sig = verifier.sign(BODY).unwrap();

        for i in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            mutated[i] ^= 0x01;
            assert!(
                verifier.verify(&mutated, Some(&sig)).is_err(),
                "mutation at byte {} accepted",
                i
            );
        }

        // Re-serialised JSON is a different byte string
        let reserialized =
            serde_json::to_vec_pretty(&serde_json::from_slice::<serde_json::Value>(BODY).unwrap())
                .unwrap();
        assert!(verifier.verify(&reserialized, Some(&sig)).is_err());
    }

    #[test]
    fn test_rejects_any_signature_mutation() {
        let verifier = SignatureVerifier::new("whsec");
        let sig = verifier.sign(BODY).unwrap();

        for (i, c) in sig.char_indices() {
            let replacement = if c == '0' { '1' } else { '0' };
            let mut mutated = sig.clone();
            mutated.replace_range(i..i + 1, &replacement.to_string());
            assert!(verifier.verify(BODY, Some(&mutated)).is_err());
        }

        assert!(verifier.verify(BODY, Some(&sig[..sig.len() - 2])).is_err());
        assert!(verifier.verify(BODY, Some("not-hex")).is_err());
    }

    #[test]
    fn test_fails_closed() {
        let unconfigured = SignatureVerifier::new("");
        assert!(!unconfigured.is_configured());
        assert!(matches!(
            unconfigured.verify(BODY, Some("00")),
            Err(PipelineError::Authentication(_))
        ));

        let verifier = SignatureVerifier::new("whsec");
        assert!(matches!(
            verifier.verify(BODY, None),
            Err(PipelineError::Authentication(_))
        ));
        assert!(verifier.verify(BODY, Some("  ")).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = SignatureVerifier::new("other-secret");
        let sig = signer.sign(BODY).unwrap();
        assert!(SignatureVerifier::new("whsec").verify(BODY, Some(&sig)).is_err());
    }
}
