//! Shared-secret checks for the inbound webhook path.
//!
//! Payload parsing lives elsewhere; these helpers only decide whether a
//! request carries the right secret.

use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    subtle::ConstantTimeEq,
    tracing::warn,
};

use wabridge_config::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Verify an `X-Hub-Signature-256` style header (`sha256=<hex>`) over `body`.
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(provided) = signature_header.trim().strip_prefix("sha256=") else {
        warn!("invalid signature header format (missing sha256= prefix)");
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        warn!("signature header is not valid hex");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        warn!("failed to create HMAC");
        return false;
    };
    mac.update(body);
    // Constant-time comparison inside `verify_slice`.
    mac.verify_slice(&provided).is_ok()
}

/// Whether `provided` equals the configured webhook token.
///
/// Always false when no token is configured.
pub fn verify_webhook_token(provided: &str, credentials: &Credentials) -> bool {
    let expected = credentials.webhook_token_str();
    if expected.is_empty() {
        return false;
    }
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// Handle a subscription handshake; returns the challenge to echo back.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    credentials: &Credentials,
) -> Option<String> {
    let mode = mode?;
    let token = token?;
    let challenge = challenge?;

    if mode == "subscribe" && verify_webhook_token(token, credentials) {
        Some(challenge.to_string())
    } else {
        warn!(mode, "webhook subscription rejected");
        None
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, secrecy::Secret};

    fn credentials(token: &str) -> Credentials {
        Credentials {
            webhook_token: Some(Secret::new(token.into())),
            ..Default::default()
        }
    }

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_valid() {
        let body = b"{\"entry\":[]}";
        assert!(verify_signature(body, &sign(body, "s3cret"), "s3cret"));
    }

    #[rstest]
    #[case("sha256=0000000000000000000000000000000000000000000000000000000000000000")]
    #[case("sha256=not-hex")]
    #[case("md5=abc")]
    #[case("")]
    fn signature_rejected(#[case] header: &str) {
        assert!(!verify_signature(b"body", header, "s3cret"));
    }

    #[test]
    fn signature_with_wrong_secret_rejected() {
        let body = b"body";
        assert!(!verify_signature(body, &sign(body, "other"), "s3cret"));
    }

    #[rstest]
    #[case("verify-token-0123456789", true)]
    #[case("verify-token-012345678", false)]
    #[case("verify-token-0123456780", false)]
    #[case("verify-token-01234567890", false)]
    #[case("", false)]
    fn token_comparison(#[case] provided: &str, #[case] accepted: bool) {
        let creds = credentials("verify-token-0123456789");
        assert_eq!(verify_webhook_token(provided, &creds), accepted);
    }

    #[test]
    fn unconfigured_token_rejects_everything() {
        assert!(!verify_webhook_token("", &Credentials::default()));
        assert!(!verify_webhook_token("anything", &Credentials::default()));
    }

    #[test]
    fn subscription_handshake() {
        let creds = credentials("my_token");
        assert_eq!(
            verify_subscription(
                Some("subscribe"),
                Some("my_token"),
                Some("challenge_123"),
                &creds
            ),
            Some("challenge_123".to_string())
        );
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("wrong"), Some("c"), &creds),
            None
        );
        assert_eq!(
            verify_subscription(Some("unsubscribe"), Some("my_token"), Some("c"), &creds),
            None
        );
        assert_eq!(
            verify_subscription(None, Some("my_token"), Some("c"), &creds),
            None
        );
    }
}
