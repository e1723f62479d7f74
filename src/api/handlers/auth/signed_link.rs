//! HMAC-signed email verification links.
//!
//! Links carry the user id, a fingerprint of the email, an expiry, and a
//! signature over all three. The server keeps no per-link state; any party
//! can present the link but nobody can forge or extend one without the app
//! key.

use anyhow::{anyhow, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::normalize_email;

type HmacSha256 = Hmac<Sha256>;

/// Components of a verification link.
#[derive(Debug, Clone)]
pub(super) struct SignedLink {
    pub(super) user_id: Uuid,
    pub(super) email_hash: String,
    pub(super) expires: i64,
    pub(super) signature: String,
}

impl SignedLink {
    /// Absolute URL the email template embeds.
    pub(super) fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        format!(
            "{base}/v1/auth/verify-email/{id}/{hash}?expires={expires}&signature={signature}",
            id = self.user_id,
            hash = self.email_hash,
            expires = self.expires,
            signature = self.signature,
        )
    }
}

/// Outcome of validating a presented link.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum VerifyOutcome {
    Valid,
    Expired,
    Tampered,
}

/// Fingerprint of the normalized email, bound into the link so a verified
/// address cannot be swapped after signing.
pub(super) fn email_fingerprint(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_email(email).as_bytes());
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}

fn signing_input(user_id: Uuid, email_hash: &str, expires: i64) -> String {
    format!("{user_id}.{email_hash}.{expires}")
}

fn sign(app_key: &SecretString, user_id: Uuid, email_hash: &str, expires: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(app_key.expose_secret().as_bytes())
        .map_err(|err| anyhow!("invalid app key: {err}"))?;
    mac.update(signing_input(user_id, email_hash, expires).as_bytes());
    Ok(Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes()))
}

/// Build a fresh signed link for the user, expiring `verify_link_ttl` from
/// `now` (unix seconds).
pub(super) fn build_link(
    config: &AuthConfig,
    user_id: Uuid,
    email: &str,
    now: i64,
) -> Result<SignedLink> {
    let email_hash = email_fingerprint(email);
    let expires = now + config.verify_link_ttl_seconds();
    let signature = sign(config.app_key(), user_id, &email_hash, expires)?;
    Ok(SignedLink {
        user_id,
        email_hash,
        expires,
        signature,
    })
}

/// Validate a presented link against the app key and the clock.
///
/// The signature check runs first and in constant time; expiry is only
/// consulted for authentically signed links.
pub(super) fn verify(
    app_key: &SecretString,
    user_id: Uuid,
    email_hash: &str,
    expires: i64,
    signature: &str,
    now: i64,
) -> Result<VerifyOutcome> {
    let Ok(presented) = Base64UrlUnpadded::decode_vec(signature) else {
        return Ok(VerifyOutcome::Tampered);
    };

    let mut mac = HmacSha256::new_from_slice(app_key.expose_secret().as_bytes())
        .map_err(|err| anyhow!("invalid app key: {err}"))?;
    mac.update(signing_input(user_id, email_hash, expires).as_bytes());
    if mac.verify_slice(&presented).is_err() {
        return Ok(VerifyOutcome::Tampered);
    }

    if expires <= now {
        return Ok(VerifyOutcome::Expired);
    }

    Ok(VerifyOutcome::Valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(SecretString::from("unit-test-key"))
            .with_base_url("https://api.sesamo.dev".to_string())
            .with_verify_link_ttl(3600)
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn email_fingerprint_normalizes_first() {
        assert_eq!(
            email_fingerprint(" Alice@Example.COM "),
            email_fingerprint("alice@example.com")
        );
        assert_ne!(
            email_fingerprint("alice@example.com"),
            email_fingerprint("bob@example.com")
        );
    }

    #[test]
    fn build_then_verify_round_trip() {
        let config = config();
        let user_id = Uuid::new_v4();
        let link = build_link(&config, user_id, "alice@example.com", NOW).unwrap();

        assert_eq!(link.expires, NOW + 3600);
        let outcome = verify(
            config.app_key(),
            user_id,
            &link.email_hash,
            link.expires,
            &link.signature,
            NOW + 10,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Valid);
    }

    #[test]
    fn url_embeds_all_parts() {
        let config = config();
        let user_id = Uuid::nil();
        let link = build_link(&config, user_id, "alice@example.com", NOW).unwrap();
        let url = link.url(config.base_url());

        assert!(url.starts_with(&format!(
            "https://api.sesamo.dev/v1/auth/verify-email/{user_id}/{}",
            link.email_hash
        )));
        assert!(url.contains(&format!("expires={}", link.expires)));
        assert!(url.contains(&format!("signature={}", link.signature)));
    }

    #[test]
    fn expired_link_is_reported_as_expired() {
        let config = config();
        let user_id = Uuid::new_v4();
        let link = build_link(&config, user_id, "alice@example.com", NOW).unwrap();

        let outcome = verify(
            config.app_key(),
            user_id,
            &link.email_hash,
            link.expires,
            &link.signature,
            link.expires,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Expired);
    }

    #[test]
    fn tampering_with_any_component_invalidates() {
        let config = config();
        let user_id = Uuid::new_v4();
        let link = build_link(&config, user_id, "alice@example.com", NOW).unwrap();

        // different user id
        let outcome = verify(
            config.app_key(),
            Uuid::new_v4(),
            &link.email_hash,
            link.expires,
            &link.signature,
            NOW,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Tampered);

        // extended expiry
        let outcome = verify(
            config.app_key(),
            user_id,
            &link.email_hash,
            link.expires + 1,
            &link.signature,
            NOW,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Tampered);

        // swapped email fingerprint
        let outcome = verify(
            config.app_key(),
            user_id,
            &email_fingerprint("bob@example.com"),
            link.expires,
            &link.signature,
            NOW,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Tampered);
    }

    #[test]
    fn garbage_signature_is_tampered_not_error() {
        let config = config();
        let outcome = verify(
            config.app_key(),
            Uuid::new_v4(),
            "hash",
            NOW + 100,
            "!!not-base64!!",
            NOW,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Tampered);
    }

    #[test]
    fn signature_depends_on_key() {
        let user_id = Uuid::new_v4();
        let link = build_link(&config(), user_id, "alice@example.com", NOW).unwrap();

        let other_key = SecretString::from("a different key");
        let outcome = verify(
            &other_key,
            user_id,
            &link.email_hash,
            link.expires,
            &link.signature,
            NOW,
        )
        .unwrap();
        assert_eq!(outcome, VerifyOutcome::Tampered);
    }
}
