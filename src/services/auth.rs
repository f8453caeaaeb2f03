//! The committee authentication gate.
//!
//! There are no per-user accounts: one shared intranet password plus a server
//! secret hash into a single session token, and any request presenting that
//! token in the `commission_auth` cookie is the committee. The separate
//! `commission_user` cookie only carries a display name for attribution; it
//! is unauthenticated and trivially spoofable, which is an accepted weakness
//! of the trust model, not something to harden here.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};

/// HTTP-only cookie holding the session token.
pub const AUTH_COOKIE: &str = "commission_auth";
/// Client-readable cookie holding the display username.
pub const USER_COOKIE: &str = "commission_user";

pub struct AuthService;

impl AuthService {
    /// The one token that authenticates the committee:
    /// `hex(sha256(password ++ secret))`, independent of who logged in.
    /// Recomputed from config on every check so a secret rotation takes
    /// effect without invalidating logic elsewhere.
    pub fn session_token(session: &SessionConfig) -> String {
        let mut hasher = Sha256::new();
        hasher.update(session.intranet_password.trim().as_bytes());
        hasher.update(session.session_secret.trim().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether a presented cookie value is the current session token.
    pub fn token_matches(session: &SessionConfig, presented: &str) -> bool {
        !presented.is_empty() && constant_time_eq(presented, &Self::session_token(session))
    }

    /// Look the submitted name up in the member allow-list, ignoring case
    /// and surrounding whitespace. Returns the canonical spelling so the
    /// attribution cookie always carries the list's form of the name.
    pub fn canonical_member(session: &SessionConfig, username: &str) -> Option<String> {
        let wanted = username.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        session
            .members
            .iter()
            .find(|m| m.trim().to_lowercase() == wanted)
            .cloned()
    }

    /// Verify a login attempt: known member name plus the shared password,
    /// compared in constant time. Both failure modes collapse into the same
    /// error so the response does not reveal which part was wrong.
    pub fn verify_login(
        session: &SessionConfig,
        username: &str,
        password: &str,
    ) -> AppResult<String> {
        let member = Self::canonical_member(session, username);
        let password_ok = constant_time_eq(password.trim(), session.intranet_password.trim());

        match member {
            Some(member) if password_ok => Ok(member),
            _ => Err(AppError::Unauthorized(
                "Usuario o contraseña incorrectos".to_string(),
            )),
        }
    }
}

/// Constant-time string comparison. Hashing both sides first gives
/// fixed-length inputs, so the comparison leaks neither contents nor length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let hash_a = Sha256::digest(a.as_bytes());
    let hash_b = Sha256::digest(b.as_bytes());
    hash_a.ct_eq(&hash_b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn session() -> crate::config::SessionConfig {
        Config::default().session
    }

    #[test]
    fn session_token_is_deterministic_and_username_independent() {
        let s = session();
        assert_eq!(AuthService::session_token(&s), AuthService::session_token(&s));
        assert!(AuthService::token_matches(&s, &AuthService::session_token(&s)));
    }

    #[test]
    fn token_rotates_with_the_secret() {
        let mut s = session();
        let before = AuthService::session_token(&s);
        s.session_secret = "rotated".to_string();
        assert_ne!(before, AuthService::session_token(&s));
        assert!(!AuthService::token_matches(&s, &before));
    }

    #[test]
    fn empty_cookie_never_matches() {
        assert!(!AuthService::token_matches(&session(), ""));
    }

    #[test]
    fn member_lookup_is_trimmed_and_case_insensitive() {
        let s = session();
        assert_eq!(
            AuthService::canonical_member(&s, "  alba "),
            Some("Alba".to_string())
        );
        assert_eq!(AuthService::canonical_member(&s, "nadie"), None);
        assert_eq!(AuthService::canonical_member(&s, ""), None);
    }

    #[test]
    fn login_requires_both_member_and_password() {
        let s = session();
        assert_eq!(
            AuthService::verify_login(&s, "Alba", "fiestas2025").unwrap(),
            "Alba"
        );
        assert!(AuthService::verify_login(&s, "Alba", "wrong").is_err());
        assert!(AuthService::verify_login(&s, "nadie", "fiestas2025").is_err());
    }
}
