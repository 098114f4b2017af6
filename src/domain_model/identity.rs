use crate::domain_model::UserId;
use serde::Serialize;

/// A user record as owned by the identity store.
///
/// Each identity carries exactly one session slot: the pair
/// (`current_refresh_token`, `is_session_valid`). A presented refresh token
/// is accepted iff it equals `current_refresh_token` and the flag is set.
/// Login fills the slot, every rotation replaces it, logout clears it.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub secret_digest: String,
    pub is_blocked: bool,
    pub is_session_valid: bool,
    pub current_refresh_token: Option<String>,
}

impl Identity {
    /// A fresh identity with no session.
    pub fn new(id: UserId, email: impl Into<String>, secret_digest: impl Into<String>) -> Self {
        Identity {
            id,
            email: email.into(),
            secret_digest: secret_digest.into(),
            is_blocked: false,
            is_session_valid: false,
            current_refresh_token: None,
        }
    }

    pub fn holds_session(&self, presented_refresh_token: &str) -> bool {
        self.is_session_valid
            && self.current_refresh_token.as_deref() == Some(presented_refresh_token)
    }
}

/// What leaves the service: no secret digest, no session fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicIdentity {
    pub id: UserId,
    pub email: String,
    pub is_blocked: bool,
}

impl From<Identity> for PublicIdentity {
    fn from(identity: Identity) -> Self {
        PublicIdentity {
            id: identity.id,
            email: identity.email,
            is_blocked: identity.is_blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with_session(token: Option<&str>, valid: bool) -> Identity {
        let mut identity = Identity::new(UserId::new_random(), "a@test.com", "digest");
        identity.current_refresh_token = token.map(str::to_string);
        identity.is_session_valid = valid;
        identity
    }

    #[test]
    fn session_requires_both_value_and_flag() {
        assert!(identity_with_session(Some("r1"), true).holds_session("r1"));
        assert!(!identity_with_session(Some("r1"), true).holds_session("r2"));
        assert!(!identity_with_session(Some("r1"), false).holds_session("r1"));
        assert!(!identity_with_session(None, true).holds_session(""));
    }

    #[test]
    fn public_view_strips_digest() {
        let identity = identity_with_session(Some("r1"), true);
        let json = serde_json::to_value(PublicIdentity::from(identity)).unwrap();
        assert!(json.get("secret_digest").is_none());
        assert!(json.get("current_refresh_token").is_none());
        assert_eq!(json["email"], "a@test.com");
    }
}
