use crate::application_port::AuthError;
use crate::domain_model::*;

/// How much a route trusts a bare access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Both tokens required; an expired access token is renewed from the refresh token.
    Rotating,
    /// Access token only, no fallback and no rotation.
    AccessOnly,
}

#[derive(Debug, Clone, Default)]
pub struct PresentedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl PresentedTokens {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        // blank header values count as absent
        let non_empty = |t: Option<String>| t.filter(|s| !s.trim().is_empty());
        PresentedTokens {
            access_token: non_empty(access_token),
            refresh_token: non_empty(refresh_token),
        }
    }
}

/// Result of a successful admission. When `rotated` is set the caller must
/// hand the new pair to the client, the old pair is already dead.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: PublicIdentity,
    pub rotated: Option<AuthTokens>,
}

#[async_trait::async_trait]
pub trait AuthGate: Send + Sync {
    async fn admit(&self, presented: PresentedTokens, mode: GateMode)
    -> Result<Admission, AuthError>;
}
