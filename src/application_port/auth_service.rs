use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing tokens")]
    MissingTokens,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("identity not found")]
    NotFound,
    #[error("identity is blocked")]
    Forbidden,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("session invalidated")]
    SessionInvalidated,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Failures of the token itself, as opposed to the session or the store.
    pub fn is_token_failure(&self) -> bool {
        matches!(self, AuthError::TokenExpired | AuthError::TokenInvalid)
    }
}

#[derive(Clone)]
pub struct LoginInput {
    pub email: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub identity: PublicIdentity,
    pub tokens: AuthTokens,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    /// Mint a signed token for `subject` with the lifetime of `kind`.
    async fn generate(&self, subject: UserId, kind: TokenKind) -> Result<IssuedToken, AuthError>;
    /// Check signature, issuer, audience and expiry.
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
    /// Read the payload without checking anything. Never admit on this.
    async fn decode(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    async fn logout(&self, user_id: UserId) -> Result<(), AuthError>;
    async fn refresh_tokens(
        &self,
        user_id: UserId,
        old_refresh_token: &str,
    ) -> Result<AuthTokens, AuthError>;
}
