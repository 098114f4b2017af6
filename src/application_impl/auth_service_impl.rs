use super::session_rotation::{RotationPolicy, SessionRotator, issue_pair};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::IdentityStore;
use crate::logger::*;
use std::sync::Arc;

pub struct RealAuthService {
    identity_store: Arc<dyn IdentityStore>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    rotator: SessionRotator,
}

impl RealAuthService {
    pub fn new(
        identity_store: Arc<dyn IdentityStore>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
        policy: RotationPolicy,
    ) -> Self {
        let rotator = SessionRotator::new(token_codec.clone(), identity_store.clone(), policy);
        Self {
            identity_store,
            credential_hasher,
            token_codec,
            rotator,
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { email, secret } = request;
        debug!(%email, "login attempt");

        let Some(identity) = self.identity_store.get_by_email(&email).await? else {
            warn!(%email, "login: identity not found");
            return Err(AuthError::NotFound);
        };

        if identity.is_blocked {
            warn!(user_id = %identity.id, "login: identity is blocked");
            return Err(AuthError::Forbidden);
        }

        let ok = self
            .credential_hasher
            .verify_password(&secret, &identity.secret_digest)
            .await?;
        if !ok {
            warn!(user_id = %identity.id, "login: secret mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = issue_pair(self.token_codec.as_ref(), identity.id).await?;
        self.identity_store
            .update_refresh_token(identity.id, &tokens.refresh_token.0)
            .await?;

        info!(user_id = %identity.id, "login succeeded");
        Ok(LoginResult {
            identity: identity.into(),
            tokens,
        })
    }

    async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        if self.identity_store.get_by_id(user_id).await?.is_none() {
            warn!(%user_id, "logout: identity not found");
            return Err(AuthError::NotFound);
        }

        self.identity_store.invalidate_session(user_id).await?;

        info!(%user_id, "logout succeeded");
        Ok(())
    }

    async fn refresh_tokens(
        &self,
        user_id: UserId,
        old_refresh_token: &str,
    ) -> Result<AuthTokens, AuthError> {
        let claims = self.token_codec.verify(old_refresh_token).await?;
        if claims.kind != TokenKind::Refresh || claims.subject != user_id {
            warn!(%user_id, kind = %claims.kind, "refresh: token does not belong to this session");
            return Err(AuthError::TokenInvalid);
        }

        let Some(identity) = self.identity_store.get_by_id(user_id).await? else {
            warn!(%user_id, "refresh: identity not found");
            return Err(AuthError::SessionInvalidated);
        };

        let tokens = self.rotator.rotate(&identity, old_refresh_token).await?;

        info!(%user_id, "tokens refreshed");
        Ok(tokens)
    }
}
