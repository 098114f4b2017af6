use crate::application_port::{AuthError, TokenCodec};
use crate::domain_model::*;
use crate::domain_port::IdentityStore;
use crate::logger::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    /// Kill the session when a stale refresh token shows up on a live session.
    pub revoke_on_reuse: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        RotationPolicy {
            revoke_on_reuse: true,
        }
    }
}

pub(crate) async fn issue_pair(
    codec: &dyn TokenCodec,
    user_id: UserId,
) -> Result<AuthTokens, AuthError> {
    let access = codec.generate(user_id, TokenKind::Access).await?;
    let refresh = codec.generate(user_id, TokenKind::Refresh).await?;
    Ok(AuthTokens {
        access_token: AccessToken(access.token),
        refresh_token: RefreshToken(refresh.token),
        access_token_expires_at: access.expires_at,
        refresh_token_expires_at: refresh.expires_at,
    })
}

/// Replaces a session's refresh token with a freshly minted pair.
#[derive(Clone)]
pub(crate) struct SessionRotator {
    token_codec: Arc<dyn TokenCodec>,
    identity_store: Arc<dyn IdentityStore>,
    policy: RotationPolicy,
}

impl SessionRotator {
    pub(crate) fn new(
        token_codec: Arc<dyn TokenCodec>,
        identity_store: Arc<dyn IdentityStore>,
        policy: RotationPolicy,
    ) -> Self {
        SessionRotator {
            token_codec,
            identity_store,
            policy,
        }
    }

    /// `presented` must already be a verified refresh token for `identity`.
    pub(crate) async fn rotate(
        &self,
        identity: &Identity,
        presented: &str,
    ) -> Result<AuthTokens, AuthError> {
        if identity.is_blocked {
            warn!(user_id = %identity.id, "rotation refused: identity is blocked");
            return Err(AuthError::Forbidden);
        }

        if !identity.holds_session(presented) {
            warn!(
                user_id = %identity.id,
                token = %fingerprint(presented),
                session_valid = identity.is_session_valid,
                "refresh token does not match the current session"
            );
            if self.policy.revoke_on_reuse && identity.is_session_valid {
                self.identity_store.invalidate_session(identity.id).await?;
                warn!(user_id = %identity.id, "session revoked after refresh token reuse");
            }
            return Err(AuthError::SessionInvalidated);
        }

        let tokens = issue_pair(self.token_codec.as_ref(), identity.id).await?;

        // Once issued, the write runs to completion even if the caller goes away.
        let store = self.identity_store.clone();
        let user_id = identity.id;
        let expected = presented.to_owned();
        let replacement = tokens.refresh_token.0.clone();
        let swapped = tokio::spawn(async move {
            store
                .rotate_refresh_token(user_id, &expected, &replacement)
                .await
        })
        .await
        .map_err(|e| AuthError::InternalError(format!("rotation task: {e}")))?
        .map_err(|e| match e {
            AuthError::Store(msg) => AuthError::InternalError(format!("rotation write: {msg}")),
            other => other,
        })?;

        if !swapped {
            warn!(user_id = %identity.id, "lost refresh token rotation race");
            return Err(AuthError::SessionInvalidated);
        }

        debug!(
            user_id = %identity.id,
            old = %fingerprint(presented),
            new = %fingerprint(&tokens.refresh_token.0),
            "refresh token rotated"
        );
        Ok(tokens)
    }
}
