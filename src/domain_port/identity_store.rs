use crate::application_port::*;
use crate::domain_model::*;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;

    /// Open a session unconditionally: store `refresh_token` and mark it valid.
    async fn update_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> Result<(), AuthError>;

    /// Replace the stored refresh token only if it still equals `expected` and
    /// the session is valid. Returns whether the swap happened.
    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError>;

    /// Clear the stored refresh token and mark the session invalid.
    async fn invalidate_session(&self, user_id: UserId) -> Result<(), AuthError>;
}
