use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

pub struct MySqlIdentityStore {
    pool: MySqlPool,
}

impl MySqlIdentityStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlIdentityStore { pool }
    }

    #[inline]
    fn uid_as_bytes(id: &UserId) -> &[u8] {
        id.0.as_bytes()
    }

    #[inline]
    fn uid_from_bytes(id: &[u8]) -> Result<UserId, AuthError> {
        Ok(UserId(
            Uuid::from_slice(id).map_err(|e| AuthError::Store(e.to_string()))?,
        ))
    }

    fn row_to_identity(row: MySqlRow) -> Result<Identity, AuthError> {
        let user_id_bytes: Vec<u8> = row
            .try_get("user_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let id = Self::uid_from_bytes(&user_id_bytes)?;

        let email: String = row
            .try_get("email")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let secret_digest: String = row
            .try_get("secret_digest")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let is_blocked: bool = row
            .try_get("is_blocked")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let is_session_valid: bool = row
            .try_get("is_session_valid")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let current_refresh_token: Option<String> = row
            .try_get("refresh_token")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(Identity {
            id,
            email,
            secret_digest,
            is_blocked,
            is_session_valid,
            current_refresh_token,
        })
    }
}

#[async_trait::async_trait]
impl IdentityStore for MySqlIdentityStore {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, email, secret_digest, is_blocked, is_session_valid, refresh_token
FROM identity
WHERE user_id = ?
"#,
        )
        .bind(Self::uid_as_bytes(&user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_identity).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, email, secret_digest, is_blocked, is_session_valid, refresh_token
FROM identity
WHERE email = ?
"#,
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_identity).transpose()
    }

    async fn update_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
UPDATE identity
SET refresh_token = ?, is_session_valid = 1
WHERE user_id = ?
"#,
        )
        .bind(refresh_token)
        .bind(Self::uid_as_bytes(&user_id))
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("update refresh token: {e}")))?;

        // sqlx reports matched rows, so an unchanged token still counts
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
UPDATE identity
SET refresh_token = ?
WHERE user_id = ? AND refresh_token = ? AND is_session_valid = 1
"#,
        )
        .bind(replacement)
        .bind(Self::uid_as_bytes(&user_id))
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("rotate refresh token: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_session(&self, user_id: UserId) -> Result<(), AuthError> {
        sqlx::query(
            r#"
UPDATE identity
SET refresh_token = NULL, is_session_valid = 0
WHERE user_id = ?
"#,
        )
        .bind(Self::uid_as_bytes(&user_id))
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("invalidate session: {e}")))?;

        Ok(())
    }
}
