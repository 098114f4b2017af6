use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;

/// Identity store kept in process memory. Used for development and tests.
///
/// Compare-and-swap happens under the entry's write guard, which is never
/// held across an `.await`.
pub struct MemoryIdentityStore {
    identities: DashMap<UserId, Identity>,
    email_index: DashMap<String, UserId>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        MemoryIdentityStore {
            identities: DashMap::new(),
            email_index: DashMap::new(),
        }
    }

    pub fn insert(&self, identity: Identity) {
        self.email_index
            .insert(normalize_email(&identity.email), identity.id);
        self.identities.insert(identity.id, identity);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait::async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError> {
        Ok(self.identities.get(&user_id).map(|e| e.value().clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let Some(user_id) = self.email_index.get(&normalize_email(email)).map(|e| *e.value())
        else {
            return Ok(None);
        };
        self.get_by_id(user_id).await
    }

    async fn update_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        let mut entry = self
            .identities
            .get_mut(&user_id)
            .ok_or(AuthError::NotFound)?;
        entry.current_refresh_token = Some(refresh_token.to_string());
        entry.is_session_valid = true;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let Some(mut entry) = self.identities.get_mut(&user_id) else {
            return Ok(false);
        };
        if !entry.holds_session(expected) {
            return Ok(false);
        }
        entry.current_refresh_token = Some(replacement.to_string());
        Ok(true)
    }

    async fn invalidate_session(&self, user_id: UserId) -> Result<(), AuthError> {
        if let Some(mut entry) = self.identities.get_mut(&user_id) {
            entry.current_refresh_token = None;
            entry.is_session_valid = false;
        }
        Ok(())
    }
}
