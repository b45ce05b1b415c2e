//! User storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::User;

/// Read access to users.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by id.
    async fn get_by_id(&self, tenant: &str, realm: &str, user_id: &str) -> AuthResult<Option<User>>;
}
