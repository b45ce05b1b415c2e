//! Application storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Application;

/// Read access to registered applications.
#[async_trait]
pub trait ApplicationStorage: Send + Sync {
    /// Finds an application by its OAuth 2.0 client id.
    async fn get_by_client_id(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Option<Application>>;
}
