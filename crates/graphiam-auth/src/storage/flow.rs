//! Flow definition storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Flow;

/// Read access to stored flows.
#[async_trait]
pub trait FlowDefinitionStorage: Send + Sync {
    /// Finds a flow by id.
    async fn get_by_id(&self, tenant: &str, realm: &str, flow_id: &str) -> AuthResult<Option<Flow>>;

    /// Finds a flow by its public route.
    async fn get_by_route(&self, tenant: &str, realm: &str, route: &str)
    -> AuthResult<Option<Flow>>;
}
