//! Node executor capability.
//!
//! A node executor implements one node type (`use` in a flow definition).
//! The interpreter never branches on concrete node types: it only asks an
//! executor whether it needs input and what its outcome is.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;

use crate::types::{FlowResult, GraphNode, Oauth2Session, Prompts, User};

/// Result of executing one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Follow the outgoing edge with this condition.
    Condition(String),
    /// Suspend and ask the caller for input; the same node runs again on resume.
    Prompts(Prompts),
    /// End the flow. Only valid on a node without outgoing edges.
    Terminal(FlowResult),
}

impl NodeOutcome {
    /// Shorthand for `NodeOutcome::Condition`.
    #[must_use]
    pub fn condition(condition: impl Into<String>) -> Self {
        Self::Condition(condition.into())
    }
}

/// Failure of a node executor.
///
/// Recorded on the session, which then ends in the `Failed` state. Use a
/// condition instead for expected negative outcomes such as a wrong password.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    /// The node could not complete.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// Input the node requires was not supplied.
    #[error("missing input '{key}'")]
    MissingInput {
        /// Name of the missing input.
        key: String,
    },

    /// The node's `custom_config` is invalid.
    #[error("invalid node configuration: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl NodeError {
    /// Creates a new `Failed` error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a new `MissingInput` error.
    #[must_use]
    pub fn missing_input(key: impl Into<String>) -> Self {
        Self::MissingInput { key: key.into() }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// What a node executor sees of the running session.
///
/// Input is only present for the first node executed in a start or resume
/// call. The accumulated context can be read and extended, never shrunk.
pub struct NodeContext<'a> {
    tenant: &'a str,
    realm: &'a str,
    node_name: &'a str,
    node: &'a GraphNode,
    input: Option<&'a HashMap<String, String>>,
    context: &'a mut HashMap<String, String>,
    user: &'a mut Option<User>,
    oauth2: Option<&'a Oauth2Session>,
}

impl<'a> NodeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tenant: &'a str,
        realm: &'a str,
        node_name: &'a str,
        node: &'a GraphNode,
        input: Option<&'a HashMap<String, String>>,
        context: &'a mut HashMap<String, String>,
        user: &'a mut Option<User>,
        oauth2: Option<&'a Oauth2Session>,
    ) -> Self {
        Self {
            tenant,
            realm,
            node_name,
            node,
            input,
            context,
            user,
            oauth2,
        }
    }

    /// Tenant of the session.
    #[must_use]
    pub fn tenant(&self) -> &str {
        self.tenant
    }

    /// Realm of the session.
    #[must_use]
    pub fn realm(&self) -> &str {
        self.realm
    }

    /// Name of the node being executed.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.node_name
    }

    /// Value from the node's `custom_config`.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<&str> {
        self.node.custom_config.get(key).map(String::as_str)
    }

    /// Returns `true` if the caller supplied input for this step.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Value the caller supplied for this step.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&str> {
        self.input?.get(key).map(String::as_str)
    }

    /// Input value that must be present.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::MissingInput` if the caller did not supply `key`.
    pub fn require_input(&self, key: &str) -> Result<&str, NodeError> {
        self.input(key).ok_or_else(|| NodeError::missing_input(key))
    }

    /// Value from the accumulated context.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Adds a context value. Existing keys keep their value.
    ///
    /// Returns `false` if `key` was already set.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        match self.context.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                true
            }
        }
    }

    /// User bound to the session so far.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Binds the authenticated user to the session.
    pub fn bind_user(&mut self, user: User) {
        *self.user = Some(user);
    }

    /// OAuth 2.0 context, if an authorize call started this login.
    #[must_use]
    pub fn oauth2(&self) -> Option<&Oauth2Session> {
        self.oauth2
    }
}

/// Implementation of one node type.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Prompts to show before this node can run.
    ///
    /// When this returns `Some` and the current call carries no input, the
    /// interpreter suspends on arrival instead of executing the node. The
    /// default declares no input.
    fn input_prompts(&self, _node: &GraphNode) -> Option<Prompts> {
        None
    }

    /// Every condition this node type can return.
    ///
    /// `None` leaves the node unconstrained. With `Some`, edges on other
    /// conditions are rejected when the flow is validated, and returning an
    /// undeclared condition fails the session.
    fn possible_conditions(&self) -> Option<&[&str]> {
        None
    }

    /// Runs the node.
    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_access() {
        let node = GraphNode::new("askUsername").with_config("label", "Email");
        let input = HashMap::from([("username".to_string(), "alice".to_string())]);
        let mut context = HashMap::new();
        let mut user = None;

        let mut ctx = NodeContext::new(
            "acme",
            "staff",
            "ask",
            &node,
            Some(&input),
            &mut context,
            &mut user,
            None,
        );
        assert_eq!(ctx.node_name(), "ask");
        assert_eq!(ctx.config("label"), Some("Email"));
        assert_eq!(ctx.input("username"), Some("alice"));
        assert!(matches!(
            ctx.require_input("password"),
            Err(NodeError::MissingInput { .. })
        ));

        assert!(ctx.set("username", "alice"));
        assert!(!ctx.set("username", "mallory"));
        ctx.bind_user(User::new("u1", "acme", "staff", "alice"));
        assert_eq!(ctx.get("username"), Some("alice"));
        assert!(ctx.user().is_some());

        assert_eq!(context.get("username").map(String::as_str), Some("alice"));
        assert_eq!(user.map(|u| u.id), Some("u1".to_string()));
    }

    #[test]
    fn test_node_error_display() {
        assert_eq!(
            NodeError::missing_input("otp").to_string(),
            "missing input 'otp'"
        );
        assert_eq!(NodeError::failed("locked out").to_string(), "locked out");
    }
}
