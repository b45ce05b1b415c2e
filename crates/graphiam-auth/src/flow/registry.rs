//! Node executor registry.
//!
//! Built once at the composition root and handed to the
//! [`crate::flow::FlowInterpreter`]. There is no process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin;
use super::node::NodeExecutor;
use crate::types::FlowDefinition;
use crate::{AuthError, AuthResult};

/// Maps node type names (`use`) to executors.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the structural built-in nodes
    /// (`init`, `successResult`, `failureResult`).
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .with(builtin::INIT, builtin::InitNode)
            .with(builtin::SUCCESS_RESULT, builtin::SuccessResultNode)
            .with(builtin::FAILURE_RESULT, builtin::FailureResultNode)
    }

    /// Registers an executor, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(name.into(), executor);
    }

    /// Builder form of [`NodeRegistry::register`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, executor: impl NodeExecutor + 'static) -> Self {
        self.register(name, Arc::new(executor));
        self
    }

    /// Looks up an executor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(name)
    }

    /// Returns `true` if an executor is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validates a definition's structure, that every node type it uses is
    /// registered, and that every edge is on a condition its node type can
    /// return.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FlowDefinition` on the first problem found.
    pub fn validate(&self, definition: &FlowDefinition) -> AuthResult<()> {
        definition.validate()?;

        let mut nodes: Vec<(&String, &String)> = definition
            .nodes
            .iter()
            .map(|(name, node)| (name, &node.use_))
            .collect();
        nodes.sort_unstable();

        for (name, use_) in nodes {
            let Some(executor) = self.get(use_) else {
                return Err(AuthError::flow_definition(format!(
                    "flow '{}': node '{}' uses unknown node type '{}'",
                    definition.name, name, use_
                )));
            };
            let Some(declared) = executor.possible_conditions() else {
                continue;
            };
            let mut conditions: Vec<&String> = definition.nodes[name].next.keys().collect();
            conditions.sort_unstable();
            if let Some(condition) = conditions
                .into_iter()
                .find(|c| !declared.contains(&c.as_str()))
            {
                return Err(AuthError::flow_definition(format!(
                    "flow '{}': node '{}' has an edge on '{}', which node type '{}' never returns",
                    definition.name, name, condition, use_
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("executors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::{NodeContext, NodeError, NodeOutcome};
    use crate::types::GraphNode;
    use async_trait::async_trait;

    struct Unconstrained;

    #[async_trait]
    impl NodeExecutor for Unconstrained {
        async fn execute(&self, _ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
            Ok(NodeOutcome::condition("ok"))
        }
    }

    fn definition(use_: &str) -> FlowDefinition {
        FlowDefinition::new("login", "init")
            .with_node("init", GraphNode::new("init").with_edge("start", "check"))
            .with_node("check", GraphNode::new(use_).with_edge("ok", "done"))
            .with_node("done", GraphNode::new("successResult"))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["failureResult", "init", "successResult"]
        );
    }

    #[test]
    fn test_validate_unknown_node_type() {
        let registry = NodeRegistry::with_builtins();
        let err = registry.validate(&definition("passwordCheck")).unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("passwordCheck"));

        let registry = registry.with("passwordCheck", Unconstrained);
        assert!(registry.validate(&definition("passwordCheck")).is_ok());
    }

    #[test]
    fn test_validate_rejects_undeclared_edge() {
        let registry = NodeRegistry::with_builtins().with("check", builtin::InitNode);
        let err = registry.validate(&definition("check")).unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("'ok'"));

        let mut def = definition("successResult");
        def.nodes.get_mut("check").unwrap().next.clear();
        def.nodes
            .get_mut("done")
            .unwrap()
            .next
            .insert("again".into(), "check".into());
        let err = registry.validate(&def).unwrap_err();
        assert!(err.to_string().contains("'again'"));
    }

    #[test]
    fn test_validate_runs_structural_checks() {
        let registry = NodeRegistry::with_builtins();
        let mut def = definition("init");
        def.start = "missing".into();
        assert!(registry.validate(&def).is_err());
    }
}
