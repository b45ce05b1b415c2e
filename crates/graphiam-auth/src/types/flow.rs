//! Flow definitions.
//!
//! A [`FlowDefinition`] is a directed graph of named nodes. Each node names
//! the executor that runs it (`use`) and maps the condition strings that
//! executor can return to the next node. Graphs may contain cycles; a node
//! with no outgoing edges is terminal.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::flow::builtin::INIT;
use crate::{AuthError, AuthResult};

/// One node of a flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Name of the registered node executor that runs this node.
    #[serde(rename = "use")]
    pub use_: String,

    /// Outgoing edges: condition returned by the executor → target node name.
    #[serde(default)]
    pub next: HashMap<String, String>,

    /// Per-node settings handed to the executor.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_config: HashMap<String, String>,
}

impl GraphNode {
    /// Creates a node with no edges and no config.
    #[must_use]
    pub fn new(use_: impl Into<String>) -> Self {
        Self {
            use_: use_.into(),
            next: HashMap::new(),
            custom_config: HashMap::new(),
        }
    }

    /// Adds an outgoing edge.
    #[must_use]
    pub fn with_edge(mut self, condition: impl Into<String>, target: impl Into<String>) -> Self {
        self.next.insert(condition.into(), target.into());
        self
    }

    /// Adds a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_config.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the node has no outgoing edges.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty()
    }
}

/// An immutable authentication graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Human-readable flow name, copied into every `FlowResult`.
    pub name: String,

    /// Optional description for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entry node name.
    pub start: String,

    /// Nodes keyed by name.
    pub nodes: HashMap<String, GraphNode>,
}

impl FlowDefinition {
    /// Creates an empty definition starting at `start`.
    #[must_use]
    pub fn new(name: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            start: start.into(),
            nodes: HashMap::new(),
        }
    }

    /// Adds (or replaces) a node.
    #[must_use]
    pub fn with_node(mut self, name: impl Into<String>, node: GraphNode) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }

    /// Checks the structural invariants of the graph.
    ///
    /// Cycles are allowed. Executor names are checked separately against a
    /// [`crate::flow::NodeRegistry`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FlowDefinition` if the start node is missing or
    /// is not an `init` node, a node has an empty `use`, or an edge points
    /// at a missing node.
    pub fn validate(&self) -> AuthResult<()> {
        if self.start.is_empty() {
            return Err(AuthError::flow_definition(format!(
                "flow '{}' has no start node",
                self.name
            )));
        }
        let Some(start) = self.nodes.get(&self.start) else {
            return Err(AuthError::flow_definition(format!(
                "flow '{}': start node '{}' does not exist",
                self.name, self.start
            )));
        };
        if start.use_ != INIT {
            return Err(AuthError::flow_definition(format!(
                "flow '{}': start node '{}' must use '{INIT}', not '{}'",
                self.name, self.start, start.use_
            )));
        }

        // Sorted so the first reported problem is stable across runs.
        let names: BTreeSet<&String> = self.nodes.keys().collect();
        for name in names {
            let node = &self.nodes[name];
            if node.use_.trim().is_empty() {
                return Err(AuthError::flow_definition(format!(
                    "flow '{}': node '{}' has no executor",
                    self.name, name
                )));
            }
            let edges: BTreeSet<(&String, &String)> = node.next.iter().collect();
            for (condition, target) in edges {
                if !self.nodes.contains_key(target) {
                    return Err(AuthError::flow_definition(format!(
                        "flow '{}': edge '{}' of node '{}' points to missing node '{}'",
                        self.name, condition, name, target
                    )));
                }
            }
        }

        Ok(())
    }

    /// Names of nodes with no outgoing edges, sorted.
    #[must_use]
    pub fn terminal_nodes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.is_terminal())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of nodes that cannot be reached from the start node, sorted.
    #[must_use]
    pub fn unreachable_nodes(&self) -> Vec<&str> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut stack = vec![self.start.as_str()];
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(node) = self.nodes.get(name) {
                stack.extend(node.next.values().map(String::as_str));
            }
        }
        let mut names: Vec<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|name| !seen.contains(name))
            .collect();
        names.sort_unstable();
        names
    }
}

/// A stored flow: a definition bound to a tenant/realm with routing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// Flow id, unique per tenant/realm.
    pub id: String,

    /// Public route the flow is reachable under (e.g. `"login"`).
    pub route: String,

    /// Inactive flows cannot be started.
    pub active: bool,

    /// The graph.
    pub definition: FlowDefinition,

    /// When the flow was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the flow was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Flow {
    /// Creates an active flow.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        id: impl Into<String>,
        route: impl Into<String>,
        definition: FlowDefinition,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            tenant: tenant.into(),
            realm: realm.into(),
            id: id.into(),
            route: route.into(),
            active: true,
            definition,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_flow() -> FlowDefinition {
        FlowDefinition::new("login", "init")
            .with_node("init", GraphNode::new("init").with_edge("start", "askUsername"))
            .with_node(
                "askUsername",
                GraphNode::new("askUsername").with_edge("submitted", "checkPassword"),
            )
            .with_node(
                "checkPassword",
                GraphNode::new("passwordCheck")
                    .with_edge("success", "success")
                    .with_edge("failure", "askUsername"),
            )
            .with_node("success", GraphNode::new("successResult"))
    }

    #[test]
    fn test_valid_flow_with_cycle() {
        assert!(login_flow().validate().is_ok());
    }

    #[test]
    fn test_missing_start_node() {
        let mut flow = login_flow();
        flow.start = "nowhere".to_string();
        let err = flow.validate().unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_start_node_must_be_init() {
        let mut flow = login_flow();
        flow.start = "askUsername".to_string();
        let err = flow.validate().unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("must use 'init'"));
    }

    #[test]
    fn test_dangling_edge() {
        let flow = login_flow().with_node(
            "success",
            GraphNode::new("successResult").with_edge("again", "ghost"),
        );
        let err = flow.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_empty_use() {
        let flow = login_flow().with_node("success", GraphNode::new(" "));
        assert!(flow.validate().is_err());
    }

    #[test]
    fn test_terminal_and_unreachable_nodes() {
        let flow = login_flow().with_node("orphan", GraphNode::new("failureResult"));
        assert_eq!(flow.terminal_nodes(), vec!["orphan", "success"]);
        assert_eq!(flow.unreachable_nodes(), vec!["orphan"]);
    }

    #[test]
    fn test_definition_serialization() {
        let json = serde_json::to_value(login_flow()).unwrap();
        assert_eq!(json["nodes"]["init"]["use"], "init");
        assert_eq!(json["nodes"]["init"]["next"]["start"], "askUsername");
        assert!(json["nodes"]["init"].get("custom_config").is_none());

        let parsed: FlowDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, login_flow());
    }
}
