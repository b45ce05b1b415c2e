//! Flow interpreter.
//!
//! Walks a [`FlowDefinition`] node by node on behalf of an [`AuthSession`].
//! A start or resume call keeps executing nodes until one of them needs
//! input, the flow terminates, or the session fails. Internal transitions
//! are never returned to the caller, but each one is persisted before the
//! next node runs, so a crash loses at most the step in flight.
//!
//! # Step outcomes
//!
//! | outcome                   | effect                                          |
//! |---------------------------|-------------------------------------------------|
//! | condition with an edge    | append to history, move, persist, continue      |
//! | condition without an edge | session fails, `AuthError::FlowDefinition`      |
//! | prompts                   | store prompts, persist, return                  |
//! | terminal                  | append to history, store result, persist, return|
//! | node error                | store error, persist, return the failed session |
//!
//! Graphs may loop. Only the per-call step limit stops a runaway graph.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;

use super::node::{NodeContext, NodeOutcome};
use super::registry::NodeRegistry;
use crate::config::FlowConfig;
use crate::session::AuthSessionManager;
use crate::storage::FlowDefinitionStorage;
use crate::token::secret::hash_prefix;
use crate::types::{AuthSession, Flow, FlowDefinition, Oauth2Session};
use crate::{AuthError, AuthResult};

/// How a flow to start is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowSelector {
    /// By flow id.
    Id(String),
    /// By public route.
    Route(String),
}

/// Parameters for starting a flow.
#[derive(Debug, Clone)]
pub struct FlowStart {
    /// Tenant to run in.
    pub tenant: String,
    /// Realm to run in.
    pub realm: String,
    /// Flow to run.
    pub flow: FlowSelector,
    /// SHA-256 of the handle the caller gave to the client.
    pub session_id_hash: String,
    /// Input for the first node.
    pub input: HashMap<String, String>,
    /// OAuth 2.0 context if an authorize call started this login.
    pub oauth2: Option<Oauth2Session>,
}

impl FlowStart {
    /// Starts the flow with the given id and no input.
    #[must_use]
    pub fn by_id(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        flow_id: impl Into<String>,
        session_id_hash: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            realm: realm.into(),
            flow: FlowSelector::Id(flow_id.into()),
            session_id_hash: session_id_hash.into(),
            input: HashMap::new(),
            oauth2: None,
        }
    }

    /// Sets the initial input.
    #[must_use]
    pub fn with_input(mut self, input: HashMap<String, String>) -> Self {
        self.input = input;
        self
    }

    /// Attaches OAuth 2.0 context.
    #[must_use]
    pub fn with_oauth2(mut self, oauth2: Oauth2Session) -> Self {
        self.oauth2 = Some(oauth2);
        self
    }
}

/// Executes flow graphs against auth sessions.
pub struct FlowInterpreter {
    flows: Arc<dyn FlowDefinitionStorage>,
    sessions: AuthSessionManager,
    registry: Arc<NodeRegistry>,
    max_steps: usize,
}

impl FlowInterpreter {
    /// Creates an interpreter.
    pub fn new(
        flows: Arc<dyn FlowDefinitionStorage>,
        sessions: AuthSessionManager,
        registry: NodeRegistry,
        config: &FlowConfig,
    ) -> Self {
        Self {
            flows,
            sessions,
            registry: Arc::new(registry),
            max_steps: config.max_steps_per_request,
        }
    }

    /// The session manager used for persistence.
    #[must_use]
    pub fn sessions(&self) -> &AuthSessionManager {
        &self.sessions
    }

    /// The node registry.
    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Starts a flow and runs it until it needs input or ends.
    ///
    /// # Errors
    ///
    /// - `AuthError::FlowNotFound` if no such flow exists
    /// - `AuthError::InvalidRequest` if the flow is inactive
    /// - `AuthError::FlowDefinition` if the graph is invalid or a node
    ///   returns a condition without an edge
    /// - `AuthError::FlowExecutionLimitExceeded` for a runaway graph
    /// - storage errors unchanged
    pub async fn start(&self, request: FlowStart) -> AuthResult<AuthSession> {
        let flow = self
            .resolve(&request.tenant, &request.realm, &request.flow)
            .await?;
        if !flow.active {
            return Err(AuthError::invalid_request(format!(
                "flow '{}' is not active",
                flow.id
            )));
        }
        self.registry.validate(&flow.definition)?;

        let mut session = self.sessions.new_session(
            &request.tenant,
            &request.realm,
            &flow.id,
            &request.session_id_hash,
            &flow.definition.start,
        );
        session.oauth2 = request.oauth2;

        tracing::debug!(
            tenant = %session.tenant,
            realm = %session.realm,
            flow_id = %session.flow_id,
            run_id = %session.run_id,
            "flow started"
        );

        self.run(&flow.definition, &mut session, request.input)
            .await?;
        Ok(session)
    }

    /// Resumes a session with caller input.
    ///
    /// Returns `Ok(None)` if the session does not exist or has expired. A
    /// session that already ended is returned unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`FlowInterpreter::start`], plus `AuthError::SessionConflict`
    /// if a concurrent resume persisted first.
    pub async fn resume(
        &self,
        tenant: &str,
        realm: &str,
        session_id_hash: &str,
        input: HashMap<String, String>,
    ) -> AuthResult<Option<AuthSession>> {
        let Some(mut session) = self.sessions.load(tenant, realm, session_id_hash).await? else {
            tracing::debug!(
                tenant,
                realm,
                session = hash_prefix(session_id_hash),
                "resume of unknown session"
            );
            return Ok(None);
        };

        if session.is_terminal() {
            return Ok(Some(session));
        }

        let flow = self
            .flows
            .get_by_id(tenant, realm, &session.flow_id)
            .await?
            .ok_or_else(|| AuthError::flow_not_found(session.flow_id.clone()))?;

        self.run(&flow.definition, &mut session, input).await?;
        Ok(Some(session))
    }

    async fn resolve(&self, tenant: &str, realm: &str, selector: &FlowSelector) -> AuthResult<Flow> {
        let flow = match selector {
            FlowSelector::Id(id) => self.flows.get_by_id(tenant, realm, id).await?,
            FlowSelector::Route(route) => self.flows.get_by_route(tenant, realm, route).await?,
        };
        flow.ok_or_else(|| {
            AuthError::flow_not_found(match selector {
                FlowSelector::Id(id) => id.clone(),
                FlowSelector::Route(route) => route.clone(),
            })
        })
    }

    async fn run(
        &self,
        definition: &FlowDefinition,
        session: &mut AuthSession,
        input: HashMap<String, String>,
    ) -> AuthResult<()> {
        let input = (!input.is_empty()).then_some(input);
        if let Some(input) = &input {
            session
                .context
                .extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        session.prompts.clear();

        // Input belongs to the first node executed in this call only.
        let mut pending_input = input.as_ref();
        let mut steps = 0usize;

        loop {
            if steps == self.max_steps {
                tracing::warn!(
                    tenant = %session.tenant,
                    realm = %session.realm,
                    flow_id = %session.flow_id,
                    run_id = %session.run_id,
                    node = %session.current,
                    steps,
                    "flow execution limit exceeded"
                );
                self.fail(session, "flow execution limit exceeded").await?;
                return Err(AuthError::FlowExecutionLimitExceeded { steps });
            }
            steps += 1;

            let Some(node) = definition.nodes.get(&session.current) else {
                let message = format!(
                    "flow '{}': current node '{}' does not exist",
                    definition.name, session.current
                );
                return self.fail_definition(session, message).await;
            };
            let Some(executor) = self.registry.get(&node.use_).cloned() else {
                let message = format!(
                    "flow '{}': node '{}' uses unknown node type '{}'",
                    definition.name, session.current, node.use_
                );
                return self.fail_definition(session, message).await;
            };

            if pending_input.is_none() {
                if let Some(prompts) = executor.input_prompts(node) {
                    tracing::debug!(
                        run_id = %session.run_id,
                        node = %session.current,
                        "awaiting input"
                    );
                    session.prompts = prompts;
                    return self.sessions.save(session).await;
                }
            }

            let outcome = {
                let mut ctx = NodeContext::new(
                    &session.tenant,
                    &session.realm,
                    &session.current,
                    node,
                    pending_input.take(),
                    &mut session.context,
                    &mut session.user,
                    session.oauth2.as_ref(),
                );
                executor.execute(&mut ctx).await
            };

            match outcome {
                Err(err) => {
                    tracing::info!(
                        tenant = %session.tenant,
                        realm = %session.realm,
                        run_id = %session.run_id,
                        node = %session.current,
                        error = %err,
                        "flow failed in node"
                    );
                    session.error = Some(err.to_string());
                    return self.sessions.save(session).await;
                }
                Ok(NodeOutcome::Prompts(prompts)) => {
                    tracing::debug!(
                        run_id = %session.run_id,
                        node = %session.current,
                        "node requested input"
                    );
                    session.prompts = prompts;
                    return self.sessions.save(session).await;
                }
                Ok(NodeOutcome::Condition(condition)) => {
                    if let Some(declared) = executor.possible_conditions() {
                        if !declared.contains(&condition.as_str()) {
                            let message = format!(
                                "flow '{}': node '{}' returned undeclared condition '{}'",
                                definition.name, session.current, condition
                            );
                            return self.fail_definition(session, message).await;
                        }
                    }
                    let Some(target) = node.next.get(&condition) else {
                        let message = format!(
                            "flow '{}': node '{}' returned condition '{}' which has no edge",
                            definition.name, session.current, condition
                        );
                        return self.fail_definition(session, message).await;
                    };
                    tracing::debug!(
                        run_id = %session.run_id,
                        from = %session.current,
                        to = %target,
                        condition = %condition,
                        "flow transition"
                    );
                    let previous = std::mem::replace(&mut session.current, target.clone());
                    session.history.push(previous);
                    self.sessions.save(session).await?;
                }
                Ok(NodeOutcome::Terminal(mut result)) => {
                    if !node.is_terminal() {
                        let message = format!(
                            "flow '{}': node '{}' ended the flow but has outgoing edges",
                            definition.name, session.current
                        );
                        return self.fail_definition(session, message).await;
                    }
                    result.flow_name = definition.name.clone();
                    if result.authenticated {
                        if let Some(oauth2) = session.oauth2.as_mut() {
                            oauth2.auth_time = Some(OffsetDateTime::now_utc());
                            oauth2.acr = Some(result.auth_level.as_str().to_string());
                        }
                    }
                    tracing::info!(
                        tenant = %session.tenant,
                        realm = %session.realm,
                        flow = %definition.name,
                        run_id = %session.run_id,
                        authenticated = result.authenticated,
                        auth_level = %result.auth_level,
                        "flow completed"
                    );
                    session.history.push(session.current.clone());
                    session.result = Some(result);
                    return self.sessions.save(session).await;
                }
            }
        }
    }

    async fn fail(&self, session: &mut AuthSession, message: &str) -> AuthResult<()> {
        session.error = Some(message.to_string());
        session.prompts.clear();
        self.sessions.save(session).await
    }

    async fn fail_definition(&self, session: &mut AuthSession, message: String) -> AuthResult<()> {
        tracing::error!(
            tenant = %session.tenant,
            realm = %session.realm,
            flow_id = %session.flow_id,
            run_id = %session.run_id,
            "{message}"
        );
        self.fail(session, "flow definition error").await?;
        Err(AuthError::flow_definition(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::builtin::{FAILURE_RESULT, INIT, SUCCESS_RESULT};
    use crate::flow::node::{NodeError, NodeExecutor};
    use crate::storage::AuthSessionStorage;
    use crate::types::{AuthLevel, GraphNode, Prompts, SessionState, User};
    use async_trait::async_trait;
    use std::sync::RwLock;
    use std::time::Duration;

    #[derive(Default)]
    struct MockStorage {
        sessions: RwLock<HashMap<String, AuthSession>>,
        flows: RwLock<Vec<Flow>>,
        saves: RwLock<usize>,
    }

    #[async_trait]
    impl AuthSessionStorage for MockStorage {
        async fn create_or_update(
            &self,
            session: &AuthSession,
            expected_version: Option<u64>,
        ) -> AuthResult<()> {
            let mut sessions = self.sessions.write().unwrap();
            if sessions.get(&session.run_id).map(|s| s.version) != expected_version {
                return Err(AuthError::session_conflict("version mismatch"));
            }
            sessions.insert(session.run_id.clone(), session.clone());
            *self.saves.write().unwrap() += 1;
            Ok(())
        }

        async fn get_by_hash(
            &self,
            _tenant: &str,
            _realm: &str,
            hash: &str,
        ) -> AuthResult<Option<AuthSession>> {
            let sessions = self.sessions.read().unwrap();
            Ok(sessions
                .values()
                .find(|s| s.session_id_hash == hash)
                .cloned())
        }

        async fn get_by_run_id(
            &self,
            _tenant: &str,
            _realm: &str,
            run_id: &str,
        ) -> AuthResult<Option<AuthSession>> {
            Ok(self.sessions.read().unwrap().get(run_id).cloned())
        }

        async fn list_all(&self, _tenant: &str) -> AuthResult<Vec<AuthSession>> {
            Ok(self.sessions.read().unwrap().values().cloned().collect())
        }

        async fn delete(&self, _tenant: &str, _realm: &str, run_id: &str) -> AuthResult<bool> {
            Ok(self.sessions.write().unwrap().remove(run_id).is_some())
        }

        async fn delete_expired(
            &self,
            _tenant: &str,
            _realm: &str,
            _now: OffsetDateTime,
        ) -> AuthResult<u64> {
            Ok(0)
        }
    }

    #[async_trait]
    impl FlowDefinitionStorage for MockStorage {
        async fn get_by_id(
            &self,
            _tenant: &str,
            _realm: &str,
            flow_id: &str,
        ) -> AuthResult<Option<Flow>> {
            let flows = self.flows.read().unwrap();
            Ok(flows.iter().find(|f| f.id == flow_id).cloned())
        }

        async fn get_by_route(
            &self,
            _tenant: &str,
            _realm: &str,
            route: &str,
        ) -> AuthResult<Option<Flow>> {
            let flows = self.flows.read().unwrap();
            Ok(flows.iter().find(|f| f.route == route).cloned())
        }
    }

    /// Asks for a username, binds the user and branches on it.
    struct AskUsername;

    #[async_trait]
    impl NodeExecutor for AskUsername {
        fn input_prompts(&self, _node: &GraphNode) -> Option<Prompts> {
            Some(Prompts::from([("username".to_string(), "text".to_string())]))
        }

        async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
            let username = ctx.require_input("username")?.to_string();
            match username.as_str() {
                "alice" => {
                    ctx.bind_user(User::new("u-alice", ctx.tenant(), ctx.realm(), "alice"));
                    Ok(NodeOutcome::condition("known"))
                }
                "" => Ok(NodeOutcome::Prompts(Prompts::from([(
                    "username".to_string(),
                    "required".to_string(),
                )]))),
                "explode" => Err(NodeError::failed("directory unavailable")),
                "weird" => Ok(NodeOutcome::condition("weird")),
                _ => Ok(NodeOutcome::condition("unknown")),
            }
        }
    }

    /// [`AskUsername`] with its conditions declared.
    struct StrictAsk;

    #[async_trait]
    impl NodeExecutor for StrictAsk {
        fn input_prompts(&self, node: &GraphNode) -> Option<Prompts> {
            AskUsername.input_prompts(node)
        }

        fn possible_conditions(&self) -> Option<&[&str]> {
            Some(&["known", "unknown"])
        }

        async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
            AskUsername.execute(ctx).await
        }
    }

    /// Always loops.
    struct Spin;

    #[async_trait]
    impl NodeExecutor for Spin {
        async fn execute(&self, _ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
            Ok(NodeOutcome::condition("again"))
        }
    }

    fn definition() -> FlowDefinition {
        FlowDefinition::new("username-only", "init")
            .with_node("init", GraphNode::new(INIT).with_edge("start", "ask"))
            .with_node(
                "ask",
                GraphNode::new("askUsername")
                    .with_edge("known", "done")
                    .with_edge("unknown", "denied"),
            )
            .with_node("done", GraphNode::new(SUCCESS_RESULT))
            .with_node("denied", GraphNode::new(FAILURE_RESULT))
    }

    fn interpreter_with(definition: FlowDefinition, max_steps: usize) -> (FlowInterpreter, Arc<MockStorage>) {
        let storage = Arc::new(MockStorage::default());
        storage
            .flows
            .write()
            .unwrap()
            .push(Flow::new("acme", "staff", "login", "login", definition));
        let sessions = AuthSessionManager::new(storage.clone(), Duration::from_secs(60));
        let registry = NodeRegistry::with_builtins()
            .with("askUsername", AskUsername)
            .with("strictAsk", StrictAsk)
            .with("spin", Spin);
        let config = FlowConfig {
            max_steps_per_request: max_steps,
            ..FlowConfig::default()
        };
        (
            FlowInterpreter::new(storage.clone(), sessions, registry, &config),
            storage,
        )
    }

    fn input(username: &str) -> HashMap<String, String> {
        HashMap::from([("username".to_string(), username.to_string())])
    }

    #[tokio::test]
    async fn test_start_suspends_at_prompt() {
        let (interpreter, storage) = interpreter_with(definition(), 100);
        let session = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.current, "ask");
        assert_eq!(session.history, vec!["init".to_string()]);
        assert!(session.prompts.contains_key("username"));
        // One save for the transition, one for the suspension.
        assert_eq!(*storage.saves.read().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resume_to_success() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();

        let session = interpreter
            .resume("acme", "staff", "h1", input("alice"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.state(), SessionState::Completed);
        let result = session.result.as_ref().unwrap();
        assert!(result.authenticated);
        assert_eq!(result.user_id, "u-alice");
        assert_eq!(result.auth_level, AuthLevel::SingleFactor);
        assert_eq!(result.flow_name, "username-only");
        assert_eq!(session.history, vec!["init", "ask", "done"]);
        assert!(session.prompts.is_empty());
        assert_eq!(session.context.get("username").map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_resume_terminal_session_is_unchanged() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();
        let done = interpreter
            .resume("acme", "staff", "h1", input("bob"))
            .await
            .unwrap()
            .unwrap();
        assert!(!done.result.as_ref().unwrap().authenticated);

        let again = interpreter
            .resume("acme", "staff", "h1", input("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again, done);
    }

    #[tokio::test]
    async fn test_node_reprompt_keeps_node() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();
        let session = interpreter
            .resume("acme", "staff", "h1", input(""))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.current, "ask");
        assert_eq!(session.prompts.get("username").map(String::as_str), Some("required"));
        assert_eq!(session.history, vec!["init".to_string()]);
    }

    #[tokio::test]
    async fn test_unmatched_condition_fails_session() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();

        let err = interpreter
            .resume("acme", "staff", "h1", input("weird"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("weird"));

        let stored = interpreter
            .sessions()
            .load("acme", "staff", "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state(), SessionState::Failed);
        assert!(stored.error.is_some());
    }

    fn strict_definition() -> FlowDefinition {
        FlowDefinition::new("strict", "init")
            .with_node("init", GraphNode::new(INIT).with_edge("start", "ask"))
            .with_node(
                "ask",
                GraphNode::new("strictAsk")
                    .with_edge("known", "done")
                    .with_edge("unknown", "ask"),
            )
            .with_node("done", GraphNode::new(SUCCESS_RESULT))
    }

    #[tokio::test]
    async fn test_undeclared_condition_fails_session() {
        let (interpreter, _) = interpreter_with(strict_definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();

        let err = interpreter
            .resume("acme", "staff", "h1", input("weird"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("undeclared condition 'weird'"));

        let stored = interpreter
            .sessions()
            .load("acme", "staff", "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_start_rejects_edge_on_undeclared_condition() {
        let mut definition = strict_definition();
        definition
            .nodes
            .get_mut("ask")
            .unwrap()
            .next
            .insert("weird".into(), "done".into());
        let (interpreter, storage) = interpreter_with(definition, 100);

        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(err.to_string().contains("'weird'"));
        assert!(storage.sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_non_init_start_node() {
        let mut definition = strict_definition();
        definition.start = "ask".into();
        let (interpreter, storage) = interpreter_with(definition, 100);

        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(storage.sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_error_is_recorded_not_raised() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();
        let session = interpreter
            .resume("acme", "staff", "h1", input("explode"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.error.as_deref(), Some("directory unavailable"));
    }

    #[tokio::test]
    async fn test_loops_are_bounded_by_step_limit() {
        let spinning = FlowDefinition::new("spin", "init")
            .with_node("init", GraphNode::new(INIT).with_edge("start", "a"))
            .with_node("a", GraphNode::new("spin").with_edge("again", "b"))
            .with_node("b", GraphNode::new("spin").with_edge("again", "a"));
        let (interpreter, _) = interpreter_with(spinning, 10);

        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::FlowExecutionLimitExceeded { steps: 10 }
        ));

        let stored = interpreter
            .sessions()
            .load("acme", "staff", "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state(), SessionState::Failed);
        assert_eq!(stored.history.len(), 10);
    }

    #[tokio::test]
    async fn test_revisiting_a_node_is_legal() {
        let retry = FlowDefinition::new("retry", "init")
            .with_node("init", GraphNode::new(INIT).with_edge("start", "ask"))
            .with_node(
                "ask",
                GraphNode::new("askUsername")
                    .with_edge("known", "done")
                    .with_edge("unknown", "ask"),
            )
            .with_node("done", GraphNode::new(SUCCESS_RESULT));
        let (interpreter, _) = interpreter_with(retry, 100);
        interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap();

        let session = interpreter
            .resume("acme", "staff", "h1", input("mallory"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.history, vec!["init", "ask"]);

        let session = interpreter
            .resume("acme", "staff", "h1", input("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.history, vec!["init", "ask", "ask", "done"]);
    }

    #[tokio::test]
    async fn test_unknown_session_is_none() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        let resumed = interpreter
            .resume("acme", "staff", "missing", input("alice"))
            .await
            .unwrap();
        assert!(resumed.is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_graph() {
        let broken = definition().with_node("done", GraphNode::new("nope"));
        let (interpreter, storage) = interpreter_with(broken, 100);
        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowDefinition { .. }));
        assert!(storage.sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_unknown_and_inactive_flow() {
        let (interpreter, storage) = interpreter_with(definition(), 100);
        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "other", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::FlowNotFound { .. }));

        storage.flows.write().unwrap()[0].active = false;
        let err = interpreter
            .start(FlowStart::by_id("acme", "staff", "login", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_start_by_route_with_initial_input() {
        let (interpreter, _) = interpreter_with(definition(), 100);
        let mut request = FlowStart::by_id("acme", "staff", "", "h1").with_input(input("alice"));
        request.flow = FlowSelector::Route("login".into());

        let session = interpreter.start(request).await.unwrap();
        // The initial input is consumed by `init`, so `ask` still prompts.
        assert_eq!(session.state(), SessionState::AwaitingInput);
        assert_eq!(session.context.get("username").map(String::as_str), Some("alice"));
    }
}
