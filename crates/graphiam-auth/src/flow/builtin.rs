//! Structural built-in nodes.
//!
//! These nodes carry no credential logic: `init` enters a graph and the two
//! result nodes turn the session state into a [`FlowResult`]. Credential
//! checks are registered by the embedding application.

use async_trait::async_trait;

use super::node::{NodeContext, NodeError, NodeExecutor, NodeOutcome};
use crate::types::{AuthLevel, FlowResult};

/// Node type name of [`InitNode`].
pub const INIT: &str = "init";
/// Node type name of [`SuccessResultNode`].
pub const SUCCESS_RESULT: &str = "successResult";
/// Node type name of [`FailureResultNode`].
pub const FAILURE_RESULT: &str = "failureResult";

/// Condition returned by [`InitNode`].
pub const INIT_CONDITION: &str = "start";

/// Context key a node can set to raise the achieved auth level.
pub const AUTH_LEVEL_KEY: &str = "auth_level";

/// Entry node; always returns the `start` condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitNode;

#[async_trait]
impl NodeExecutor for InitNode {
    fn possible_conditions(&self) -> Option<&[&str]> {
        Some(&[INIT_CONDITION])
    }

    async fn execute(&self, _ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::condition(INIT_CONDITION))
    }
}

/// Terminal node producing an authenticated result for the bound user.
///
/// The auth level comes from the `auth_level` node config, then the
/// `auth_level` context value, and defaults to single-factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessResultNode;

#[async_trait]
impl NodeExecutor for SuccessResultNode {
    fn possible_conditions(&self) -> Option<&[&str]> {
        Some(&[])
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
        let level = match ctx.config(AUTH_LEVEL_KEY).or_else(|| ctx.get(AUTH_LEVEL_KEY)) {
            Some(raw) => AuthLevel::parse(raw).ok_or_else(|| {
                NodeError::configuration(format!("invalid auth level '{raw}'"))
            })?,
            None => AuthLevel::SingleFactor,
        };
        if level == AuthLevel::None {
            return Err(NodeError::configuration(
                "successResult requires an auth level above 0",
            ));
        }

        let user = ctx
            .user()
            .ok_or_else(|| NodeError::failed("no user was authenticated"))?;
        if user.disabled {
            return Err(NodeError::failed("user is disabled"));
        }

        Ok(NodeOutcome::Terminal(FlowResult::authenticated(user, level)))
    }
}

/// Terminal node producing an unauthenticated result.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureResultNode;

#[async_trait]
impl NodeExecutor for FailureResultNode {
    fn possible_conditions(&self) -> Option<&[&str]> {
        Some(&[])
    }

    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
        let mut result = FlowResult::unauthenticated();
        if let Some(user) = ctx.user() {
            result.user_id = user.id.clone();
            result.username = user.username.clone();
        }
        Ok(NodeOutcome::Terminal(result))
    }
}
