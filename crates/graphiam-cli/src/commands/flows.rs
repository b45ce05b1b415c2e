use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use graphiam_auth::flow::load_dir;
use graphiam_auth::{NodeContext, NodeError, NodeExecutor, NodeOutcome, NodeRegistry};
use serde::Serialize;

use crate::cli::{OutputFormat, ValidateFlowsArgs};
use crate::output::{print_json, print_success, print_table, print_warning};

/// Stand-in for a node type the deployment provides. Only its name matters
/// here; flows are never executed by the CLI.
struct DeclaredNode;

#[async_trait]
impl NodeExecutor for DeclaredNode {
    async fn execute(&self, ctx: &mut NodeContext<'_>) -> Result<NodeOutcome, NodeError> {
        Err(NodeError::failed(format!(
            "node '{}' has no implementation in this process",
            ctx.node_name()
        )))
    }
}

#[derive(Debug, Serialize)]
pub struct FlowSummary {
    pub id: String,
    pub route: String,
    pub active: bool,
    pub name: String,
    pub start: String,
    pub nodes: usize,
    pub terminal: Vec<String>,
    pub unreachable: Vec<String>,
}

fn registry(node_types: &[String]) -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    for name in node_types.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        registry.register(name, Arc::new(DeclaredNode));
    }
    registry
}

pub fn summarize(dir: &Path, node_types: &[String]) -> Result<Vec<FlowSummary>> {
    let registry = registry(node_types);
    let documents =
        load_dir(dir).with_context(|| format!("Cannot load flows from {}", dir.display()))?;

    documents
        .into_iter()
        .map(|document| -> Result<FlowSummary> {
            registry
                .validate(&document.definition)
                .with_context(|| format!("Flow '{}' is invalid", document.id))?;
            let definition = &document.definition;
            let owned = |names: Vec<&str>| -> Vec<String> {
                names.into_iter().map(String::from).collect()
            };
            Ok(FlowSummary {
                route: document.route().to_string(),
                id: document.id.clone(),
                active: document.active,
                name: definition.name.clone(),
                start: definition.start.clone(),
                nodes: definition.nodes.len(),
                terminal: owned(definition.terminal_nodes()),
                unreachable: owned(definition.unreachable_nodes()),
            })
        })
        .collect()
}

pub fn validate_flows(args: &ValidateFlowsArgs, format: OutputFormat) -> Result<()> {
    let summaries = summarize(&args.dir, &args.node_types)?;

    match format {
        OutputFormat::Json => print_json(&summaries)?,
        OutputFormat::Table => {
            if summaries.is_empty() {
                print_warning(&format!("No flow documents in {}", args.dir.display()));
                return Ok(());
            }
            let rows = summaries
                .iter()
                .map(|s| {
                    [
                        s.id.clone(),
                        s.route.clone(),
                        if s.active { "yes" } else { "no" }.to_string(),
                        s.start.clone(),
                        s.nodes.to_string(),
                        s.terminal.join(", "),
                    ]
                })
                .collect();
            print_table(
                ["ID", "Route", "Active", "Start", "Nodes", "Terminal"],
                rows,
            );
            for summary in summaries.iter().filter(|s| !s.unreachable.is_empty()) {
                print_warning(&format!(
                    "Flow '{}': unreachable nodes {}",
                    summary.id,
                    summary.unreachable.join(", ")
                ));
            }
            print_success(&format!("{} flow(s) valid", summaries.len()));
        }
    }
    Ok(())
}
