//! Flow document loading.
//!
//! Flows are authored as TOML or JSON documents, one flow per file:
//!
//! ```toml
//! id = "login"
//! route = "login"
//!
//! [definition]
//! name = "username-password"
//! start = "init"
//!
//! [definition.nodes.init]
//! use = "init"
//! next = { start = "done" }
//!
//! [definition.nodes.done]
//! use = "successResult"
//! ```
//!
//! Loading checks graph structure only, including that the start node is an
//! `init` node. Node types and the conditions they declare are checked
//! against a [`super::NodeRegistry`] by whoever owns one.


use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Flow, FlowDefinition};
use crate::{AuthError, AuthResult};

/// A flow as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDocument {
    /// Flow id.
    pub id: String,

    /// Public route; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    /// Whether the flow can be started.
    #[serde(default = "default_active")]
    pub active: bool,

    /// The graph.
    pub definition: FlowDefinition,
}

fn default_active() -> bool {
    true
}

impl FlowDocument {
    /// Parses a TOML document and checks its structure.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FlowDefinition` on parse or structural errors.
    pub fn from_toml_str(content: &str) -> AuthResult<Self> {
        let document: Self = toml::from_str(content)
            .map_err(|e| AuthError::flow_definition(format!("invalid flow document: {e}")))?;
        document.definition.validate()?;
        Ok(document)
    }

    /// Parses a JSON document and checks its structure.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FlowDefinition` on parse or structural errors.
    pub fn from_json_str(content: &str) -> AuthResult<Self> {
        let document: Self = serde_json::from_str(content)
            .map_err(|e| AuthError::flow_definition(format!("invalid flow document: {e}")))?;
        document.definition.validate()?;
        Ok(document)
    }

    /// Reads a document, choosing the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the file cannot be read or has
    /// an unsupported extension, and `AuthError::FlowDefinition` if its
    /// content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        let parsed = match Format::of(path) {
            Some(Format::Toml) => Self::from_toml_str(&content),
            Some(Format::Json) => Self::from_json_str(&content),
            None => {
                return Err(AuthError::configuration(format!(
                    "unsupported flow file extension: {}",
                    path.display()
                )));
            }
        };

        parsed.map_err(|err| match err {
            AuthError::FlowDefinition { message } => {
                AuthError::flow_definition(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Route the flow is reachable under.
    #[must_use]
    pub fn route(&self) -> &str {
        self.route.as_deref().unwrap_or(&self.id)
    }

    /// Binds the document to a tenant/realm.
    #[must_use]
    pub fn into_flow(self, tenant: &str, realm: &str) -> Flow {
        let route = self.route().to_string();
        let mut flow = Flow::new(tenant, realm, self.id, route, self.definition);
        flow.active = self.active;
        flow
    }
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Lists the flow files of a directory, sorted by name.
///
/// Only `*.toml` and `*.json` files are returned; subdirectories are not
/// searched.
///
/// # Errors
///
/// Returns `AuthError::Configuration` if the directory cannot be read.
pub fn flow_files(dir: impl AsRef<Path>) -> AuthResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AuthError::configuration(format!("cannot read {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AuthError::configuration(format!("cannot read {}: {e}", dir.display())))?
            .path();
        if path.is_file() && Format::of(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads every flow document in a directory.
///
/// Fails on the first invalid file.
///
/// # Errors
///
/// See [`flow_files`] and [`FlowDocument::from_file`]. Also returns
/// `AuthError::FlowDefinition` if two documents share an id or a route.
pub fn load_dir(dir: impl AsRef<Path>) -> AuthResult<Vec<FlowDocument>> {
    let mut documents: Vec<FlowDocument> = Vec::new();
    for path in flow_files(dir)? {
        let document = FlowDocument::from_file(&path)?;
        if let Some(existing) = documents
            .iter()
            .find(|d| d.id == document.id || d.route() == document.route())
        {
            return Err(AuthError::flow_definition(format!(
                "{}: flow '{}' clashes with flow '{}'",
                path.display(),
                document.id,
                existing.id
            )));
        }
        tracing::debug!(path = %path.display(), flow_id = %document.id, "flow document loaded");
        documents.push(document);
    }
    Ok(documents)
}
