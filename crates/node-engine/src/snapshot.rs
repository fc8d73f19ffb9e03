//! Graph snapshot file format
//!
//! The import/export shape shared with the authoring tools:
//!
//! ```json
//! { "version": 2, "kind": "node-graph", "graph": { "nodes": [], "connections": [] }, "groups": [], "ui": {} }
//! ```
//!
//! Version 1 files carry no groups. Id remapping and orphan pruning on import
//! are left to the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeEngineError, Result};
use crate::groups::NodeGroup;
use crate::types::GraphState;

/// `kind` marker of a snapshot file
pub const SNAPSHOT_KIND: &str = "node-graph";
/// Version written by [`GraphSnapshotFile::new`]
pub const SNAPSHOT_VERSION: u32 = 2;
/// Oldest version still accepted
pub const MIN_SNAPSHOT_VERSION: u32 = 1;

/// A serialized graph with its groups and opaque editor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshotFile {
    pub version: u32,
    pub kind: String,
    pub graph: GraphState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<NodeGroup>>,
    /// Editor viewport and similar; passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

impl GraphSnapshotFile {
    /// Snapshot a graph for export; computed outputs are not saved
    pub fn new(graph: &GraphState, groups: &[NodeGroup]) -> Self {
        let mut graph = graph.clone();
        graph.clear_outputs();
        Self {
            version: SNAPSHOT_VERSION,
            kind: SNAPSHOT_KIND.to_string(),
            graph,
            groups: Some(groups.to_vec()),
            ui: None,
        }
    }

    pub fn with_ui(mut self, ui: Value) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Parse and check kind and version
    pub fn from_json(text: &str) -> Result<Self> {
        let file: Self = serde_json::from_str(text)?;
        file.check()?;
        Ok(file)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let file: Self = serde_json::from_value(value)?;
        file.check()?;
        Ok(file)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check(&self) -> Result<()> {
        if self.kind != SNAPSHOT_KIND {
            return Err(NodeEngineError::UnsupportedSnapshot(format!(
                "expected kind '{}', found '{}'",
                SNAPSHOT_KIND, self.kind
            )));
        }
        if !(MIN_SNAPSHOT_VERSION..=SNAPSHOT_VERSION).contains(&self.version) {
            return Err(NodeEngineError::UnsupportedSnapshot(format!(
                "version {} is not supported",
                self.version
            )));
        }
        Ok(())
    }

    /// Graph and groups, with absent groups as an empty list
    pub fn into_parts(self) -> (GraphState, Vec<NodeGroup>) {
        (self.graph, self.groups.unwrap_or_default())
    }
}
