//! Authoring undo/redo over compressed snapshots
//!
//! Each entry is the whole editable state (graph plus groups) serialized to
//! JSON and zstd-compressed. Restoring an entry is a plain replace, so any
//! mix of change sets and group edits can be undone without inverse
//! operations.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::groups::NodeGroup;
use crate::types::GraphState;

const COMPRESSION_LEVEL: i32 = 3;

/// Everything one undo step restores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub graph: GraphState,
    #[serde(default)]
    pub groups: Vec<NodeGroup>,
}

impl EditorState {
    /// Capture a graph for undo; computed outputs are not kept
    pub fn capture(graph: &GraphState, groups: &[NodeGroup]) -> Self {
        let mut graph = graph.clone();
        graph.clear_outputs();
        Self {
            graph,
            groups: groups.to_vec(),
        }
    }
}

/// Bounded undo/redo history
pub struct UndoStack {
    snapshots: VecDeque<Vec<u8>>,
    /// Index of the entry matching the live state
    current: usize,
    max_snapshots: usize,
}

impl UndoStack {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Record `state` as the newest entry, dropping any redo history
    ///
    /// Returns `false` without recording when `state` equals the current
    /// entry, so repeated saves of an unchanged graph do not waste steps.
    pub fn push(&mut self, state: &EditorState) -> Result<bool> {
        let compressed = compress(state)?;
        if self.snapshots.get(self.current) == Some(&compressed) {
            return Ok(false);
        }

        self.snapshots.truncate(self.current + 1);
        self.snapshots.push_back(compressed);
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
            self.current = self.current.saturating_sub(1);
        }
        Ok(true)
    }

    /// Step back; `None` at the oldest entry
    pub fn undo(&mut self) -> Option<Result<EditorState>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.decompress(self.current))
    }

    /// Step forward; `None` at the newest entry
    pub fn redo(&mut self) -> Option<Result<EditorState>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.decompress(self.current))
    }

    pub fn current(&self) -> Option<Result<EditorState>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.current))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total bytes held by all entries
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn decompress(&self, index: usize) -> Result<EditorState> {
        let compressed = self
            .snapshots
            .get(index)
            .ok_or_else(|| NodeEngineError::Compression(format!("no snapshot at index {}", index)))?;
        let json = zstd::decode_all(&compressed[..]).map_err(|e| NodeEngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

fn compress(state: &EditorState) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(state)?;
    zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| NodeEngineError::Compression(e.to_string()))
}
