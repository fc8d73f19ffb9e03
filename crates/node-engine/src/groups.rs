//! Node groups - hierarchical enable/disable gating
//!
//! Groups nest through `parent_id`. A group's effective node set is its own
//! `node_ids` plus the effective sets of all its descendants, and a node is
//! disabled whenever any group whose effective set contains it is disabled.
//! Disabling a parent therefore disables every node of every descendant,
//! regardless of the descendants' own flags.
//!
//! Parent links come from authoring and are not trusted: the closure pass
//! terminates on cyclic parent references by treating a group already on the
//! current path as contributing nothing.
//!
//! # Example
//!
//! ```ignore
//! let mut groups = Vec::new();
//! let fx = GroupOperations::create_group(&mut groups, "Effects", &["lfo-1".into()], None)?;
//! GroupOperations::set_disabled(&mut groups, &fx, true)?;
//! let closure = GroupClosure::compute(&groups);
//! assert!(closure.is_node_disabled("lfo-1"));
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::types::NodeId;
use crate::validation::GraphIssue;

/// A named, nestable set of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Unique identifier for this group
    pub id: String,
    /// Enclosing group, `null` for a root group
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Human-readable name for the group
    pub name: String,
    /// Nodes placed directly in this group
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
    #[serde(default)]
    pub disabled: bool,
    /// Collapsed on the canvas
    #[serde(default)]
    pub minimized: bool,
}

impl NodeGroup {
    /// Create a new empty root group
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            name: name.into(),
            node_ids: Vec::new(),
            disabled: false,
            minimized: false,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_nodes<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.node_ids = node_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Check if this group directly contains a specific node
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|n| n == node_id)
    }
}

/// Effective node sets and the derived disabled set
#[derive(Debug, Clone, Default)]
pub struct GroupClosure {
    effective: HashMap<String, BTreeSet<NodeId>>,
    disabled_nodes: HashSet<NodeId>,
}

impl GroupClosure {
    /// Recompute the closure for `groups`
    pub fn compute(groups: &[NodeGroup]) -> Self {
        let by_id: HashMap<&str, &NodeGroup> = groups.iter().map(|g| (g.id.as_str(), g)).collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for group in groups {
            if let Some(parent) = group.parent_id.as_deref() {
                if by_id.contains_key(parent) {
                    children.entry(parent).or_default().push(group.id.as_str());
                }
            }
        }

        let mut effective = HashMap::new();
        for group in groups {
            let mut visiting = HashSet::new();
            let set = collect_effective(group.id.as_str(), &by_id, &children, &mut visiting);
            effective.insert(group.id.clone(), set);
        }

        let disabled_nodes = groups
            .iter()
            .filter(|g| g.disabled)
            .filter_map(|g| effective.get(&g.id))
            .flat_map(|set| set.iter().cloned())
            .collect();

        Self {
            effective,
            disabled_nodes,
        }
    }

    /// Transitive node set of a group
    pub fn effective_nodes(&self, group_id: &str) -> Option<&BTreeSet<NodeId>> {
        self.effective.get(group_id)
    }

    pub fn is_node_disabled(&self, node_id: &str) -> bool {
        self.disabled_nodes.contains(node_id)
    }

    pub fn disabled_nodes(&self) -> &HashSet<NodeId> {
        &self.disabled_nodes
    }
}

fn collect_effective<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a NodeGroup>,
    children: &HashMap<&'a str, Vec<&'a str>>,
    visiting: &mut HashSet<&'a str>,
) -> BTreeSet<NodeId> {
    if !visiting.insert(id) {
        log::warn!("Group '{}' is its own ancestor; ignoring the cyclic link", id);
        return BTreeSet::new();
    }

    let mut set: BTreeSet<NodeId> = by_id
        .get(id)
        .map(|g| g.node_ids.iter().cloned().collect())
        .unwrap_or_default();
    if let Some(kids) = children.get(id) {
        for &child in kids {
            set.extend(collect_effective(child, by_id, children, visiting));
        }
    }

    visiting.remove(id);
    set
}

/// Operations for managing node groups
pub struct GroupOperations;

impl GroupOperations {
    /// Create a group holding `node_ids`, optionally nested under `parent_id`
    ///
    /// Nodes listed directly in the parent move into the new group, so the
    /// parent's effective set is unchanged. Returns the new group's id.
    pub fn create_group(
        groups: &mut Vec<NodeGroup>,
        name: impl Into<String>,
        node_ids: &[NodeId],
        parent_id: Option<&str>,
    ) -> Result<String> {
        if let Some(parent) = parent_id {
            let parent = find_mut(groups, parent)?;
            parent.node_ids.retain(|n| !node_ids.contains(n));
        }

        let id = format!("group-{}", uuid::Uuid::new_v4());
        let mut group = NodeGroup::new(id.clone(), name).with_nodes(node_ids.iter().cloned());
        group.parent_id = parent_id.map(str::to_string);
        groups.push(group);
        Ok(id)
    }

    pub fn set_disabled(groups: &mut [NodeGroup], group_id: &str, disabled: bool) -> Result<()> {
        find_mut(groups, group_id)?.disabled = disabled;
        Ok(())
    }

    pub fn set_minimized(groups: &mut [NodeGroup], group_id: &str, minimized: bool) -> Result<()> {
        find_mut(groups, group_id)?.minimized = minimized;
        Ok(())
    }

    /// Move a group under `new_parent` (or to the root)
    ///
    /// Rejects moves that would make the group its own ancestor.
    pub fn reparent(groups: &mut [NodeGroup], group_id: &str, new_parent: Option<&str>) -> Result<()> {
        if !groups.iter().any(|g| g.id == group_id) {
            return Err(NodeEngineError::GroupNotFound(group_id.to_string()));
        }
        if let Some(parent) = new_parent {
            if !groups.iter().any(|g| g.id == parent) {
                return Err(NodeEngineError::GroupNotFound(parent.to_string()));
            }
            if parent == group_id || Self::ancestors(groups, parent).iter().any(|a| a == group_id) {
                return Err(NodeEngineError::Rejected(GraphIssue::GroupCycle {
                    group_id: group_id.to_string(),
                }));
            }
        }
        find_mut(groups, group_id)?.parent_id = new_parent.map(str::to_string);
        Ok(())
    }

    /// Remove a group, lifting its child groups and nodes into its parent
    pub fn remove_group(groups: &mut Vec<NodeGroup>, group_id: &str) -> Option<NodeGroup> {
        let pos = groups.iter().position(|g| g.id == group_id)?;
        let removed = groups.remove(pos);

        for group in groups.iter_mut() {
            if group.parent_id.as_deref() == Some(group_id) {
                group.parent_id = removed.parent_id.clone();
            }
        }
        if let Some(parent) = removed.parent_id.as_deref() {
            if let Some(parent) = groups.iter_mut().find(|g| g.id == parent) {
                for node in &removed.node_ids {
                    if !parent.contains_node(node) {
                        parent.node_ids.push(node.clone());
                    }
                }
            }
        }
        Some(removed)
    }

    /// Drop node ids that are not in `existing` and parent links to vanished
    /// groups; returns how many node ids were dropped
    pub fn prune_missing(groups: &mut [NodeGroup], existing: &HashSet<&str>) -> usize {
        let group_ids: HashSet<String> = groups.iter().map(|g| g.id.clone()).collect();
        let mut pruned = 0;
        for group in groups.iter_mut() {
            let before = group.node_ids.len();
            group.node_ids.retain(|n| existing.contains(n.as_str()));
            pruned += before - group.node_ids.len();

            if group.parent_id.as_ref().is_some_and(|p| !group_ids.contains(p)) {
                log::debug!("Group '{}' lost its parent; moving to root", group.id);
                group.parent_id = None;
            }
        }
        pruned
    }

    /// Parent chain of a group, nearest first, stopping at a repeated id
    pub fn ancestors(groups: &[NodeGroup], group_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(group_id.to_string());
        let mut current = groups.iter().find(|g| g.id == group_id).and_then(|g| g.parent_id.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = groups.iter().find(|g| g.id == parent).and_then(|g| g.parent_id.clone());
            chain.push(parent);
        }
        chain
    }
}

fn find_mut<'a>(groups: &'a mut [NodeGroup], group_id: &str) -> Result<&'a mut NodeGroup> {
    groups
        .iter_mut()
        .find(|g| g.id == group_id)
        .ok_or_else(|| NodeEngineError::GroupNotFound(group_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Vec<NodeGroup> {
        vec![
            NodeGroup::new("root", "Root").with_nodes(["a"]),
            NodeGroup::new("child", "Child").with_parent("root").with_nodes(["b"]),
            NodeGroup::new("grandchild", "Grandchild")
                .with_parent("child")
                .with_nodes(["c", "d"]),
        ]
    }

    #[test]
    fn test_effective_sets_include_descendants() {
        let closure = GroupClosure::compute(&nested());
        let root: Vec<&str> = closure.effective_nodes("root").unwrap().iter().map(|s| s.as_str()).collect();
        assert_eq!(root, vec!["a", "b", "c", "d"]);
        assert_eq!(closure.effective_nodes("grandchild").unwrap().len(), 2);
    }

    #[test]
    fn test_disabled_parent_disables_enabled_descendants() {
        let mut groups = nested();
        groups[0].disabled = true;
        let closure = GroupClosure::compute(&groups);
        for node in ["a", "b", "c", "d"] {
            assert!(closure.is_node_disabled(node), "{} should be disabled", node);
        }
    }

    #[test]
    fn test_disabled_child_leaves_parent_nodes_enabled() {
        let mut groups = nested();
        groups[1].disabled = true;
        let closure = GroupClosure::compute(&groups);
        assert!(!closure.is_node_disabled("a"));
        assert!(closure.is_node_disabled("b"));
        assert!(closure.is_node_disabled("c"));
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let groups = vec![
            NodeGroup::new("x", "X").with_parent("y").with_nodes(["n1"]),
            NodeGroup::new("y", "Y").with_parent("x").with_nodes(["n2"]).disabled(true),
        ];
        let closure = GroupClosure::compute(&groups);
        assert!(closure.is_node_disabled("n2"));
        assert!(closure.is_node_disabled("n1"));
        assert_eq!(GroupOperations::ancestors(&groups, "x"), vec!["y".to_string()]);
    }

    #[test]
    fn test_create_group_moves_nodes_out_of_parent() {
        let mut groups = vec![NodeGroup::new("root", "Root").with_nodes(["a", "b"])];
        let id = GroupOperations::create_group(&mut groups, "Inner", &["b".to_string()], Some("root")).unwrap();

        assert!(id.starts_with("group-"));
        assert_eq!(groups[0].node_ids, vec!["a".to_string()]);
        let closure = GroupClosure::compute(&groups);
        assert_eq!(closure.effective_nodes("root").unwrap().len(), 2);
    }

    #[test]
    fn test_reparent_rejects_cycle() {
        let mut groups = nested();
        let err = GroupOperations::reparent(&mut groups, "root", Some("grandchild")).unwrap_err();
        assert!(matches!(err, NodeEngineError::Rejected(GraphIssue::GroupCycle { .. })));

        GroupOperations::reparent(&mut groups, "grandchild", None).unwrap();
        assert_eq!(groups[2].parent_id, None);
    }

    #[test]
    fn test_remove_group_lifts_children() {
        let mut groups = nested();
        let removed = GroupOperations::remove_group(&mut groups, "child").unwrap();
        assert_eq!(removed.id, "child");

        let grandchild = groups.iter().find(|g| g.id == "grandchild").unwrap();
        assert_eq!(grandchild.parent_id.as_deref(), Some("root"));
        assert!(groups[0].contains_node("b"));
    }

    #[test]
    fn test_prune_missing() {
        let mut groups = nested();
        groups.remove(0);
        let existing: HashSet<&str> = ["b", "c"].into_iter().collect();
        let pruned = GroupOperations::prune_missing(&mut groups, &existing);
        assert_eq!(pruned, 1);
        assert_eq!(groups[0].parent_id, None);
        assert_eq!(groups[1].node_ids, vec!["c".to_string()]);
    }

    #[test]
    fn test_set_flags() {
        let mut groups = nested();
        GroupOperations::set_minimized(&mut groups, "child", true).unwrap();
        assert!(groups[1].minimized);
        assert!(GroupOperations::set_disabled(&mut groups, "missing", true).is_err());
    }

    #[test]
    fn test_group_wire_shape() {
        let value = serde_json::to_value(NodeGroup::new("g", "G")).unwrap();
        assert_eq!(value["parentId"], serde_json::Value::Null);
        assert_eq!(value["nodeIds"], serde_json::json!([]));
    }
}
