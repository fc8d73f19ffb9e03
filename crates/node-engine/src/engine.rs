//! Tick-driven graph evaluation
//!
//! [`GraphEngine`] owns one graph and its groups. Every [`GraphEngine::tick`]
//! derives the enabled set from the group closure, evaluates data nodes in
//! topological order, and then delivers sink inputs in node order. Node state
//! is not stored between ticks beyond the documented `inputValues` and
//! `outputValues` on each node.
//!
//! # Key Concepts
//!
//! - **Plan cache**: the evaluation order and the validated connection index
//!   are rebuilt only after a change that alters wiring
//! - **Active set**: nodes that ran while enabled; leaving it fires
//!   `on_disable` exactly once
//! - **Validated edits**: [`GraphEngine::apply_changes`] checks each change
//!   against the registry before handing it to the pure reducer

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::changes::{apply_graph_change, GraphChange};
use crate::definition::NodeDefinition;
use crate::error::{NodeEngineError, Result};
use crate::events::EffectSink;
use crate::groups::{GroupClosure, GroupOperations, NodeGroup};
use crate::registry::{NodeRegistry, ProcessContext};
use crate::types::{Connection, ConnectionId, GraphState, NodeId, NodeInstance, PortId, PortKind, ValueMap};
use crate::validation::{check_connection, plan_evaluation, validate_graph, EvaluationPlan, GraphIssue};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Nodes whose `process` succeeded, in evaluation order
    pub evaluated: Vec<NodeId>,
    /// Nodes skipped because a group disables them
    pub skipped_disabled: Vec<NodeId>,
    /// Nodes on or downstream of a data cycle
    pub blocked: Vec<NodeId>,
    /// Nodes whose `on_disable` fired during this tick
    pub disabled: Vec<NodeId>,
    /// Number of successful `on_sink` deliveries
    pub sink_deliveries: usize,
    pub issues: Vec<GraphIssue>,
}

/// Outcome of a validated change set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeReport {
    /// Changes that altered the graph
    pub applied: usize,
    /// Rejected changes, by index into the submitted slice
    pub rejected: Vec<(usize, GraphIssue)>,
    /// Connections dropped because a node type change removed their port
    pub pruned_connections: Vec<ConnectionId>,
}

impl ChangeReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A node that left the graph while active
#[derive(Debug, Clone)]
struct Retired {
    node_id: NodeId,
    node_type: String,
    config: ValueMap,
}

/// Valid connections grouped by target node, then target port
type IncomingIndex = HashMap<NodeId, HashMap<PortId, Vec<Connection>>>;

#[derive(Debug, Clone)]
struct Prepared {
    plan: EvaluationPlan,
    incoming: IncomingIndex,
}

impl Prepared {
    fn build(state: &GraphState, registry: &NodeRegistry) -> Self {
        let plan = plan_evaluation(state, registry);
        let mut incoming: IncomingIndex = HashMap::new();
        for connection in &state.connections {
            match check_connection(state, registry, connection) {
                Ok(()) => incoming
                    .entry(connection.target_node_id.clone())
                    .or_default()
                    .entry(connection.target_port_id.clone())
                    .or_default()
                    .push(connection.clone()),
                Err(issue) => log::warn!("Ignoring connection during evaluation: {}", issue),
            }
        }
        if !plan.cycles.is_empty() {
            log::warn!(
                "Graph has {} data cycle(s); {} node(s) will not be evaluated",
                plan.cycles.len(),
                plan.blocked.len()
            );
        }
        Self { plan, incoming }
    }
}

/// Evaluates one graph against a shared registry
pub struct GraphEngine {
    registry: Arc<NodeRegistry>,
    state: GraphState,
    groups: Vec<NodeGroup>,
    closure: GroupClosure,
    prepared: Option<Prepared>,
    active: HashSet<NodeId>,
    retired: Vec<Retired>,
    last_time: f64,
}

impl GraphEngine {
    /// Create an engine with an empty graph
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_graph(registry, GraphState::new(), Vec::new())
    }

    /// Create an engine for an existing graph
    ///
    /// The graph is taken as-is; call [`validate`](Self::validate) to get a
    /// report of its problems. Group node ids that do not exist are pruned.
    pub fn with_graph(registry: Arc<NodeRegistry>, state: GraphState, groups: Vec<NodeGroup>) -> Self {
        let mut engine = Self {
            registry,
            state,
            groups,
            closure: GroupClosure::default(),
            prepared: None,
            active: HashSet::new(),
            retired: Vec::new(),
            last_time: 0.0,
        };
        engine.refresh_groups();
        engine
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    pub fn closure(&self) -> &GroupClosure {
        &self.closure
    }

    /// Whether no ancestor group of the node is disabled
    pub fn is_node_enabled(&self, node_id: &str) -> bool {
        !self.closure.is_node_disabled(node_id)
    }

    /// Full configuration report for the current graph
    pub fn validate(&self) -> Vec<GraphIssue> {
        validate_graph(&self.state, &self.registry)
    }

    /// Evaluation plan for the current structure
    pub fn plan(&mut self) -> &EvaluationPlan {
        let prepared = self
            .prepared
            .get_or_insert_with(|| Prepared::build(&self.state, &self.registry));
        &prepared.plan
    }

    /// Copy of the graph with outputs cleared, for export
    pub fn export_state(&self) -> GraphState {
        let mut state = self.state.clone();
        state.clear_outputs();
        state
    }

    /// Apply a change set, rejecting changes the registry does not allow
    ///
    /// Each change is checked against the graph as it stands after the
    /// changes before it. Rejected changes are skipped; the rest still apply.
    pub fn apply_changes(&mut self, changes: &[GraphChange]) -> ChangeReport {
        let mut report = ChangeReport::default();
        for (index, change) in changes.iter().enumerate() {
            if let Err(issue) = self.check_change(change) {
                log::warn!("Rejected graph change #{}: {}", index, issue);
                report.rejected.push((index, issue));
                continue;
            }

            self.retire_replaced(change);
            if !apply_graph_change(&mut self.state, change) {
                continue;
            }
            report.applied += 1;

            match change {
                GraphChange::AddNode { node } => {
                    report.pruned_connections.extend(self.prune_stale_connections(&node.id));
                }
                GraphChange::UpdateNodeType { node_id, .. } => {
                    report.pruned_connections.extend(self.prune_stale_connections(node_id));
                }
                _ => {}
            }
            if change.rewires() {
                self.prepared = None;
            }
        }

        if report.applied > 0 {
            self.refresh_groups();
        }
        report
    }

    fn check_change(&self, change: &GraphChange) -> std::result::Result<(), GraphIssue> {
        match change {
            GraphChange::AddNode { node } => {
                let definition = self.definition_for(&node.id, &node.node_type)?;
                resolve_for(definition, &node.id, &node.config).map(|_| ())
            }
            GraphChange::UpdateNodeType { node_id, node_type } => {
                let definition = self.definition_for(node_id, node_type)?;
                match self.state.find_node(node_id) {
                    Some(node) => resolve_for(definition, node_id, &node.config).map(|_| ()),
                    None => Ok(()),
                }
            }
            GraphChange::UpdateNodeConfig { node_id, config } => {
                let Some(node) = self.state.find_node(node_id) else {
                    return Ok(());
                };
                let Some(definition) = self.registry.get_definition(&node.node_type) else {
                    return Ok(());
                };
                let mut merged = node.config.clone();
                for (key, value) in config {
                    if value.is_null() {
                        merged.remove(key);
                    } else {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                resolve_for(definition, node_id, &merged).map(|_| ())
            }
            GraphChange::AddConnection { connection } => {
                check_connection(&self.state, &self.registry, connection)?;
                self.check_single_input(connection)
            }
            GraphChange::RemoveNode { .. }
            | GraphChange::UpdateNodePosition { .. }
            | GraphChange::RemoveConnection { .. } => Ok(()),
        }
    }

    fn definition_for(&self, node_id: &str, node_type: &str) -> std::result::Result<&NodeDefinition, GraphIssue> {
        self.registry
            .get_definition(node_type)
            .ok_or_else(|| GraphIssue::UnknownNodeType {
                node_id: node_id.to_string(),
                node_type: node_type.to_string(),
            })
    }

    fn check_single_input(&self, connection: &Connection) -> std::result::Result<(), GraphIssue> {
        let single = self
            .state
            .find_node(&connection.target_node_id)
            .and_then(|n| self.registry.get_definition(&n.node_type))
            .and_then(|d| d.find_input(&connection.target_port_id))
            .is_some_and(|p| !p.multiple);
        let taken = self.state.connections.iter().any(|c| {
            c.id != connection.id
                && c.target_node_id == connection.target_node_id
                && c.target_port_id == connection.target_port_id
        });
        if single && taken {
            return Err(GraphIssue::PortAlreadyConnected {
                connection_id: connection.id.clone(),
                node_id: connection.target_node_id.clone(),
                port_id: connection.target_port_id.clone(),
            });
        }
        Ok(())
    }

    /// Queue `on_disable` for an active node the change removes or retypes
    fn retire_replaced(&mut self, change: &GraphChange) {
        let (node_id, replaced) = match change {
            GraphChange::RemoveNode { node_id } => (node_id, true),
            GraphChange::UpdateNodeType { node_id, node_type } => (
                node_id,
                self.state.find_node(node_id).is_some_and(|n| &n.node_type != node_type),
            ),
            GraphChange::AddNode { node } => (
                &node.id,
                self.state
                    .find_node(&node.id)
                    .is_some_and(|n| n.node_type != node.node_type),
            ),
            _ => return,
        };
        if !replaced || !self.active.contains(node_id) {
            return;
        }
        if let Some(node) = self.state.find_node(node_id) {
            self.retired.push(Retired {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                config: node.config.clone(),
            });
        }
        self.active.remove(node_id);
    }

    /// Drop connections on `node_id` whose ports no longer fit
    fn prune_stale_connections(&mut self, node_id: &str) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = self
            .state
            .connections
            .iter()
            .filter(|c| c.touches(node_id))
            .filter(|c| {
                matches!(
                    check_connection(&self.state, &self.registry, c),
                    Err(GraphIssue::UnknownPort { .. }
                        | GraphIssue::PortKindMismatch { .. }
                        | GraphIssue::IncompatiblePortTypes { .. })
                )
            })
            .map(|c| c.id.clone())
            .collect();
        if !stale.is_empty() {
            log::debug!("Pruning {} connection(s) on retyped node '{}'", stale.len(), node_id);
            self.state.connections.retain(|c| !stale.contains(&c.id));
            self.prepared = None;
        }
        stale
    }

    /// Replace all groups
    pub fn set_groups(&mut self, groups: Vec<NodeGroup>) {
        self.groups = groups;
        self.refresh_groups();
    }

    /// Mutate groups in place, then recompute the closure
    ///
    /// ```ignore
    /// engine.update_groups(|groups| GroupOperations::set_disabled(groups, "fx", true))?;
    /// ```
    pub fn update_groups<R>(&mut self, edit: impl FnOnce(&mut Vec<NodeGroup>) -> R) -> R {
        let result = edit(&mut self.groups);
        self.refresh_groups();
        result
    }

    fn refresh_groups(&mut self) {
        let existing: HashSet<&str> = self.state.nodes.iter().map(|n| n.id.as_str()).collect();
        let pruned = GroupOperations::prune_missing(&mut self.groups, &existing);
        if pruned > 0 {
            log::debug!("Pruned {} missing node id(s) from groups", pruned);
        }
        self.closure = GroupClosure::compute(&self.groups);
    }

    /// Set the literal value of one input port
    pub fn set_input_value(&mut self, node_id: &str, port_id: &str, value: Value) -> Result<()> {
        let node = self
            .state
            .find_node_mut(node_id)
            .ok_or_else(|| NodeEngineError::NodeNotFound(node_id.to_string()))?;
        node.input_values.insert(port_id.to_string(), value);
        Ok(())
    }

    /// Run one evaluation pass
    ///
    /// `time` and `delta_time` are in seconds. Problems are collected in the
    /// report; a failing node only loses its own outputs for this tick.
    pub fn tick(&mut self, time: f64, delta_time: f64, effects: &dyn EffectSink) -> TickReport {
        self.last_time = time;
        let prepared = match self.prepared.take() {
            Some(prepared) => prepared,
            None => Prepared::build(&self.state, &self.registry),
        };
        let retired = std::mem::take(&mut self.retired);
        let registry = self.registry.as_ref();
        let disabled = self.closure.disabled_nodes();

        let mut report = TickReport {
            blocked: prepared.plan.blocked.clone(),
            ..TickReport::default()
        };
        for node_ids in &prepared.plan.cycles {
            report.issues.push(GraphIssue::Cycle {
                node_ids: node_ids.clone(),
            });
        }

        for node in &retired {
            let ctx = ProcessContext {
                node_id: &node.node_id,
                time,
                delta_time,
            };
            fire_disable(registry, &node.node_type, &node.config, &ctx, effects, &mut report);
        }

        let mut attempted: HashSet<NodeId> = HashSet::new();
        let mut went_dark: HashSet<NodeId> = HashSet::new();
        for node in &self.state.nodes {
            if self.active.contains(&node.id) && disabled.contains(&node.id) {
                let ctx = ProcessContext {
                    node_id: &node.id,
                    time,
                    delta_time,
                };
                fire_disable(registry, &node.node_type, &node.config, &ctx, effects, &mut report);
                went_dark.insert(node.id.clone());
            }
        }

        let nodes: HashMap<&str, &NodeInstance> = self.state.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut outputs: HashMap<NodeId, ValueMap> = HashMap::new();
        let mut configs: HashMap<&str, ValueMap> = HashMap::new();

        for node_id in &prepared.plan.order {
            let Some(node) = nodes.get(node_id.as_str()) else {
                continue;
            };
            if disabled.contains(node_id) {
                report.skipped_disabled.push(node_id.clone());
                continue;
            }
            let (Some(definition), Some(behavior)) = (
                registry.get_definition(&node.node_type),
                registry.get_behavior(&node.node_type),
            ) else {
                report.issues.push(GraphIssue::UnknownNodeType {
                    node_id: node_id.clone(),
                    node_type: node.node_type.clone(),
                });
                continue;
            };
            let config = match resolve_for(definition, node_id, &node.config) {
                Ok(config) => config,
                Err(issue) => {
                    report.issues.push(issue);
                    continue;
                }
            };

            attempted.insert(node_id.clone());
            let inputs = resolve_inputs(node, definition, PortKind::Data, &prepared.incoming, &outputs);
            let ctx = ProcessContext {
                node_id: node_id.as_str(),
                time,
                delta_time,
            };
            match behavior.process(&inputs, &config, &ctx) {
                Ok(mut produced) => {
                    produced.retain(|port, _| definition.find_output(port).is_some());
                    outputs.insert(node_id.clone(), produced);
                    report.evaluated.push(node_id.clone());
                }
                Err(e) => {
                    log::debug!("Node '{}' failed to process: {}", node_id, e);
                    report.issues.push(GraphIssue::ProcessFailed {
                        node_id: node_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
            configs.insert(node_id.as_str(), config);
        }

        for node in &self.state.nodes {
            let Some(config) = configs.get(node.id.as_str()) else {
                continue;
            };
            let (Some(definition), Some(behavior)) = (
                registry.get_definition(&node.node_type),
                registry.get_behavior(&node.node_type),
            ) else {
                continue;
            };
            if !definition.has_sink_inputs() {
                continue;
            }
            let inputs = resolve_inputs(node, definition, PortKind::Sink, &prepared.incoming, &outputs);
            if inputs.is_empty() {
                continue;
            }
            let ctx = ProcessContext {
                node_id: &node.id,
                time,
                delta_time,
            };
            match behavior.on_sink(&inputs, config, &ctx, effects) {
                Ok(()) => report.sink_deliveries += 1,
                Err(e) => report.issues.push(GraphIssue::ProcessFailed {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        for node in self.state.nodes.iter_mut() {
            node.output_values = outputs.remove(&node.id).unwrap_or_default();
        }
        self.active.retain(|id| !went_dark.contains(id));
        self.active.extend(attempted);
        self.prepared = Some(prepared);
        report
    }

    /// Fire `on_disable` for every active node and clear outputs
    ///
    /// Returns the nodes whose hook fired. The graph itself is kept, so a
    /// later tick starts the nodes again.
    pub fn teardown(&mut self, effects: &dyn EffectSink) -> Vec<NodeId> {
        let registry = self.registry.as_ref();
        let mut report = TickReport::default();
        for node in std::mem::take(&mut self.retired) {
            let ctx = ProcessContext {
                node_id: &node.node_id,
                time: self.last_time,
                delta_time: 0.0,
            };
            fire_disable(registry, &node.node_type, &node.config, &ctx, effects, &mut report);
        }
        for node in &self.state.nodes {
            if self.active.contains(&node.id) {
                let ctx = ProcessContext {
                    node_id: &node.id,
                    time: self.last_time,
                    delta_time: 0.0,
                };
                fire_disable(registry, &node.node_type, &node.config, &ctx, effects, &mut report);
            }
        }
        for issue in &report.issues {
            log::warn!("Teardown: {}", issue);
        }
        self.active.clear();
        self.state.clear_outputs();
        report.disabled
    }
}

fn resolve_for(
    definition: &NodeDefinition,
    node_id: &str,
    config: &ValueMap,
) -> std::result::Result<ValueMap, GraphIssue> {
    definition
        .resolve_config(config)
        .map_err(|e| GraphIssue::InvalidConfig {
            node_id: node_id.to_string(),
            message: e.to_string(),
        })
}

fn fire_disable(
    registry: &NodeRegistry,
    node_type: &str,
    config: &ValueMap,
    ctx: &ProcessContext<'_>,
    effects: &dyn EffectSink,
    report: &mut TickReport,
) {
    let Some(behavior) = registry.get_behavior(node_type) else {
        return;
    };
    let config = registry
        .get_definition(node_type)
        .and_then(|d| d.resolve_config(config).ok())
        .unwrap_or_else(|| config.clone());
    if let Err(e) = behavior.on_disable(&config, ctx, effects) {
        report.issues.push(GraphIssue::ProcessFailed {
            node_id: ctx.node_id.to_string(),
            message: e.to_string(),
        });
    }
    report.disabled.push(ctx.node_id.to_string());
}

/// Resolve the inputs of one kind for a node
///
/// Per port: connected upstream outputs (an array for `multiple` ports, in
/// connection order), then the node's literal `inputValues`, then the port
/// default. Ports with none of these are absent.
fn resolve_inputs(
    node: &NodeInstance,
    definition: &NodeDefinition,
    kind: PortKind,
    incoming: &IncomingIndex,
    outputs: &HashMap<NodeId, ValueMap>,
) -> ValueMap {
    let ports = incoming.get(node.id.as_str());
    let mut inputs = ValueMap::new();
    for port in definition.inputs.iter().filter(|p| p.kind == kind) {
        let upstream: Vec<Value> = ports
            .and_then(|p| p.get(port.id.as_str()))
            .into_iter()
            .flatten()
            .filter_map(|c| outputs.get(&c.source_node_id)?.get(&c.source_port_id).cloned())
            .collect();

        let connected = if upstream.is_empty() {
            None
        } else if port.multiple {
            Some(Value::Array(upstream))
        } else {
            upstream.into_iter().next()
        };
        let value = connected
            .or_else(|| node.input_values.get(&port.id).cloned())
            .or_else(|| port.default_value.clone());
        if let Some(value) = value {
            inputs.insert(port.id.clone(), value);
        }
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::definition::ConfigField;
    use crate::events::{Effect, VecEffectSink};
    use crate::types::{NodeCategory, PortDataType, PortDefinition};
    use serde_json::json;

    fn number(value: &Value) -> f64 {
        value.as_f64().unwrap_or_default()
    }

    fn constant(_: &ValueMap, config: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
        Ok([("out".to_string(), config["value"].clone())].into_iter().collect())
    }

    fn double(inputs: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
        let value = inputs.get("in").map(number).unwrap_or_default();
        Ok([("out".to_string(), json!(value * 2.0))].into_iter().collect())
    }

    fn sum(inputs: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
        let total: f64 = inputs
            .get("in")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(number).sum())
            .unwrap_or_default();
        Ok([("out".to_string(), json!(total))].into_iter().collect())
    }

    fn fail(_: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
        Err(NodeEngineError::failed("boom"))
    }

    /// Data in, command out on a sink port; emits "off" when disabled
    struct Emit;

    impl crate::registry::NodeBehavior for Emit {
        fn process(&self, inputs: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
            let level = inputs.get("in").map(number).unwrap_or_default();
            Ok([("cmd".to_string(), json!({ "level": level }))].into_iter().collect())
        }

        fn on_disable(&self, _: &ValueMap, ctx: &ProcessContext<'_>, effects: &dyn EffectSink) -> Result<()> {
            effects.emit(Effect::new(ctx.node_id, json!({ "off": true })))?;
            Ok(())
        }
    }

    /// Forwards every sink value as an effect for its configured client
    struct Anchor;

    impl crate::registry::NodeBehavior for Anchor {
        fn process(&self, _: &ValueMap, _: &ValueMap, _: &ProcessContext<'_>) -> Result<ValueMap> {
            Ok(ValueMap::new())
        }

        fn on_sink(
            &self,
            inputs: &ValueMap,
            config: &ValueMap,
            ctx: &ProcessContext<'_>,
            effects: &dyn EffectSink,
        ) -> Result<()> {
            let client = config.get("clientId").and_then(Value::as_str).map(str::to_string);
            for command in inputs.get("in").and_then(Value::as_array).into_iter().flatten() {
                effects.emit(Effect::new(ctx.node_id, command.clone()).for_client(client.clone()))?;
            }
            Ok(())
        }
    }

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn(
                NodeDefinition::new("const", NodeCategory::Input, "Constant")
                    .output(PortDefinition::data("out", "Out", PortDataType::Number))
                    .config(ConfigField::number("value", "Value", 0.0)),
                constant,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("double", NodeCategory::Processing, "Double")
                    .input(PortDefinition::data("in", "In", PortDataType::Number).with_default(json!(1.0)))
                    .output(PortDefinition::data("out", "Out", PortDataType::Number)),
                double,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("sum", NodeCategory::Processing, "Sum")
                    .input(PortDefinition::data("in", "In", PortDataType::Number).multiple())
                    .output(PortDefinition::data("out", "Out", PortDataType::Number)),
                sum,
            )
            .unwrap();
        registry
            .register_fn(
                NodeDefinition::new("fail", NodeCategory::Processing, "Fail")
                    .output(PortDefinition::data("out", "Out", PortDataType::Number)),
                fail,
            )
            .unwrap();
        registry
            .register(
                NodeDefinition::new("emit", NodeCategory::Effect, "Emit")
                    .input(PortDefinition::data("in", "In", PortDataType::Number))
                    .output(PortDefinition::sink("cmd", "Command", PortDataType::Command)),
                Arc::new(Emit),
            )
            .unwrap();
        registry
            .register(
                NodeDefinition::new("anchor", NodeCategory::Output, "Anchor")
                    .input(PortDefinition::sink("in", "In", PortDataType::Command).multiple())
                    .config(ConfigField::string("clientId", "Client", "").optional()),
                Arc::new(Anchor),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn output(engine: &GraphEngine, node_id: &str) -> Option<Value> {
        engine.state().find_node(node_id)?.output_values.get("out").cloned()
    }

    #[test]
    fn test_values_flow_in_dependency_order() {
        // Inserted downstream-first to exercise the sort
        let graph = GraphBuilder::new()
            .add_node("d2", "double")
            .add_node("d1", "double")
            .add_node("c", "const")
            .with_config("value", json!(3.0))
            .connect("d1", "out", "d2", "in")
            .connect("c", "out", "d1", "in")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());

        let report = engine.tick(0.0, 0.016, &VecEffectSink::new());
        assert_eq!(report.evaluated, vec!["c", "d1", "d2"]);
        assert_eq!(output(&engine, "d2"), Some(json!(12.0)));
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_input_resolution_order() {
        let graph = GraphBuilder::new()
            .add_node("literal", "double")
            .with_input_value("in", json!(5.0))
            .add_node("default", "double")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());
        engine.tick(0.0, 0.0, &VecEffectSink::new());

        assert_eq!(output(&engine, "literal"), Some(json!(10.0)));
        assert_eq!(output(&engine, "default"), Some(json!(2.0)));
    }

    #[test]
    fn test_multiple_input_collects_in_connection_order() {
        let graph = GraphBuilder::new()
            .add_node("a", "const")
            .with_config("value", json!(1.0))
            .add_node("b", "const")
            .with_config("value", json!(10.0))
            .add_node("s", "sum")
            .connect("b", "out", "s", "in")
            .connect("a", "out", "s", "in")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());
        engine.tick(0.0, 0.0, &VecEffectSink::new());
        assert_eq!(output(&engine, "s"), Some(json!(11.0)));

        let mut plan_engine = engine;
        let prepared = Prepared::build(plan_engine.state(), plan_engine.registry());
        let sources: Vec<&str> = prepared.incoming["s"]["in"]
            .iter()
            .map(|c| c.source_node_id.as_str())
            .collect();
        assert_eq!(sources, vec!["b", "a"]);
        assert_eq!(plan_engine.plan().order.len(), 3);
    }

    #[test]
    fn test_cycle_reported_and_rest_evaluated() {
        let graph = GraphBuilder::new()
            .add_node("a", "double")
            .add_node("b", "double")
            .add_node("free", "const")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "a", "in")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());

        let report = engine.tick(0.0, 0.0, &VecEffectSink::new());
        assert_eq!(report.evaluated, vec!["free"]);
        assert_eq!(report.blocked, vec!["a", "b"]);
        assert!(report.issues.contains(&GraphIssue::Cycle {
            node_ids: vec!["a".to_string(), "b".to_string()]
        }));
        assert_eq!(output(&engine, "a"), None);
    }

    #[test]
    fn test_sinks_delivered_after_data() {
        let graph = GraphBuilder::new()
            .add_node("anchor", "anchor")
            .with_config("clientId", json!("phone-1"))
            .add_node("e", "emit")
            .add_node("c", "const")
            .with_config("value", json!(0.5))
            .connect("c", "out", "e", "in")
            .connect("e", "cmd", "anchor", "in")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());
        let sink = VecEffectSink::new();

        let report = engine.tick(0.0, 0.0, &sink);
        assert_eq!(report.sink_deliveries, 1);
        assert_eq!(
            sink.effects(),
            vec![Effect::new("anchor", json!({ "level": 0.5 })).for_client(Some("phone-1".to_string()))]
        );
    }

    #[test]
    fn test_disable_fires_once_and_resumes() {
        let (graph, groups) = GraphBuilder::new()
            .add_node("c", "const")
            .add_node("e", "emit")
            .connect("c", "out", "e", "in")
            .group(NodeGroup::new("parent", "Parent"))
            .group(NodeGroup::new("child", "Child").with_parent("parent").with_nodes(["e"]))
            .build_with_groups();
        let mut engine = GraphEngine::with_graph(registry(), graph, groups);
        let sink = VecEffectSink::new();

        engine.tick(0.0, 0.1, &sink);
        assert!(engine.state().find_node("e").unwrap().output_values.contains_key("cmd"));

        engine
            .update_groups(|groups| GroupOperations::set_disabled(groups, "parent", true))
            .unwrap();
        assert!(!engine.is_node_enabled("e"));

        let first = engine.tick(0.1, 0.1, &sink);
        let second = engine.tick(0.2, 0.1, &sink);
        assert_eq!(first.disabled, vec!["e"]);
        assert!(second.disabled.is_empty());
        assert_eq!(second.skipped_disabled, vec!["e"]);
        assert!(engine.state().find_node("e").unwrap().output_values.is_empty());
        assert_eq!(sink.drain(), vec![Effect::new("e", json!({ "off": true }))]);

        engine
            .update_groups(|groups| GroupOperations::set_disabled(groups, "parent", false))
            .unwrap();
        let resumed = engine.tick(0.3, 0.1, &sink);
        assert!(resumed.evaluated.contains(&"e".to_string()));
    }

    #[test]
    fn test_process_failure_isolated() {
        let graph = GraphBuilder::new()
            .add_node("bad", "fail")
            .add_node("d", "double")
            .connect("bad", "out", "d", "in")
            .build();
        let mut engine = GraphEngine::with_graph(registry(), graph, Vec::new());

        let report = engine.tick(0.0, 0.0, &VecEffectSink::new());
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, GraphIssue::ProcessFailed { node_id, .. } if node_id == "bad")));
        // Falls back to the port default
        assert_eq!(output(&engine, "d"), Some(json!(2.0)));
    }

    #[test]
    fn test_apply_changes_rejects_bad_edits() {
        let mut engine = GraphEngine::new(registry());
        let report = engine.apply_changes(&[
            GraphChange::AddNode {
                node: NodeInstance::new("c", "const"),
            },
            GraphChange::AddNode {
                node: NodeInstance::new("x", "mystery"),
            },
            GraphChange::AddNode {
                node: NodeInstance::new("anchor", "anchor"),
            },
            // Data output into a sink input
            GraphChange::AddConnection {
                connection: Connection::new("bad", "c", "out", "anchor", "in"),
            },
            GraphChange::UpdateNodeConfig {
                node_id: "c".to_string(),
                config: [("value".to_string(), json!("loud"))].into_iter().collect(),
            },
        ]);

        assert_eq!(report.applied, 2);
        let rejected: Vec<usize> = report.rejected.iter().map(|(i, _)| *i).collect();
        assert_eq!(rejected, vec![1, 3, 4]);
        assert!(matches!(report.rejected[1].1, GraphIssue::PortKindMismatch { .. }));
        assert!(engine.state().connections.is_empty());
    }

    #[test]
    fn test_single_input_rejects_second_connection() {
        let mut engine = GraphEngine::with_graph(
            registry(),
            GraphBuilder::new()
                .add_node("a", "const")
                .add_node("b", "const")
                .add_node("d", "double")
                .connect("a", "out", "d", "in")
                .build(),
            Vec::new(),
        );
        let report = engine.apply_changes(&[GraphChange::AddConnection {
            connection: Connection::new("second", "b", "out", "d", "in"),
        }]);
        assert!(matches!(
            report.rejected[0].1,
            GraphIssue::PortAlreadyConnected { .. }
        ));
    }

    #[test]
    fn test_retype_prunes_vanished_ports() {
        let mut engine = GraphEngine::with_graph(
            registry(),
            GraphBuilder::new()
                .add_node("c", "const")
                .add_node("d", "double")
                .connect_with_id("wire", "c", "out", "d", "in")
                .build(),
            Vec::new(),
        );
        // "fail" has no input ports
        let report = engine.apply_changes(&[GraphChange::UpdateNodeType {
            node_id: "d".to_string(),
            node_type: "fail".to_string(),
        }]);
        assert!(report.is_clean());
        assert_eq!(report.pruned_connections, vec!["wire"]);
        assert!(engine.state().connections.is_empty());
    }

    #[test]
    fn test_removed_active_node_disables_next_tick() {
        let mut engine = GraphEngine::with_graph(
            registry(),
            GraphBuilder::new().add_node("e", "emit").build(),
            Vec::new(),
        );
        let sink = VecEffectSink::new();
        engine.tick(0.0, 0.0, &sink);

        engine.apply_changes(&[GraphChange::RemoveNode {
            node_id: "e".to_string(),
        }]);
        let report = engine.tick(0.1, 0.1, &sink);
        assert_eq!(report.disabled, vec!["e"]);
        assert_eq!(sink.effects().len(), 1);
    }

    #[test]
    fn test_remove_node_prunes_group_membership() {
        let (graph, groups) = GraphBuilder::new()
            .add_node("c", "const")
            .group(NodeGroup::new("g", "G").with_nodes(["c"]))
            .build_with_groups();
        let mut engine = GraphEngine::with_graph(registry(), graph, groups);
        engine.apply_changes(&[GraphChange::RemoveNode {
            node_id: "c".to_string(),
        }]);
        assert!(engine.groups()[0].node_ids.is_empty());
    }

    #[test]
    fn test_teardown_disables_active_nodes() {
        let mut engine = GraphEngine::with_graph(
            registry(),
            GraphBuilder::new()
                .add_node("e1", "emit")
                .add_node("e2", "emit")
                .add_node("c", "const")
                .build(),
            Vec::new(),
        );
        let sink = VecEffectSink::new();
        engine.tick(0.0, 0.0, &sink);

        let disabled = engine.teardown(&sink);
        assert_eq!(disabled, vec!["e1", "e2", "c"]);
        assert_eq!(sink.effects().len(), 2);
        assert!(engine.teardown(&sink).is_empty());
    }
}
