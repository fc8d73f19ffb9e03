//! Client-side executor host
//!
//! Runs loops deployed by a manager without a round trip per frame. Each
//! loop gets its own [`GraphEngine`] over the shared registry. Commands are
//! handled synchronously and answered with the [`ExecutorReport`] the client
//! sends back.
//!
//! Running loops re-emit their commands on every tick. The host forwards a
//! command only when it differs from what the same node emitted in the
//! previous tick, so a held trigger buzzes once and a steady color is set
//! once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use effect_nodes::{BuiltinNode, SensorInputNode};
use node_engine::{
    Effect, EffectSink, GraphEngine, GraphIssue, GraphState, NodeGroup, NodeRegistry, TickReport, VecEffectSink,
};
use parking_lot::Mutex;
use serde_json::Value;
use tandem_protocol::constants::executor::PLUGIN_ID;
use tandem_protocol::{DataSample, Message};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::commands::{ExecutorCommand, ExecutorEvent, ExecutorReport};
use crate::config::HostConfig;
use crate::error::{ExecutorError, Result};

/// `(node, action, nth command of that action from the node this tick)`
type EffectKey = (String, String, usize);

struct InstalledLoop {
    engine: GraphEngine,
    running: bool,
    /// Engine time in seconds, advanced only while running
    elapsed: f64,
    last_commands: HashMap<EffectKey, Value>,
}

impl InstalledLoop {
    fn halt(&mut self, effects: &dyn EffectSink) {
        self.running = false;
        self.engine.teardown(effects);
        self.last_commands.clear();
    }
}

/// Installed loops on one client
pub struct ExecutorHost {
    registry: Arc<NodeRegistry>,
    loops: BTreeMap<String, InstalledLoop>,
}

impl ExecutorHost {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            loops: BTreeMap::new(),
        }
    }

    pub fn loop_ids(&self) -> Vec<&str> {
        self.loops.keys().map(String::as_str).collect()
    }

    pub fn is_installed(&self, loop_id: &str) -> bool {
        self.loops.contains_key(loop_id)
    }

    pub fn is_running(&self, loop_id: &str) -> bool {
        self.loops.get(loop_id).is_some_and(|l| l.running)
    }

    pub fn engine(&self, loop_id: &str) -> Option<&GraphEngine> {
        self.loops.get(loop_id).map(|l| &l.engine)
    }

    /// Handle an incoming envelope addressed to this client
    ///
    /// Returns `None` for anything that is not a node executor command.
    pub fn handle_message(&mut self, message: &Message, effects: &dyn EffectSink) -> Option<ExecutorReport> {
        let Message::Plugin(plugin) = message else {
            return None;
        };
        if plugin.plugin_id != PLUGIN_ID {
            return None;
        }
        match ExecutorCommand::from_plugin(plugin) {
            Ok(command) => Some(self.handle_command(command, effects)),
            Err(e) => {
                log::warn!("Dropping executor command '{}': {}", plugin.command, e);
                plugin
                    .payload
                    .get("loopId")
                    .and_then(Value::as_str)
                    .map(|loop_id| ExecutorReport::rejected(loop_id, e.to_string()))
            }
        }
    }

    pub fn handle_command(&mut self, command: ExecutorCommand, effects: &dyn EffectSink) -> ExecutorReport {
        let loop_id = command.loop_id().to_string();
        let result = match command {
            ExecutorCommand::Deploy { loop_id, graph, groups } => self
                .deploy(&loop_id, graph, groups, effects)
                .map(|()| ExecutorEvent::Deployed),
            ExecutorCommand::Start { loop_id } => self.start(&loop_id).map(|()| ExecutorEvent::Started),
            ExecutorCommand::Stop { loop_id } => self.stop(&loop_id, effects).map(|()| ExecutorEvent::Stopped),
            ExecutorCommand::Remove { loop_id } => self.remove(&loop_id, effects).map(|()| ExecutorEvent::Removed),
        };
        match result {
            Ok(event) => ExecutorReport::new(event, loop_id),
            Err(e) => {
                log::warn!("Executor command for loop '{}' failed: {}", loop_id, e);
                ExecutorReport::rejected(loop_id, e.to_string())
            }
        }
    }

    /// Validate and install a loop, replacing any loop with the same id
    ///
    /// The loop starts stopped. Unknown node types and data cycles reject
    /// the deploy; other issues are logged and the affected connections
    /// are skipped at evaluation time.
    pub fn deploy(
        &mut self,
        loop_id: &str,
        graph: GraphState,
        groups: Vec<NodeGroup>,
        effects: &dyn EffectSink,
    ) -> Result<()> {
        let engine = GraphEngine::with_graph(Arc::clone(&self.registry), graph, groups);
        let (fatal, minor): (Vec<GraphIssue>, Vec<GraphIssue>) = engine
            .validate()
            .into_iter()
            .partition(|issue| matches!(issue, GraphIssue::UnknownNodeType { .. } | GraphIssue::Cycle { .. }));
        if !fatal.is_empty() {
            return Err(ExecutorError::InvalidGraph {
                loop_id: loop_id.to_string(),
                issues: fatal,
            });
        }
        for issue in &minor {
            log::warn!("Loop '{}': {}", loop_id, issue);
        }

        if let Some(mut previous) = self.loops.remove(loop_id) {
            log::debug!("Replacing installed loop '{}'", loop_id);
            previous.halt(effects);
        }
        log::info!(
            "Installed loop '{}' ({} nodes, {} connections)",
            loop_id,
            engine.state().nodes.len(),
            engine.state().connections.len()
        );
        self.loops.insert(
            loop_id.to_string(),
            InstalledLoop {
                engine,
                running: false,
                elapsed: 0.0,
                last_commands: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn start(&mut self, loop_id: &str) -> Result<()> {
        let installed = self
            .loops
            .get_mut(loop_id)
            .ok_or_else(|| ExecutorError::LoopNotFound(loop_id.to_string()))?;
        installed.running = true;
        log::info!("Started loop '{}'", loop_id);
        Ok(())
    }

    /// Pause a loop and undo its held effects
    pub fn stop(&mut self, loop_id: &str, effects: &dyn EffectSink) -> Result<()> {
        let installed = self
            .loops
            .get_mut(loop_id)
            .ok_or_else(|| ExecutorError::LoopNotFound(loop_id.to_string()))?;
        installed.halt(effects);
        log::info!("Stopped loop '{}'", loop_id);
        Ok(())
    }

    pub fn remove(&mut self, loop_id: &str, effects: &dyn EffectSink) -> Result<()> {
        let mut installed = self
            .loops
            .remove(loop_id)
            .ok_or_else(|| ExecutorError::LoopNotFound(loop_id.to_string()))?;
        installed.halt(effects);
        log::info!("Removed loop '{}'", loop_id);
        Ok(())
    }

    /// Stop and uninstall everything, e.g. before disconnecting
    pub fn remove_all(&mut self, effects: &dyn EffectSink) -> Vec<String> {
        let removed: Vec<String> = self.loops.keys().cloned().collect();
        for (_, mut installed) in std::mem::take(&mut self.loops) {
            installed.halt(effects);
        }
        removed
    }

    /// Write a sensor sample into every sensor input that listens for it
    ///
    /// Returns the number of nodes updated.
    pub fn feed_sample(&mut self, sample: &DataSample) -> usize {
        let value = match serde_json::to_value(sample) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Unserializable sensor sample: {}", e);
                return 0;
            }
        };
        let mut updated = 0;
        for installed in self.loops.values_mut() {
            let targets: Vec<String> = installed
                .engine
                .state()
                .nodes
                .iter()
                .filter(|n| n.node_type == SensorInputNode::NODE_TYPE && SensorInputNode::accepts(&n.config, sample))
                .map(|n| n.id.clone())
                .collect();
            for node_id in targets {
                match installed
                    .engine
                    .set_input_value(&node_id, SensorInputNode::PORT_SAMPLE, value.clone())
                {
                    Ok(()) => updated += 1,
                    Err(e) => log::warn!("Could not feed sample to '{}': {}", node_id, e),
                }
            }
        }
        updated
    }

    /// Advance every running loop by `delta_time` seconds
    pub fn tick(&mut self, delta_time: f64, effects: &dyn EffectSink) -> Vec<(String, TickReport)> {
        let mut reports = Vec::new();
        for (loop_id, installed) in self.loops.iter_mut().filter(|(_, l)| l.running) {
            installed.elapsed += delta_time;
            let collected = VecEffectSink::new();
            let report = installed.engine.tick(installed.elapsed, delta_time, &collected);
            for issue in &report.issues {
                log::debug!("Loop '{}': {}", loop_id, issue);
            }
            installed.last_commands = forward_changed(collected.drain(), &installed.last_commands, effects);
            reports.push((loop_id.clone(), report));
        }
        reports
    }

    /// Drive [`tick`](Self::tick) from a tokio interval until aborted
    pub fn spawn_ticker(
        host: Arc<Mutex<ExecutorHost>>,
        effects: Arc<dyn EffectSink>,
        config: HostConfig,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                let delta_time = now.duration_since(last).as_secs_f64();
                last = now;
                host.lock().tick(delta_time, effects.as_ref());
            }
        })
    }
}

/// Emit effects that changed since the previous tick and return the new memory
fn forward_changed(
    effects: Vec<Effect>,
    previous: &HashMap<EffectKey, Value>,
    sink: &dyn EffectSink,
) -> HashMap<EffectKey, Value> {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut current = HashMap::new();
    for effect in effects {
        let action = effect
            .command
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let occurrence = seen.entry((effect.node_id.clone(), action.clone())).or_insert(0);
        let key = (effect.node_id.clone(), action, *occurrence);
        *occurrence += 1;

        if previous.get(&key) != Some(&effect.command) {
            let command = effect.command.clone();
            if let Err(e) = sink.emit(effect) {
                log::warn!("Dropping effect: {}", e);
                continue;
            }
            current.insert(key, command);
        } else {
            current.insert(key, effect.command);
        }
    }
    current
}
