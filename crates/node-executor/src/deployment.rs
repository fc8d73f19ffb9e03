//! Manager-side deploy lifecycle
//!
//! Each loop moves through `idle -> pending -> deployed -> {stopped, removed}`,
//! with `rejected` reachable from `pending`. A deploy is fire-and-forget: the
//! manager sends the command, arms a timer and returns. If no acknowledgement
//! arrives before the timer fires the deploy is presumed lost, the loop goes
//! back to `idle` and the observer hears about it once.
//!
//! Timers carry a generation number. Superseding a pending deploy aborts the
//! old timer, and a timer that wakes up for a generation that is no longer
//! pending does nothing.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use node_engine::{export_graph_for_loop, find_loop, GraphState, LoopDescriptor, NodeGroup};
use parking_lot::Mutex;
use tandem_protocol::{now_ms, ClientId, Message};
use tokio::task::JoinHandle;

use crate::commands::{ExecutorCommand, ExecutorEvent, ExecutorReport};
use crate::config::DeployConfig;
use crate::error::Result;

/// Outbound path from the manager to the server
pub trait DeployLink: Send + Sync {
    /// Whether a live connection exists
    fn is_connected(&self) -> bool;

    fn send(&self, message: Message) -> Result<()>;
}

/// Callbacks for deploy outcomes
///
/// The manager never returns these failures to its caller; the UI layer
/// decides how to present them.
pub trait DeploymentObserver: Send + Sync {
    /// No acknowledgement arrived in time
    fn on_deploy_timeout(&self, _loop_id: &str, _client_id: &str) {}

    /// The client rejected the loop, or a command could not be sent
    fn on_deploy_error(&self, _loop_id: &str, _error: &str) {}

    /// The loop's anchor names no client
    fn on_deploy_missing_client(&self, _loop_id: &str) {}

    /// There is no live link to send through
    fn on_missing_sdk(&self, _loop_id: &str) {}

    /// Any status report from an owning client
    fn on_status(&self, _client_id: &str, _report: &ExecutorReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl DeploymentObserver for NullObserver {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentState {
    #[default]
    Idle,
    Pending,
    Deployed,
    Stopped,
    Removed,
    Rejected,
}

/// One received status report
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub report: ExecutorReport,
    /// Local receive time (ms since epoch)
    pub received_at: f64,
}

/// What the manager knows about one client's executor
#[derive(Debug, Clone, Default)]
pub struct ClientExecutorStatus {
    pub running: bool,
    /// Newest last, bounded by `DeployConfig::event_log_limit`
    pub events: VecDeque<StatusEntry>,
}

struct PendingDeploy {
    client_id: ClientId,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct DeploymentBook {
    pending: HashMap<String, PendingDeploy>,
    deployed: HashMap<String, ClientId>,
    states: HashMap<String, DeploymentState>,
    clients: HashMap<ClientId, ClientExecutorStatus>,
    next_generation: u64,
}

impl DeploymentBook {
    fn cancel_pending(&mut self, loop_id: &str) -> Option<ClientId> {
        let pending = self.pending.remove(loop_id)?;
        pending.timer.abort();
        Some(pending.client_id)
    }

    fn owner(&self, loop_id: &str) -> Option<&ClientId> {
        self.pending
            .get(loop_id)
            .map(|p| &p.client_id)
            .or_else(|| self.deployed.get(loop_id))
    }
}

/// Tracks deployments of loops to client executors
pub struct DeploymentManager {
    config: DeployConfig,
    link: Arc<dyn DeployLink>,
    observer: Arc<dyn DeploymentObserver>,
    book: Arc<Mutex<DeploymentBook>>,
}

impl DeploymentManager {
    pub fn new(link: Arc<dyn DeployLink>, observer: Arc<dyn DeploymentObserver>) -> Self {
        Self::with_config(DeployConfig::default(), link, observer)
    }

    pub fn with_config(config: DeployConfig, link: Arc<dyn DeployLink>, observer: Arc<dyn DeploymentObserver>) -> Self {
        Self {
            config,
            link,
            observer,
            book: Arc::new(Mutex::new(DeploymentBook::default())),
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn state(&self, loop_id: &str) -> DeploymentState {
        self.book.lock().states.get(loop_id).copied().unwrap_or_default()
    }

    /// Client that currently owns a deployed loop
    pub fn deployed_client(&self, loop_id: &str) -> Option<ClientId> {
        self.book.lock().deployed.get(loop_id).cloned()
    }

    pub fn pending_loops(&self) -> Vec<String> {
        let book = self.book.lock();
        let mut ids: Vec<String> = book.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn deployed_loops(&self) -> Vec<String> {
        let book = self.book.lock();
        let mut ids: Vec<String> = book.deployed.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn client_status(&self, client_id: &str) -> Option<ClientExecutorStatus> {
        self.book.lock().clients.get(client_id).cloned()
    }

    pub fn is_running(&self, client_id: &str) -> bool {
        self.book.lock().clients.get(client_id).is_some_and(|s| s.running)
    }

    /// Ship a loop's subgraph to its client and wait for the acknowledgement
    ///
    /// Returns whether the deploy command went out. Must be called inside a
    /// tokio runtime.
    pub fn deploy_loop(&self, state: &GraphState, groups: &[NodeGroup], descriptor: &LoopDescriptor) -> bool {
        let loop_id = descriptor.loop_id.as_str();
        let Some(client_id) = descriptor.client_id.clone() else {
            log::warn!("Loop '{}' has no target client, not deploying", loop_id);
            self.observer.on_deploy_missing_client(loop_id);
            return false;
        };
        if !self.link.is_connected() {
            log::warn!("No live link, cannot deploy loop '{}'", loop_id);
            self.observer.on_missing_sdk(loop_id);
            return false;
        }

        let (graph, groups) = export_graph_for_loop(state, groups, descriptor);
        let command = ExecutorCommand::Deploy {
            loop_id: loop_id.to_string(),
            graph,
            groups,
        };

        let (generation, previous_owner) = {
            let mut book = self.book.lock();
            if book.cancel_pending(loop_id).is_some() {
                log::debug!("Superseding pending deploy of loop '{}'", loop_id);
            }
            let previous_owner = book.deployed.remove(loop_id).filter(|owner| *owner != client_id);
            book.next_generation += 1;
            let generation = book.next_generation;
            let timer = self.spawn_timeout(loop_id.to_string(), client_id.clone(), generation);
            book.pending.insert(
                loop_id.to_string(),
                PendingDeploy {
                    client_id: client_id.clone(),
                    generation,
                    timer,
                },
            );
            book.states.insert(loop_id.to_string(), DeploymentState::Pending);
            (generation, previous_owner)
        };

        // One owner per loop
        if let Some(owner) = previous_owner {
            log::info!("Moving loop '{}' from client '{}' to '{}'", loop_id, owner, client_id);
            self.send_best_effort(
                &ExecutorCommand::Remove {
                    loop_id: loop_id.to_string(),
                },
                &owner,
            );
        }

        if let Err(e) = self.send(&command, &client_id) {
            log::error!("Failed to send deploy of loop '{}': {}", loop_id, e);
            {
                let mut book = self.book.lock();
                if book.pending.get(loop_id).is_some_and(|p| p.generation == generation) {
                    book.cancel_pending(loop_id);
                    book.states.insert(loop_id.to_string(), DeploymentState::Idle);
                }
            }
            self.observer.on_deploy_error(loop_id, &e.to_string());
            return false;
        }

        log::info!(
            "Deploying loop '{}' ({} nodes) to client '{}'",
            loop_id,
            descriptor.node_ids.len(),
            client_id
        );
        true
    }

    fn spawn_timeout(&self, loop_id: String, client_id: ClientId, generation: u64) -> JoinHandle<()> {
        let book = Arc::clone(&self.book);
        let observer = Arc::clone(&self.observer);
        let timeout = self.config.pending_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = {
                let mut book = book.lock();
                if book.pending.get(&loop_id).is_some_and(|p| p.generation == generation) {
                    book.pending.remove(&loop_id);
                    book.states.insert(loop_id.clone(), DeploymentState::Idle);
                    true
                } else {
                    false
                }
            };
            if expired {
                log::warn!(
                    "Deploy of loop '{}' to client '{}' timed out after {:?}",
                    loop_id,
                    client_id,
                    timeout
                );
                observer.on_deploy_timeout(&loop_id, &client_id);
            }
        })
    }

    /// Feed a routed message; returns whether it carried an executor report
    pub fn handle_message(&self, message: &Message) -> bool {
        let Message::Data(data) = message else {
            return false;
        };
        let Some(report) = ExecutorReport::from_sample(&data.sample) else {
            return false;
        };
        let Some(client_id) = data.client_id.as_deref() else {
            log::debug!("Executor report for loop '{}' without a client id", report.loop_id);
            return false;
        };
        self.handle_report(client_id, report);
        true
    }

    /// Apply a status report from `client_id`
    pub fn handle_report(&self, client_id: &str, report: ExecutorReport) {
        let loop_id = report.loop_id.clone();
        let mut send_start = false;
        {
            let mut book = self.book.lock();
            if let Some(owner) = book.owner(&loop_id).filter(|owner| owner.as_str() != client_id) {
                log::debug!(
                    "Ignoring {:?} for loop '{}' from '{}' (owned by '{}')",
                    report.event,
                    loop_id,
                    client_id,
                    owner
                );
                return;
            }

            let limit = self.config.event_log_limit;
            let status = book.clients.entry(client_id.to_string()).or_default();
            status.events.push_back(StatusEntry {
                report: report.clone(),
                received_at: now_ms(),
            });
            while status.events.len() > limit {
                status.events.pop_front();
            }
            match report.event {
                ExecutorEvent::Started => status.running = true,
                ExecutorEvent::Deployed
                | ExecutorEvent::Stopped
                | ExecutorEvent::Removed
                | ExecutorEvent::Rejected => status.running = false,
                ExecutorEvent::Unknown => {}
            }

            match report.event {
                ExecutorEvent::Deployed => {
                    // An ack after the timeout is adopted but not auto-started
                    let was_pending = book.cancel_pending(&loop_id).is_some();
                    book.deployed.insert(loop_id.clone(), client_id.to_string());
                    book.states.insert(loop_id.clone(), DeploymentState::Deployed);
                    send_start = was_pending && self.config.auto_start;
                }
                ExecutorEvent::Started => {
                    book.deployed.insert(loop_id.clone(), client_id.to_string());
                    book.states.insert(loop_id.clone(), DeploymentState::Deployed);
                }
                ExecutorEvent::Stopped => {
                    book.states.insert(loop_id.clone(), DeploymentState::Stopped);
                }
                ExecutorEvent::Removed => {
                    book.cancel_pending(&loop_id);
                    book.deployed.remove(&loop_id);
                    book.states.insert(loop_id.clone(), DeploymentState::Removed);
                }
                ExecutorEvent::Rejected => {
                    book.cancel_pending(&loop_id);
                    book.deployed.remove(&loop_id);
                    book.states.insert(loop_id.clone(), DeploymentState::Rejected);
                }
                ExecutorEvent::Unknown => {}
            }
        }

        log::info!("Client '{}' reported {:?} for loop '{}'", client_id, report.event, loop_id);
        if report.event == ExecutorEvent::Rejected {
            let error = report.error.as_deref().unwrap_or("rejected by client");
            self.observer.on_deploy_error(&loop_id, error);
        }
        if send_start {
            let start = ExecutorCommand::Start {
                loop_id: loop_id.clone(),
            };
            if let Err(e) = self.send(&start, client_id) {
                self.observer.on_deploy_error(&loop_id, &e.to_string());
            }
        }
        self.observer.on_status(client_id, &report);
    }

    /// Pause a loop; cancels a pending deploy of it
    pub fn stop_loop(&self, loop_id: &str) -> bool {
        let client = {
            let mut book = self.book.lock();
            let client = book.owner(loop_id).cloned();
            if book.cancel_pending(loop_id).is_some() {
                book.states.insert(loop_id.to_string(), DeploymentState::Idle);
            }
            client
        };
        let Some(client) = client else {
            log::debug!("Loop '{}' is not deployed, nothing to stop", loop_id);
            return false;
        };
        self.send_reporting(
            &ExecutorCommand::Stop {
                loop_id: loop_id.to_string(),
            },
            &client,
        )
    }

    /// Uninstall a loop from its client and forget it locally
    pub fn remove_loop(&self, loop_id: &str) -> bool {
        let client = {
            let mut book = self.book.lock();
            let client = book.owner(loop_id).cloned();
            book.cancel_pending(loop_id);
            book.deployed.remove(loop_id);
            if client.is_some() {
                book.states.insert(loop_id.to_string(), DeploymentState::Removed);
            }
            client
        };
        let Some(client) = client else {
            log::debug!("Loop '{}' is not deployed, nothing to remove", loop_id);
            return false;
        };
        self.send_reporting(
            &ExecutorCommand::Remove {
                loop_id: loop_id.to_string(),
            },
            &client,
        )
    }

    /// Stop and remove every deployed or pending loop
    ///
    /// Owners are resolved from the deployed map, then the pending entry,
    /// then the anchor in `state`. Sends are best-effort and local
    /// bookkeeping is cleared without waiting for acknowledgements. Returns
    /// the number of loops torn down.
    pub fn stop_all_deployed_loops(&self, state: &GraphState) -> usize {
        let targets: Vec<(String, Option<ClientId>)> = {
            let mut book = self.book.lock();
            let ids: BTreeSet<String> = book.deployed.keys().chain(book.pending.keys()).cloned().collect();
            let targets = ids
                .into_iter()
                .map(|id| {
                    let client = book
                        .deployed
                        .get(&id)
                        .cloned()
                        .or_else(|| book.pending.get(&id).map(|p| p.client_id.clone()));
                    (id, client)
                })
                .collect::<Vec<_>>();
            for (id, _) in &targets {
                book.cancel_pending(id);
                book.states.insert(id.clone(), DeploymentState::Removed);
            }
            book.deployed.clear();
            targets
        };

        let mut torn_down = 0;
        for (loop_id, client) in targets {
            let client = client.or_else(|| find_loop(state, &loop_id).and_then(|d| d.client_id));
            let Some(client) = client else {
                log::warn!("No client found for loop '{}', skipping teardown", loop_id);
                continue;
            };
            for command in [
                ExecutorCommand::Stop {
                    loop_id: loop_id.clone(),
                },
                ExecutorCommand::Remove {
                    loop_id: loop_id.clone(),
                },
            ] {
                self.send_best_effort(&command, &client);
            }
            torn_down += 1;
        }
        log::info!("Tore down {} deployed loop(s)", torn_down);
        torn_down
    }

    fn send(&self, command: &ExecutorCommand, client_id: &str) -> Result<()> {
        let message = command.to_message(client_id)?;
        self.link.send(message)
    }

    fn send_reporting(&self, command: &ExecutorCommand, client_id: &str) -> bool {
        match self.send(command, client_id) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send {} for loop '{}': {}", command.name(), command.loop_id(), e);
                self.observer.on_deploy_error(command.loop_id(), &e.to_string());
                false
            }
        }
    }

    fn send_best_effort(&self, command: &ExecutorCommand, client_id: &str) {
        if let Err(e) = self.send(command, client_id) {
            log::warn!(
                "Best-effort {} of loop '{}' to '{}' failed: {}",
                command.name(),
                command.loop_id(),
                client_id,
                e
            );
        }
    }
}

impl Drop for DeploymentManager {
    fn drop(&mut self) {
        for (_, pending) in self.book.lock().pending.drain() {
            pending.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use node_engine::{GraphBuilder, CLIENT_ANCHOR_TYPE, CLIENT_ID_KEY};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tandem_protocol::TargetSelector;

    #[derive(Default)]
    struct RecordingLink {
        sent: Mutex<Vec<Message>>,
        offline: AtomicBool,
        failing: AtomicBool,
    }

    impl RecordingLink {
        /// `(command, client)` for every plugin message sent
        fn commands(&self) -> Vec<(String, String)> {
            self.sent
                .lock()
                .iter()
                .filter_map(|m| match m {
                    Message::Plugin(p) => {
                        let client = match &p.target {
                            TargetSelector::ClientIds { ids } => ids.join(","),
                            _ => String::new(),
                        };
                        Some((p.command.clone(), client))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    impl DeployLink for RecordingLink {
        fn is_connected(&self) -> bool {
            !self.offline.load(Ordering::SeqCst)
        }

        fn send(&self, message: Message) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ExecutorError::transport("socket closed"));
            }
            self.sent.lock().push(message);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl DeploymentObserver for RecordingObserver {
        fn on_deploy_timeout(&self, loop_id: &str, client_id: &str) {
            self.events.lock().push(format!("timeout:{}:{}", loop_id, client_id));
        }

        fn on_deploy_error(&self, loop_id: &str, error: &str) {
            self.events.lock().push(format!("error:{}:{}", loop_id, error));
        }

        fn on_deploy_missing_client(&self, loop_id: &str) {
            self.events.lock().push(format!("missing-client:{}", loop_id));
        }

        fn on_missing_sdk(&self, loop_id: &str) {
            self.events.lock().push(format!("missing-sdk:{}", loop_id));
        }
    }

    fn setup() -> (DeploymentManager, Arc<RecordingLink>, Arc<RecordingObserver>) {
        let link = Arc::new(RecordingLink::default());
        let observer = Arc::new(RecordingObserver::default());
        let manager = DeploymentManager::new(link.clone(), observer.clone());
        (manager, link, observer)
    }

    fn graph() -> GraphState {
        GraphBuilder::new()
            .add_node("lfo", "lfo")
            .add_node("color", "screen-color")
            .add_node("phone", CLIENT_ANCHOR_TYPE)
            .with_config(CLIENT_ID_KEY, json!("phone-1"))
            .add_node("buzz", "vibrate")
            .add_node("tablet", CLIENT_ANCHOR_TYPE)
            .with_config(CLIENT_ID_KEY, json!("tablet-1"))
            .add_node("orphan", CLIENT_ANCHOR_TYPE)
            .connect("lfo", "value", "color", "intensity")
            .connect("color", "cmd", "phone", "in")
            .connect("buzz", "cmd", "tablet", "in")
            .build()
    }

    fn deploy(manager: &DeploymentManager, state: &GraphState, loop_id: &str) -> bool {
        let descriptor = find_loop(state, loop_id).unwrap();
        manager.deploy_loop(state, &[], &descriptor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reverts_to_idle_once() {
        let (manager, link, observer) = setup();
        let state = graph();

        assert!(deploy(&manager, &state, "loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Pending);
        assert_eq!(link.commands(), vec![("deploy".to_string(), "phone-1".to_string())]);

        tokio::time::sleep(Duration::from_millis(7999)).await;
        assert!(observer.events().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(manager.state("loop-phone"), DeploymentState::Idle);
        assert_eq!(observer.events(), vec!["timeout:loop-phone:phone-1"]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(observer.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_cancels_timer_and_auto_starts() {
        let (manager, link, observer) = setup();
        let state = graph();
        deploy(&manager, &state, "loop-phone");

        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Deployed, "loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Deployed);
        assert_eq!(manager.deployed_client("loop-phone").as_deref(), Some("phone-1"));
        assert!(!manager.is_running("phone-1"));

        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Started, "loop-phone"));
        assert!(manager.is_running("phone-1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(observer.events().is_empty());
        let sent: Vec<String> = link.commands().into_iter().map(|(c, _)| c).collect();
        assert_eq!(sent, vec!["deploy", "start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ack_marks_deployed_without_starting() {
        let (manager, link, observer) = setup();
        let state = graph();
        deploy(&manager, &state, "loop-phone");

        tokio::time::sleep(Duration::from_millis(8001)).await;
        assert_eq!(manager.state("loop-phone"), DeploymentState::Idle);
        assert_eq!(observer.events(), vec!["timeout:loop-phone:phone-1"]);

        // The client did install the loop; it is tracked but left for the user to start
        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Deployed, "loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Deployed);
        assert_eq!(manager.deployed_client("loop-phone").as_deref(), Some("phone-1"));
        assert!(!manager.is_running("phone-1"));
        assert!(manager.pending_loops().is_empty());

        let sent: Vec<String> = link.commands().into_iter().map(|(c, _)| c).collect();
        assert_eq!(sent, vec!["deploy"]);
        assert_eq!(observer.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeploy_supersedes_pending_timer() {
        let (manager, _link, observer) = setup();
        let state = graph();

        deploy(&manager, &state, "loop-phone");
        tokio::time::sleep(Duration::from_secs(5)).await;
        deploy(&manager, &state, "loop-phone");

        // First timer would have fired at 8s
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(observer.events().is_empty());
        assert_eq!(manager.state("loop-phone"), DeploymentState::Pending);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(observer.events(), vec!["timeout:loop-phone:phone-1"]);
    }

    #[tokio::test]
    async fn test_missing_client_and_missing_link() {
        let (manager, link, observer) = setup();
        let state = graph();

        assert!(!deploy(&manager, &state, "loop-orphan"));
        link.offline.store(true, Ordering::SeqCst);
        assert!(!deploy(&manager, &state, "loop-phone"));

        assert_eq!(observer.events(), vec!["missing-client:loop-orphan", "missing-sdk:loop-phone"]);
        assert!(link.commands().is_empty());
        assert_eq!(manager.state("loop-phone"), DeploymentState::Idle);
    }

    #[tokio::test]
    async fn test_send_failure_reports_error() {
        let (manager, link, observer) = setup();
        link.failing.store(true, Ordering::SeqCst);

        assert!(!deploy(&manager, &graph(), "loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Idle);
        assert!(manager.pending_loops().is_empty());
        assert_eq!(observer.events().len(), 1);
        assert!(observer.events()[0].starts_with("error:loop-phone:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection() {
        let (manager, _link, observer) = setup();
        deploy(&manager, &graph(), "loop-phone");

        manager.handle_report("phone-1", ExecutorReport::rejected("loop-phone", "cycle through [a, b]"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Rejected);
        assert!(manager.pending_loops().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(observer.events(), vec!["error:loop-phone:cycle through [a, b]"]);
    }

    #[tokio::test]
    async fn test_reports_from_non_owner_are_ignored() {
        let (manager, _link, _observer) = setup();
        deploy(&manager, &graph(), "loop-phone");

        manager.handle_report("intruder", ExecutorReport::new(ExecutorEvent::Deployed, "loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Pending);
        assert!(manager.client_status("intruder").is_none());
    }

    #[tokio::test]
    async fn test_unknown_event_keeps_running_flag() {
        let (manager, _link, _observer) = setup();
        deploy(&manager, &graph(), "loop-phone");
        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Deployed, "loop-phone"));
        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Started, "loop-phone"));

        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Unknown, "loop-phone"));
        assert!(manager.is_running("phone-1"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Deployed);

        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Stopped, "loop-phone"));
        assert!(!manager.is_running("phone-1"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Stopped);
    }

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let link = Arc::new(RecordingLink::default());
        let config = DeployConfig {
            event_log_limit: 3,
            ..DeployConfig::default()
        };
        let manager = DeploymentManager::with_config(config, link, Arc::new(NullObserver));

        for i in 0..5 {
            manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Unknown, format!("loop-{}", i)));
        }
        let status = manager.client_status("phone-1").unwrap();
        assert_eq!(status.events.len(), 3);
        assert_eq!(status.events[0].report.loop_id, "loop-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_tears_down_deployed_and_pending() {
        let (manager, link, observer) = setup();
        let state = graph();
        deploy(&manager, &state, "loop-phone");
        deploy(&manager, &state, "loop-tablet");
        manager.handle_report("phone-1", ExecutorReport::new(ExecutorEvent::Deployed, "loop-phone"));

        assert_eq!(manager.stop_all_deployed_loops(&state), 2);
        assert!(manager.deployed_loops().is_empty());
        assert!(manager.pending_loops().is_empty());

        let teardown: Vec<(String, String)> = link.commands().into_iter().skip(3).collect();
        assert_eq!(
            teardown,
            vec![
                ("stop".to_string(), "phone-1".to_string()),
                ("remove".to_string(), "phone-1".to_string()),
                ("stop".to_string(), "tablet-1".to_string()),
                ("remove".to_string(), "tablet-1".to_string()),
            ]
        );

        // The pending tablet deploy never times out
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels_pending() {
        let (manager, link, _observer) = setup();
        deploy(&manager, &graph(), "loop-phone");

        assert!(manager.stop_loop("loop-phone"));
        assert_eq!(manager.state("loop-phone"), DeploymentState::Idle);
        assert_eq!(link.commands().last().map(|(c, _)| c.as_str()), Some("stop"));
        assert!(!manager.stop_loop("loop-unknown"));
    }
}
