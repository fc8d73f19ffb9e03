//! Node Engine - re-evaluable dataflow graphs for tandem effects
//!
//! This crate provides the host-agnostic graph model shared by the manager
//! (authoring) and the client-side executor (autonomous playback). It
//! supports:
//!
//! - Deterministic tick evaluation in topological order over data ports
//! - Side-effect isolation through sink ports and an [`EffectSink`]
//! - Hierarchical enable/disable gating through node groups
//! - A replayable, idempotent change-set reducer
//! - Loop detection and subgraph export for deployment
//! - Snapshot import/export and compressed undo/redo
//!
//! # Architecture
//!
//! - `NodeRegistry`: explicitly constructed map from node type to definition
//!   and behavior, shared by `Arc`
//! - `GraphEngine`: owns one graph and its groups and runs ticks
//! - `EffectSink`: where sink and disable hooks deliver commands
//!
//! # Example
//!
//! ```ignore
//! use node_engine::{GraphBuilder, GraphEngine, NodeRegistry, NullEffectSink};
//!
//! let mut registry = NodeRegistry::new();
//! effect_nodes::register_builtin_nodes(&mut registry)?;
//! let graph = GraphBuilder::new()
//!     .add_node("lfo-1", "lfo")
//!     .add_node("color-1", "screen-color")
//!     .connect("lfo-1", "value", "color-1", "intensity")
//!     .build();
//! let mut engine = GraphEngine::with_graph(Arc::new(registry), graph, Vec::new());
//! let report = engine.tick(0.0, 1.0 / 60.0, &NullEffectSink);
//! ```

pub mod builder;
pub mod changes;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod groups;
pub mod loops;
pub mod registry;
pub mod snapshot;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use changes::{apply_graph_change, apply_graph_changes, GraphChange};
pub use definition::{ConfigField, ConfigFieldKind, NodeDefinition};
pub use engine::{ChangeReport, GraphEngine, TickReport};
pub use error::{NodeEngineError, Result};
pub use events::{Effect, EffectError, EffectSink, NullEffectSink, VecEffectSink};
pub use groups::{GroupClosure, GroupOperations, NodeGroup};
pub use loops::{
    detect_loops, export_graph_for_loop, find_loop, loop_id_for, LoopDescriptor, CLIENT_ANCHOR_TYPE, CLIENT_ID_KEY,
};
pub use registry::{FnBehavior, NodeBehavior, NodeRegistry, ProcessContext};
pub use snapshot::{GraphSnapshotFile, SNAPSHOT_KIND, SNAPSHOT_VERSION};
pub use types::{
    Connection, ConnectionId, GraphState, NodeCategory, NodeId, NodeInstance, PortDataType, PortDefinition, PortId,
    PortKind, Position, ValueMap,
};
pub use undo::{EditorState, UndoStack};
pub use validation::{check_connection, find_cycles, plan_evaluation, validate_graph, EvaluationPlan, GraphIssue};
