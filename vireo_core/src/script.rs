//! The script abstraction: engine-side Script node state and the trait an
//! embedded language implements.
//!
//! The engine never interprets script source. A [`ScriptFactory`] supplied
//! by the embedding turns a Script node's `url` list into a boxed
//! [`Script`]; the dispatcher then drives the four lifecycle callbacks.
//! Callbacks receive a [`ScriptEnv`] scoped to the owning node, which is the
//! only way script code touches the scene.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::warn;
use once_cell::sync::Lazy;

use vireo_field::{FieldKind, FieldValue};
use vireo_ids::NodeId;

use crate::error::Result;
use crate::interface::{NodeInterface, NodeType};
use crate::scene::{LoadRequest, Scene};

/// Interfaces every Script node carries before user declarations.
static SCRIPT_BASE: Lazy<NodeType> = Lazy::new(|| {
    let mut ty = NodeType::new("Script");
    ty.add_exposedfield(FieldKind::MfString, "url")
        .expect("base interface");
    ty.add_field(FieldKind::SfBool, "directOutput")
        .expect("base interface");
    ty.add_field(FieldKind::SfBool, "mustEvaluate")
        .expect("base interface");
    ty
});

/// Build the node type for a Script node with the given user-declared
/// interfaces appended to the base set. Fails on identifier collisions.
pub fn script_node_type(interfaces: &[NodeInterface]) -> Result<Arc<NodeType>> {
    let mut ty = SCRIPT_BASE.clone();
    for iface in interfaces {
        ty.add(iface.kind, iface.field_kind, &iface.id)?;
    }
    Ok(Arc::new(ty))
}

/// Lifecycle callbacks an embedded script language implements.
///
/// Errors are reported and dispatch continues; one misbehaving script never
/// stalls the rest of the scene.
pub trait Script {
    /// Called once, before the script sees any event.
    fn initialize(&mut self, env: &mut ScriptEnv<'_>, timestamp: f64) -> anyhow::Result<()>;

    /// Called for each event delivered to one of the node's eventIns.
    fn process_event(
        &mut self,
        env: &mut ScriptEnv<'_>,
        eventin: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> anyhow::Result<()>;

    /// Called once per cascade after the last `process_event` of that
    /// cascade, for scripts that saw at least one event.
    fn events_processed(&mut self, env: &mut ScriptEnv<'_>, timestamp: f64) -> anyhow::Result<()>;

    /// Called once, when the node leaves the scene or the scene shuts down.
    fn shutdown(&mut self, env: &mut ScriptEnv<'_>, timestamp: f64) -> anyhow::Result<()>;
}

/// Supplied by the embedding: instantiates a [`Script`] from a Script
/// node's `url` list.
pub trait ScriptFactory {
    fn create_script(
        &mut self,
        node: NodeId,
        urls: &[Arc<str>],
    ) -> anyhow::Result<Box<dyn Script>>;
}

/// Engine-side state of one Script node.
pub(crate) struct ScriptState {
    pub(crate) script: Option<Rc<RefCell<Box<dyn Script>>>>,
    pub(crate) direct_output: bool,
    pub(crate) must_evaluate: bool,
    pub(crate) events_received: u32,
    pub(crate) initialized: bool,
    pub(crate) shut_down: bool,
}

impl ScriptState {
    pub(crate) fn new(direct_output: bool, must_evaluate: bool) -> Self {
        Self {
            script: None,
            direct_output,
            must_evaluate,
            events_received: 0,
            initialized: false,
            shut_down: false,
        }
    }
}

/// The scene surface handed to a script callback.
///
/// Reads and writes on the *owning* node are always allowed. Operations
/// that reach beyond the owning node (writing another node, editing the
/// route table, posting events directly) require the node's `directOutput`
/// field; without it they are logged and dropped. `load_url` additionally
/// requires `mustEvaluate`.
pub struct ScriptEnv<'a> {
    pub(crate) scene: &'a mut Scene,
    pub(crate) node: NodeId,
}

impl ScriptEnv<'_> {
    /// The Script node this callback belongs to.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn direct_output(&self) -> bool {
        self.scene
            .script_state(self.node)
            .map(|s| s.direct_output)
            .unwrap_or(false)
    }

    pub fn must_evaluate(&self) -> bool {
        self.scene
            .script_state(self.node)
            .map(|s| s.must_evaluate)
            .unwrap_or(false)
    }

    /// Read a field or exposedField of the owning node.
    pub fn field(&self, id: &str) -> Result<FieldValue> {
        self.scene.field(self.node, id)
    }

    /// Write a field or exposedField of the owning node.
    pub fn set_field(&mut self, id: &str, value: &FieldValue) -> Result<()> {
        self.scene.set_field(self.node, id, value)
    }

    /// Set an eventOut of the owning node. The new value fans out when the
    /// callback returns, at the callback's timestamp.
    pub fn eventout(&mut self, id: &str, value: &FieldValue) -> Result<()> {
        self.scene.set_eventout(self.node, id, value)
    }

    /// Snapshot of the owning node's plain fields.
    pub fn field_value_map(&self) -> Result<indexmap::IndexMap<Arc<str>, FieldValue>> {
        self.scene.field_value_map(self.node)
    }

    /// Snapshot of the owning node's current eventOut values.
    pub fn eventout_map(&self) -> Result<indexmap::IndexMap<Arc<str>, FieldValue>> {
        self.scene.eventout_map(self.node)
    }

    /// Write a field on another node. Requires `directOutput`.
    pub fn set_node_field(&mut self, node: NodeId, id: &str, value: &FieldValue) -> Result<()> {
        if !self.direct_output() {
            warn!(
                "script node {} wrote node {node} without directOutput; dropped",
                self.node
            );
            return Ok(());
        }
        self.scene.set_field(node, id, value)
    }

    /// Add a route. Requires `directOutput`.
    pub fn add_route(
        &mut self,
        from: NodeId,
        eventout: &str,
        to: NodeId,
        eventin: &str,
    ) -> Result<()> {
        if !self.direct_output() {
            warn!(
                "script node {} added a route without directOutput; dropped",
                self.node
            );
            return Ok(());
        }
        self.scene.add_route(from, eventout, to, eventin)
    }

    /// Delete a route. Requires `directOutput`.
    pub fn delete_route(&mut self, from: NodeId, eventout: &str, to: NodeId, eventin: &str) {
        if !self.direct_output() {
            warn!(
                "script node {} deleted a route without directOutput; dropped",
                self.node
            );
            return;
        }
        self.scene.delete_route(from, eventout, to, eventin);
    }

    /// Post an event directly to another node's eventIn. Requires
    /// `directOutput`.
    pub fn send_event(
        &mut self,
        to: NodeId,
        eventin: &str,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        if !self.direct_output() {
            warn!(
                "script node {} sent an event without directOutput; dropped",
                self.node
            );
            return Ok(());
        }
        self.scene.queue_event(to, eventin, value, timestamp)
    }

    /// Ask the browser to replace the world. Requires `mustEvaluate`.
    pub fn load_url(&mut self, urls: &[Arc<str>], parameters: &[Arc<str>]) {
        if !self.must_evaluate() {
            warn!(
                "script node {} called load_url without mustEvaluate; dropped",
                self.node
            );
            return;
        }
        self.scene.request_load(LoadRequest {
            urls: urls.to_vec(),
            parameters: parameters.to_vec(),
        });
    }

    // Browser surface, mirrored so scripts need nothing but the env.

    pub fn browser_name(&self) -> &'static str {
        self.scene.name()
    }

    pub fn browser_version(&self) -> &'static str {
        self.scene.version()
    }

    pub fn current_speed(&self) -> f32 {
        self.scene.current_speed()
    }

    pub fn current_frame_rate(&self) -> f64 {
        self.scene.frame_rate()
    }

    pub fn world_url(&self) -> Option<Arc<str>> {
        self.scene.world_url()
    }

    pub fn description(&mut self, text: &str) {
        self.scene.description(text);
    }
}
