//! The scene: node arena, route table, and the event dispatcher.
//!
//! All mutation of the event graph goes through [`Scene`]. Routes are
//! validated and canonicalized here; events are queued here; [`Scene::update`]
//! drains the queue to quiescence, delivering each event at its timestamp
//! and notifying scripts at the cascade boundary.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use rustc_hash::FxHashMap;

use vireo_field::FieldValue;
use vireo_ids::NodeId;

use crate::error::{Result, VireoError};
use crate::event::{Event, EventQueue};
use crate::interface::{InterfaceKind, NodeInterface, NodeType};
use crate::node::Node;
use crate::node_arena::NodeArena;
use crate::route::Route;
use crate::script::{script_node_type, ScriptEnv, ScriptFactory, ScriptState};

/// A world-replacement request posted by a script via `load_url`.
/// The embedding polls it with [`Scene::take_pending_load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub urls: Vec<Arc<str>>,
    pub parameters: Vec<Arc<str>>,
}

pub struct Scene {
    arena: NodeArena,
    names: FxHashMap<Arc<str>, NodeId>,
    queue: EventQueue,
    scripts: Vec<NodeId>,
    factory: Option<Box<dyn ScriptFactory>>,
    pending_load: Option<LoadRequest>,
    world_url: Option<Arc<str>>,
    frame_rate: f64,
    speed: f32,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            arena: NodeArena::new(),
            names: FxHashMap::default(),
            queue: EventQueue::new(),
            scripts: Vec::new(),
            factory: None,
            pending_load: None,
            world_url: None,
            frame_rate: 0.0,
            speed: 1.0,
        }
    }

    pub fn with_factory(factory: Box<dyn ScriptFactory>) -> Self {
        let mut scene = Self::new();
        scene.factory = Some(factory);
        scene
    }

    pub fn set_script_factory(&mut self, factory: Box<dyn ScriptFactory>) {
        self.factory = Some(factory);
    }

    // ------------------------------------------------------------------
    // Nodes

    /// Add a node of the given type, all fields at their defaults.
    pub fn create_node(&mut self, ty: Arc<NodeType>) -> NodeId {
        self.arena.insert(Node::new(ty))
    }

    /// Add a node and register it under a DEF name. A repeated name
    /// rebinds to the newest node, as DEF does.
    pub fn create_named_node(&mut self, ty: Arc<NodeType>, name: &str) -> NodeId {
        let name: Arc<str> = Arc::from(name);
        let id = self.arena.insert(Node::new(ty));
        if let Some(node) = self.arena.get_mut(id) {
            node.name = Some(name.clone());
        }
        self.names.insert(name, id);
        id
    }

    /// Add a Script node. `interfaces` are the script's user-declared
    /// eventIns, eventOuts, and fields, appended to the base `url` /
    /// `directOutput` / `mustEvaluate` set. The script object itself is
    /// instantiated lazily, at the first [`Scene::initialize`] or
    /// [`Scene::update`].
    pub fn create_script_node(&mut self, interfaces: &[NodeInterface]) -> Result<NodeId> {
        let ty = script_node_type(interfaces)?;
        let mut node = Node::new(ty);
        node.script = Some(ScriptState::new(false, false));
        let id = self.arena.insert(node);
        self.scripts.push(id);
        Ok(id)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.arena.get(id).ok_or(VireoError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.arena.get_mut(id).ok_or(VireoError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Remove a node. A Script node gets its `shutdown` callback first.
    /// IDs held elsewhere (routes, SFNode values) go stale and are skipped
    /// at delivery time.
    pub fn remove_node(&mut self, id: NodeId, timestamp: f64) -> Result<()> {
        if self.arena.get(id).is_none() {
            return Err(VireoError::UnknownNode(id));
        }
        self.shutdown_script(id, timestamp);
        self.scripts.retain(|s| *s != id);
        let node = self.arena.remove(id).ok_or(VireoError::UnknownNode(id))?;
        if let Some(name) = node.name {
            if self.names.get(&name) == Some(&id) {
                self.names.remove(&name);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fields and eventOuts

    pub fn field(&self, node: NodeId, id: &str) -> Result<FieldValue> {
        self.node(node)?.field(id).cloned()
    }

    /// Set a field or exposedField. An exposedField write is observable:
    /// its `_changed` eventOut fans out at the next update.
    pub fn set_field(&mut self, node: NodeId, id: &str, value: &FieldValue) -> Result<()> {
        self.node_mut(node)?.set_field(id, value)
    }

    /// Set a field during scene construction, without event side effects.
    pub fn init_field(&mut self, node: NodeId, id: &str, value: &FieldValue) -> Result<()> {
        self.node_mut(node)?.init_field(id, value)
    }

    pub fn eventout(&self, node: NodeId, id: &str) -> Result<FieldValue> {
        self.node(node)?.eventout(id).cloned()
    }

    pub(crate) fn set_eventout(&mut self, node: NodeId, id: &str, value: &FieldValue) -> Result<()> {
        self.node_mut(node)?.set_eventout(id, value)
    }

    pub(crate) fn field_value_map(&self, node: NodeId) -> Result<IndexMap<Arc<str>, FieldValue>> {
        Ok(self.node(node)?.field_value_map())
    }

    pub(crate) fn eventout_map(&self, node: NodeId) -> Result<IndexMap<Arc<str>, FieldValue>> {
        Ok(self.node(node)?.eventout_map())
    }

    // ------------------------------------------------------------------
    // Routes

    /// Add a route from `from`'s eventOut to `to`'s eventIn.
    ///
    /// Both interfaces must exist (any exposedField spelling is accepted)
    /// and their field kinds must agree. Adding a route that already exists
    /// is a no-op.
    pub fn add_route(
        &mut self,
        from: NodeId,
        eventout: &str,
        to: NodeId,
        eventin: &str,
    ) -> Result<()> {
        let (out_id, out_kind) = {
            let node = self.node(from)?;
            let iface = node
                .node_type()
                .find_eventout(eventout)
                .ok_or_else(|| node.node_type().unsupported(InterfaceKind::EventOut, eventout))?;
            (iface.id.clone(), iface.field_kind)
        };
        let (in_id, in_kind) = {
            let node = self.node(to)?;
            let iface = node
                .node_type()
                .find_eventin(eventin)
                .ok_or_else(|| node.node_type().unsupported(InterfaceKind::EventIn, eventin))?;
            (iface.id.clone(), iface.field_kind)
        };
        if out_kind != in_kind {
            // A route whose endpoint kinds disagree is an invalid-route
            // condition, reported against the destination endpoint.
            debug!("route kinds disagree: {out_kind} eventOut -> {in_kind} eventIn");
            let node = self.node(to)?;
            return Err(node.node_type().unsupported(InterfaceKind::EventIn, eventin));
        }
        let added = self
            .node_mut(from)?
            .add_route_entry(Route::new(out_id, to, in_id));
        if !added {
            debug!("route {from}.{eventout} -> {to}.{eventin} already exists");
        }
        Ok(())
    }

    /// Delete a route. Deleting a route that does not exist (including on
    /// unknown nodes or interfaces) is a silent no-op.
    pub fn delete_route(&mut self, from: NodeId, eventout: &str, to: NodeId, eventin: &str) {
        let route = {
            let Some(node) = self.arena.get(from) else { return };
            let Some(out) = node.node_type().find_eventout(eventout) else {
                return;
            };
            let Some(target) = self.arena.get(to) else { return };
            let Some(input) = target.node_type().find_eventin(eventin) else {
                return;
            };
            Route::new(out.id.clone(), to, input.id.clone())
        };
        if let Some(node) = self.arena.get_mut(from) {
            node.remove_route_entry(&route);
        }
    }

    /// Routes leaving a node.
    pub fn routes(&self, from: NodeId) -> Result<Vec<Route>> {
        Ok(self.node(from)?.routes().to_vec())
    }

    // ------------------------------------------------------------------
    // Events

    /// Queue an event for a node's eventIn, validated and canonicalized.
    pub fn queue_event(
        &mut self,
        to: NodeId,
        eventin: &str,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        let (in_id, in_kind) = {
            let node = self.node(to)?;
            let iface = node
                .node_type()
                .find_eventin(eventin)
                .ok_or_else(|| node.node_type().unsupported(InterfaceKind::EventIn, eventin))?;
            (iface.id.clone(), iface.field_kind)
        };
        if value.kind() != in_kind {
            return Err(VireoError::TypeMismatch {
                expected: in_kind,
                found: value.kind(),
            });
        }
        self.queue.push(Event {
            timestamp,
            to_node: to,
            to_eventin: in_id,
            value,
        })
    }

    /// Set an eventOut and fan the new value out along routes at
    /// `timestamp`. This is how sensors and timers inject events.
    pub fn emit_event(
        &mut self,
        node: NodeId,
        eventout: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        self.set_eventout(node, eventout, value)?;
        self.flush_modified(node, timestamp);
        Ok(())
    }

    pub fn events_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Discard all pending events.
    pub fn flush_events(&mut self) {
        self.queue.flush();
    }

    /// Fan one eventOut value along the owning node's routes. Each route
    /// gets its own clone. Stale targets are skipped.
    fn fan_out(&mut self, from: NodeId, eventout: &Arc<str>, value: &FieldValue, timestamp: f64) {
        let routes: Vec<Route> = match self.arena.get(from) {
            Some(node) => node
                .routes
                .iter()
                .filter(|r| r.eventout == *eventout)
                .cloned()
                .collect(),
            None => return,
        };
        for route in routes {
            if self.arena.get(route.to_node).is_none() {
                debug!("route target {} is gone; skipping", route.to_node);
                continue;
            }
            if let Err(err) = self.queue.push(Event {
                timestamp,
                to_node: route.to_node,
                to_eventin: route.eventin.clone(),
                value: value.clone(),
            }) {
                error!("dropping event for {}: {err}", route.to_node);
            }
        }
    }

    /// Drain a node's modified eventOuts into the queue at `timestamp`.
    fn flush_modified(&mut self, node: NodeId, timestamp: f64) {
        let fired = match self.arena.get_mut(node) {
            Some(n) if n.has_modified_eventouts() => n.take_modified_eventouts(),
            _ => return,
        };
        for (id, value) in fired {
            self.fan_out(node, &id, &value, timestamp);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch

    /// Instantiate and initialize any scripts that have not run yet.
    pub fn initialize(&mut self, timestamp: f64) {
        for id in self.scripts.clone() {
            self.initialize_script(id, timestamp);
        }
    }

    /// Run one dispatch cycle at `timestamp`: flush exposedField writes
    /// made since the last cycle, then deliver pending events until the
    /// queue is empty, calling `events_processed` on every script that saw
    /// an event at each quiescence boundary. Returns whether anything was
    /// delivered.
    pub fn update(&mut self, timestamp: f64) -> bool {
        self.initialize(timestamp);
        let mut delivered = false;
        loop {
            for id in self.arena.keys().collect::<Vec<_>>() {
                self.flush_modified(id, timestamp);
            }
            while let Some(event) = self.queue.pop() {
                delivered |= self.deliver(event);
            }
            self.cascade_boundary(timestamp);
            if self.queue.is_empty() {
                break;
            }
        }
        delivered
    }

    /// Deliver one event to its eventIn. Returns whether it reached a node.
    fn deliver(&mut self, event: Event) -> bool {
        let Some(node) = self.arena.get(event.to_node) else {
            debug!("event target {} is gone; dropping", event.to_node);
            return false;
        };
        let Some(iface) = node.node_type().find_eventin(&event.to_eventin).cloned() else {
            debug!(
                "{} lost eventIn \"{}\"; dropping",
                event.to_node, event.to_eventin
            );
            return false;
        };
        if node.is_script() {
            self.deliver_to_script(event, &iface);
        } else {
            self.deliver_to_node(event, &iface);
        }
        true
    }

    /// Built-in node behavior: an exposedField eventIn stores the value and
    /// re-emits on its `_changed` eventOut, but only if the value actually
    /// changed. That unchanged-value cutoff is what makes route cycles
    /// settle. A plain eventIn on a non-script node has no engine-level
    /// behavior.
    fn deliver_to_node(&mut self, event: Event, iface: &NodeInterface) {
        match iface.kind {
            InterfaceKind::ExposedField => {
                let node = self
                    .arena
                    .get_mut(event.to_node)
                    .expect("checked by deliver");
                match node.field(&iface.id) {
                    Ok(current) if *current == event.value => {}
                    _ => {
                        if let Err(err) = node.set_field(&iface.id, &event.value) {
                            error!("{}.{}: {err}", event.to_node, iface.id);
                            return;
                        }
                        self.flush_modified(event.to_node, event.timestamp);
                    }
                }
            }
            _ => {
                debug!(
                    "event {}.{} has no built-in behavior",
                    event.to_node, iface.id
                );
            }
        }
    }

    fn deliver_to_script(&mut self, event: Event, iface: &NodeInterface) {
        // Rewriting url tears the script down and builds a new one.
        if iface.id.as_ref() == "url" {
            self.replace_script_url(event.to_node, &event.value, event.timestamp);
            return;
        }
        if iface.kind == InterfaceKind::ExposedField {
            let node = self
                .arena
                .get_mut(event.to_node)
                .expect("checked by deliver");
            match node.field(&iface.id) {
                Ok(current) if *current == event.value => return,
                _ => {
                    if let Err(err) = node.set_field(&iface.id, &event.value) {
                        error!("{}.{}: {err}", event.to_node, iface.id);
                        return;
                    }
                }
            }
        }
        if let Some(state) = self.script_state_mut(event.to_node) {
            state.events_received += 1;
        }
        let id = iface.id.clone();
        self.with_script(event.to_node, |script, env| {
            script.process_event(env, &id, &event.value, event.timestamp)
        });
        self.flush_modified(event.to_node, event.timestamp);
    }

    /// Call `events_processed` on every script that saw at least one event
    /// since the last boundary, then flush their eventOuts.
    fn cascade_boundary(&mut self, timestamp: f64) {
        for id in self.scripts.clone() {
            let saw_events = match self.script_state_mut(id) {
                Some(state) if state.events_received > 0 => {
                    state.events_received = 0;
                    true
                }
                _ => false,
            };
            if saw_events {
                self.with_script(id, |script, env| script.events_processed(env, timestamp));
                self.flush_modified(id, timestamp);
            }
        }
    }

    /// Shut every script down, exactly once, and drop pending events.
    pub fn shutdown(&mut self, timestamp: f64) {
        for id in self.scripts.clone() {
            self.shutdown_script(id, timestamp);
        }
        self.queue.flush();
    }

    // ------------------------------------------------------------------
    // Script plumbing

    pub(crate) fn script_state(&self, id: NodeId) -> Option<&ScriptState> {
        self.arena.get(id)?.script.as_ref()
    }

    fn script_state_mut(&mut self, id: NodeId) -> Option<&mut ScriptState> {
        self.arena.get_mut(id)?.script.as_mut()
    }

    /// Run a callback against a node's script object, reporting (not
    /// propagating) its error. The `Rc` is cloned out of the arena first so
    /// the callback can borrow the whole scene through its env.
    fn with_script<F>(&mut self, id: NodeId, f: F)
    where
        F: FnOnce(&mut Box<dyn crate::script::Script>, &mut ScriptEnv<'_>) -> anyhow::Result<()>,
    {
        let Some(rc) = self.script_state(id).and_then(|s| s.script.clone()) else {
            return;
        };
        let mut script = rc.borrow_mut();
        let mut env = ScriptEnv { scene: self, node: id };
        if let Err(err) = f(&mut script, &mut env) {
            error!("script {id}: {err:#}");
        }
    }

    /// Instantiate a script from its node's `url` list and run its
    /// `initialize` callback. `directOutput` and `mustEvaluate` are
    /// snapshotted here, before the script first runs.
    fn initialize_script(&mut self, id: NodeId, timestamp: f64) {
        let (urls, direct_output, must_evaluate) = {
            let Some(node) = self.arena.get(id) else { return };
            let Some(state) = node.script.as_ref() else { return };
            if state.initialized || state.shut_down {
                return;
            }
            let urls: Vec<Arc<str>> = node
                .field("url")
                .ok()
                .and_then(|v| v.as_strings().map(<[Arc<str>]>::to_vec))
                .unwrap_or_default();
            let direct = node
                .field("directOutput")
                .ok()
                .and_then(FieldValue::as_bool)
                .unwrap_or(false);
            let must = node
                .field("mustEvaluate")
                .ok()
                .and_then(FieldValue::as_bool)
                .unwrap_or(false);
            (urls, direct, must)
        };
        if let Some(state) = self.script_state_mut(id) {
            state.initialized = true;
            state.direct_output = direct_output;
            state.must_evaluate = must_evaluate;
        }
        let Some(factory) = self.factory.as_mut() else {
            warn!("script node {id} has no script factory; left inert");
            return;
        };
        let script = match factory.create_script(id, &urls) {
            Ok(script) => script,
            Err(err) => {
                error!("script node {id} failed to load: {err:#}");
                return;
            }
        };
        if let Some(state) = self.script_state_mut(id) {
            state.script = Some(std::rc::Rc::new(std::cell::RefCell::new(script)));
        }
        self.with_script(id, |script, env| script.initialize(env, timestamp));
        self.flush_modified(id, timestamp);
    }

    /// Replace a Script node's program: shut the old script down, store the
    /// new url list, and initialize a fresh script from it. An unchanged
    /// url list is a no-op.
    fn replace_script_url(&mut self, id: NodeId, urls: &FieldValue, timestamp: f64) {
        match self.arena.get(id).and_then(|n| n.field("url").ok()) {
            Some(current) if *current == *urls => return,
            None => return,
            _ => {}
        }
        self.with_script(id, |script, env| script.shutdown(env, timestamp));
        if let Some(state) = self.script_state_mut(id) {
            state.script = None;
            state.initialized = false;
            state.events_received = 0;
        }
        {
            let node = self.arena.get_mut(id).expect("checked above");
            if let Err(err) = node.set_field("url", urls) {
                error!("{id}.url: {err}");
                return;
            }
        }
        self.initialize_script(id, timestamp);
        // url_changed, plus anything initialize emitted
        self.flush_modified(id, timestamp);
    }

    /// Final shutdown of one script. Safe to call more than once.
    fn shutdown_script(&mut self, id: NodeId, timestamp: f64) {
        match self.script_state_mut(id) {
            Some(state) if !state.shut_down => state.shut_down = true,
            _ => return,
        }
        self.with_script(id, |script, env| script.shutdown(env, timestamp));
        if let Some(state) = self.script_state_mut(id) {
            state.script = None;
        }
    }

    // ------------------------------------------------------------------
    // Browser surface

    pub fn name(&self) -> &'static str {
        "Vireo"
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn current_speed(&self) -> f32 {
        self.speed
    }

    pub fn set_current_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, rate: f64) {
        self.frame_rate = rate;
    }

    pub fn world_url(&self) -> Option<Arc<str>> {
        self.world_url.clone()
    }

    pub fn set_world_url(&mut self, url: &str) {
        self.world_url = Some(Arc::from(url));
    }

    /// Post a status-line description.
    pub fn description(&mut self, text: &str) {
        info!("description: {text}");
    }

    /// Request a world replacement: an ordered fallback list of URLs plus
    /// `key=value` parameter strings. At most one request is pending; later
    /// requests are dropped until the embedding takes the current one.
    pub fn load_url(&mut self, urls: &[Arc<str>], parameters: &[Arc<str>]) {
        self.request_load(LoadRequest {
            urls: urls.to_vec(),
            parameters: parameters.to_vec(),
        });
    }

    pub(crate) fn request_load(&mut self, request: LoadRequest) {
        if self.pending_load.is_some() {
            warn!("load_url while a load is already pending; dropped");
            return;
        }
        self.pending_load = Some(request);
    }

    /// Take the world-replacement request posted by a script, if any.
    /// The embedding calls this after [`Scene::update`].
    pub fn take_pending_load(&mut self) -> Option<LoadRequest> {
        self.pending_load.take()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use vireo_field::FieldKind;

    use crate::script::Script;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Init(f64),
        Event(String, FieldValue, f64),
        Processed(f64),
        Shutdown(f64),
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    /// Records every callback; optionally echoes one eventIn to one
    /// eventOut, which is how the tests build cascades.
    struct Recorder {
        log: Log,
        relay: Option<(&'static str, &'static str)>,
    }

    impl Script for Recorder {
        fn initialize(&mut self, _env: &mut ScriptEnv<'_>, timestamp: f64) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Call::Init(timestamp));
            Ok(())
        }

        fn process_event(
            &mut self,
            env: &mut ScriptEnv<'_>,
            eventin: &str,
            value: &FieldValue,
            timestamp: f64,
        ) -> anyhow::Result<()> {
            self.log
                .borrow_mut()
                .push(Call::Event(eventin.to_string(), value.clone(), timestamp));
            if let Some((input, output)) = self.relay {
                if eventin == input {
                    env.eventout(output, value)?;
                }
            }
            Ok(())
        }

        fn events_processed(
            &mut self,
            _env: &mut ScriptEnv<'_>,
            timestamp: f64,
        ) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Call::Processed(timestamp));
            Ok(())
        }

        fn shutdown(&mut self, _env: &mut ScriptEnv<'_>, timestamp: f64) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Call::Shutdown(timestamp));
            Ok(())
        }
    }

    struct RecorderFactory {
        log: Log,
        relay: Option<(&'static str, &'static str)>,
    }

    impl ScriptFactory for RecorderFactory {
        fn create_script(
            &mut self,
            _node: NodeId,
            _urls: &[Arc<str>],
        ) -> anyhow::Result<Box<dyn Script>> {
            Ok(Box::new(Recorder {
                log: self.log.clone(),
                relay: self.relay,
            }))
        }
    }

    fn timer_type() -> Arc<NodeType> {
        let mut ty = NodeType::new("TimeSensor");
        ty.add_eventout(FieldKind::SfFloat, "fraction_changed").unwrap();
        ty.add_exposedfield(FieldKind::SfBool, "enabled").unwrap();
        Arc::new(ty)
    }

    fn listener_interfaces() -> Vec<NodeInterface> {
        vec![
            NodeInterface {
                kind: InterfaceKind::EventIn,
                field_kind: FieldKind::SfFloat,
                id: Arc::from("set_fraction"),
            },
            NodeInterface {
                kind: InterfaceKind::EventOut,
                field_kind: FieldKind::SfFloat,
                id: Arc::from("value_changed"),
            },
        ]
    }

    fn recorder_scene(relay: Option<(&'static str, &'static str)>) -> (Scene, Log) {
        let _ = env_logger::builder().is_test(true).try_init();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let scene = Scene::with_factory(Box::new(RecorderFactory {
            log: log.clone(),
            relay,
        }));
        (scene, log)
    }

    #[test]
    fn route_delivers_one_event_then_events_processed() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene
            .add_route(timer, "fraction_changed", script, "set_fraction")
            .unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        assert!(scene.events_pending());
        assert!(scene.update(1.0));

        let calls = log.borrow();
        assert_eq!(
            *calls,
            vec![
                Call::Init(1.0),
                Call::Event("set_fraction".into(), FieldValue::SfFloat(0.5), 1.0),
                Call::Processed(1.0),
            ]
        );
        assert!(!scene.events_pending());
    }

    #[test]
    fn eventout_fans_out_to_every_route() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let a = scene.create_script_node(&listener_interfaces()).unwrap();
        let b = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", a, "set_fraction").unwrap();
        scene.add_route(timer, "fraction_changed", b, "set_fraction").unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.25), 2.0)
            .unwrap();
        scene.update(2.0);

        let events = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Event(..)))
            .count();
        assert_eq!(events, 2);
    }

    #[test]
    fn mismatched_route_kinds_are_rejected() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&[NodeInterface {
            kind: InterfaceKind::EventIn,
            field_kind: FieldKind::SfBool,
            id: Arc::from("set_active"),
        }]).unwrap();

        let err = scene
            .add_route(timer, "fraction_changed", script, "set_active")
            .unwrap_err();
        assert!(matches!(err, VireoError::UnsupportedInterface { .. }));

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        scene.update(1.0);
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::Event(..))));
    }

    #[test]
    fn unknown_interfaces_are_rejected() {
        let (mut scene, _log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        assert!(matches!(
            scene.add_route(timer, "no_such_out", script, "set_fraction"),
            Err(VireoError::UnsupportedInterface { .. })
        ));
        assert!(matches!(
            scene.add_route(timer, "fraction_changed", script, "no_such_in"),
            Err(VireoError::UnsupportedInterface { .. })
        ));
        assert!(matches!(
            scene.queue_event(NodeId::nil(), "set_fraction", FieldValue::SfFloat(0.0), 0.0),
            Err(VireoError::UnknownNode(_))
        ));
    }

    #[test]
    fn duplicate_route_delivers_once() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", script, "set_fraction").unwrap();
        scene.add_route(timer, "fraction_changed", script, "set_fraction").unwrap();
        assert_eq!(scene.routes(timer).unwrap().len(), 1);

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        scene.update(1.0);
        let events = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Event(..)))
            .count();
        assert_eq!(events, 1);
    }

    #[test]
    fn delete_route_is_silent_and_final() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", script, "set_fraction").unwrap();

        scene.delete_route(timer, "fraction_changed", script, "set_fraction");
        // again, and with garbage: still silent
        scene.delete_route(timer, "fraction_changed", script, "set_fraction");
        scene.delete_route(timer, "bogus", script, "set_fraction");
        scene.delete_route(NodeId::nil(), "fraction_changed", script, "set_fraction");

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        scene.update(1.0);
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::Event(..))));
    }

    #[test]
    fn events_share_one_cascade_boundary() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", script, "set_fraction").unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.1), 1.0)
            .unwrap();
        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.2), 1.0)
            .unwrap();
        scene.update(1.0);

        let calls = log.borrow();
        let events = calls.iter().filter(|c| matches!(c, Call::Event(..))).count();
        let boundaries = calls.iter().filter(|c| matches!(c, Call::Processed(_))).count();
        assert_eq!(events, 2);
        assert_eq!(boundaries, 1);
        // the boundary comes after the last event
        assert_eq!(calls.last(), Some(&Call::Processed(1.0)));
    }

    #[test]
    fn script_cascade_crosses_nodes_in_one_update() {
        // relay script: set_fraction in, value_changed out
        let (mut scene, log) = recorder_scene(Some(("set_fraction", "value_changed")));
        let timer = scene.create_node(timer_type());
        let first = scene.create_script_node(&listener_interfaces()).unwrap();
        let second = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", first, "set_fraction").unwrap();
        scene.add_route(first, "value_changed", second, "set_fraction").unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 3.0)
            .unwrap();
        scene.update(3.0);

        let calls = log.borrow();
        let events = calls.iter().filter(|c| matches!(c, Call::Event(..))).count();
        let boundaries = calls.iter().filter(|c| matches!(c, Call::Processed(_))).count();
        assert_eq!(events, 2, "relay reached the second script: {calls:?}");
        assert_eq!(boundaries, 2, "each script gets one boundary: {calls:?}");
        // the relayed event keeps the original timestamp
        assert!(calls.contains(&Call::Event(
            "set_fraction".into(),
            FieldValue::SfFloat(0.5),
            3.0
        )));
    }

    #[test]
    fn exposedfield_write_is_observable_on_next_update() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&[NodeInterface {
            kind: InterfaceKind::EventIn,
            field_kind: FieldKind::SfBool,
            id: Arc::from("set_active"),
        }]).unwrap();
        scene.add_route(timer, "enabled_changed", script, "set_active").unwrap();

        scene
            .set_field(timer, "enabled", &FieldValue::SfBool(true))
            .unwrap();
        scene.update(4.0);

        assert!(log.borrow().contains(&Call::Event(
            "set_active".into(),
            FieldValue::SfBool(true),
            4.0
        )));
    }

    #[test]
    fn init_field_is_not_observable() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&[NodeInterface {
            kind: InterfaceKind::EventIn,
            field_kind: FieldKind::SfBool,
            id: Arc::from("set_active"),
        }]).unwrap();
        scene.add_route(timer, "enabled_changed", script, "set_active").unwrap();

        scene
            .init_field(timer, "enabled", &FieldValue::SfBool(true))
            .unwrap();
        scene.update(4.0);
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::Event(..))));
    }

    #[test]
    fn exposedfield_route_cycle_settles() {
        // A.enabled -> B.enabled -> A.enabled; the unchanged-value cutoff
        // stops the ping-pong.
        let (mut scene, _log) = recorder_scene(None);
        let a = scene.create_node(timer_type());
        let b = scene.create_node(timer_type());
        scene.add_route(a, "enabled_changed", b, "set_enabled").unwrap();
        scene.add_route(b, "enabled_changed", a, "set_enabled").unwrap();

        scene
            .queue_event(a, "set_enabled", FieldValue::SfBool(true), 5.0)
            .unwrap();
        assert!(scene.update(5.0));

        assert_eq!(scene.field(a, "enabled").unwrap(), FieldValue::SfBool(true));
        assert_eq!(scene.field(b, "enabled").unwrap(), FieldValue::SfBool(true));
        assert!(!scene.events_pending());
    }

    #[test]
    fn failing_script_does_not_stall_the_cascade() {
        struct Failing;
        impl Script for Failing {
            fn initialize(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
            fn process_event(
                &mut self,
                _: &mut ScriptEnv<'_>,
                _: &str,
                _: &FieldValue,
                _: f64,
            ) -> anyhow::Result<()> {
                anyhow::bail!("deliberate failure")
            }
            fn events_processed(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
            fn shutdown(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
        }

        // first created script fails, the rest record
        struct MixedFactory {
            log: Log,
            created: usize,
        }
        impl ScriptFactory for MixedFactory {
            fn create_script(
                &mut self,
                _node: NodeId,
                _urls: &[Arc<str>],
            ) -> anyhow::Result<Box<dyn Script>> {
                self.created += 1;
                if self.created == 1 {
                    Ok(Box::new(Failing))
                } else {
                    Ok(Box::new(Recorder {
                        log: self.log.clone(),
                        relay: None,
                    }))
                }
            }
        }

        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut scene = Scene::with_factory(Box::new(MixedFactory {
            log: log.clone(),
            created: 0,
        }));
        let timer = scene.create_node(timer_type());
        let failing = scene.create_script_node(&listener_interfaces()).unwrap();
        let healthy = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", failing, "set_fraction").unwrap();
        scene.add_route(timer, "fraction_changed", healthy, "set_fraction").unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        scene.update(1.0);

        assert!(log.borrow().contains(&Call::Event(
            "set_fraction".into(),
            FieldValue::SfFloat(0.5),
            1.0
        )));
    }

    #[test]
    fn set_url_shuts_old_script_down_before_the_new_one_starts() {
        let (mut scene, log) = recorder_scene(None);
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene
            .init_field(
                script,
                "url",
                &FieldValue::MfString(vec![Arc::from("one.js")]),
            )
            .unwrap();
        scene.initialize(0.0);

        scene
            .queue_event(
                script,
                "set_url",
                FieldValue::MfString(vec![Arc::from("two.js")]),
                6.0,
            )
            .unwrap();
        scene.update(6.0);

        let calls = log.borrow();
        assert_eq!(
            *calls,
            vec![Call::Init(0.0), Call::Shutdown(6.0), Call::Init(6.0)]
        );
        assert_eq!(
            scene.field(script, "url").unwrap(),
            FieldValue::MfString(vec![Arc::from("two.js")])
        );
    }

    #[test]
    fn unchanged_url_does_not_reload() {
        let (mut scene, log) = recorder_scene(None);
        let script = scene.create_script_node(&[]).unwrap();
        scene
            .init_field(
                script,
                "url",
                &FieldValue::MfString(vec![Arc::from("one.js")]),
            )
            .unwrap();
        scene.initialize(0.0);

        scene
            .queue_event(
                script,
                "set_url",
                FieldValue::MfString(vec![Arc::from("one.js")]),
                6.0,
            )
            .unwrap();
        scene.update(6.0);
        assert_eq!(*log.borrow(), vec![Call::Init(0.0)]);
    }

    #[test]
    fn direct_output_gates_scene_mutation() {
        // script that tries to add a route during initialize
        struct Wiring {
            from: NodeId,
            to: NodeId,
        }
        impl Script for Wiring {
            fn initialize(&mut self, env: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                env.add_route(self.from, "fraction_changed", self.to, "set_fraction")?;
                Ok(())
            }
            fn process_event(
                &mut self,
                _: &mut ScriptEnv<'_>,
                _: &str,
                _: &FieldValue,
                _: f64,
            ) -> anyhow::Result<()> {
                Ok(())
            }
            fn events_processed(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
            fn shutdown(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
        }
        struct WiringFactory {
            from: NodeId,
            to: NodeId,
        }
        impl ScriptFactory for WiringFactory {
            fn create_script(
                &mut self,
                _node: NodeId,
                _urls: &[Arc<str>],
            ) -> anyhow::Result<Box<dyn Script>> {
                Ok(Box::new(Wiring {
                    from: self.from,
                    to: self.to,
                }))
            }
        }

        for direct_output in [false, true] {
            let mut scene = Scene::new();
            let timer = scene.create_node(timer_type());
            let listener = scene.create_script_node(&listener_interfaces()).unwrap();
            let wiring = scene.create_script_node(&[]).unwrap();
            scene
                .init_field(wiring, "directOutput", &FieldValue::SfBool(direct_output))
                .unwrap();
            scene.set_script_factory(Box::new(WiringFactory {
                from: timer,
                to: listener,
            }));

            scene.initialize(0.0);
            let wired = !scene.routes(timer).unwrap().is_empty();
            assert_eq!(wired, direct_output);
        }
    }

    #[test]
    fn must_evaluate_gates_load_url() {
        struct Loader;
        impl Script for Loader {
            fn initialize(&mut self, env: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                env.load_url(&[Arc::from("next-world.wrl")], &[]);
                Ok(())
            }
            fn process_event(
                &mut self,
                _: &mut ScriptEnv<'_>,
                _: &str,
                _: &FieldValue,
                _: f64,
            ) -> anyhow::Result<()> {
                Ok(())
            }
            fn events_processed(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
            fn shutdown(&mut self, _: &mut ScriptEnv<'_>, _: f64) -> anyhow::Result<()> {
                Ok(())
            }
        }
        struct LoaderFactory;
        impl ScriptFactory for LoaderFactory {
            fn create_script(
                &mut self,
                _node: NodeId,
                _urls: &[Arc<str>],
            ) -> anyhow::Result<Box<dyn Script>> {
                Ok(Box::new(Loader))
            }
        }

        for must_evaluate in [false, true] {
            let mut scene = Scene::with_factory(Box::new(LoaderFactory));
            let script = scene.create_script_node(&[]).unwrap();
            scene
                .init_field(script, "mustEvaluate", &FieldValue::SfBool(must_evaluate))
                .unwrap();
            scene.initialize(0.0);
            assert_eq!(scene.take_pending_load().is_some(), must_evaluate);
            assert!(scene.take_pending_load().is_none());
        }
    }

    #[test]
    fn shutdown_runs_exactly_once() {
        let (mut scene, log) = recorder_scene(None);
        let a = scene.create_script_node(&[]).unwrap();
        scene.initialize(0.0);

        scene.shutdown(9.0);
        scene.shutdown(10.0);
        let shutdowns = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Shutdown(_)))
            .count();
        assert_eq!(shutdowns, 1);

        // and again through node removal of an already-shut-down script
        assert!(scene.remove_node(a, 11.0).is_ok());
        let shutdowns = log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Shutdown(_)))
            .count();
        assert_eq!(shutdowns, 1);
    }

    #[test]
    fn remove_node_shuts_its_script_down() {
        let (mut scene, log) = recorder_scene(None);
        let script = scene.create_script_node(&[]).unwrap();
        scene.initialize(0.0);
        scene.remove_node(script, 7.0).unwrap();
        assert_eq!(*log.borrow(), vec![Call::Init(0.0), Call::Shutdown(7.0)]);
        assert!(matches!(
            scene.field(script, "url"),
            Err(VireoError::UnknownNode(_))
        ));
    }

    #[test]
    fn stale_route_targets_are_skipped() {
        let (mut scene, log) = recorder_scene(None);
        let timer = scene.create_node(timer_type());
        let script = scene.create_script_node(&listener_interfaces()).unwrap();
        scene.add_route(timer, "fraction_changed", script, "set_fraction").unwrap();
        scene.remove_node(script, 0.0).unwrap();

        scene
            .emit_event(timer, "fraction_changed", &FieldValue::SfFloat(0.5), 1.0)
            .unwrap();
        assert!(!scene.update(1.0));
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::Event(..))));
    }

    #[test]
    fn def_names_resolve_to_newest_binding() {
        let mut scene = Scene::new();
        let first = scene.create_named_node(timer_type(), "Clock");
        let second = scene.create_named_node(timer_type(), "Clock");
        assert_ne!(first, second);
        assert_eq!(scene.find_node("Clock"), Some(second));
    }
}
