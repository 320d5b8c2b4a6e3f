//! Scene-graph nodes.
//!
//! A node is its type descriptor plus current state: field values, polled
//! eventOut values (with a modified flag consumed by the dispatcher), and
//! the routes leaving this node. Script nodes additionally carry a
//! [`ScriptState`](crate::script::ScriptState).

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use vireo_field::FieldValue;
use vireo_ids::NodeId;

use crate::error::Result;
use crate::interface::{InterfaceKind, NodeType};
use crate::route::Route;
use crate::script::ScriptState;

/// A polled eventOut: current value plus a flag the dispatcher clears when
/// it fans the value out.
#[derive(Clone, Debug)]
pub struct EventOut {
    pub value: FieldValue,
    pub modified: bool,
}

pub struct Node {
    pub id: NodeId,
    pub name: Option<Arc<str>>,
    ty: Arc<NodeType>,
    fields: IndexMap<Arc<str>, FieldValue>,
    eventouts: IndexMap<Arc<str>, EventOut>,
    pub(crate) routes: SmallVec<[Route; 2]>,
    pub(crate) script: Option<ScriptState>,
}

impl Node {
    /// Create a node with every field and eventOut at its kind's default.
    /// The ID is assigned when the node enters the arena.
    pub fn new(ty: Arc<NodeType>) -> Self {
        let mut fields = IndexMap::new();
        let mut eventouts = IndexMap::new();
        for iface in ty.interfaces() {
            match iface.kind {
                InterfaceKind::Field => {
                    fields.insert(iface.id.clone(), iface.field_kind.default_value());
                }
                InterfaceKind::EventOut => {
                    eventouts.insert(
                        iface.id.clone(),
                        EventOut {
                            value: iface.field_kind.default_value(),
                            modified: false,
                        },
                    );
                }
                InterfaceKind::ExposedField => {
                    fields.insert(iface.id.clone(), iface.field_kind.default_value());
                    eventouts.insert(
                        iface.id.clone(),
                        EventOut {
                            value: iface.field_kind.default_value(),
                            modified: false,
                        },
                    );
                }
                InterfaceKind::EventIn => {}
            }
        }
        Self {
            id: NodeId::nil(),
            name: None,
            ty,
            fields,
            eventouts,
            routes: SmallVec::new(),
            script: None,
        }
    }

    #[inline]
    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.ty
    }

    #[inline]
    pub fn is_script(&self) -> bool {
        self.script.is_some()
    }

    /// Current value of a field or exposedField.
    pub fn field(&self, id: &str) -> Result<&FieldValue> {
        let iface = self
            .ty
            .find_field(id)
            .ok_or_else(|| self.ty.unsupported(InterfaceKind::Field, id))?;
        Ok(&self.fields[&iface.id])
    }

    /// Set a field without event side effects (scene-load initialization).
    pub fn init_field(&mut self, id: &str, value: &FieldValue) -> Result<()> {
        let iface = self
            .ty
            .find_field(id)
            .ok_or_else(|| self.ty.unsupported(InterfaceKind::Field, id))?;
        let id = iface.id.clone();
        self.fields[&id].assign(value)?;
        // Keep the paired eventOut's resting value in step, but do not mark
        // it modified: initial values never fire.
        if let Some(out) = self.eventouts.get_mut(&id) {
            out.value.clone_from(value);
        }
        Ok(())
    }

    /// Set a field or exposedField. Setting an exposedField marks its
    /// paired eventOut modified for fan-out at the next dispatch pass.
    pub fn set_field(&mut self, id: &str, value: &FieldValue) -> Result<()> {
        let iface = self
            .ty
            .find_field(id)
            .ok_or_else(|| self.ty.unsupported(InterfaceKind::Field, id))?;
        let exposed = iface.kind == InterfaceKind::ExposedField;
        let id = iface.id.clone();
        self.fields[&id].assign(value)?;
        if exposed {
            let out = self
                .eventouts
                .get_mut(&id)
                .expect("exposedField always has a paired eventOut");
            out.value.clone_from(value);
            out.modified = true;
        }
        Ok(())
    }

    /// Current value of an eventOut (or exposedField's implicit eventOut).
    pub fn eventout(&self, id: &str) -> Result<&FieldValue> {
        let iface = self
            .ty
            .find_eventout(id)
            .ok_or_else(|| self.ty.unsupported(InterfaceKind::EventOut, id))?;
        Ok(&self.eventouts[&iface.id].value)
    }

    /// Store a new eventOut value and mark it for fan-out.
    pub(crate) fn set_eventout(&mut self, id: &str, value: &FieldValue) -> Result<()> {
        let iface = self
            .ty
            .find_eventout(id)
            .ok_or_else(|| self.ty.unsupported(InterfaceKind::EventOut, id))?;
        let id = iface.id.clone();
        let out = &mut self.eventouts[&id];
        out.value.assign(value)?;
        out.modified = true;
        // An exposedField's eventOut and field share one value.
        if let Some(field) = self.fields.get_mut(&id) {
            field.clone_from(value);
        }
        Ok(())
    }

    /// Drain (id, value) for every modified eventOut, clearing the flags.
    pub(crate) fn take_modified_eventouts(&mut self) -> Vec<(Arc<str>, FieldValue)> {
        let mut out = Vec::new();
        for (id, ev) in self.eventouts.iter_mut() {
            if ev.modified {
                ev.modified = false;
                out.push((id.clone(), ev.value.clone()));
            }
        }
        out
    }

    pub(crate) fn has_modified_eventouts(&self) -> bool {
        self.eventouts.values().any(|ev| ev.modified)
    }

    /// Add an outgoing route. No-op if an identical route exists.
    /// Returns whether the route was added.
    pub(crate) fn add_route_entry(&mut self, route: Route) -> bool {
        if self.routes.contains(&route) {
            return false;
        }
        self.routes.push(route);
        true
    }

    /// Remove an outgoing route. No-op if absent.
    pub(crate) fn remove_route_entry(&mut self, route: &Route) -> bool {
        match self.routes.iter().position(|r| r == route) {
            Some(pos) => {
                self.routes.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Snapshot of the node's plain fields (interface kind `field`) —
    /// a Script node's `field_value_map`.
    pub fn field_value_map(&self) -> IndexMap<Arc<str>, FieldValue> {
        self.ty
            .interfaces()
            .iter()
            .filter(|i| i.kind == InterfaceKind::Field)
            .map(|i| (i.id.clone(), self.fields[&i.id].clone()))
            .collect()
    }

    /// Snapshot of the node's current eventOut values — a Script node's
    /// `eventout_map`.
    pub fn eventout_map(&self) -> IndexMap<Arc<str>, FieldValue> {
        self.eventouts
            .iter()
            .map(|(id, ev)| (id.clone(), ev.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vireo_field::FieldKind;
    use crate::error::VireoError;

    fn material_type() -> Arc<NodeType> {
        let mut ty = NodeType::new("TestMaterial");
        ty.add_exposedfield(FieldKind::SfFloat, "transparency").unwrap();
        ty.add_field(FieldKind::SfBool, "solid").unwrap();
        ty.add_eventout(FieldKind::SfTime, "touch_time").unwrap();
        Arc::new(ty)
    }

    #[test]
    fn fields_start_at_kind_defaults() {
        let node = Node::new(material_type());
        assert_eq!(node.field("transparency").unwrap().as_float(), Some(0.0));
        assert_eq!(node.field("solid").unwrap().as_bool(), Some(false));
        assert_eq!(node.eventout("touch_time").unwrap().as_time(), Some(0.0));
    }

    #[test]
    fn unknown_field_is_unsupported_interface() {
        let node = Node::new(material_type());
        match node.field("shininess") {
            Err(VireoError::UnsupportedInterface { id, .. }) => assert_eq!(id, "shininess"),
            other => panic!("expected UnsupportedInterface, got {other:?}"),
        }
    }

    #[test]
    fn set_field_checks_kind() {
        let mut node = Node::new(material_type());
        let err = node
            .set_field("transparency", &FieldValue::SfDouble(0.5))
            .unwrap_err();
        assert!(matches!(err, VireoError::TypeMismatch { .. }));
    }

    #[test]
    fn exposedfield_write_marks_eventout() {
        let mut node = Node::new(material_type());
        assert!(!node.has_modified_eventouts());
        node.set_field("transparency", &FieldValue::SfFloat(0.25)).unwrap();
        assert!(node.has_modified_eventouts());
        let fired = node.take_modified_eventouts();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0.as_ref(), "transparency");
        assert_eq!(fired[0].1.as_float(), Some(0.25));
        assert!(!node.has_modified_eventouts());
    }

    #[test]
    fn init_field_fires_nothing() {
        let mut node = Node::new(material_type());
        node.init_field("transparency", &FieldValue::SfFloat(0.75)).unwrap();
        assert!(!node.has_modified_eventouts());
        // but the resting eventOut value tracks the field
        assert_eq!(node.eventout("transparency_changed").unwrap().as_float(), Some(0.75));
    }

    #[test]
    fn plain_field_write_fires_nothing() {
        let mut node = Node::new(material_type());
        node.set_field("solid", &FieldValue::SfBool(true)).unwrap();
        assert!(!node.has_modified_eventouts());
    }
}
