//! Node type descriptors: the interface set a node exposes.
//!
//! A [`NodeType`] is the list of (direction, field kind, identifier)
//! declarations for a class of nodes. Types are built by the scene loader
//! (or by Script node construction) and shared via `Arc`.
//!
//! VRML exposedField naming: an exposedField `foo` is simultaneously a
//! field, the eventIn `set_foo`, and the eventOut `foo_changed`. Lookups
//! here accept all three spellings (and the bare `foo`) and resolve to the
//! one declared interface, so routes and events always operate on canonical
//! identifiers.

use std::fmt;
use std::sync::Arc;

use vireo_field::FieldKind;

use crate::error::{Result, VireoError};

/// The direction/role of a declared interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    EventIn,
    EventOut,
    ExposedField,
    Field,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterfaceKind::EventIn => "eventIn",
            InterfaceKind::EventOut => "eventOut",
            InterfaceKind::ExposedField => "exposedField",
            InterfaceKind::Field => "field",
        })
    }
}

/// One declared interface of a node type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInterface {
    pub kind: InterfaceKind,
    pub field_kind: FieldKind,
    pub id: Arc<str>,
}

/// A node type: name plus interface set.
#[derive(Clone, Debug)]
pub struct NodeType {
    name: Arc<str>,
    interfaces: Vec<NodeInterface>,
}

fn eventin_base(id: &str) -> &str {
    id.strip_prefix("set_").unwrap_or(id)
}

fn eventout_base(id: &str) -> &str {
    id.strip_suffix("_changed").unwrap_or(id)
}

impl NodeType {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            interfaces: Vec::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn interfaces(&self) -> &[NodeInterface] {
        &self.interfaces
    }

    fn add_interface(
        &mut self,
        kind: InterfaceKind,
        field_kind: FieldKind,
        id: &str,
    ) -> Result<()> {
        // Identifiers must be unique across all spellings: an exposedField
        // "foo" excludes a separate eventIn "set_foo" and eventOut
        // "foo_changed", and vice versa.
        let base = eventout_base(eventin_base(id));
        let collides = self.interfaces.iter().any(|i| {
            i.id.as_ref() == id || eventout_base(eventin_base(&i.id)) == base
        });
        if collides {
            return Err(VireoError::DuplicateInterface {
                node_type: self.name.clone(),
                id: id.to_string(),
            });
        }
        self.interfaces.push(NodeInterface {
            kind,
            field_kind,
            id: Arc::from(id),
        });
        Ok(())
    }

    /// Add an interface of any kind.
    pub fn add(&mut self, kind: InterfaceKind, field_kind: FieldKind, id: &str) -> Result<()> {
        self.add_interface(kind, field_kind, id)
    }

    pub fn add_eventin(&mut self, field_kind: FieldKind, id: &str) -> Result<()> {
        self.add_interface(InterfaceKind::EventIn, field_kind, id)
    }

    pub fn add_eventout(&mut self, field_kind: FieldKind, id: &str) -> Result<()> {
        self.add_interface(InterfaceKind::EventOut, field_kind, id)
    }

    pub fn add_exposedfield(&mut self, field_kind: FieldKind, id: &str) -> Result<()> {
        self.add_interface(InterfaceKind::ExposedField, field_kind, id)
    }

    pub fn add_field(&mut self, field_kind: FieldKind, id: &str) -> Result<()> {
        self.add_interface(InterfaceKind::Field, field_kind, id)
    }

    /// Resolve `id` as an eventIn. Accepts a declared eventIn identifier or
    /// an exposedField identifier with or without the `set_` prefix.
    pub fn find_eventin(&self, id: &str) -> Option<&NodeInterface> {
        self.interfaces.iter().find(|i| match i.kind {
            InterfaceKind::EventIn => {
                i.id.as_ref() == id
                    || eventin_base(id) == i.id.as_ref()
                    || eventin_base(&i.id) == id
            }
            InterfaceKind::ExposedField => eventin_base(id) == i.id.as_ref(),
            _ => false,
        })
    }

    /// Resolve `id` as an eventOut. Accepts a declared eventOut identifier
    /// or an exposedField identifier with or without the `_changed` suffix.
    pub fn find_eventout(&self, id: &str) -> Option<&NodeInterface> {
        self.interfaces.iter().find(|i| match i.kind {
            InterfaceKind::EventOut => {
                i.id.as_ref() == id
                    || eventout_base(id) == i.id.as_ref()
                    || eventout_base(&i.id) == id
            }
            InterfaceKind::ExposedField => eventout_base(id) == i.id.as_ref(),
            _ => false,
        })
    }

    /// Resolve `id` as a readable/writable field (field or exposedField).
    pub fn find_field(&self, id: &str) -> Option<&NodeInterface> {
        self.interfaces.iter().find(|i| {
            matches!(i.kind, InterfaceKind::Field | InterfaceKind::ExposedField)
                && i.id.as_ref() == id
        })
    }

    pub(crate) fn unsupported(&self, interface: InterfaceKind, id: &str) -> VireoError {
        VireoError::UnsupportedInterface {
            node_type: self.name.clone(),
            interface,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_type() -> NodeType {
        let mut ty = NodeType::new("TestSensor");
        ty.add_eventin(FieldKind::SfBool, "set_enabled_flag").unwrap();
        ty.add_eventout(FieldKind::SfTime, "fraction").unwrap();
        ty.add_exposedfield(FieldKind::SfFloat, "gain").unwrap();
        ty.add_field(FieldKind::SfInt32, "order").unwrap();
        ty
    }

    #[test]
    fn exposedfield_answers_all_spellings() {
        let ty = sensor_type();
        assert_eq!(ty.find_eventin("gain").unwrap().id.as_ref(), "gain");
        assert_eq!(ty.find_eventin("set_gain").unwrap().id.as_ref(), "gain");
        assert_eq!(ty.find_eventout("gain").unwrap().id.as_ref(), "gain");
        assert_eq!(ty.find_eventout("gain_changed").unwrap().id.as_ref(), "gain");
        assert!(ty.find_field("gain").is_some());
    }

    #[test]
    fn plain_interfaces_resolve_by_role() {
        let ty = sensor_type();
        assert!(ty.find_eventin("set_enabled_flag").is_some());
        assert!(ty.find_eventout("set_enabled_flag").is_none());
        assert!(ty.find_eventout("fraction").is_some());
        assert!(ty.find_eventin("fraction").is_none());
        // plain fields take no part in events
        assert!(ty.find_eventin("order").is_none());
        assert!(ty.find_eventout("order").is_none());
        assert!(ty.find_field("order").is_some());
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let mut ty = sensor_type();
        assert!(ty.add_field(FieldKind::SfBool, "gain").is_err());
        // "set_gain" collides with the exposedField "gain" spelling
        assert!(ty.add_eventin(FieldKind::SfFloat, "set_gain").is_err());
    }
}
