//! Routes: directed, kind-checked edges from an eventOut to an eventIn.
//!
//! A route is stored on its *source* node, so fan-out during event delivery
//! is a scan of that node's route list. Identifiers are canonicalized at
//! add time (exposedField spellings collapse to the declared identifier),
//! which is what makes `add_route` idempotence and `delete_route` matching
//! work across the `set_foo` / `foo` / `foo_changed` spellings.
//!
//! Validation (does the eventOut exist, does the eventIn exist, do the
//! kinds match) happens in [`Scene::add_route`](crate::scene::Scene::add_route),
//! which is the only constructor of live routes.

use std::sync::Arc;

use vireo_ids::NodeId;

/// A directed edge from `eventout` on the owning node to `eventin` on
/// `to_node`. Both identifiers are canonical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub eventout: Arc<str>,
    pub to_node: NodeId,
    pub eventin: Arc<str>,
}

impl Route {
    pub fn new(eventout: Arc<str>, to_node: NodeId, eventin: Arc<str>) -> Self {
        Self {
            eventout,
            to_node,
            eventin,
        }
    }
}
