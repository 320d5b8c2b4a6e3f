//! Event-propagation core of a VRML-style scene runtime.
//!
//! The pieces: typed nodes in a generational arena ([`NodeArena`]), routes
//! from eventOuts to eventIns, a timestamp-ordered event queue, and a
//! dispatcher ([`Scene::update`]) that drains cascades to quiescence.
//! Script nodes bridge to an embedded language through the [`Script`] and
//! [`ScriptFactory`] traits.

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod interface;
pub mod node;
pub mod node_arena;
pub mod route;
pub mod scene;
pub mod script;

pub use error::{Result, VireoError};
pub use event::{Event, EventQueue, MAX_EVENTS};
pub use interface::{InterfaceKind, NodeInterface, NodeType};
pub use node::{EventOut, Node};
pub use node_arena::NodeArena;
pub use route::Route;
pub use scene::{LoadRequest, Scene};
pub use script::{script_node_type, Script, ScriptEnv, ScriptFactory};

pub use vireo_field::{FieldError, FieldKind, FieldValue};
pub use vireo_ids::NodeId;
