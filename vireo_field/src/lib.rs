//! VRML field values: the closed set of 27 field kinds, their tagged-union
//! value type, and the JSON conversion used at the scene-loader boundary.

#![forbid(unsafe_code)]

pub mod basetypes;
pub mod field;

pub use basetypes::*;
pub use field::*;
