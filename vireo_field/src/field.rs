//! The VRML field value model.
//!
//! `FieldValue` is a closed tagged union over the 27 VRML97 field kinds:
//! fourteen single-valued ("SF") kinds and a homogeneous-sequence ("MF")
//! counterpart for each of them except SFImage. A value's kind is fixed at
//! construction; `assign` requires an exact kind match. Single- and
//! double-precision kinds are distinct and never convert implicitly.
//!
//! Node references are arena IDs ([`NodeId`]), not owning pointers. An
//! `SFNode` holding `NodeId::nil()` is VRML `NULL`. Everything else has
//! plain copy-on-assignment value semantics.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use vireo_ids::NodeId;

use crate::basetypes::{Color, Image, Rotation, Vec2d, Vec2f, Vec3d, Vec3f};

/// Errors raised by field value operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Access or assignment across incompatible kinds.
    TypeMismatch {
        expected: FieldKind,
        found: FieldKind,
    },
    /// MF element access outside `[0, len)`.
    IndexOutOfBounds { index: usize, len: usize },
    /// A loader-supplied literal did not have the shape the kind requires.
    Malformed(String),
    /// Allocation failure while growing a sequence.
    OutOfMemory,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::TypeMismatch { expected, found } => {
                write!(f, "field value type mismatch: expected {expected}, found {found}")
            }
            FieldError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for sequence of length {len}")
            }
            FieldError::Malformed(msg) => write!(f, "malformed field literal: {msg}"),
            FieldError::OutOfMemory => write!(f, "out of memory growing field value"),
        }
    }
}

impl std::error::Error for FieldError {}

/// Discriminant identifying which of the VRML field kinds a value holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    SfBool,
    SfColor,
    SfFloat,
    SfDouble,
    SfImage,
    SfInt32,
    SfNode,
    SfRotation,
    SfString,
    SfTime,
    SfVec2f,
    SfVec2d,
    SfVec3f,
    SfVec3d,
    MfBool,
    MfColor,
    MfFloat,
    MfDouble,
    MfInt32,
    MfNode,
    MfRotation,
    MfString,
    MfTime,
    MfVec2f,
    MfVec2d,
    MfVec3f,
    MfVec3d,
}

impl FieldKind {
    /// The VRML spelling of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::SfBool => "SFBool",
            FieldKind::SfColor => "SFColor",
            FieldKind::SfFloat => "SFFloat",
            FieldKind::SfDouble => "SFDouble",
            FieldKind::SfImage => "SFImage",
            FieldKind::SfInt32 => "SFInt32",
            FieldKind::SfNode => "SFNode",
            FieldKind::SfRotation => "SFRotation",
            FieldKind::SfString => "SFString",
            FieldKind::SfTime => "SFTime",
            FieldKind::SfVec2f => "SFVec2f",
            FieldKind::SfVec2d => "SFVec2d",
            FieldKind::SfVec3f => "SFVec3f",
            FieldKind::SfVec3d => "SFVec3d",
            FieldKind::MfBool => "MFBool",
            FieldKind::MfColor => "MFColor",
            FieldKind::MfFloat => "MFFloat",
            FieldKind::MfDouble => "MFDouble",
            FieldKind::MfInt32 => "MFInt32",
            FieldKind::MfNode => "MFNode",
            FieldKind::MfRotation => "MFRotation",
            FieldKind::MfString => "MFString",
            FieldKind::MfTime => "MFTime",
            FieldKind::MfVec2f => "MFVec2f",
            FieldKind::MfVec2d => "MFVec2d",
            FieldKind::MfVec3f => "MFVec3f",
            FieldKind::MfVec3d => "MFVec3d",
        }
    }

    /// Parse a VRML kind name ("SFBool", "MFVec3f", ...).
    pub fn from_name(name: &str) -> Option<FieldKind> {
        Some(match name {
            "SFBool" => FieldKind::SfBool,
            "SFColor" => FieldKind::SfColor,
            "SFFloat" => FieldKind::SfFloat,
            "SFDouble" => FieldKind::SfDouble,
            "SFImage" => FieldKind::SfImage,
            "SFInt32" => FieldKind::SfInt32,
            "SFNode" => FieldKind::SfNode,
            "SFRotation" => FieldKind::SfRotation,
            "SFString" => FieldKind::SfString,
            "SFTime" => FieldKind::SfTime,
            "SFVec2f" => FieldKind::SfVec2f,
            "SFVec2d" => FieldKind::SfVec2d,
            "SFVec3f" => FieldKind::SfVec3f,
            "SFVec3d" => FieldKind::SfVec3d,
            "MFBool" => FieldKind::MfBool,
            "MFColor" => FieldKind::MfColor,
            "MFFloat" => FieldKind::MfFloat,
            "MFDouble" => FieldKind::MfDouble,
            "MFInt32" => FieldKind::MfInt32,
            "MFNode" => FieldKind::MfNode,
            "MFRotation" => FieldKind::MfRotation,
            "MFString" => FieldKind::MfString,
            "MFTime" => FieldKind::MfTime,
            "MFVec2f" => FieldKind::MfVec2f,
            "MFVec2d" => FieldKind::MfVec2d,
            "MFVec3f" => FieldKind::MfVec3f,
            "MFVec3d" => FieldKind::MfVec3d,
            _ => return None,
        })
    }

    #[inline]
    pub const fn is_many(self) -> bool {
        matches!(
            self,
            FieldKind::MfBool
                | FieldKind::MfColor
                | FieldKind::MfFloat
                | FieldKind::MfDouble
                | FieldKind::MfInt32
                | FieldKind::MfNode
                | FieldKind::MfRotation
                | FieldKind::MfString
                | FieldKind::MfTime
                | FieldKind::MfVec2f
                | FieldKind::MfVec2d
                | FieldKind::MfVec3f
                | FieldKind::MfVec3d
        )
    }

    /// The MF counterpart of an SF kind (SFImage has none).
    pub const fn many(self) -> Option<FieldKind> {
        Some(match self {
            FieldKind::SfBool => FieldKind::MfBool,
            FieldKind::SfColor => FieldKind::MfColor,
            FieldKind::SfFloat => FieldKind::MfFloat,
            FieldKind::SfDouble => FieldKind::MfDouble,
            FieldKind::SfInt32 => FieldKind::MfInt32,
            FieldKind::SfNode => FieldKind::MfNode,
            FieldKind::SfRotation => FieldKind::MfRotation,
            FieldKind::SfString => FieldKind::MfString,
            FieldKind::SfTime => FieldKind::MfTime,
            FieldKind::SfVec2f => FieldKind::MfVec2f,
            FieldKind::SfVec2d => FieldKind::MfVec2d,
            FieldKind::SfVec3f => FieldKind::MfVec3f,
            FieldKind::SfVec3d => FieldKind::MfVec3d,
            _ => return None,
        })
    }

    /// The element kind of an MF kind.
    pub const fn one(self) -> Option<FieldKind> {
        Some(match self {
            FieldKind::MfBool => FieldKind::SfBool,
            FieldKind::MfColor => FieldKind::SfColor,
            FieldKind::MfFloat => FieldKind::SfFloat,
            FieldKind::MfDouble => FieldKind::SfDouble,
            FieldKind::MfInt32 => FieldKind::SfInt32,
            FieldKind::MfNode => FieldKind::SfNode,
            FieldKind::MfRotation => FieldKind::SfRotation,
            FieldKind::MfString => FieldKind::SfString,
            FieldKind::MfTime => FieldKind::SfTime,
            FieldKind::MfVec2f => FieldKind::SfVec2f,
            FieldKind::MfVec2d => FieldKind::SfVec2d,
            FieldKind::MfVec3f => FieldKind::SfVec3f,
            FieldKind::MfVec3d => FieldKind::SfVec3d,
            _ => return None,
        })
    }

    /// The default value of this kind (VRML97 field defaults).
    pub fn default_value(self) -> FieldValue {
        match self {
            FieldKind::SfBool => FieldValue::SfBool(false),
            FieldKind::SfColor => FieldValue::SfColor(Color::default()),
            FieldKind::SfFloat => FieldValue::SfFloat(0.0),
            FieldKind::SfDouble => FieldValue::SfDouble(0.0),
            FieldKind::SfImage => FieldValue::SfImage(Image::default()),
            FieldKind::SfInt32 => FieldValue::SfInt32(0),
            FieldKind::SfNode => FieldValue::SfNode(NodeId::nil()),
            FieldKind::SfRotation => FieldValue::SfRotation(Rotation::default()),
            FieldKind::SfString => FieldValue::SfString(Arc::from("")),
            FieldKind::SfTime => FieldValue::SfTime(0.0),
            FieldKind::SfVec2f => FieldValue::SfVec2f(Vec2f::default()),
            FieldKind::SfVec2d => FieldValue::SfVec2d(Vec2d::default()),
            FieldKind::SfVec3f => FieldValue::SfVec3f(Vec3f::default()),
            FieldKind::SfVec3d => FieldValue::SfVec3d(Vec3d::default()),
            FieldKind::MfBool => FieldValue::MfBool(Vec::new()),
            FieldKind::MfColor => FieldValue::MfColor(Vec::new()),
            FieldKind::MfFloat => FieldValue::MfFloat(Vec::new()),
            FieldKind::MfDouble => FieldValue::MfDouble(Vec::new()),
            FieldKind::MfInt32 => FieldValue::MfInt32(Vec::new()),
            FieldKind::MfNode => FieldValue::MfNode(Vec::new()),
            FieldKind::MfRotation => FieldValue::MfRotation(Vec::new()),
            FieldKind::MfString => FieldValue::MfString(Vec::new()),
            FieldKind::MfTime => FieldValue::MfTime(Vec::new()),
            FieldKind::MfVec2f => FieldValue::MfVec2f(Vec::new()),
            FieldKind::MfVec2d => FieldValue::MfVec2d(Vec::new()),
            FieldKind::MfVec3f => FieldValue::MfVec3f(Vec::new()),
            FieldKind::MfVec3d => FieldValue::MfVec3d(Vec::new()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A VRML field value. See the module docs for semantics.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    SfBool(bool),
    SfColor(Color),
    SfFloat(f32),
    SfDouble(f64),
    SfImage(Image),
    SfInt32(i32),
    SfNode(NodeId),
    SfRotation(Rotation),
    SfString(Arc<str>),
    SfTime(f64),
    SfVec2f(Vec2f),
    SfVec2d(Vec2d),
    SfVec3f(Vec3f),
    SfVec3d(Vec3d),
    MfBool(Vec<bool>),
    MfColor(Vec<Color>),
    MfFloat(Vec<f32>),
    MfDouble(Vec<f64>),
    MfInt32(Vec<i32>),
    MfNode(Vec<NodeId>),
    MfRotation(Vec<Rotation>),
    MfString(Vec<Arc<str>>),
    MfTime(Vec<f64>),
    MfVec2f(Vec<Vec2f>),
    MfVec2d(Vec<Vec2d>),
    MfVec3f(Vec<Vec3f>),
    MfVec3d(Vec<Vec3d>),
}

impl FieldValue {
    /// The kind tag of this value.
    pub const fn kind(&self) -> FieldKind {
        match self {
            FieldValue::SfBool(_) => FieldKind::SfBool,
            FieldValue::SfColor(_) => FieldKind::SfColor,
            FieldValue::SfFloat(_) => FieldKind::SfFloat,
            FieldValue::SfDouble(_) => FieldKind::SfDouble,
            FieldValue::SfImage(_) => FieldKind::SfImage,
            FieldValue::SfInt32(_) => FieldKind::SfInt32,
            FieldValue::SfNode(_) => FieldKind::SfNode,
            FieldValue::SfRotation(_) => FieldKind::SfRotation,
            FieldValue::SfString(_) => FieldKind::SfString,
            FieldValue::SfTime(_) => FieldKind::SfTime,
            FieldValue::SfVec2f(_) => FieldKind::SfVec2f,
            FieldValue::SfVec2d(_) => FieldKind::SfVec2d,
            FieldValue::SfVec3f(_) => FieldKind::SfVec3f,
            FieldValue::SfVec3d(_) => FieldKind::SfVec3d,
            FieldValue::MfBool(_) => FieldKind::MfBool,
            FieldValue::MfColor(_) => FieldKind::MfColor,
            FieldValue::MfFloat(_) => FieldKind::MfFloat,
            FieldValue::MfDouble(_) => FieldKind::MfDouble,
            FieldValue::MfInt32(_) => FieldKind::MfInt32,
            FieldValue::MfNode(_) => FieldKind::MfNode,
            FieldValue::MfRotation(_) => FieldKind::MfRotation,
            FieldValue::MfString(_) => FieldKind::MfString,
            FieldValue::MfTime(_) => FieldKind::MfTime,
            FieldValue::MfVec2f(_) => FieldKind::MfVec2f,
            FieldValue::MfVec2d(_) => FieldKind::MfVec2d,
            FieldValue::MfVec3f(_) => FieldKind::MfVec3f,
            FieldValue::MfVec3d(_) => FieldKind::MfVec3d,
        }
    }

    /// Time constructor; `f64` otherwise converts to SFDouble.
    #[inline]
    pub const fn time(seconds: f64) -> Self {
        FieldValue::SfTime(seconds)
    }

    #[inline]
    pub fn string<S: AsRef<str>>(s: S) -> Self {
        FieldValue::SfString(Arc::from(s.as_ref()))
    }

    /// Kind-checked assignment. The kind of `self` never changes.
    pub fn assign(&mut self, other: &FieldValue) -> Result<(), FieldError> {
        if self.kind() != other.kind() {
            return Err(FieldError::TypeMismatch {
                expected: self.kind(),
                found: other.kind(),
            });
        }
        self.clone_from(other);
        Ok(())
    }

    // -------------------- Typed accessors --------------------

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::SfBool(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            FieldValue::SfFloat(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            FieldValue::SfDouble(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int32(&self) -> Option<i32> {
        match *self {
            FieldValue::SfInt32(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_time(&self) -> Option<f64> {
        match *self {
            FieldValue::SfTime(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::SfString(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<NodeId> {
        match *self {
            FieldValue::SfNode(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_color(&self) -> Option<Color> {
        match *self {
            FieldValue::SfColor(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn as_rotation(&self) -> Option<Rotation> {
        match *self {
            FieldValue::SfRotation(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_image(&self) -> Option<&Image> {
        match self {
            FieldValue::SfImage(i) => Some(i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_strings(&self) -> Option<&[Arc<str>]> {
        match self {
            FieldValue::MfString(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_nodes(&self) -> Option<&[NodeId]> {
        match self {
            FieldValue::MfNode(v) => Some(v),
            _ => None,
        }
    }

    // -------------------- Sequence operations --------------------

    /// Element count for MF kinds, `None` for SF kinds.
    pub fn len(&self) -> Option<usize> {
        Some(match self {
            FieldValue::MfBool(v) => v.len(),
            FieldValue::MfColor(v) => v.len(),
            FieldValue::MfFloat(v) => v.len(),
            FieldValue::MfDouble(v) => v.len(),
            FieldValue::MfInt32(v) => v.len(),
            FieldValue::MfNode(v) => v.len(),
            FieldValue::MfRotation(v) => v.len(),
            FieldValue::MfString(v) => v.len(),
            FieldValue::MfTime(v) => v.len(),
            FieldValue::MfVec2f(v) => v.len(),
            FieldValue::MfVec2d(v) => v.len(),
            FieldValue::MfVec3f(v) => v.len(),
            FieldValue::MfVec3d(v) => v.len(),
            _ => return None,
        })
    }

    fn not_a_sequence(&self) -> FieldError {
        FieldError::TypeMismatch {
            expected: self.kind().many().unwrap_or(self.kind()),
            found: self.kind(),
        }
    }

    fn check_index(&self, index: usize) -> Result<usize, FieldError> {
        let len = self.len().ok_or_else(|| self.not_a_sequence())?;
        if index >= len {
            return Err(FieldError::IndexOutOfBounds { index, len });
        }
        Ok(index)
    }

    /// Copy out element `index` of an MF value as the matching SF value.
    pub fn element(&self, index: usize) -> Result<FieldValue, FieldError> {
        let i = self.check_index(index)?;
        Ok(match self {
            FieldValue::MfBool(v) => FieldValue::SfBool(v[i]),
            FieldValue::MfColor(v) => FieldValue::SfColor(v[i]),
            FieldValue::MfFloat(v) => FieldValue::SfFloat(v[i]),
            FieldValue::MfDouble(v) => FieldValue::SfDouble(v[i]),
            FieldValue::MfInt32(v) => FieldValue::SfInt32(v[i]),
            FieldValue::MfNode(v) => FieldValue::SfNode(v[i]),
            FieldValue::MfRotation(v) => FieldValue::SfRotation(v[i]),
            FieldValue::MfString(v) => FieldValue::SfString(v[i].clone()),
            FieldValue::MfTime(v) => FieldValue::SfTime(v[i]),
            FieldValue::MfVec2f(v) => FieldValue::SfVec2f(v[i]),
            FieldValue::MfVec2d(v) => FieldValue::SfVec2d(v[i]),
            FieldValue::MfVec3f(v) => FieldValue::SfVec3f(v[i]),
            FieldValue::MfVec3d(v) => FieldValue::SfVec3d(v[i]),
            _ => unreachable!("check_index admits MF kinds only"),
        })
    }

    /// Overwrite element `index` of an MF value with a matching SF value.
    pub fn set_element(&mut self, index: usize, value: &FieldValue) -> Result<(), FieldError> {
        let elem_kind = self.kind().one().ok_or_else(|| self.not_a_sequence())?;
        if value.kind() != elem_kind {
            return Err(FieldError::TypeMismatch {
                expected: elem_kind,
                found: value.kind(),
            });
        }
        let i = self.check_index(index)?;
        match (self, value) {
            (FieldValue::MfBool(v), FieldValue::SfBool(e)) => v[i] = *e,
            (FieldValue::MfColor(v), FieldValue::SfColor(e)) => v[i] = *e,
            (FieldValue::MfFloat(v), FieldValue::SfFloat(e)) => v[i] = *e,
            (FieldValue::MfDouble(v), FieldValue::SfDouble(e)) => v[i] = *e,
            (FieldValue::MfInt32(v), FieldValue::SfInt32(e)) => v[i] = *e,
            (FieldValue::MfNode(v), FieldValue::SfNode(e)) => v[i] = *e,
            (FieldValue::MfRotation(v), FieldValue::SfRotation(e)) => v[i] = *e,
            (FieldValue::MfString(v), FieldValue::SfString(e)) => v[i] = e.clone(),
            (FieldValue::MfTime(v), FieldValue::SfTime(e)) => v[i] = *e,
            (FieldValue::MfVec2f(v), FieldValue::SfVec2f(e)) => v[i] = *e,
            (FieldValue::MfVec2d(v), FieldValue::SfVec2d(e)) => v[i] = *e,
            (FieldValue::MfVec3f(v), FieldValue::SfVec3f(e)) => v[i] = *e,
            (FieldValue::MfVec3d(v), FieldValue::SfVec3d(e)) => v[i] = *e,
            _ => unreachable!("element kind checked above"),
        }
        Ok(())
    }

    /// Append a matching SF value to an MF value. Allocation failure is
    /// reported as [`FieldError::OutOfMemory`].
    pub fn push(&mut self, value: &FieldValue) -> Result<(), FieldError> {
        let elem_kind = self.kind().one().ok_or_else(|| self.not_a_sequence())?;
        if value.kind() != elem_kind {
            return Err(FieldError::TypeMismatch {
                expected: elem_kind,
                found: value.kind(),
            });
        }
        fn grow<T: Clone>(v: &mut Vec<T>, e: &T) -> Result<(), FieldError> {
            v.try_reserve(1).map_err(|_| FieldError::OutOfMemory)?;
            v.push(e.clone());
            Ok(())
        }
        match (self, value) {
            (FieldValue::MfBool(v), FieldValue::SfBool(e)) => grow(v, e),
            (FieldValue::MfColor(v), FieldValue::SfColor(e)) => grow(v, e),
            (FieldValue::MfFloat(v), FieldValue::SfFloat(e)) => grow(v, e),
            (FieldValue::MfDouble(v), FieldValue::SfDouble(e)) => grow(v, e),
            (FieldValue::MfInt32(v), FieldValue::SfInt32(e)) => grow(v, e),
            (FieldValue::MfNode(v), FieldValue::SfNode(e)) => grow(v, e),
            (FieldValue::MfRotation(v), FieldValue::SfRotation(e)) => grow(v, e),
            (FieldValue::MfString(v), FieldValue::SfString(e)) => grow(v, e),
            (FieldValue::MfTime(v), FieldValue::SfTime(e)) => grow(v, e),
            (FieldValue::MfVec2f(v), FieldValue::SfVec2f(e)) => grow(v, e),
            (FieldValue::MfVec2d(v), FieldValue::SfVec2d(e)) => grow(v, e),
            (FieldValue::MfVec3f(v), FieldValue::SfVec3f(e)) => grow(v, e),
            (FieldValue::MfVec3d(v), FieldValue::SfVec3d(e)) => grow(v, e),
            _ => unreachable!("element kind checked above"),
        }
    }
}

// -------------------- From impls --------------------

impl From<bool> for FieldValue {
    #[inline]
    fn from(v: bool) -> Self {
        FieldValue::SfBool(v)
    }
}

impl From<f32> for FieldValue {
    #[inline]
    fn from(v: f32) -> Self {
        FieldValue::SfFloat(v)
    }
}

impl From<f64> for FieldValue {
    #[inline]
    fn from(v: f64) -> Self {
        FieldValue::SfDouble(v)
    }
}

impl From<i32> for FieldValue {
    #[inline]
    fn from(v: i32) -> Self {
        FieldValue::SfInt32(v)
    }
}

impl From<&str> for FieldValue {
    #[inline]
    fn from(v: &str) -> Self {
        FieldValue::SfString(Arc::from(v))
    }
}

impl From<String> for FieldValue {
    #[inline]
    fn from(v: String) -> Self {
        FieldValue::SfString(Arc::from(v.as_str()))
    }
}

impl From<NodeId> for FieldValue {
    #[inline]
    fn from(v: NodeId) -> Self {
        FieldValue::SfNode(v)
    }
}

impl From<Color> for FieldValue {
    #[inline]
    fn from(v: Color) -> Self {
        FieldValue::SfColor(v)
    }
}

impl From<Rotation> for FieldValue {
    #[inline]
    fn from(v: Rotation) -> Self {
        FieldValue::SfRotation(v)
    }
}

impl From<Vec2f> for FieldValue {
    #[inline]
    fn from(v: Vec2f) -> Self {
        FieldValue::SfVec2f(v)
    }
}

impl From<Vec3f> for FieldValue {
    #[inline]
    fn from(v: Vec3f) -> Self {
        FieldValue::SfVec3f(v)
    }
}

impl From<Vec<f32>> for FieldValue {
    #[inline]
    fn from(v: Vec<f32>) -> Self {
        FieldValue::MfFloat(v)
    }
}

impl From<Vec<i32>> for FieldValue {
    #[inline]
    fn from(v: Vec<i32>) -> Self {
        FieldValue::MfInt32(v)
    }
}

impl From<Vec<NodeId>> for FieldValue {
    #[inline]
    fn from(v: Vec<NodeId>) -> Self {
        FieldValue::MfNode(v)
    }
}

impl From<Vec<String>> for FieldValue {
    #[inline]
    fn from(v: Vec<String>) -> Self {
        FieldValue::MfString(v.into_iter().map(|s| Arc::from(s.as_str())).collect())
    }
}

// -------------------- Display --------------------

fn write_seq<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::SfBool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            FieldValue::SfColor(v) => write!(f, "{v}"),
            FieldValue::SfFloat(v) => write!(f, "{v}"),
            FieldValue::SfDouble(v) => write!(f, "{v}"),
            FieldValue::SfImage(v) => {
                write!(f, "{} {} {} <{} bytes>", v.width, v.height, v.components, v.pixels.len())
            }
            FieldValue::SfInt32(v) => write!(f, "{v}"),
            FieldValue::SfNode(v) => {
                if v.is_nil() {
                    write!(f, "NULL")
                } else {
                    write!(f, "{v}")
                }
            }
            FieldValue::SfRotation(v) => write!(f, "{} {} {} {}", v.x, v.y, v.z, v.angle),
            FieldValue::SfString(v) => write!(f, "{:?}", v.as_ref()),
            FieldValue::SfTime(v) => write!(f, "{v}"),
            FieldValue::SfVec2f(v) => write!(f, "{} {}", v.x, v.y),
            FieldValue::SfVec2d(v) => write!(f, "{} {}", v.x, v.y),
            FieldValue::SfVec3f(v) => write!(f, "{} {} {}", v.x, v.y, v.z),
            FieldValue::SfVec3d(v) => write!(f, "{} {} {}", v.x, v.y, v.z),
            FieldValue::MfBool(v) => {
                let items: Vec<&str> =
                    v.iter().map(|b| if *b { "TRUE" } else { "FALSE" }).collect();
                write_seq(f, &items)
            }
            FieldValue::MfColor(v) => write_seq(f, v),
            FieldValue::MfFloat(v) => write_seq(f, v),
            FieldValue::MfDouble(v) => write_seq(f, v),
            FieldValue::MfInt32(v) => write_seq(f, v),
            FieldValue::MfNode(v) => write_seq(f, v),
            FieldValue::MfRotation(v) => {
                write!(f, "[")?;
                for (i, r) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {} {} {}", r.x, r.y, r.z, r.angle)?;
                }
                write!(f, "]")
            }
            FieldValue::MfString(v) => {
                write!(f, "[")?;
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", s.as_ref())?;
                }
                write!(f, "]")
            }
            FieldValue::MfTime(v) => write_seq(f, v),
            FieldValue::MfVec2f(v) => {
                write!(f, "[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", e.x, e.y)?;
                }
                write!(f, "]")
            }
            FieldValue::MfVec2d(v) => {
                write!(f, "[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", e.x, e.y)?;
                }
                write!(f, "]")
            }
            FieldValue::MfVec3f(v) => {
                write!(f, "[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {} {}", e.x, e.y, e.z)?;
                }
                write!(f, "]")
            }
            FieldValue::MfVec3d(v) => {
                write!(f, "[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {} {}", e.x, e.y, e.z)?;
                }
                write!(f, "]")
            }
        }
    }
}

// -------------------- JSON conversion (loader boundary) --------------------

fn json_f64(v: &JsonValue, what: &str) -> Result<f64, FieldError> {
    v.as_f64()
        .ok_or_else(|| FieldError::Malformed(format!("expected number for {what}, got {v}")))
}

fn json_f32(v: &JsonValue, what: &str) -> Result<f32, FieldError> {
    json_f64(v, what).map(|n| n as f32)
}

fn json_array<'a>(v: &'a JsonValue, what: &str) -> Result<&'a [JsonValue], FieldError> {
    v.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| FieldError::Malformed(format!("expected array for {what}, got {v}")))
}

fn json_tuple<'a, const N: usize>(
    v: &'a JsonValue,
    what: &str,
) -> Result<&'a [JsonValue], FieldError> {
    let items = json_array(v, what)?;
    if items.len() != N {
        return Err(FieldError::Malformed(format!(
            "expected {N} components for {what}, got {}",
            items.len()
        )));
    }
    Ok(items)
}

fn float_to_json(v: f64) -> JsonValue {
    JsonNumber::from_f64(v).map_or(JsonValue::Null, JsonValue::Number)
}

impl FieldValue {
    /// Build a field value of an explicit kind from loader-supplied JSON.
    ///
    /// The kind is never inferred from the JSON shape: a bare number becomes
    /// an SFFloat only when the declaration says SFFloat, and becomes an
    /// SFDouble only when it says SFDouble.
    pub fn from_json(kind: FieldKind, value: &JsonValue) -> Result<FieldValue, FieldError> {
        let parse_one = |v: &JsonValue| -> Result<FieldValue, FieldError> {
            match kind.one().unwrap_or(kind) {
                FieldKind::SfBool => v
                    .as_bool()
                    .map(FieldValue::SfBool)
                    .ok_or_else(|| FieldError::Malformed(format!("expected bool, got {v}"))),
                FieldKind::SfColor => {
                    let c = json_tuple::<3>(v, "SFColor")?;
                    Ok(FieldValue::SfColor(Color::new(
                        json_f32(&c[0], "SFColor.r")?,
                        json_f32(&c[1], "SFColor.g")?,
                        json_f32(&c[2], "SFColor.b")?,
                    )))
                }
                FieldKind::SfFloat => Ok(FieldValue::SfFloat(json_f32(v, "SFFloat")?)),
                FieldKind::SfDouble => Ok(FieldValue::SfDouble(json_f64(v, "SFDouble")?)),
                FieldKind::SfImage => {
                    let obj = v.as_object().ok_or_else(|| {
                        FieldError::Malformed(format!("expected object for SFImage, got {v}"))
                    })?;
                    let dim = |key: &str| -> Result<u32, FieldError> {
                        obj.get(key)
                            .and_then(JsonValue::as_u64)
                            .map(|n| n as u32)
                            .ok_or_else(|| {
                                FieldError::Malformed(format!("SFImage missing \"{key}\""))
                            })
                    };
                    let pixels = obj
                        .get("pixels")
                        .and_then(JsonValue::as_array)
                        .ok_or_else(|| FieldError::Malformed("SFImage missing \"pixels\"".into()))?
                        .iter()
                        .map(|b| {
                            b.as_u64().map(|n| n as u8).ok_or_else(|| {
                                FieldError::Malformed(format!("bad SFImage pixel byte {b}"))
                            })
                        })
                        .collect::<Result<Vec<u8>, FieldError>>()?;
                    let (width, height, components) =
                        (dim("width")?, dim("height")?, dim("components")?);
                    if pixels.len() as u64 != width as u64 * height as u64 * components as u64 {
                        return Err(FieldError::Malformed(
                            "SFImage pixel buffer does not match dimensions".into(),
                        ));
                    }
                    Ok(FieldValue::SfImage(Image::new(width, height, components, pixels)))
                }
                FieldKind::SfInt32 => v
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .map(FieldValue::SfInt32)
                    .ok_or_else(|| FieldError::Malformed(format!("expected int32, got {v}"))),
                FieldKind::SfNode => match v {
                    JsonValue::Null => Ok(FieldValue::SfNode(NodeId::nil())),
                    JsonValue::Number(n) => n
                        .as_u64()
                        .map(|raw| FieldValue::SfNode(NodeId::from_u64(raw)))
                        .ok_or_else(|| FieldError::Malformed(format!("bad node id {n}"))),
                    _ => Err(FieldError::Malformed(format!(
                        "expected null or node id for SFNode, got {v}"
                    ))),
                },
                FieldKind::SfRotation => {
                    let r = json_tuple::<4>(v, "SFRotation")?;
                    Ok(FieldValue::SfRotation(Rotation::new(
                        json_f32(&r[0], "SFRotation.x")?,
                        json_f32(&r[1], "SFRotation.y")?,
                        json_f32(&r[2], "SFRotation.z")?,
                        json_f32(&r[3], "SFRotation.angle")?,
                    )))
                }
                FieldKind::SfString => v
                    .as_str()
                    .map(FieldValue::string)
                    .ok_or_else(|| FieldError::Malformed(format!("expected string, got {v}"))),
                FieldKind::SfTime => Ok(FieldValue::SfTime(json_f64(v, "SFTime")?)),
                FieldKind::SfVec2f => {
                    let e = json_tuple::<2>(v, "SFVec2f")?;
                    Ok(FieldValue::SfVec2f(Vec2f::new(
                        json_f32(&e[0], "SFVec2f.x")?,
                        json_f32(&e[1], "SFVec2f.y")?,
                    )))
                }
                FieldKind::SfVec2d => {
                    let e = json_tuple::<2>(v, "SFVec2d")?;
                    Ok(FieldValue::SfVec2d(Vec2d::new(
                        json_f64(&e[0], "SFVec2d.x")?,
                        json_f64(&e[1], "SFVec2d.y")?,
                    )))
                }
                FieldKind::SfVec3f => {
                    let e = json_tuple::<3>(v, "SFVec3f")?;
                    Ok(FieldValue::SfVec3f(Vec3f::new(
                        json_f32(&e[0], "SFVec3f.x")?,
                        json_f32(&e[1], "SFVec3f.y")?,
                        json_f32(&e[2], "SFVec3f.z")?,
                    )))
                }
                FieldKind::SfVec3d => {
                    let e = json_tuple::<3>(v, "SFVec3d")?;
                    Ok(FieldValue::SfVec3d(Vec3d::new(
                        json_f64(&e[0], "SFVec3d.x")?,
                        json_f64(&e[1], "SFVec3d.y")?,
                        json_f64(&e[2], "SFVec3d.z")?,
                    )))
                }
                mf => unreachable!("kind.one() never yields {mf}"),
            }
        };

        if !kind.is_many() {
            return parse_one(value);
        }

        let items = json_array(value, kind.name())?;
        let mut out = kind.default_value();
        for item in items {
            let element = parse_one(item)?;
            out.push(&element)?;
        }
        Ok(out)
    }

    /// Render this value to JSON with the same shapes `from_json` accepts.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::SfBool(v) => JsonValue::Bool(*v),
            FieldValue::SfColor(v) => JsonValue::Array(vec![
                float_to_json(v.r as f64),
                float_to_json(v.g as f64),
                float_to_json(v.b as f64),
            ]),
            FieldValue::SfFloat(v) => float_to_json(*v as f64),
            FieldValue::SfDouble(v) => float_to_json(*v),
            FieldValue::SfImage(v) => {
                let mut map = JsonMap::new();
                map.insert("width".to_string(), JsonValue::Number(v.width.into()));
                map.insert("height".to_string(), JsonValue::Number(v.height.into()));
                map.insert(
                    "components".to_string(),
                    JsonValue::Number(v.components.into()),
                );
                map.insert(
                    "pixels".to_string(),
                    JsonValue::Array(
                        v.pixels
                            .iter()
                            .map(|b| JsonValue::Number((*b).into()))
                            .collect(),
                    ),
                );
                JsonValue::Object(map)
            }
            FieldValue::SfInt32(v) => JsonValue::Number((*v).into()),
            FieldValue::SfNode(v) => {
                if v.is_nil() {
                    JsonValue::Null
                } else {
                    JsonValue::Number(v.as_u64().into())
                }
            }
            FieldValue::SfRotation(v) => JsonValue::Array(vec![
                float_to_json(v.x as f64),
                float_to_json(v.y as f64),
                float_to_json(v.z as f64),
                float_to_json(v.angle as f64),
            ]),
            FieldValue::SfString(v) => JsonValue::String(v.as_ref().to_string()),
            FieldValue::SfTime(v) => float_to_json(*v),
            FieldValue::SfVec2f(v) => {
                JsonValue::Array(vec![float_to_json(v.x as f64), float_to_json(v.y as f64)])
            }
            FieldValue::SfVec2d(v) => {
                JsonValue::Array(vec![float_to_json(v.x), float_to_json(v.y)])
            }
            FieldValue::SfVec3f(v) => JsonValue::Array(vec![
                float_to_json(v.x as f64),
                float_to_json(v.y as f64),
                float_to_json(v.z as f64),
            ]),
            FieldValue::SfVec3d(v) => JsonValue::Array(vec![
                float_to_json(v.x),
                float_to_json(v.y),
                float_to_json(v.z),
            ]),
            mf => {
                let len = mf.len().unwrap_or(0);
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    // element() cannot fail inside [0, len)
                    if let Ok(e) = mf.element(i) {
                        items.push(e.to_json());
                    }
                }
                JsonValue::Array(items)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clone_preserves_kind_and_value() {
        let values = [
            FieldValue::SfBool(true),
            FieldValue::SfColor(Color::new(0.5, 0.25, 1.0)),
            FieldValue::SfFloat(3.5),
            FieldValue::SfDouble(2.25),
            FieldValue::SfInt32(-7),
            FieldValue::SfNode(NodeId::from_parts(4, 1)),
            FieldValue::SfRotation(Rotation::new(0.0, 1.0, 0.0, 1.5)),
            FieldValue::string("hello"),
            FieldValue::time(12.0),
            FieldValue::SfVec3f(Vec3f::new(1.0, 2.0, 3.0)),
            FieldValue::MfFloat(vec![1.0, 2.0]),
            FieldValue::MfString(vec![Arc::from("a"), Arc::from("b")]),
        ];
        for v in &values {
            let c = v.clone();
            assert_eq!(c.kind(), v.kind());
            assert_eq!(&c, v);
        }
    }

    #[test]
    fn assign_requires_exact_kind() {
        let mut target = FieldValue::SfFloat(1.0);
        assert!(target.assign(&FieldValue::SfFloat(2.0)).is_ok());
        assert_eq!(target.as_float(), Some(2.0));

        // Single and double precision are distinct kinds.
        let err = target.assign(&FieldValue::SfDouble(2.0)).unwrap_err();
        assert_eq!(
            err,
            FieldError::TypeMismatch {
                expected: FieldKind::SfFloat,
                found: FieldKind::SfDouble,
            }
        );

        // SF and MF are distinct kinds too.
        let err = target.assign(&FieldValue::MfFloat(vec![2.0])).unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { .. }));
    }

    #[test]
    fn default_values_match_kind() {
        for name in ["SFBool", "SFNode", "SFRotation", "MFVec3f", "MFNode"] {
            let kind = FieldKind::from_name(name).unwrap();
            assert_eq!(kind.default_value().kind(), kind);
            assert_eq!(kind.name(), name);
        }
        assert_eq!(
            FieldKind::SfNode.default_value().as_node(),
            Some(NodeId::nil())
        );
    }

    #[test]
    fn element_access_is_bounds_checked() {
        let v = FieldValue::MfInt32(vec![10, 20, 30]);
        assert_eq!(v.element(2).unwrap(), FieldValue::SfInt32(30));
        assert_eq!(
            v.element(3).unwrap_err(),
            FieldError::IndexOutOfBounds { index: 3, len: 3 }
        );

        let sf = FieldValue::SfInt32(1);
        assert!(matches!(
            sf.element(0).unwrap_err(),
            FieldError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn set_element_checks_element_kind() {
        let mut v = FieldValue::MfFloat(vec![1.0, 2.0]);
        v.set_element(1, &FieldValue::SfFloat(5.0)).unwrap();
        assert_eq!(v, FieldValue::MfFloat(vec![1.0, 5.0]));
        assert!(v.set_element(0, &FieldValue::SfDouble(5.0)).is_err());
        assert!(v.set_element(9, &FieldValue::SfFloat(5.0)).is_err());
    }

    #[test]
    fn push_appends_matching_elements() {
        let mut v = FieldKind::MfString.default_value();
        v.push(&FieldValue::string("x")).unwrap();
        v.push(&FieldValue::string("y")).unwrap();
        assert_eq!(v.len(), Some(2));
        assert!(v.push(&FieldValue::SfBool(true)).is_err());
    }

    #[test]
    fn json_respects_declared_kind() {
        // The same literal lands on different kinds depending on declaration.
        let f = FieldValue::from_json(FieldKind::SfFloat, &json!(1.5)).unwrap();
        let d = FieldValue::from_json(FieldKind::SfDouble, &json!(1.5)).unwrap();
        let t = FieldValue::from_json(FieldKind::SfTime, &json!(1.5)).unwrap();
        assert_eq!(f.kind(), FieldKind::SfFloat);
        assert_eq!(d.kind(), FieldKind::SfDouble);
        assert_eq!(t.kind(), FieldKind::SfTime);

        let v = FieldValue::from_json(FieldKind::SfVec3f, &json!([1, 2, 3])).unwrap();
        assert_eq!(v, FieldValue::SfVec3f(Vec3f::new(1.0, 2.0, 3.0)));

        let m = FieldValue::from_json(FieldKind::MfColor, &json!([[1, 0, 0], [0, 1, 0]])).unwrap();
        assert_eq!(m.len(), Some(2));
        assert_eq!(m.element(1).unwrap().as_color(), Some(Color::new(0.0, 1.0, 0.0)));

        assert!(FieldValue::from_json(FieldKind::SfVec3f, &json!([1, 2])).is_err());
        assert!(FieldValue::from_json(FieldKind::SfBool, &json!(1)).is_err());
    }

    #[test]
    fn json_round_trips_node_null() {
        let null_node = FieldValue::from_json(FieldKind::SfNode, &JsonValue::Null).unwrap();
        assert_eq!(null_node, FieldValue::SfNode(NodeId::nil()));
        assert_eq!(null_node.to_json(), JsonValue::Null);
    }

    #[test]
    fn display_uses_vrml_spellings() {
        assert_eq!(FieldValue::SfBool(true).to_string(), "TRUE");
        assert_eq!(FieldValue::SfNode(NodeId::nil()).to_string(), "NULL");
        assert_eq!(
            FieldValue::SfVec3f(Vec3f::new(1.0, 2.0, 3.0)).to_string(),
            "1 2 3"
        );
        assert_eq!(
            FieldValue::MfInt32(vec![1, 2]).to_string(),
            "[1, 2]"
        );
    }
}
