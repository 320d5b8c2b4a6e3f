//! Small value types shared by the VRML field model.
//!
//! Single- and double-precision vectors are distinct types on purpose: the
//! VRML field kinds SFVec3f and SFVec3d are *different* kinds and must never
//! be silently widened or narrowed into each other.

use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2d {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Vec2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Vec3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Vec3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Axis-angle rotation (SFRotation). Axis is not normalized on construction;
/// that is the writer's responsibility, per VRML97.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
}

impl Rotation {
    pub const fn new(x: f32, y: f32, z: f32, angle: f32) -> Self {
        Self { x, y, z, angle }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        // VRML default: rotation about +Z by 0 radians.
        Self::new(0.0, 0.0, 1.0, 0.0)
    }
}

/// RGB color with components in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.r, self.g, self.b)
    }
}

/// SFImage pixel data: width x height pixels of `components` bytes each,
/// row-major from bottom-left as VRML specifies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, components: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len() as u64,
            width as u64 * height as u64 * components as u64,
            "pixel buffer size must be width * height * components"
        );
        Self {
            width,
            height,
            components,
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_default_is_positive_z_zero_angle() {
        let r = Rotation::default();
        assert_eq!((r.x, r.y, r.z, r.angle), (0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn image_holds_dimensions() {
        let img = Image::new(2, 2, 1, vec![0, 1, 2, 3]);
        assert_eq!(img.pixels.len(), 4);
        assert_eq!(img.components, 1);
    }
}
