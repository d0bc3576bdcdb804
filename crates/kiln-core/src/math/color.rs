// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the `LinearRgba` color type used by clear values and text runs.

/// A color in **linear RGBA** space with `f32` components.
///
/// `#[repr(C)]` keeps the layout stable so clear colors can be handed to the
/// backend as raw floats.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Default,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(C)]
pub struct LinearRgba {
    /// The red component in linear space.
    pub r: f32,
    /// The green component in linear space.
    pub g: f32,
    /// The blue component in linear space.
    pub b: f32,
    /// The alpha (opacity) component.
    pub a: f32,
}

impl LinearRgba {
    /// Opaque red (`[1.0, 0.0, 0.0, 1.0]`).
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    /// Opaque green (`[0.0, 1.0, 0.0, 1.0]`).
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    /// Opaque blue (`[0.0, 0.0, 1.0, 1.0]`).
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    /// Opaque white (`[1.0, 1.0, 1.0, 1.0]`).
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black (`[0.0, 0.0, 0.0, 1.0]`).
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a new `LinearRgba` with explicit RGBA values.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a new opaque `LinearRgba` (alpha = 1.0).
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Returns the components as `[r, g, b, a]`.
    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Returns the raw bit patterns of the components, usable as a hash key.
    #[inline]
    pub fn to_bits(self) -> [u32; 4] {
        self.to_array().map(f32::to_bits)
    }
}

impl From<[f32; 4]> for LinearRgba {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_opaque() {
        assert_eq!(LinearRgba::RED.a, 1.0);
        assert_eq!(LinearRgba::TRANSPARENT.a, 0.0);
        assert_eq!(LinearRgba::RED.to_array(), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bits_distinguish_signed_zero() {
        let a = LinearRgba::new(0.0, 0.0, 0.0, 1.0);
        let b = LinearRgba::new(-0.0, 0.0, 0.0, 1.0);
        assert_eq!(a, b);
        assert_ne!(a.to_bits(), b.to_bits());
    }
}
