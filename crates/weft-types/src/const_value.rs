// SPDX-License-Identifier: Apache-2.0
//! Tagged constant values, one variant per [`crate::payload::Payload`] kind.

use crate::payload::Payload;

/// A compile-time constant value.
///
/// Each variant's arity matches its payload's [`Payload::stride`] exactly
/// (invariant I3 on [`crate::canonical::CanonicalType`]: a constant's tag
/// always matches its declared payload).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstValue {
    /// A float scalar.
    Float(f64),
    /// An integer scalar.
    Int(i64),
    /// A boolean scalar.
    Bool(bool),
    /// A two-component vector, `[x, y]`.
    Vec2([f64; 2]),
    /// A three-component vector, `[x, y, z]`.
    Vec3([f64; 3]),
    /// An RGBA color, `[r, g, b, a]`.
    Color([f64; 4]),
    /// An opaque camera projection handle.
    CameraProjection(u32),
}

impl ConstValue {
    /// The payload kind this value is tagged with.
    #[must_use]
    pub fn payload(&self) -> Payload {
        match self {
            ConstValue::Float(_) => Payload::Float,
            ConstValue::Int(_) => Payload::Int,
            ConstValue::Bool(_) => Payload::Bool,
            ConstValue::Vec2(_) => Payload::Vec2,
            ConstValue::Vec3(_) => Payload::Vec3,
            ConstValue::Color(_) => Payload::Color,
            ConstValue::CameraProjection(_) => Payload::CameraProjection,
        }
    }

    /// Reads component `index` as a scalar `f64`, or `None` if out of range.
    ///
    /// `Bool` reads as `0.0`/`1.0`; `Int` and `CameraProjection` are cast.
    #[must_use]
    pub fn component(&self, index: usize) -> Option<f64> {
        match self {
            ConstValue::Float(v) if index == 0 => Some(*v),
            ConstValue::Int(v) if index == 0 => Some(*v as f64),
            ConstValue::Bool(v) if index == 0 => Some(if *v { 1.0 } else { 0.0 }),
            ConstValue::CameraProjection(v) if index == 0 => Some(f64::from(*v)),
            ConstValue::Vec2(v) => v.get(index).copied(),
            ConstValue::Vec3(v) => v.get(index).copied(),
            ConstValue::Color(v) => v.get(index).copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tag_matches_variant() {
        assert_eq!(ConstValue::Vec3([1.0, 2.0, 3.0]).payload(), Payload::Vec3);
        assert_eq!(ConstValue::Color([0.0; 4]).payload(), Payload::Color);
    }

    #[test]
    fn component_reads_within_stride_only() {
        let v = ConstValue::Vec2([3.0, 4.0]);
        assert_eq!(v.component(0), Some(3.0));
        assert_eq!(v.component(1), Some(4.0));
        assert_eq!(v.component(2), None);
    }
}
