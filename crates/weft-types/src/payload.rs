// SPDX-License-Identifier: Apache-2.0
//! The closed payload union and its derived stride.

/// The closed set of value kinds a [`crate::canonical::CanonicalType`] can carry.
///
/// Stride (component count) is derived from the variant, never stored
/// alongside it — see [`Payload::stride`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// A 64-bit float scalar.
    Float,
    /// A 64-bit signed integer scalar.
    Int,
    /// A boolean scalar.
    Bool,
    /// A two-component vector.
    Vec2,
    /// A three-component vector.
    Vec3,
    /// A four-component RGBA color.
    Color,
    /// An opaque camera projection handle (stride 1: referenced, not decomposed).
    CameraProjection,
}

impl Payload {
    /// The number of scalar components this payload occupies in a strided slot.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Payload::Float | Payload::Int | Payload::Bool | Payload::CameraProjection => 1,
            Payload::Vec2 => 2,
            Payload::Vec3 => 3,
            Payload::Color => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Payload;

    #[test]
    fn stride_matches_spec_table() {
        assert_eq!(Payload::Float.stride(), 1);
        assert_eq!(Payload::Int.stride(), 1);
        assert_eq!(Payload::Bool.stride(), 1);
        assert_eq!(Payload::CameraProjection.stride(), 1);
        assert_eq!(Payload::Vec2.stride(), 2);
        assert_eq!(Payload::Vec3.stride(), 3);
        assert_eq!(Payload::Color.stride(), 4);
    }
}
