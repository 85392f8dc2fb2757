// SPDX-License-Identifier: Apache-2.0
//! The closed unit union and the payload/unit legality table.

use crate::payload::Payload;

/// Angle representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AngleUnit {
    /// Radians.
    Radians,
    /// Degrees.
    Degrees,
    /// Full turns (`0.0..=1.0` == one revolution).
    Turns,
}

/// Time representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeUnit {
    /// Milliseconds.
    Ms,
    /// Seconds.
    Seconds,
}

/// Coordinate space a `space` unit is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpaceKind {
    /// Normalized device coordinates.
    Ndc,
    /// World space.
    World,
    /// View (camera-relative) space.
    View,
}

/// Color encoding a `color` unit is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorEncoding {
    /// Straight-alpha RGBA in `[0, 1]`.
    Rgba01,
    /// Hue/saturation/lightness.
    Hsl,
}

/// The closed set of semantic units a value may carry.
///
/// Units describe meaning, not representation: two `float` signals with
/// unit `angle{radians}` and `angle{degrees}` hold the same payload kind but
/// are not interchangeable without an explicit conversion block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    /// No semantic unit.
    None,
    /// A dimensionless count (distinct from `none`; see project open questions).
    Count,
    /// An angle in the given representation.
    Angle(AngleUnit),
    /// A duration or timestamp in the given representation.
    Time(TimeUnit),
    /// A spatial coordinate in the given space and dimensionality.
    Space {
        /// Which coordinate space.
        kind: SpaceKind,
        /// 2 or 3 spatial dimensions.
        dims: u8,
    },
    /// A color in the given encoding.
    Color(ColorEncoding),
}

/// Returns whether `(payload, unit)` is a legal pairing.
///
/// This is invariant I2 on [`crate::canonical::CanonicalType`]: constructors
/// that would produce an illegal pairing must fail rather than build the
/// type.
#[must_use]
pub fn is_legal_pairing(payload: Payload, unit: Unit) -> bool {
    match payload {
        Payload::Bool => matches!(unit, Unit::None),
        Payload::Color => matches!(unit, Unit::Color(_)),
        Payload::CameraProjection => matches!(unit, Unit::None),
        Payload::Int => matches!(unit, Unit::None | Unit::Count),
        Payload::Float => !matches!(unit, Unit::Color(_)),
        Payload::Vec2 => matches!(
            unit,
            Unit::None | Unit::Space { dims: 2, .. }
        ),
        Payload::Vec3 => matches!(
            unit,
            Unit::None | Unit::Space { dims: 3, .. }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_only_pairs_with_none() {
        assert!(is_legal_pairing(Payload::Bool, Unit::None));
        assert!(!is_legal_pairing(Payload::Bool, Unit::Count));
    }

    #[test]
    fn color_only_pairs_with_color_units() {
        assert!(is_legal_pairing(Payload::Color, Unit::Color(ColorEncoding::Hsl)));
        assert!(!is_legal_pairing(Payload::Color, Unit::None));
    }

    #[test]
    fn vec2_rejects_mismatched_space_dims() {
        assert!(!is_legal_pairing(
            Payload::Vec2,
            Unit::Space {
                kind: SpaceKind::World,
                dims: 3
            }
        ));
    }
}
