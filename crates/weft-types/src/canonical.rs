// SPDX-License-Identifier: Apache-2.0
//! Fully resolved types: payload × unit × extent × contract, with no
//! inference variables remaining.

use crate::contract::ValueContract;
use crate::extent::CanonicalExtent;
use crate::ids::InstanceRef;
use crate::payload::Payload;
use crate::unit::{is_legal_pairing, Unit};

/// A fully resolved type: `{payload, unit, extent, contract?}`.
///
/// Invariants upheld by every constructor in this module:
/// - I1: no inference variable appears anywhere in `extent` (enforced by
///   [`CanonicalExtent`]'s shape, which has no `Var` case).
/// - I2: `(payload, unit)` is a legal pairing per
///   [`crate::unit::is_legal_pairing`].
/// - I3: a constant's payload tag matches `payload` (checked by callers that
///   build a `CanonicalType` alongside a `ConstValue`; see
///   `weft-core`'s IR builder).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalType {
    /// The value's payload kind.
    pub payload: Payload,
    /// The value's semantic unit.
    pub unit: Unit,
    /// The value's five-axis extent, fully resolved.
    pub extent: CanonicalExtent,
    /// The value's declared range guarantee, if any.
    pub contract: Option<ValueContract>,
}

/// Error returned when a `CanonicalType` constructor would violate I2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadUnitIllegal {
    /// The offending payload.
    pub payload: Payload,
    /// The offending unit.
    pub unit: Unit,
}

impl CanonicalType {
    fn checked(
        payload: Payload,
        unit: Unit,
        extent: CanonicalExtent,
        contract: Option<ValueContract>,
    ) -> Result<Self, PayloadUnitIllegal> {
        if is_legal_pairing(payload, unit) {
            Ok(Self {
                payload,
                unit,
                extent,
                contract,
            })
        } else {
            Err(PayloadUnitIllegal { payload, unit })
        }
    }

    /// A signal-extent canonical type.
    pub fn signal(
        payload: Payload,
        unit: Unit,
        contract: Option<ValueContract>,
    ) -> Result<Self, PayloadUnitIllegal> {
        Self::checked(payload, unit, CanonicalExtent::signal(), contract)
    }

    /// A field-extent canonical type over `instance`.
    pub fn field(
        payload: Payload,
        unit: Unit,
        instance: InstanceRef,
        contract: Option<ValueContract>,
    ) -> Result<Self, PayloadUnitIllegal> {
        Self::checked(payload, unit, CanonicalExtent::field(instance), contract)
    }

    /// An event-extent canonical type. Events never carry a contract or a
    /// meaningful unit; both are normalized to `none`/`None`.
    pub fn event() -> Self {
        Self {
            payload: Payload::Bool,
            unit: Unit::None,
            extent: CanonicalExtent::event(),
            contract: None,
        }
    }

    /// A zero-cardinality (compile-time constant) canonical type.
    pub fn constant(
        payload: Payload,
        unit: Unit,
        contract: Option<ValueContract>,
    ) -> Result<Self, PayloadUnitIllegal> {
        Self::checked(payload, unit, CanonicalExtent::constant(), contract)
    }
}

/// Deep structural equality between two fully resolved types.
///
/// Unlike `CanonicalType`'s derived `PartialEq`, this is the name used by the
/// specification and is the function other components should call; it never
/// accepts a type containing an inference variable (there is no such case to
/// accept).
#[must_use]
pub fn types_equal(a: &CanonicalType, b: &CanonicalType) -> bool {
    a == b
}
