// SPDX-License-Identifier: Apache-2.0
//! Inference-time types and the `finalize` conversion to canonical form.

use alloc::collections::BTreeMap;

use crate::canonical::CanonicalType;
use crate::contract::ValueContract;
use crate::extent::{AxisValue, Binding, Branch, CanonicalExtent, Cardinality, InferenceExtent};
use crate::extent::{Perspective, Temporality};
use crate::ids::VarId;
use crate::payload::Payload;
use crate::unit::{is_legal_pairing, Unit};

/// Same shape as [`CanonicalType`], but payload, unit, and every extent axis
/// may instead be an unresolved [`VarId`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InferenceCanonicalType {
    /// The value's payload kind, possibly a variable.
    pub payload: AxisValue<Payload>,
    /// The value's semantic unit, possibly a variable.
    pub unit: AxisValue<Unit>,
    /// The value's five-axis extent, each axis possibly a variable.
    pub extent: InferenceExtent,
    /// The value's declared range guarantee. Never a variable: contracts are
    /// declared, not inferred.
    pub contract: Option<ValueContract>,
}

/// Partial maps from inference variable to resolved value, one map per kind
/// of variable (payload, unit, and one per extent axis).
///
/// Variables never collide across maps: a `VarId(3)` in the payload map and
/// a `VarId(3)` in the cardinality map are unrelated.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    /// Resolved payload variables.
    pub payload: BTreeMap<VarId, Payload>,
    /// Resolved unit variables.
    pub unit: BTreeMap<VarId, Unit>,
    /// Resolved cardinality-axis variables.
    pub cardinality: BTreeMap<VarId, Cardinality>,
    /// Resolved temporality-axis variables.
    pub temporality: BTreeMap<VarId, Temporality>,
    /// Resolved binding-axis variables.
    pub binding: BTreeMap<VarId, Binding>,
    /// Resolved perspective-axis variables.
    pub perspective: BTreeMap<VarId, Perspective>,
    /// Resolved branch-axis variables.
    pub branch: BTreeMap<VarId, Branch>,
}

impl Substitution {
    /// An empty substitution (no variable resolved).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The specific kind of axis a `finalize` failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    /// The cardinality axis.
    Cardinality,
    /// The temporality axis.
    Temporality,
    /// The binding axis.
    Binding,
    /// The perspective axis.
    Perspective,
    /// The branch axis.
    Branch,
}

/// A variable that remained unresolved when `finalize` was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedVar {
    /// An unresolved payload variable.
    Payload(VarId),
    /// An unresolved unit variable.
    Unit(VarId),
    /// An unresolved axis variable, tagged with which axis.
    Axis(AxisKind, VarId),
    /// `(payload, unit)` resolved, but to an illegal pairing (I2 violation).
    PayloadUnitIllegal {
        /// The resolved payload.
        payload: Payload,
        /// The resolved unit.
        unit: Unit,
    },
}

fn resolve<T: Clone>(value: &AxisValue<T>, map: &BTreeMap<VarId, T>) -> Option<T> {
    match value {
        AxisValue::Inst(v) => Some(v.clone()),
        AxisValue::Var(id) => map.get(id).cloned(),
    }
}

/// Attempts to fully resolve `ict` under `subst`, returning `None` (rather
/// than an error) on the first unresolved variable.
///
/// Used by the solver's fixpoint loop to cheaply test "has this port become
/// canonicalizable yet?" without needing to unpack a specific failure.
#[must_use]
pub fn try_finalize(ict: &InferenceCanonicalType, subst: &Substitution) -> Option<CanonicalType> {
    finalize(ict, subst).ok()
}

/// Resolves `ict` under `subst` into a fully concrete [`CanonicalType`].
///
/// # Errors
/// Returns the first unresolved variable encountered, in the fixed
/// inspection order payload → unit → cardinality → temporality → binding →
/// perspective → branch, or a `PayloadUnitIllegal` if every variable
/// resolved but the resulting pairing is not legal (I2).
pub fn finalize(
    ict: &InferenceCanonicalType,
    subst: &Substitution,
) -> Result<CanonicalType, UnresolvedVar> {
    let payload = match &ict.payload {
        AxisValue::Inst(p) => *p,
        AxisValue::Var(id) => resolve(&ict.payload, &subst.payload)
            .ok_or(UnresolvedVar::Payload(*id))?,
    };
    let unit = match &ict.unit {
        AxisValue::Inst(u) => u.clone(),
        AxisValue::Var(id) => {
            resolve(&ict.unit, &subst.unit).ok_or(UnresolvedVar::Unit(*id))?
        }
    };
    let cardinality = resolve(&ict.extent.cardinality, &subst.cardinality).ok_or_else(|| {
        match &ict.extent.cardinality {
            AxisValue::Var(id) => UnresolvedVar::Axis(AxisKind::Cardinality, *id),
            AxisValue::Inst(_) => unreachable!("resolve only fails for Var"),
        }
    })?;
    let temporality = resolve(&ict.extent.temporality, &subst.temporality).ok_or_else(|| {
        match &ict.extent.temporality {
            AxisValue::Var(id) => UnresolvedVar::Axis(AxisKind::Temporality, *id),
            AxisValue::Inst(_) => unreachable!("resolve only fails for Var"),
        }
    })?;
    let binding = resolve(&ict.extent.binding, &subst.binding).ok_or_else(|| {
        match &ict.extent.binding {
            AxisValue::Var(id) => UnresolvedVar::Axis(AxisKind::Binding, *id),
            AxisValue::Inst(_) => unreachable!("resolve only fails for Var"),
        }
    })?;
    let perspective = resolve(&ict.extent.perspective, &subst.perspective).ok_or_else(|| {
        match &ict.extent.perspective {
            AxisValue::Var(id) => UnresolvedVar::Axis(AxisKind::Perspective, *id),
            AxisValue::Inst(_) => unreachable!("resolve only fails for Var"),
        }
    })?;
    let branch = resolve(&ict.extent.branch, &subst.branch).ok_or_else(|| {
        match &ict.extent.branch {
            AxisValue::Var(id) => UnresolvedVar::Axis(AxisKind::Branch, *id),
            AxisValue::Inst(_) => unreachable!("resolve only fails for Var"),
        }
    })?;

    if !is_legal_pairing(payload, unit.clone()) {
        return Err(UnresolvedVar::PayloadUnitIllegal { payload, unit });
    }

    Ok(CanonicalType {
        payload,
        unit,
        extent: CanonicalExtent {
            cardinality,
            temporality,
            binding,
            perspective,
            branch,
        },
        contract: ict.contract,
    })
}

/// Lifts a fully resolved [`CanonicalType`] into inference form with no
/// variables, satisfying `finalize(canonical_type(ct), EMPTY_SUBSTITUTION) ==
/// ct` (invariant 1 in the testable-properties list: canonical types are a
/// subset of inference-canonicalizable types).
#[must_use]
pub fn canonical_type(ct: CanonicalType) -> InferenceCanonicalType {
    InferenceCanonicalType {
        payload: AxisValue::Inst(ct.payload),
        unit: AxisValue::Inst(ct.unit),
        extent: InferenceExtent {
            cardinality: AxisValue::Inst(ct.extent.cardinality),
            temporality: AxisValue::Inst(ct.extent.temporality),
            binding: AxisValue::Inst(ct.extent.binding),
            perspective: AxisValue::Inst(ct.extent.perspective),
            branch: AxisValue::Inst(ct.extent.branch),
        },
        contract: ct.contract,
    }
}

/// Deep structural equality between two fully resolved types. Re-exported at
/// the crate root; see [`crate::canonical::types_equal`] for the
/// implementation.
pub use crate::canonical::types_equal;
