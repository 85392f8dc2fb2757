// SPDX-License-Identifier: Apache-2.0
//! The five-axis extent product and its inference-time counterpart.

use crate::ids::{InstanceRef, VarId};

/// Cardinality: how many instances a value exists over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cardinality {
    /// A compile-time constant; the universal donor (unifies with `one` or
    /// `many` in a consumer context).
    Zero,
    /// A single signal value.
    One,
    /// A field over the named instance's elements.
    Many(InstanceRef),
}

/// Temporality: continuous (signal/field) vs discrete (event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Temporality {
    /// Re-evaluated every frame from current inputs.
    Continuous,
    /// Fires on a predicate transition; absent most frames.
    Discrete,
}

/// Binding: how strongly a value is associated with an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Binding {
    /// No association.
    Unbound,
    /// Association may be dropped without changing semantics.
    Weak,
    /// Association is load-bearing.
    Strong,
    /// Association is the value's identity.
    Identity,
}

/// Perspective: from whose viewpoint a value is expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Perspective {
    /// No particular viewpoint.
    Default,
    /// Expressed from the given instance's viewpoint.
    Specific(InstanceRef),
}

/// Branch: which parallel branch a value belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Branch {
    /// The default (sole) branch.
    Default,
    /// A named parallel branch.
    Specific(InstanceRef),
}

/// Either an inference-time variable or a resolved value for one extent axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisValue<T> {
    /// Unresolved; must be looked up in the relevant substitution map.
    Var(VarId),
    /// Resolved to a concrete axis value.
    Inst(T),
}

impl<T> AxisValue<T> {
    /// The resolved value, or `None` if this axis is still a variable.
    pub fn resolved(&self) -> Option<&T> {
        match self {
            AxisValue::Var(_) => None,
            AxisValue::Inst(v) => Some(v),
        }
    }
}

/// The five-axis extent product with every axis still possibly a variable.
///
/// Used inside an [`crate::infer::InferenceCanonicalType`] prior to solving.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InferenceExtent {
    /// Cardinality axis.
    pub cardinality: AxisValue<Cardinality>,
    /// Temporality axis.
    pub temporality: AxisValue<Temporality>,
    /// Binding axis.
    pub binding: AxisValue<Binding>,
    /// Perspective axis.
    pub perspective: AxisValue<Perspective>,
    /// Branch axis.
    pub branch: AxisValue<Branch>,
}

/// The five-axis extent product with every axis fully resolved.
///
/// Invariant I1 on [`crate::canonical::CanonicalType`]: a `CanonicalExtent`
/// never contains a variable, by construction (it simply has no `Var` case).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalExtent {
    /// Cardinality axis.
    pub cardinality: Cardinality,
    /// Temporality axis.
    pub temporality: Temporality,
    /// Binding axis.
    pub binding: Binding,
    /// Perspective axis.
    pub perspective: Perspective,
    /// Branch axis.
    pub branch: Branch,
}

impl CanonicalExtent {
    /// A signal: `cardinality = one`, `temporality = continuous`.
    #[must_use]
    pub fn signal() -> Self {
        Self {
            cardinality: Cardinality::One,
            temporality: Temporality::Continuous,
            binding: Binding::Unbound,
            perspective: Perspective::Default,
            branch: Branch::Default,
        }
    }

    /// A field over `instance`: `cardinality = many`, `temporality = continuous`.
    #[must_use]
    pub fn field(instance: InstanceRef) -> Self {
        Self {
            cardinality: Cardinality::Many(instance),
            temporality: Temporality::Continuous,
            binding: Binding::Unbound,
            perspective: Perspective::Default,
            branch: Branch::Default,
        }
    }

    /// An event: `temporality = discrete`, default everywhere else.
    #[must_use]
    pub fn event() -> Self {
        Self {
            cardinality: Cardinality::One,
            temporality: Temporality::Discrete,
            binding: Binding::Unbound,
            perspective: Perspective::Default,
            branch: Branch::Default,
        }
    }

    /// A compile-time constant: `cardinality = zero`.
    #[must_use]
    pub fn constant() -> Self {
        Self {
            cardinality: Cardinality::Zero,
            temporality: Temporality::Continuous,
            binding: Binding::Unbound,
            perspective: Perspective::Default,
            branch: Branch::Default,
        }
    }

    /// Whether this extent is a signal (`one`, `continuous`).
    #[must_use]
    pub fn is_signal(&self) -> bool {
        matches!(self.cardinality, Cardinality::One) && self.temporality == Temporality::Continuous
    }

    /// Whether this extent is a field (`many`, `continuous`).
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self.cardinality, Cardinality::Many(_)) && self.temporality == Temporality::Continuous
    }

    /// Whether this extent is an event (`discrete`, any cardinality other than `zero`).
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.temporality == Temporality::Discrete
    }
}
