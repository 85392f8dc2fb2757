// SPDX-License-Identifier: Apache-2.0
//! Opaque arena indices and stable identifiers shared across the lowering
//! boundary.
//!
//! Every cross-reference in the compiler is an index into some arena rather
//! than a pointer, which keeps the IR trivially serializable and makes
//! content-addressed sharing cheap to check (`==` on a `u32`).

use alloc::string::String;
use core::fmt;

/// An inference-time variable identifier.
///
/// `VarId`s are scoped by the substitution map they are looked up in
/// (payload vars, unit vars, or one of the five axis vars never collide
/// because each lives in its own map) — see [`crate::infer::Substitution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A dense index into the `ValueExpr` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueExprId(pub u32);

/// A typed storage location in `ProgramState.values`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueSlot(pub u32);

/// A slot in the per-frame event scalar/predicate arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventSlot(pub u32);

/// An index into the persistent `state[]` array (scalar or field lane base).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSlot(pub u32);

/// A deterministic, lexically sortable identifier for persistent state that
/// must survive recompilation.
///
/// Derived from `(blockId, logical state key)`; two compiles of the same
/// patch produce byte-identical `StableStateId`s, which is what lets
/// hot-swap re-associate old slots with new ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StableStateId(String);

impl StableStateId {
    /// Builds a `StableStateId` from a block identifier and a logical state
    /// key scoped to that block (e.g. a block with two independent counters
    /// would declare keys `"a"` and `"b"`).
    #[must_use]
    pub fn new(block_id: &str, key: &str) -> Self {
        Self(alloc::format!("{block_id}:{key}"))
    }

    /// The raw, lexically comparable string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named occurrence of a domain type, e.g. "the points of this spiral".
///
/// Both fields are opaque, branded strings: callers must not parse or infer
/// structure from them beyond equality and the domain/instance pairing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstanceRef {
    domain_type_id: String,
    instance_id: String,
}

impl InstanceRef {
    /// Builds an `InstanceRef` from a domain type id and an instance id.
    #[must_use]
    pub fn new(domain_type_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            domain_type_id: domain_type_id.into(),
            instance_id: instance_id.into(),
        }
    }

    /// The domain type this instance belongs to.
    #[must_use]
    pub fn domain_type_id(&self) -> &str {
        &self.domain_type_id
    }

    /// The instance's identifier within its domain type.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}
