// SPDX-License-Identifier: Apache-2.0
//! Declared value contracts and their compatibility rule.

/// A declared range guarantee on a value.
///
/// Contracts are declared by the block that produces a value; they are never
/// inferred from usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueContract {
    /// Clamped to `[0, 1]`.
    Clamp01,
    /// Wrapped into `[0, 1)`.
    Wrap01,
    /// Clamped to `[-1, 1]`.
    Clamp11,
}

/// Returns whether a connection from `source` to `target` is legal.
///
/// `target = None` accepts anything (dropping a guarantee is always safe).
/// `source = None` is only accepted by `target = None` (adding a guarantee
/// requires an explicit adapter block, never an implicit one).
#[must_use]
pub fn contracts_compatible(source: Option<ValueContract>, target: Option<ValueContract>) -> bool {
    match target {
        None => true,
        Some(t) => source == Some(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_always_compatible() {
        for c in [ValueContract::Clamp01, ValueContract::Wrap01, ValueContract::Clamp11] {
            assert!(contracts_compatible(Some(c), Some(c)));
        }
    }

    #[test]
    fn any_source_satisfies_none_target() {
        assert!(contracts_compatible(None, None));
        assert!(contracts_compatible(Some(ValueContract::Clamp01), None));
    }

    #[test]
    fn none_source_never_satisfies_a_concrete_target() {
        assert!(!contracts_compatible(None, Some(ValueContract::Clamp01)));
    }

    #[test]
    fn mismatched_concrete_contracts_are_incompatible() {
        assert!(!contracts_compatible(
            Some(ValueContract::Wrap01),
            Some(ValueContract::Clamp01)
        ));
    }
}
