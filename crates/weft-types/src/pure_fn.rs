// SPDX-License-Identifier: Apache-2.0
//! Pure functions usable inside `kernel`/`map`/`zip`/`reduce` IR nodes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::unit::Unit;

/// The closed set of arithmetic, transcendental, clamping, and selection
/// opcodes a block may compose into a [`PureFn::Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    /// `a + b`.
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// `a / b`.
    Div,
    /// `-a`.
    Neg,
    /// `a % b`, result takes the sign of `b` (true modulo, not truncating remainder).
    Mod,
    /// `min(a, b)`.
    Min,
    /// `max(a, b)`.
    Max,
    /// `clamp(x, lo, hi)`.
    Clamp,
    /// Linear interpolation `mix(a, b, t)`.
    Mix,
    /// `abs(a)`.
    Abs,
    /// `floor(a)`.
    Floor,
    /// `ceil(a)`.
    Ceil,
    /// `round(a)`.
    Round,
    /// `sqrt(a)`.
    Sqrt,
    /// `pow(a, b)`.
    Pow,
    /// `sin(a)` (radians).
    Sin,
    /// `cos(a)` (radians).
    Cos,
    /// `atan2(y, x)`.
    Atan2,
    /// Step function: `x < edge ? 0 : 1`.
    Step,
    /// Selection: `cond != 0.0 ? a : b`.
    Select,
    /// `a == b` as 0.0/1.0.
    Eq,
    /// `a < b` as 0.0/1.0.
    Lt,
}

/// A named kernel function with an optional unit signature used only for
/// validation (never to drive a conversion).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelName {
    /// The kernel's registered name, e.g. `"length"` or `"normalize"`.
    pub name: String,
    /// Expected input unit, documented for validation only.
    pub input_unit: Option<Unit>,
    /// Declared output unit, documented for validation only.
    pub output_unit: Option<Unit>,
}

/// A pure function usable as the `pureFn` of a `kernel` IR node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PureFn {
    /// A single closed-form opcode.
    Opcode(Opcode),
    /// A named, unit-documented kernel (e.g. a library-provided `length`).
    Kernel(KernelName),
    /// A short fixed program of opcodes applied in sequence, each consuming
    /// the prior step's result as its first operand (used to express small
    /// composed expressions, such as `clamp(mix(a, b, t), 0, 1)`, without
    /// allocating an intermediate IR node per step).
    Expr(Vec<Opcode>),
}
