// SPDX-License-Identifier: Apache-2.0
//! Canonical type algebra for Weft.
//!
//! This crate owns the data shapes described by the patch compiler's type
//! system: payloads, units, the five-axis extent product, value contracts,
//! and the inference-time variants of each that a solver resolves into a
//! [`canonical::CanonicalType`]. It has no knowledge of blocks, IR, or
//! scheduling — those live in `weft-block-api` and `weft-core` respectively
//! so that this crate can stay dependency-free and reusable on both sides of
//! the lowering boundary.
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn
)]

extern crate alloc;

pub mod canonical;
pub mod const_value;
pub mod contract;
pub mod extent;
pub mod ids;
pub mod infer;
pub mod payload;
pub mod pure_fn;
pub mod unit;

pub use canonical::CanonicalType;
pub use const_value::ConstValue;
pub use contract::{contracts_compatible, ValueContract};
pub use extent::{AxisValue, Branch, Cardinality, CanonicalExtent, InferenceExtent, Perspective};
pub use extent::{Binding, Temporality};
pub use ids::{EventSlot, InstanceRef, StableStateId, StateSlot, ValueExprId, ValueSlot, VarId};
pub use infer::{
    finalize, try_finalize, types_equal, InferenceCanonicalType, Substitution, UnresolvedVar,
};
pub use payload::Payload;
pub use pure_fn::{KernelName, Opcode, PureFn};
pub use unit::Unit;
