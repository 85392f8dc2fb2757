// SPDX-License-Identifier: Apache-2.0
//! Weft's patch compiler, scheduler, and frame-by-frame executor.
//!
//! This crate turns a [`patch::Patch`] plus a registry of block
//! implementations (`weft-block-api`) into a [`compiler::CompiledProgram`],
//! then drives that program frame by frame through [`runtime::run_frame`].
//! It owns none of the type algebra (`weft-types`) or the render IR
//! (`weft-render`); it is the orchestration layer that sits between them.
#![deny(missing_docs, rust_2018_idioms, unused_must_use, unsafe_code)]
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

pub mod binding;
pub mod compiler;
pub mod diagnostics;
pub mod ir;
pub mod patch;
pub mod runtime;
pub mod schedule;
#[cfg(test)]
mod scenarios;

pub use binding::{bind_effects, bind_outputs, BindResult, StateBinding, StateKind};
pub use compiler::{
    compile, BlockRegistry, CompileOutcome, CompiledProgram, DebugIndex, FieldSlotEntry,
    FieldSlotRegistry, SlotMeta,
};
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity, TargetRef};
pub use ir::{IrArena, ValueExprKind, ValueExprNode};
pub use patch::{topological_order, InputSource, Patch, PatchBlockInstance};
pub use runtime::{run_frame, ExternalChannels, Health, ProgramState, SessionState};
pub use schedule::{ScheduleBuilder, ScheduleIR, Step, TimeModel};
