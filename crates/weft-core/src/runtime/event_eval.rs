// SPDX-License-Identifier: Apache-2.0
//! Cycle-safe evaluation of event-extent `ValueExpr` nodes.

use weft_types::ValueExprId;

use crate::ir::{CombineMode, EventKind, IrArena, ValueExprKind};

/// Raised when evaluating an event node re-enters itself before returning.
///
/// The compiler must never introduce such a cycle; this is a runtime safety
/// net, not a user-facing compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cycle detected evaluating event expression {0:?}")]
pub struct CycleInEventEval(pub ValueExprId);

/// Per-expression tripwires and rising-edge memory for event evaluation.
///
/// `cycle_detection[id]` is set on entry to [`EventEvaluator::eval`] and
/// cleared on every exit path (including error returns), so it reads `0` at
/// both entry and exit of any top-level evaluation that doesn't panic.
#[derive(Debug, Default)]
pub struct EventEvaluator {
    cycle_detection: Vec<u8>,
    prev_predicate: Vec<u8>,
}

impl EventEvaluator {
    /// An evaluator with no tracked expressions yet; grows lazily.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_len(&mut self, id: ValueExprId) {
        let needed = id.0 as usize + 1;
        if self.cycle_detection.len() < needed {
            self.cycle_detection.resize(needed, 0);
            self.prev_predicate.resize(needed, 0);
        }
    }

    /// Evaluates one event-extent node, descending into `combine` operands.
    ///
    /// # Errors
    /// Returns [`CycleInEventEval`] if evaluating `id` re-enters `id` itself
    /// (directly or transitively) before the first call returns.
    pub fn eval(
        &mut self,
        arena: &IrArena,
        id: ValueExprId,
        signal_eval: &mut dyn FnMut(ValueExprId) -> f64,
    ) -> Result<bool, CycleInEventEval> {
        self.ensure_len(id);
        if self.cycle_detection[id.0 as usize] == 1 {
            return Err(CycleInEventEval(id));
        }
        self.cycle_detection[id.0 as usize] = 1;
        let result = self.eval_inner(arena, id, signal_eval);
        self.cycle_detection[id.0 as usize] = 0;
        result
    }

    fn eval_inner(
        &mut self,
        arena: &IrArena,
        id: ValueExprId,
        signal_eval: &mut dyn FnMut(ValueExprId) -> f64,
    ) -> Result<bool, CycleInEventEval> {
        let ValueExprKind::Event { kind } = &arena.node(id).kind else {
            return Ok(false);
        };
        match kind {
            EventKind::Const { fired } => Ok(*fired),
            EventKind::Never => Ok(false),
            EventKind::Pulse { .. } => Ok(true),
            EventKind::Combine { mode, inputs } => {
                let inputs = inputs.clone();
                match mode {
                    CombineMode::Any => {
                        for input in inputs {
                            if self.eval(arena, input, signal_eval)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    CombineMode::All => {
                        for input in inputs {
                            if !self.eval(arena, input, signal_eval)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                }
            }
            EventKind::Wrap { input } => {
                let x = signal_eval(*input);
                let predicate = u8::from(x.is_finite() && x >= 0.5);
                self.ensure_len(id);
                let prev = self.prev_predicate[id.0 as usize];
                self.prev_predicate[id.0 as usize] = predicate;
                Ok(predicate == 1 && prev == 0)
            }
        }
    }
}
