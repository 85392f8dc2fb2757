// SPDX-License-Identifier: Apache-2.0
//! The binding pass: turns a block's lowering [`Effects`] into concrete state
//! and value slots, patches the arena's state placeholders, and queues
//! Phase-2 state-write steps.
//!
//! Determinism is the whole point of this module: two compiles of the same
//! patch, with the same `existingState`, must allocate identical slots in
//! identical order. Every collection this module iterates is sorted by a
//! lexical key before allocation for exactly that reason.

use std::collections::BTreeMap;

use weft_block_api::{Effects, LowerResult, LoweringPurity};
use weft_types::{StableStateId, StateSlot, ValueExprId, ValueSlot};

use crate::diagnostics::{DiagnosticSink, Severity, TargetRef};
use crate::ir::IrArena;

/// What kind of storage a bound state entry occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// One `f64` slot.
    Scalar,
    /// A contiguous run of `f64` lanes.
    Field {
        /// First lane's index.
        slot_start: u32,
        /// Number of lanes.
        lane_count: u32,
    },
}

/// One resolved state binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateBinding {
    /// The final storage slot.
    pub state_slot: StateSlot,
    /// Scalar or field, and its shape.
    pub kind: StateKind,
}

/// A queued Phase-2 write, produced from a block's `stepRequests`.
#[derive(Debug, Clone, Copy)]
pub struct QueuedStateWrite {
    /// The state slot being written.
    pub state_slot: StateSlot,
    /// The Phase-1 expression whose value is written.
    pub value: ValueExprId,
}

/// The result of running [`bind_effects`] over one block's lowering output.
#[derive(Debug, Default)]
pub struct BindResult {
    /// Every state key this call resolved, in the lexical order processed.
    pub state_map: BTreeMap<StableStateId, StateBinding>,
    /// Every output port this call allocated a slot for.
    pub slot_map: BTreeMap<String, ValueSlot>,
    /// `(placeholder id, resolved slot)` pairs for the arena to patch.
    pub expr_patches: Vec<(ValueExprId, StateSlot)>,
    /// Phase-2 writes this block's `stepRequests` resolved to.
    pub queued_writes: Vec<QueuedStateWrite>,
}

/// Binds one block's [`Effects`] against `existing_state` (the previous
/// compile's state map, or empty for a first compile), allocating fresh
/// state/value slots only for keys not already present.
///
/// Mirrors the IR arena's own placeholder bookkeeping: a block that declared
/// state via `IrBuilder::declare_state` got back a builder-local
/// [`ValueSlot`] placeholder, recorded in `arena.state_slots()`. This pass
/// assigns each such placeholder's key a final [`StateSlot`] and records the
/// patch; [`apply_binding`] is what actually writes it back into the arena.
pub fn bind_effects(
    effects: &Effects,
    existing_state: &BTreeMap<StableStateId, StateBinding>,
    arena: &mut IrArena,
    next_state_slot: &mut u32,
    diagnostics: &mut DiagnosticSink,
) -> BindResult {
    let mut result = BindResult::default();

    let mut decls = effects.state_decls.clone();
    decls.sort_by(|a, b| a.key.cmp(&b.key));

    for decl in &decls {
        let binding = if let Some(existing) = existing_state.get(&decl.key) {
            *existing
        } else {
            let slot = StateSlot(*next_state_slot);
            *next_state_slot += 1;
            StateBinding {
                state_slot: slot,
                kind: StateKind::Scalar,
            }
        };
        result.state_map.insert(decl.key.clone(), binding);

        if let Some(&placeholder_slot) = arena.state_slots().get(&decl.key) {
            if let Some(placeholder_id) = find_placeholder_node(arena, placeholder_slot) {
                result.expr_patches.push((placeholder_id, binding.state_slot));
            }
        }
    }

    let mut writes = effects.step_requests.clone();
    writes.sort_by(|a, b| a.state_key.cmp(&b.state_key));
    for req in &writes {
        match result
            .state_map
            .get(&req.state_key)
            .or_else(|| existing_state.get(&req.state_key))
        {
            Some(binding) => result.queued_writes.push(QueuedStateWrite {
                state_slot: binding.state_slot,
                value: req.value,
            }),
            None => diagnostics.push(
                "UnknownStateKey",
                Severity::Error,
                "state write references an unknown key",
                format!(
                    "stepRequest targets state key {:?}, which was never declared",
                    req.state_key
                ),
                TargetRef::Binding {
                    state_key: req.state_key.clone(),
                },
            ),
        }
    }

    let mut slot_reqs = effects.slot_requests.clone();
    slot_reqs.sort_by(|a, b| a.port_id.cmp(&b.port_id));
    for req in &slot_reqs {
        let slot = weft_block_api::IrBuilder::alloc_slot(arena);
        result.slot_map.insert(req.port_id.clone(), slot);
    }

    result
}

fn find_placeholder_node(arena: &IrArena, placeholder_slot: ValueSlot) -> Option<ValueExprId> {
    (0..arena.len())
        .map(|i| ValueExprId(u32::try_from(i).unwrap_or(u32::MAX)))
        .find(|&id| {
            matches!(
                arena.node(id).kind,
                crate::ir::ValueExprKind::StatePlaceholder { slot } if slot == placeholder_slot
            )
        })
}

/// Commits a [`BindResult`] into the arena and the running state-write
/// queue: patches every state placeholder node and appends queued writes.
///
/// Must be called once per block, immediately after [`bind_effects`], before
/// lowering the next block — a later block's `find_state_slot` lookup
/// depends on the arena's placeholder bookkeeping reflecting the patch made
/// here.
pub fn apply_binding(
    arena: &mut IrArena,
    bind_result: &BindResult,
    queue: &mut Vec<QueuedStateWrite>,
) {
    for &(placeholder_id, state_slot) in &bind_result.expr_patches {
        arena.patch_state_read(placeholder_id, state_slot);
    }
    queue.extend_from_slice(&bind_result.queued_writes);
}

/// Resolves a block's `outputsById` into final bindings, allocating a slot
/// through `arena` for every pure output the block left unslotted.
///
/// # Errors
/// Pushes `MissingSlotForImpureBlock` and returns `Err(())` if an impure
/// block left any output without a slot.
pub fn bind_outputs(
    block_id: &str,
    lowered: &LowerResult,
    purity: LoweringPurity,
    arena: &mut IrArena,
    diagnostics: &mut DiagnosticSink,
) -> Result<BTreeMap<String, ValueSlot>, ()> {
    let mut bound = BTreeMap::new();
    let mut ok = true;

    for (port_id, output) in &lowered.outputs_by_id {
        let slot = match output.slot {
            Some(slot) => slot,
            None => match purity {
                LoweringPurity::Pure => weft_block_api::IrBuilder::alloc_slot(arena),
                LoweringPurity::Impure => {
                    diagnostics.push(
                        "MissingSlotForImpureBlock",
                        Severity::Error,
                        "impure block output has no slot",
                        format!(
                            "block {block_id} port {port_id} is impure but did not populate a \
                             slot for its output"
                        ),
                        TargetRef::Port {
                            block_id: block_id.to_string(),
                            port_id: port_id.clone(),
                        },
                    );
                    ok = false;
                    continue;
                }
            },
        };
        bound.insert(port_id.clone(), slot);
    }

    if ok {
        Ok(bound)
    } else {
        Err(())
    }
}
