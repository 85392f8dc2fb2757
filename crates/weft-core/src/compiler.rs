// SPDX-License-Identifier: Apache-2.0
//! The patch compiler frontend: walks a [`Patch`] in dependency order,
//! lowers each block against its already-lowered inputs, binds state and
//! output slots, and assembles the two-phase [`ScheduleIR`] the runtime
//! executes.
//!
//! This module is where per-port type resolution happens. A block's own
//! [`InputPortSpec::ty`]/[`OutputPortSpec`] are inference-time
//! ([`InferenceCanonicalType`]) — possibly still carrying variables — but
//! every upstream connection a block actually sees is already concrete: its
//! [`LoweredOutput`] reads back the producing node's resolved
//! [`CanonicalType`] straight out of the arena. So the solving this module
//! does is narrower than a general bidirectional unifier: for each block,
//! unify its declared input types against the concrete types flowing into
//! them (building a small per-block [`Substitution`] as we go, mostly to
//! pick legal defaults for disconnected ports that share a variable with a
//! connected one), then trust the block's `lower` to have picked legal,
//! concrete output types itself.

use std::collections::BTreeMap;
use std::fmt;

use weft_block_api::{BlockDef, DefaultSource, InputPortSpec, LoweredInput, LoweredOutput};
use weft_types::unit::ColorEncoding;
use weft_types::{
    contracts_compatible, AxisValue, Cardinality, CanonicalType, ConstValue, InferenceCanonicalType,
    Payload, StableStateId, Substitution, Unit, ValueSlot, VarId,
};

use crate::binding::{apply_binding, bind_effects, bind_outputs, QueuedStateWrite, StateBinding};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Severity, TargetRef};
use crate::ir::IrArena;
use crate::patch::{InputSource, Patch};
use crate::schedule::{
    EvalStrategy, ScheduleBuilder, ScheduleIR, SlotTarget, Step, Storage, TimeModel,
};

/// A registered block type, looked up by [`crate::patch::PatchBlockInstance::type_name`].
pub type BlockRegistry = BTreeMap<String, Box<dyn BlockDef>>;

/// Where one bound value lives and how to read it back.
#[derive(Debug, Clone)]
pub struct SlotMeta {
    /// The storage slot.
    pub slot: ValueSlot,
    /// Which array it lives in.
    pub storage: Storage,
    /// Component count occupied starting at `slot`.
    pub stride: usize,
    /// The value's resolved type.
    pub ty: CanonicalType,
}

/// One field buffer's registration: which instance it is materialized over.
#[derive(Debug, Clone)]
pub struct FieldSlotEntry {
    /// The instance this buffer's lanes are indexed by.
    pub instance_id: String,
    /// Component stride per lane.
    pub stride: usize,
}

/// Every object slot known to hold a materialized field buffer.
#[derive(Debug, Clone, Default)]
pub struct FieldSlotRegistry {
    /// Field slot entries, keyed by their object slot.
    pub entries: BTreeMap<ValueSlot, FieldSlotEntry>,
}

/// Cross-references from compiled artifacts back to the patch that produced
/// them, for editor/debugger tooling.
#[derive(Debug, Clone, Default)]
pub struct DebugIndex {
    /// Phase-1 step index to the block that requested it.
    pub step_to_block: BTreeMap<usize, String>,
    /// Bound slot to the block that owns it.
    pub slot_to_block: BTreeMap<ValueSlot, String>,
    /// Bound slot to the output port id it was bound for.
    pub slot_to_port: BTreeMap<ValueSlot, String>,
    /// Block id to its registered type name.
    pub block_map: BTreeMap<String, String>,
    /// Block id to its human-readable label.
    pub block_display_names: BTreeMap<String, String>,
}

/// A fully compiled program: IR, schedule, and every cross-reference needed
/// to drive a runtime executor or an editor's introspection views.
#[derive(Debug)]
pub struct CompiledProgram {
    /// The content-addressed expression arena backing every step.
    pub arena: IrArena,
    /// The compiled, two-phase frame program.
    pub schedule: ScheduleIR,
    /// Every bound slot's storage and type.
    pub slot_meta: BTreeMap<ValueSlot, SlotMeta>,
    /// Every object slot holding a materialized field buffer.
    pub field_slot_registry: FieldSlotRegistry,
    /// Every block output, keyed by `"blockId:portId"`.
    pub outputs: BTreeMap<String, ValueSlot>,
    /// Cross-reference index for tooling.
    pub debug_index: DebugIndex,
    /// Non-fatal diagnostics raised during a successful compile.
    pub diagnostics: Vec<Diagnostic>,
}

/// The result of [`compile`].
#[derive(Debug)]
pub enum CompileOutcome {
    /// Compilation produced a program; `diagnostics` on it may still be
    /// non-empty (warnings, hints).
    Ok(CompiledProgram),
    /// Compilation failed; no program is produced.
    Error(Vec<Diagnostic>),
}

/// Compiles `patch` against `registry`, reusing `existing_state` (the
/// previous compile's state map, or empty on a first compile) so that
/// hot-swap preserves persistent state keyed by [`StableStateId`].
///
/// `time_model` is supplied by the host rather than discovered from the
/// patch: nothing in the block graph today declares a clock, so the caller
/// (the authoring environment's transport controls) decides how `t_ms`
/// advances for this compiled program.
#[must_use]
pub fn compile(
    patch: &Patch,
    registry: &BlockRegistry,
    existing_state: &BTreeMap<StableStateId, StateBinding>,
    time_model: TimeModel,
) -> CompileOutcome {
    let mut diagnostics = DiagnosticSink::new();

    let order = match crate::patch::topological_order(patch, &mut diagnostics) {
        Ok(order) => order,
        Err(()) => return CompileOutcome::Error(diagnostics.into_vec()),
    };

    let mut arena = IrArena::new();
    let mut outputs_by_block: BTreeMap<String, BTreeMap<String, LoweredOutput>> = BTreeMap::new();
    let mut state_map: BTreeMap<StableStateId, StateBinding> = BTreeMap::new();
    let mut next_state_slot: u32 = 0;
    let mut next_event_slot: u32 = 0;
    let mut event_count: u32 = 0;
    let mut write_queue: Vec<QueuedStateWrite> = Vec::new();
    let mut schedule_builder = ScheduleBuilder::new();

    let mut slot_meta: BTreeMap<ValueSlot, SlotMeta> = BTreeMap::new();
    let mut field_entries: BTreeMap<ValueSlot, FieldSlotEntry> = BTreeMap::new();
    let mut outputs: BTreeMap<String, ValueSlot> = BTreeMap::new();
    let mut step_to_block: BTreeMap<usize, String> = BTreeMap::new();
    let mut slot_to_block: BTreeMap<ValueSlot, String> = BTreeMap::new();
    let mut slot_to_port: BTreeMap<ValueSlot, String> = BTreeMap::new();
    let mut block_map: BTreeMap<String, String> = BTreeMap::new();
    let mut block_display_names: BTreeMap<String, String> = BTreeMap::new();
    let mut phase_one_index: usize = 0;

    for block_id in &order {
        let Some(instance) = patch.blocks.get(block_id) else {
            continue;
        };
        let Some(block_def) = registry.get(&instance.type_name) else {
            diagnostics.push(
                "UnknownBlockType",
                Severity::Error,
                "unknown block type",
                format!(
                    "block {block_id} has unregistered type {:?}",
                    instance.type_name
                ),
                TargetRef::Block {
                    block_id: block_id.clone(),
                },
            );
            continue;
        };

        tracing::debug!(block_id, type_name = block_def.type_name(), "lowering block");
        block_map.insert(block_id.clone(), block_def.type_name().to_string());
        block_display_names.insert(block_id.clone(), block_def.label().to_string());

        let (lowered_inputs, inputs_ok) = resolve_inputs(
            block_id,
            block_def.inputs(),
            instance,
            &outputs_by_block,
            &mut arena,
            &mut diagnostics,
        );
        if !inputs_ok {
            continue;
        }

        let lowered = match block_def.lower(&mut arena, &lowered_inputs) {
            Ok(result) => result,
            Err(message) => {
                tracing::warn!(block_id, %message, "block failed to lower");
                diagnostics.push(
                    "LoweringFailed",
                    Severity::Error,
                    "block failed to lower",
                    format!("{block_id}: {message}"),
                    TargetRef::Block {
                        block_id: block_id.clone(),
                    },
                );
                continue;
            }
        };

        let bind_result = bind_effects(
            &lowered.effects,
            existing_state,
            &mut arena,
            &mut next_state_slot,
            &mut diagnostics,
        );
        apply_binding(&mut arena, &bind_result, &mut write_queue);
        for (key, binding) in &bind_result.state_map {
            state_map.insert(key.clone(), *binding);
        }

        let slot_map = match bind_outputs(
            block_id,
            &lowered,
            block_def.lowering_purity(),
            &mut arena,
            &mut diagnostics,
        ) {
            Ok(map) => map,
            Err(()) => continue,
        };

        let mut final_outputs: BTreeMap<String, LoweredOutput> = BTreeMap::new();
        for (port_id, mut output) in lowered.outputs_by_id.clone() {
            if output.slot.is_none() {
                output.slot = slot_map.get(&port_id).copied();
            }
            final_outputs.insert(port_id, output);
        }

        for (port_id, output) in &final_outputs {
            let Some(slot) = output.slot else {
                continue;
            };
            slot_to_block.insert(slot, block_id.clone());
            slot_to_port.insert(slot, port_id.clone());
            outputs.insert(format!("{block_id}:{port_id}"), slot);

            let ty = arena.node(output.id).ty.clone();
            let extent = ty.extent.clone();

            if extent.is_event() {
                let event_slot = ValueSlot(next_event_slot);
                next_event_slot += 1;
                event_count += 1;
                let strategy = if extent.is_field() {
                    EvalStrategy::DiscreteField
                } else {
                    EvalStrategy::DiscreteScalar
                };
                schedule_builder.push(Step::EvalValue {
                    target: SlotTarget {
                        storage: Storage::U32,
                        slot: event_slot,
                    },
                    expr: output.id,
                    strategy,
                });
                slot_meta.insert(
                    event_slot,
                    SlotMeta {
                        slot: event_slot,
                        storage: Storage::U32,
                        stride: 1,
                        ty,
                    },
                );
            } else if extent.is_field() {
                let Cardinality::Many(instance_ref) = &extent.cardinality else {
                    unreachable!("is_field implies Many cardinality")
                };
                let instance_id = instance_ref.instance_id().to_string();
                schedule_builder.push(Step::Materialize {
                    field: output.id,
                    instance_id: instance_id.clone(),
                    target: slot,
                });
                slot_meta.insert(
                    slot,
                    SlotMeta {
                        slot,
                        storage: Storage::Object,
                        stride: output.stride,
                        ty,
                    },
                );
                field_entries.insert(
                    slot,
                    FieldSlotEntry {
                        instance_id,
                        stride: output.stride,
                    },
                );
            } else if output.stride <= 1 {
                schedule_builder.push(Step::EvalValue {
                    target: SlotTarget {
                        storage: Storage::F64,
                        slot,
                    },
                    expr: output.id,
                    strategy: EvalStrategy::ContinuousScalar,
                });
                slot_meta.insert(
                    slot,
                    SlotMeta {
                        slot,
                        storage: Storage::F64,
                        stride: output.stride,
                        ty,
                    },
                );
            } else {
                let component_ty = CanonicalType::signal(Payload::Float, Unit::None, None)
                    .expect("float payload with no unit is always a legal pairing");
                let mut components = Vec::with_capacity(output.stride);
                for component_index in 0..output.stride {
                    match weft_block_api::IrBuilder::extract(
                        &mut arena,
                        output.id,
                        component_index,
                        component_ty.clone(),
                    ) {
                        Ok(id) => components.push(id),
                        Err(err) => diagnostics.push(
                            "ExtractFailed",
                            Severity::Fatal,
                            "could not decompose a multi-component output",
                            format!("{block_id}.{port_id}: {err}"),
                            TargetRef::Port {
                                block_id: block_id.clone(),
                                port_id: port_id.clone(),
                            },
                        ),
                    }
                }
                schedule_builder.push(Step::SlotWriteStrided {
                    slot_base: slot,
                    inputs: components,
                });
                slot_meta.insert(
                    slot,
                    SlotMeta {
                        slot,
                        storage: Storage::F64,
                        stride: output.stride,
                        ty,
                    },
                );
            }
            step_to_block.insert(phase_one_index, block_id.clone());
            phase_one_index += 1;
        }

        outputs_by_block.insert(block_id.clone(), final_outputs);
    }

    if diagnostics.has_errors() {
        tracing::warn!(error_count = diagnostics.as_slice().len(), "compile failed");
        return CompileOutcome::Error(diagnostics.into_vec());
    }

    let schedule = schedule_builder.build(
        &write_queue,
        &state_map,
        next_state_slot,
        next_event_slot,
        event_count,
        time_model,
        patch.instance_domains.clone(),
    );
    tracing::debug!(
        step_count = schedule.steps.len(),
        instance_count = schedule.instances.len(),
        "compile finished"
    );

    CompileOutcome::Ok(CompiledProgram {
        arena,
        schedule,
        slot_meta,
        field_slot_registry: FieldSlotRegistry {
            entries: field_entries,
        },
        outputs,
        debug_index: DebugIndex {
            step_to_block,
            slot_to_block,
            slot_to_port,
            block_map,
            block_display_names,
        },
        diagnostics: diagnostics.into_vec(),
    })
}

/// Resolves one block's declared input ports against its patch wiring,
/// returning the concrete [`LoweredInput`]s `lower` is called with.
///
/// Connected ports read the upstream block's already-bound output straight
/// out of the arena; disconnected ports synthesize a constant from the
/// port's declared default. Returns `(_, false)` if any port failed to
/// resolve, in which case a diagnostic was already pushed and the block
/// must be skipped rather than lowered with partial inputs.
fn resolve_inputs(
    block_id: &str,
    input_specs: &BTreeMap<String, InputPortSpec>,
    instance: &crate::patch::PatchBlockInstance,
    outputs_by_block: &BTreeMap<String, BTreeMap<String, LoweredOutput>>,
    arena: &mut IrArena,
    diagnostics: &mut DiagnosticSink,
) -> (BTreeMap<String, LoweredInput>, bool) {
    let mut local_subst = Substitution::empty();
    let mut lowered_inputs = BTreeMap::new();
    let mut ok = true;

    for (port_id, spec) in input_specs {
        let source = instance
            .inputs
            .get(port_id)
            .cloned()
            .unwrap_or(InputSource::Disconnected);

        match source {
            InputSource::Connected {
                block_id: up_block,
                port_id: up_port,
            } => {
                let upstream_output = outputs_by_block
                    .get(&up_block)
                    .and_then(|outputs| outputs.get(&up_port));
                let Some(upstream_output) = upstream_output else {
                    diagnostics.push(
                        "UnresolvedConnection",
                        Severity::Error,
                        "connection targets an output that was never bound",
                        format!(
                            "{block_id}.{port_id} connects to {up_block}.{up_port}, which \
                             produced no output (its block may have failed to lower)"
                        ),
                        TargetRef::Port {
                            block_id: block_id.to_string(),
                            port_id: port_id.clone(),
                        },
                    );
                    ok = false;
                    continue;
                };

                let concrete = arena.node(upstream_output.id).ty.clone();
                if let Err(reason) = unify_into(&spec.ty, &concrete, &mut local_subst) {
                    diagnostics.push(
                        "TypeMismatch",
                        Severity::Error,
                        "connected types do not unify",
                        format!("{block_id}.{port_id}: {reason}"),
                        TargetRef::Port {
                            block_id: block_id.to_string(),
                            port_id: port_id.clone(),
                        },
                    );
                    ok = false;
                    continue;
                }
                if !contracts_compatible(concrete.contract, spec.ty.contract) {
                    diagnostics.push(
                        "ContractMismatch",
                        Severity::Error,
                        "declared contract not satisfied",
                        format!(
                            "{block_id}.{port_id} requires {:?}, upstream declares {:?}",
                            spec.ty.contract, concrete.contract
                        ),
                        TargetRef::Port {
                            block_id: block_id.to_string(),
                            port_id: port_id.clone(),
                        },
                    );
                    ok = false;
                    continue;
                }

                lowered_inputs.insert(
                    port_id.clone(),
                    LoweredInput {
                        id: upstream_output.id,
                        stride: upstream_output.stride,
                        ty: concrete,
                    },
                );
            }
            InputSource::Disconnected => {
                let (value, ty) = default_for_port(block_id, port_id, spec, &local_subst, diagnostics);
                let stride = ty.payload.stride();
                let id = weft_block_api::IrBuilder::constant(arena, value, ty.clone());
                lowered_inputs.insert(port_id.clone(), LoweredInput { id, stride, ty });
            }
        }
    }

    (lowered_inputs, ok)
}

fn unify_into(
    ict: &InferenceCanonicalType,
    concrete: &CanonicalType,
    subst: &mut Substitution,
) -> Result<(), String> {
    unify_axis(&ict.payload, &concrete.payload, &mut subst.payload).map_err(|e| format!("payload: {e}"))?;
    unify_axis(&ict.unit, &concrete.unit, &mut subst.unit).map_err(|e| format!("unit: {e}"))?;
    unify_cardinality(
        &ict.extent.cardinality,
        &concrete.extent.cardinality,
        &mut subst.cardinality,
    )
    .map_err(|e| format!("cardinality: {e}"))?;
    unify_axis(
        &ict.extent.temporality,
        &concrete.extent.temporality,
        &mut subst.temporality,
    )
    .map_err(|e| format!("temporality: {e}"))?;
    unify_axis(&ict.extent.binding, &concrete.extent.binding, &mut subst.binding)
        .map_err(|e| format!("binding: {e}"))?;
    unify_axis(
        &ict.extent.perspective,
        &concrete.extent.perspective,
        &mut subst.perspective,
    )
    .map_err(|e| format!("perspective: {e}"))?;
    unify_axis(&ict.extent.branch, &concrete.extent.branch, &mut subst.branch)
        .map_err(|e| format!("branch: {e}"))?;
    Ok(())
}

fn unify_axis<T: Clone + PartialEq + fmt::Debug>(
    axis: &AxisValue<T>,
    concrete: &T,
    map: &mut BTreeMap<VarId, T>,
) -> Result<(), String> {
    match axis {
        AxisValue::Inst(expected) => {
            if expected == concrete {
                Ok(())
            } else {
                Err(format!("expected {expected:?}, found {concrete:?}"))
            }
        }
        AxisValue::Var(id) => match map.get(id) {
            Some(existing) if existing == concrete => Ok(()),
            Some(existing) => Err(format!("{id} resolves to both {existing:?} and {concrete:?}")),
            None => {
                map.insert(*id, concrete.clone());
                Ok(())
            }
        },
    }
}

/// Cardinality's zero case is the universal donor (I-3 edge policy): a
/// compile-time constant unifies with any consumer cardinality without
/// binding the consumer's variable.
fn unify_cardinality(
    axis: &AxisValue<Cardinality>,
    concrete: &Cardinality,
    map: &mut BTreeMap<VarId, Cardinality>,
) -> Result<(), String> {
    if matches!(concrete, Cardinality::Zero) {
        return Ok(());
    }
    unify_axis(axis, concrete, map)
}

fn fallback_unit(payload: Payload) -> Unit {
    match payload {
        Payload::Color => Unit::Color(ColorEncoding::Rgba01),
        _ => Unit::None,
    }
}

fn zero_for_payload(payload: Payload) -> ConstValue {
    match payload {
        Payload::Float => ConstValue::Float(0.0),
        Payload::Int => ConstValue::Int(0),
        Payload::Bool => ConstValue::Bool(false),
        Payload::Vec2 => ConstValue::Vec2([0.0, 0.0]),
        Payload::Vec3 => ConstValue::Vec3([0.0, 0.0, 0.0]),
        Payload::Color => ConstValue::Color([0.0, 0.0, 0.0, 1.0]),
        Payload::CameraProjection => ConstValue::CameraProjection(0),
    }
}

fn default_for_port(
    block_id: &str,
    port_id: &str,
    spec: &InputPortSpec,
    subst: &Substitution,
    diagnostics: &mut DiagnosticSink,
) -> (ConstValue, CanonicalType) {
    let payload = match &spec.ty.payload {
        AxisValue::Inst(p) => *p,
        AxisValue::Var(id) => subst.payload.get(id).copied().unwrap_or(Payload::Float),
    };
    let declared_unit = match &spec.ty.unit {
        AxisValue::Inst(u) => Some(*u),
        AxisValue::Var(id) => subst.unit.get(id).copied(),
    };
    let unit = declared_unit.unwrap_or_else(|| fallback_unit(payload));

    let ty = CanonicalType::constant(payload, unit, spec.ty.contract).unwrap_or_else(|_| {
        diagnostics.push(
            "IllegalDefaultType",
            Severity::Warn,
            "default port type falls back to an untyped pairing",
            format!(
                "{block_id}.{port_id}: unit {unit:?} is not legal for payload {payload:?}; \
                 falling back to this payload's bare unit"
            ),
            TargetRef::Port {
                block_id: block_id.to_string(),
                port_id: port_id.to_string(),
            },
        );
        CanonicalType::constant(payload, fallback_unit(payload), None)
            .expect("fallback_unit always pairs legally with its payload")
    });

    let value = match &spec.default_source {
        Some(DefaultSource::Const(v)) => *v,
        Some(DefaultSource::Zero) | None => zero_for_payload(payload),
    };
    (value, ty)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn unify_axis_accepts_matching_concrete_instance() {
        let mut map = BTreeMap::new();
        let axis = AxisValue::Inst(Payload::Float);
        assert!(unify_axis(&axis, &Payload::Float, &mut map).is_ok());
    }

    #[test]
    fn unify_axis_rejects_mismatched_instance() {
        let mut map = BTreeMap::new();
        let axis = AxisValue::Inst(Payload::Float);
        assert!(unify_axis(&axis, &Payload::Int, &mut map).is_err());
    }

    #[test]
    fn unify_axis_binds_then_checks_variable_consistency() {
        let mut map = BTreeMap::new();
        let axis = AxisValue::Var(VarId(1));
        assert!(unify_axis(&axis, &Payload::Float, &mut map).is_ok());
        assert!(unify_axis(&axis, &Payload::Float, &mut map).is_ok());
        assert!(unify_axis(&axis, &Payload::Int, &mut map).is_err());
    }

    #[test]
    fn zero_cardinality_is_a_universal_donor() {
        let mut map = BTreeMap::new();
        let axis = AxisValue::Var(VarId(1));
        assert!(unify_cardinality(&axis, &Cardinality::Zero, &mut map).is_ok());
        assert!(map.is_empty());
    }

    #[test]
    fn default_for_port_uses_const_default_source_when_present() {
        let spec = InputPortSpec {
            label: "x".to_string(),
            ty: weft_types::infer::canonical_type(
                CanonicalType::signal(Payload::Float, Unit::None, None).expect("legal"),
            ),
            default_source: Some(DefaultSource::Const(ConstValue::Float(3.5))),
            ui_hint: None,
        };
        let mut diags = DiagnosticSink::new();
        let (value, ty) = default_for_port("B", "x", &spec, &Substitution::empty(), &mut diags);
        assert_eq!(value, ConstValue::Float(3.5));
        assert_eq!(ty.payload, Payload::Float);
        assert!(diags.as_slice().is_empty());
    }
}
