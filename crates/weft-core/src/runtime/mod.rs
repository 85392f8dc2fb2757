// SPDX-License-Identifier: Apache-2.0
//! The frame-by-frame executor: per-frame protocol, signal/event
//! evaluation, and the session/program state split that supports hot-swap.

pub mod event_eval;
pub mod materializer;
pub mod render_assembly;
pub mod time;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use weft_types::{Cardinality, ConstValue, StableStateId, StateSlot, ValueExprId, ValueSlot};

use crate::binding::{StateBinding, StateKind};
use crate::ir::{IrArena, KernelOp, ValueExprKind};
use crate::schedule::{EvalStrategy, Phase, ScheduleIR, SlotTarget, Step, Storage};
use event_eval::EventEvaluator;
use materializer::{BufferPool, FieldContext};
use time::{resolve_time, ResolvedTime, TimeState};

/// External input channels, double-buffered: writers stage at any time;
/// the executor commits staging into committed exactly once per frame.
#[derive(Debug, Default)]
pub struct ExternalChannels {
    staging: FxHashMap<String, f64>,
    committed: FxHashMap<String, f64>,
}

impl ExternalChannels {
    /// Stages a value for `name`, visible only after the next [`Self::commit`].
    pub fn stage(&mut self, name: impl Into<String>, value: f64) {
        self.staging.insert(name.into(), value);
    }

    /// Copies every staged value into the committed map.
    pub fn commit(&mut self) {
        for (k, v) in self.staging.drain() {
            self.committed.insert(k, v);
        }
    }

    /// Reads `name`'s committed value, `0.0` if unknown.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.committed.get(name).copied().unwrap_or(0.0)
    }
}

/// Aggregated, per-frame health counters a host can poll for diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct Health {
    /// Estimated frames per second over a recent window.
    pub fps_estimate: f64,
    /// Rolling average frame time, milliseconds.
    pub avg_frame_ms: f64,
    /// Field materializations performed this frame.
    pub field_materializations: u64,
    /// NaN occurrences observed this frame.
    pub nan_count: u64,
    /// Infinity occurrences observed this frame.
    pub inf_count: u64,
}

/// Smoothing weight toward the previous frame's value for any continuity
/// policy other than `none`.
const CONTINUITY_SMOOTHING_ALPHA: f32 = 0.35;

/// Continuity engine state: per-instance domain-size bookkeeping that
/// survives hot-swap, plus the previous frame's output per smoothed slot.
#[derive(Debug, Default)]
pub struct Continuity {
    prev_domains: FxHashMap<String, usize>,
    built_this_frame: std::collections::HashSet<String>,
    prev_values: FxHashMap<u32, materializer::TypedBuffer>,
}

impl Continuity {
    /// Builds (or confirms) a continuity mapping for `instance_id` this
    /// frame, recording the observed domain size for next frame's compare.
    pub fn build_map(&mut self, instance_id: &str, lane_count: usize) {
        if self.built_this_frame.insert(instance_id.to_string()) {
            self.prev_domains.insert(instance_id.to_string(), lane_count);
        }
    }

    /// Clears the per-frame "already built" set; domain history persists.
    pub fn finalize_frame(&mut self) {
        self.built_this_frame.clear();
    }

    /// Materializes a smoothed buffer from `base` into a pool-allocated
    /// output, reusing `output_slot`'s previous-frame value. `policy=="none"`
    /// (or empty) is an explicit pass-through copy; any other policy name
    /// lerps each lane toward last frame's value at a fixed rate, falling
    /// back to a copy when there is no prior buffer of matching length.
    pub fn apply(
        &mut self,
        policy: &str,
        output_slot: ValueSlot,
        base: &materializer::TypedBuffer,
        pool: &mut materializer::BufferPool,
    ) -> materializer::TypedBuffer {
        let mut out = pool.alloc(base.format, base.count);
        let prior = self.prev_values.get(&output_slot.0);
        let wants_smoothing = !policy.is_empty() && policy != "none";
        match prior {
            Some(prior) if wants_smoothing && prior.data.len() == base.data.len() => {
                for (i, o) in out.data.iter_mut().enumerate() {
                    let p = prior.data[i];
                    let b = base.data[i];
                    *o = p + (b - p) * CONTINUITY_SMOOTHING_ALPHA;
                }
            }
            _ => out.data.copy_from_slice(&base.data),
        }
        self.prev_values.insert(output_slot.0, out.clone());
        out
    }
}

/// A raw capture of this frame's materialized field buffers, for hosts that
/// want to inspect program state without going through `RenderFrameIR`
/// (editor scrubbers, golden-frame test fixtures).
#[derive(Debug, Default)]
pub struct FrameTap {
    /// Captured buffers, keyed by their object slot.
    pub buffers: BTreeMap<u32, Vec<u8>>,
}

/// Session-scoped state: survives hot-swap across recompiles.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Time model bookkeeping.
    pub time_state: TimeState,
    /// Double-buffered external input channels.
    pub external: ExternalChannels,
    /// Aggregated health counters.
    pub health: Health,
    /// Continuity engine state.
    pub continuity: Continuity,
    /// When set, `run_frame` captures every materialized field buffer's raw
    /// bytes into it this frame. `None` by default: capturing costs a copy
    /// per buffer, so hosts opt in only while a debugger view is open.
    pub tap: Option<FrameTap>,
}

/// Per-frame signal/field memoization, keyed by expression id.
#[derive(Debug, Default)]
pub struct FrameCache {
    /// Monotonically increasing frame counter.
    pub frame_id: u64,
    /// Last computed scalar value per signal expression.
    pub sig_values: FxHashMap<ValueExprId, Vec<f64>>,
    /// Frame id at which `sig_values[expr]` was last computed.
    pub sig_stamps: FxHashMap<ValueExprId, u64>,
}

/// A fixed 8-word packed record describing one drawable shape instance
/// group: which topology it draws, where its control-point field (if any)
/// lives, and its style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shape2dRecord {
    /// The topology this record draws.
    pub topology_id: u32,
    /// Object slot holding the control-point field buffer, `0` if the
    /// topology is a fixed primitive with no dynamic points.
    pub points_field_slot: u32,
    /// Lane count of the control-point buffer, `0` if there is none.
    pub points_count: u32,
    /// Style reference index.
    pub style_ref: u32,
    /// Bitflags reserved for per-record draw hints.
    pub flags: u32,
    reserved: [u32; 3],
}

/// State recreated on every successful compile; migrated by [`StableStateId`]
/// across hot-swap.
#[derive(Debug, Default)]
pub struct ProgramState {
    /// Flat `f64` value storage, indexed by [`ValueSlot`].
    pub values_f64: Vec<f64>,
    /// Object storage (materialized field buffers), indexed by [`ValueSlot`].
    pub objects: BTreeMap<u32, materializer::TypedBuffer>,
    /// Packed shape2d records, indexed by [`ValueSlot`].
    pub shape2d: BTreeMap<u32, Shape2dRecord>,
    /// This compile's signal/field cache.
    pub cache: FrameCache,
    /// Persistent state array.
    pub state: Vec<f64>,
    /// This-frame event fired flags, indexed by event slot.
    pub event_scalars: Vec<u8>,
    /// Cross-frame event cycle-detection and rising-edge bookkeeping; must
    /// survive from one `run_frame` call to the next for `wrap` to see the
    /// previous frame's predicate.
    pub event_eval: EventEvaluator,
}

impl ProgramState {
    /// A fresh program state sized for `schedule`.
    #[must_use]
    pub fn new(schedule: &ScheduleIR) -> Self {
        Self {
            values_f64: Vec::new(),
            objects: BTreeMap::new(),
            shape2d: BTreeMap::new(),
            cache: FrameCache::default(),
            state: vec![0.0; schedule.state_slot_count as usize],
            event_scalars: vec![0; schedule.event_slot_count as usize],
            event_eval: EventEvaluator::new(),
        }
    }
}

fn slot_index(slot: ValueSlot) -> usize {
    slot.0 as usize
}

fn ensure_len(v: &mut Vec<f64>, len: usize) {
    if v.len() < len {
        v.resize(len, 0.0);
    }
}

struct ScalarEvaluator<'a> {
    arena: &'a IrArena,
    program: &'a mut ProgramState,
    session: &'a SessionState,
    time: ResolvedTime,
}

impl ScalarEvaluator<'_> {
    fn eval(&mut self, id: ValueExprId) -> Vec<f64> {
        if self.program.cache.sig_stamps.get(&id) == Some(&self.program.cache.frame_id) {
            return self.program.cache.sig_values[&id].clone();
        }
        let value = self.eval_uncached(id);
        self.program.cache.sig_values.insert(id, value.clone());
        self.program.cache.sig_stamps.insert(id, self.program.cache.frame_id);
        value
    }

    fn eval_scalar(&mut self, id: ValueExprId) -> f64 {
        self.eval(id).first().copied().unwrap_or(0.0)
    }

    fn eval_uncached(&mut self, id: ValueExprId) -> Vec<f64> {
        let kind = self.arena.node(id).kind.clone();
        match kind {
            ValueExprKind::Const(value) => {
                let stride = value.payload().stride();
                (0..stride).map(|c| value.component(c).unwrap_or(0.0)).collect()
            }
            ValueExprKind::Construct { components } => {
                components.iter().map(|&c| self.eval_scalar(c)).collect()
            }
            ValueExprKind::Extract {
                input,
                component_index,
            } => {
                let v = self.eval(input);
                vec![v.get(component_index).copied().unwrap_or(0.0)]
            }
            ValueExprKind::Kernel {
                op,
                operands,
                pure_fn,
            } => vec![self.eval_kernel(&op, &operands, &pure_fn)],
            ValueExprKind::HslToRgb { input } => {
                let v = self.eval(input);
                let (h, s, l, a) = (
                    v.first().copied().unwrap_or(0.0),
                    v.get(1).copied().unwrap_or(0.0),
                    v.get(2).copied().unwrap_or(0.0),
                    v.get(3).copied().unwrap_or(1.0),
                );
                materializer::hsl_to_rgb_lane(h, s, l, a).to_vec()
            }
            ValueExprKind::SlotRead { slot } => {
                let idx = slot_index(slot);
                vec![self.program.values_f64.get(idx).copied().unwrap_or(0.0)]
            }
            ValueExprKind::State { state_slot } => {
                let idx = state_slot.0 as usize;
                vec![self.program.state.get(idx).copied().unwrap_or(0.0)]
            }
            ValueExprKind::External { channel } => vec![self.session.external.get(&channel)],
            ValueExprKind::Time { which } => vec![self.eval_time(which)],
            ValueExprKind::EventRead { event_slot } => {
                let idx = event_slot.0 as usize;
                vec![f64::from(self.program.event_scalars.get(idx).copied().unwrap_or(0))]
            }
            ValueExprKind::Intrinsic(_)
            | ValueExprKind::StatePlaceholder { .. }
            | ValueExprKind::Event { .. }
            | ValueExprKind::ShapeRef { .. } => vec![0.0],
        }
    }

    fn eval_time(&self, which: crate::ir::TimeWhich) -> f64 {
        use crate::ir::TimeWhich;
        match which {
            TimeWhich::TMs => self.time.t_ms,
            TimeWhich::Dt => self.time.dt,
            TimeWhich::PhaseA => self.time.phase_a,
            TimeWhich::PhaseB => self.time.phase_b,
            TimeWhich::Pulse => f64::from(self.time.pulse),
            TimeWhich::Energy => self.time.energy,
            TimeWhich::Palette => 0.0,
        }
    }

    fn eval_kernel(&mut self, op: &KernelOp, operands: &[ValueExprId], pure_fn: &weft_types::PureFn) -> f64 {
        match op {
            KernelOp::Map => {
                let x = self.eval_scalar(operands[0]);
                materializer::apply_pure_fn(pure_fn, &[x])
            }
            KernelOp::Zip | KernelOp::ZipSig | KernelOp::Broadcast => {
                let args: Vec<f64> = operands.iter().map(|&o| self.eval_scalar(o)).collect();
                materializer::apply_pure_fn(pure_fn, &args)
            }
            KernelOp::Reduce | KernelOp::PathDerivative { .. } => self.eval_scalar(operands[0]),
        }
    }
}

/// Migrates every `StableStateId` present in both `old_mappings`/`old_state`
/// and `new_mappings` into freshly allocated storage; entries only in the
/// new schedule are left at `initial_values`, entries only in the old are
/// dropped.
#[must_use]
pub fn migrate_state(
    old_state: &[f64],
    old_mappings: &BTreeMap<StableStateId, StateBinding>,
    new_mappings: &BTreeMap<StableStateId, StateBinding>,
    new_slot_count: u32,
    initial_values: &BTreeMap<StableStateId, ConstValue>,
) -> Vec<f64> {
    tracing::debug!(
        old_count = old_mappings.len(),
        new_count = new_mappings.len(),
        "hot-swapping state"
    );
    let mut out = vec![0.0; new_slot_count as usize];
    for (key, new_binding) in new_mappings {
        let StateKind::Scalar = new_binding.kind else {
            continue;
        };
        let value = old_mappings
            .get(key)
            .and_then(|old_binding| {
                let StateKind::Scalar = old_binding.kind else {
                    return None;
                };
                old_state.get(old_binding.state_slot.0 as usize).copied()
            })
            .or_else(|| {
                initial_values.get(key).and_then(|v| v.component(0))
            })
            .unwrap_or(0.0);
        out[new_binding.state_slot.0 as usize] = value;
    }
    out
}

/// A [`FieldContext`] backed by the schedule's real instance domain sizes
/// and this frame's live program/session state.
struct RuntimeFieldCtx<'a> {
    arena: &'a IrArena,
    program: &'a mut ProgramState,
    session: &'a SessionState,
    time: ResolvedTime,
    instance_domains: &'a BTreeMap<String, u32>,
}

impl FieldContext for RuntimeFieldCtx<'_> {
    fn lane_count(&self, instance_id: &str) -> usize {
        self.instance_domains.get(instance_id).copied().unwrap_or(0) as usize
    }

    fn eval_signal(&mut self, expr: ValueExprId) -> f64 {
        let mut evaluator = ScalarEvaluator {
            arena: self.arena,
            program: &mut *self.program,
            session: self.session,
            time: self.time,
        };
        evaluator.eval_scalar(expr)
    }

    fn read_slot(&self, slot: ValueSlot, stride: usize, count: usize) -> Vec<f32> {
        self.program
            .objects
            .get(&slot.0)
            .map(|buf| {
                let mut out = vec![0.0f32; stride * count];
                let n = out.len().min(buf.data.len());
                out[..n].copy_from_slice(&buf.data[..n]);
                out
            })
            .unwrap_or_else(|| vec![0.0; stride * count])
    }

    fn read_state(&self, state_slot: StateSlot, stride: usize, count: usize) -> Vec<f32> {
        let base = state_slot.0 as usize;
        (0..stride * count)
            .map(|i| self.program.state.get(base + i).copied().unwrap_or(0.0) as f32)
            .collect()
    }
}

/// Derives a field expression's materialization instance from its resolved
/// cardinality, the same destructuring the compiler uses when it first
/// binds a field output to its owning instance.
fn field_instance_id(arena: &IrArena, expr: ValueExprId) -> String {
    match &arena.node(expr).ty.extent.cardinality {
        Cardinality::Many(instance_ref) => instance_ref.instance_id().to_string(),
        _ => String::new(),
    }
}

/// Executes one frame of `schedule` against `session`/`program`, returning
/// the assembled render output.
///
/// Follows the protocol precisely: commit external inputs, resolve time,
/// run every Phase 1 step in order (collecting `render` steps for assembly
/// at the phase boundary), then run every Phase 2 step (state writes only).
pub fn run_frame(
    arena: &IrArena,
    schedule: &ScheduleIR,
    session: &mut SessionState,
    program: &mut ProgramState,
    t_abs_ms: f64,
) -> weft_render::RenderFrameIR {
    program.cache.frame_id += 1;
    tracing::debug!(frame_id = program.cache.frame_id, t_abs_ms, "frame start");
    session.external.commit();

    let resolved_time = resolve_time(
        t_abs_ms,
        schedule.time_model.as_ref().unwrap_or(&crate::schedule::TimeModel::Infinite),
        &mut session.time_state,
    );
    program.event_scalars.iter_mut().for_each(|v| *v = 0);

    let mut pool = BufferPool::new();
    let mut render_steps = Vec::new();

    for slot in &schedule.steps {
        if slot.phase != Phase::One {
            continue;
        }
        match &slot.step {
            Step::EvalValue {
                target,
                expr,
                strategy,
            } => execute_eval_value(
                arena,
                program,
                session,
                resolved_time,
                target,
                *expr,
                *strategy,
                &schedule.instance_domains,
                &mut pool,
            ),
            Step::SlotWriteStrided { slot_base, inputs } => {
                let mut evaluator = ScalarEvaluator {
                    arena,
                    program: &mut *program,
                    session: &*session,
                    time: resolved_time,
                };
                let values: Vec<f64> = inputs.iter().map(|&e| evaluator.eval_scalar(e)).collect();
                ensure_len(&mut program.values_f64, slot_index(*slot_base) + values.len());
                for (i, v) in values.into_iter().enumerate() {
                    program.values_f64[slot_index(*slot_base) + i] = v;
                }
            }
            Step::Materialize {
                field,
                instance_id,
                target,
            } => {
                session.health.field_materializations += 1;
                let lanes = schedule.instance_domains.get(instance_id).copied().unwrap_or(0) as usize;
                let mut ctx = RuntimeFieldCtx {
                    arena,
                    program: &mut *program,
                    session,
                    time: resolved_time,
                    instance_domains: &schedule.instance_domains,
                };
                if let Ok(buf) = materializer::materialize(arena, *field, instance_id, lanes, &mut ctx, &mut pool) {
                    if let Some(tap) = session.tap.as_mut() {
                        tap.buffers
                            .insert(target.0, bytemuck::cast_slice(&buf.data).to_vec());
                    }
                    program.objects.insert(target.0, buf);
                }
            }
            Step::ContinuityMapBuild { instance_id } => {
                let lanes = schedule.instance_domains.get(instance_id).copied().unwrap_or(0) as usize;
                session.continuity.build_map(instance_id, lanes);
            }
            Step::ContinuityApply {
                policy,
                base_slot,
                output_slot,
            } => {
                if let Some(base) = program.objects.get(&base_slot.0).cloned() {
                    let smoothed = session.continuity.apply(policy, *output_slot, &base, &mut pool);
                    program.objects.insert(output_slot.0, smoothed);
                }
            }
            Step::Render { .. } => render_steps.push(slot.step.clone()),
            Step::StateWrite { .. } | Step::FieldStateWrite { .. } => {
                unreachable!("Phase 1 never contains a state write")
            }
        }
    }

    let frame = render_assembly::assemble_frame(&render_steps, &BTreeMap::new());

    for slot in &schedule.steps {
        if slot.phase != Phase::Two {
            continue;
        }
        match &slot.step {
            Step::StateWrite {
                state_slot,
                value_expr,
            } => {
                let mut evaluator = ScalarEvaluator {
                    arena,
                    program: &mut *program,
                    session: &*session,
                    time: resolved_time,
                };
                let v = evaluator.eval_scalar(*value_expr);
                let idx = state_slot.0 as usize;
                ensure_len(&mut program.state, idx + 1);
                program.state[idx] = v;
            }
            Step::FieldStateWrite {
                state_slot,
                value_expr,
            } => {
                let instance_id = field_instance_id(arena, *value_expr);
                let lanes = schedule.instance_domains.get(&instance_id).copied().unwrap_or(0) as usize;
                let mut ctx = RuntimeFieldCtx {
                    arena,
                    program: &mut *program,
                    session,
                    time: resolved_time,
                    instance_domains: &schedule.instance_domains,
                };
                if let Ok(buf) = materializer::materialize(arena, *value_expr, &instance_id, lanes, &mut ctx, &mut pool) {
                    let base = state_slot.0 as usize;
                    ensure_len(&mut program.state, base + buf.data.len());
                    for (i, v) in buf.data.iter().enumerate() {
                        program.state[base + i] = f64::from(*v);
                    }
                }
            }
            _ => unreachable!("Phase 2 contains only state writes"),
        }
    }

    session.continuity.finalize_frame();
    tracing::debug!(
        frame_id = program.cache.frame_id,
        materializations = session.health.field_materializations,
        draw_ops = frame.ops.len(),
        "frame end"
    );
    frame
}

#[allow(clippy::too_many_arguments)]
fn execute_eval_value(
    arena: &IrArena,
    program: &mut ProgramState,
    session: &SessionState,
    time: ResolvedTime,
    target: &SlotTarget,
    expr: ValueExprId,
    strategy: EvalStrategy,
    instance_domains: &BTreeMap<String, u32>,
    pool: &mut materializer::BufferPool,
) {
    if matches!(target.storage, Storage::Shape2d) {
        write_shape2d_record(arena, program, session, time, instance_domains, pool, target.slot, expr);
        return;
    }
    match strategy {
        EvalStrategy::ContinuousScalar => {
            let mut evaluator = ScalarEvaluator {
                arena,
                program: &mut *program,
                session,
                time,
            };
            let v = evaluator.eval_scalar(expr);
            let idx = slot_index(target.slot);
            if matches!(target.storage, Storage::F64) {
                ensure_len(&mut program.values_f64, idx + 1);
                program.values_f64[idx] = v;
            }
        }
        EvalStrategy::ContinuousField => {
            // Field roots are handled by `Step::Materialize`; this arm is
            // reached only for degenerate zero-lane fields.
        }
        EvalStrategy::DiscreteScalar | EvalStrategy::DiscreteField => {
            let mut event_eval = std::mem::take(&mut program.event_eval);
            let fired = {
                let mut evaluator = ScalarEvaluator {
                    arena,
                    program: &mut *program,
                    session,
                    time,
                };
                event_eval
                    .eval(arena, expr, &mut |id| evaluator.eval_scalar(id))
                    .unwrap_or(false)
            };
            program.event_eval = event_eval;
            if fired {
                let idx = target.slot.0 as usize;
                ensure_len_u8(&mut program.event_scalars, idx + 1);
                program.event_scalars[idx] = 1;
            }
        }
    }
}

/// Writes a packed [`Shape2dRecord`] for `expr` (a `shapeRef` node) to
/// `slot`, materializing its control-point field (if any) to fill in
/// `pointsFieldSlot`/`pointsCount`.
#[allow(clippy::too_many_arguments)]
fn write_shape2d_record(
    arena: &IrArena,
    program: &mut ProgramState,
    session: &SessionState,
    time: ResolvedTime,
    instance_domains: &BTreeMap<String, u32>,
    pool: &mut materializer::BufferPool,
    slot: ValueSlot,
    expr: ValueExprId,
) {
    let ValueExprKind::ShapeRef {
        topology_id,
        control_point_field,
    } = arena.node(expr).kind.clone()
    else {
        return;
    };

    let mut points_field_slot = 0u32;
    let mut points_count = 0u32;

    if let Some(field_expr) = control_point_field {
        let instance_id = field_instance_id(arena, field_expr);
        let lanes = instance_domains.get(&instance_id).copied().unwrap_or(0) as usize;
        let mut ctx = RuntimeFieldCtx {
            arena,
            program: &mut *program,
            session,
            time,
            instance_domains,
        };
        if let Ok(buf) = materializer::materialize(arena, field_expr, &instance_id, lanes, &mut ctx, pool) {
            points_count = buf.count as u32;
            points_field_slot = field_expr.0;
            program.objects.insert(field_expr.0, buf);
        }
    }

    program.shape2d.insert(
        slot.0,
        Shape2dRecord {
            topology_id: topology_id.0,
            points_field_slot,
            points_count,
            style_ref: 0,
            flags: 0,
            reserved: [0; 3],
        },
    );
}

fn ensure_len_u8(v: &mut Vec<u8>, len: usize) {
    if v.len() < len {
        v.resize(len, 0);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use proptest::prelude::*;
    use weft_block_api::IrBuilder;
    use weft_types::{CanonicalType, Payload, Unit};

    fn float_signal() -> CanonicalType {
        CanonicalType::signal(Payload::Float, Unit::None, None).expect("legal")
    }

    #[test]
    fn phase_one_state_read_sees_previous_frame_value() {
        let mut arena = IrArena::new();
        let const_id = arena.constant(ConstValue::Float(5.0), float_signal());
        let schedule = ScheduleIR {
            steps: vec![
                crate::schedule::StepSlot {
                    phase: Phase::One,
                    step: Step::EvalValue {
                        target: SlotTarget {
                            storage: Storage::F64,
                            slot: ValueSlot(0),
                        },
                        expr: const_id,
                        strategy: EvalStrategy::ContinuousScalar,
                    },
                },
            ],
            instances: vec![],
            state_mappings: BTreeMap::new(),
            state_slot_count: 0,
            event_slot_count: 0,
            event_count: 0,
            time_model: Some(crate::schedule::TimeModel::Infinite),
            instance_domains: BTreeMap::new(),
        };
        let mut session = SessionState::default();
        let mut program = ProgramState::new(&schedule);
        let _ = run_frame(&arena, &schedule, &mut session, &mut program, 0.0);
        assert_eq!(program.values_f64[0], 5.0);
    }

    #[test]
    fn migrate_state_preserves_common_keys_and_defaults_new_ones() {
        let key_a = StableStateId::new("A", "counter");
        let key_b = StableStateId::new("B", "gauge");
        let mut old_mappings = BTreeMap::new();
        old_mappings.insert(
            key_a.clone(),
            StateBinding {
                state_slot: StateSlot(0),
                kind: StateKind::Scalar,
            },
        );
        let mut new_mappings = BTreeMap::new();
        new_mappings.insert(
            key_a.clone(),
            StateBinding {
                state_slot: StateSlot(0),
                kind: StateKind::Scalar,
            },
        );
        new_mappings.insert(
            key_b.clone(),
            StateBinding {
                state_slot: StateSlot(1),
                kind: StateKind::Scalar,
            },
        );
        let mut initial = BTreeMap::new();
        initial.insert(key_b, ConstValue::Float(7.0));
        let migrated = migrate_state(&[42.0], &old_mappings, &new_mappings, 2, &initial);
        assert_eq!(migrated[0], 42.0);
        assert_eq!(migrated[1], 7.0);
    }

    proptest::proptest! {
        /// Invariant 11: any key present in both the old and new schedule's
        /// state mappings survives a hot-swap with its old value, regardless
        /// of how many other keys are added or dropped around it.
        #[test]
        fn migrate_state_preserves_any_shared_key(
            old_value in -1000.0f64..1000.0,
            default_value in -1000.0f64..1000.0,
            dropped_count in 0u32..5,
            added_count in 0u32..5,
        ) {
            let shared_key = StableStateId::new("shared", "counter");
            let mut old_mappings = BTreeMap::new();
            old_mappings.insert(
                shared_key.clone(),
                StateBinding { state_slot: StateSlot(0), kind: StateKind::Scalar },
            );
            for i in 0..dropped_count {
                old_mappings.insert(
                    StableStateId::new("dropped", &i.to_string()),
                    StateBinding { state_slot: StateSlot(i + 1), kind: StateKind::Scalar },
                );
            }

            let mut new_mappings = BTreeMap::new();
            new_mappings.insert(
                shared_key.clone(),
                StateBinding { state_slot: StateSlot(0), kind: StateKind::Scalar },
            );
            for i in 0..added_count {
                new_mappings.insert(
                    StableStateId::new("added", &i.to_string()),
                    StateBinding { state_slot: StateSlot(i + 1), kind: StateKind::Scalar },
                );
            }

            let mut initial = BTreeMap::new();
            for i in 0..added_count {
                initial.insert(StableStateId::new("added", &i.to_string()), ConstValue::Float(default_value));
            }

            let old_state = vec![old_value; (dropped_count + 1) as usize];
            let migrated = migrate_state(&old_state, &old_mappings, &new_mappings, added_count + 1, &initial);

            prop_assert_eq!(migrated[0], old_value);
            for i in 0..added_count {
                prop_assert_eq!(migrated[(i + 1) as usize], default_value);
            }
        }
    }
}
