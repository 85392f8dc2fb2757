// SPDX-License-Identifier: Apache-2.0
//! Assembles a deterministic two-phase frame program from lowered,
//! bound blocks.
//!
//! The `ValueExpr` arena is append-only and every constructor takes its
//! operands as already-minted ids (`crate::ir::IrArena`): a node can never
//! reference an id greater than its own. That invariant means arena order
//! is already a valid topological order of the data-dependency graph — the
//! scheduler does not need to re-derive one with an explicit graph
//! traversal. What it does need to do is separate Phase 1 (reads, compute,
//! render assembly) from Phase 2 (state writes), and order the *requests*
//! for each within a frame deterministically.

use weft_types::{StableStateId, StateSlot, ValueExprId, ValueSlot};

use crate::binding::{QueuedStateWrite, StateBinding};
use crate::ir::TopologyId;

/// Which evaluation strategy an `evalValue` step uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStrategy {
    /// Scalar, re-evaluated every frame.
    ContinuousScalar = 0,
    /// Field, re-evaluated every frame.
    ContinuousField = 1,
    /// Scalar, evaluated as an event predicate.
    DiscreteScalar = 2,
    /// Field, evaluated as an event predicate per lane.
    DiscreteField = 3,
}

/// What kind of storage array a slot lives in.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// `ProgramState.values.f64`.
    F64,
    /// `ProgramState.values.f32` (materialized field buffers).
    F32,
    /// `ProgramState.values.i32`.
    I32,
    /// `ProgramState.values.u32`.
    U32,
    /// `ProgramState.values.objects` (field buffers, `RenderFrameIR`).
    Object,
    /// `ProgramState.values.shape2d` (fixed 8-word packed record).
    Shape2d,
}

/// A typed storage destination.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTarget {
    /// Which array the slot lives in.
    pub storage: Storage,
    /// The slot's storage index.
    pub slot: ValueSlot,
}

/// A 2D style reference used by `render` steps.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleRef(pub u32);

/// The shape a `render` step draws, either a fixed primitive topology or a
/// dynamic path driven by a control-point field.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeSelector {
    /// A fixed primitive topology (no per-frame geometry recompute).
    Primitive(TopologyId),
    /// A dynamic path topology whose control points are field-valued.
    DynamicPath {
        /// The path's topology id.
        topology_id: TopologyId,
        /// Slot holding the control-point field buffer.
        control_points: ValueSlot,
    },
}

/// One step in the compiled frame program.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub enum Step {
    /// Evaluates `expr` and writes it to `target` using `strategy`.
    EvalValue {
        /// Destination.
        target: SlotTarget,
        /// Expression to evaluate.
        expr: ValueExprId,
        /// How to evaluate it.
        strategy: EvalStrategy,
    },
    /// Writes `inputs.len()` scalar expressions into contiguous positions
    /// starting at `slot_base`.
    SlotWriteStrided {
        /// First destination slot.
        slot_base: ValueSlot,
        /// Per-component scalar expressions, in stride order.
        inputs: Vec<ValueExprId>,
    },
    /// Materializes a field expression into a pooled buffer.
    Materialize {
        /// The field-extent expression to materialize.
        field: ValueExprId,
        /// The instance whose lane count drives materialization.
        instance_id: String,
        /// Destination object slot for the resulting buffer.
        target: ValueSlot,
    },
    /// Writes a scalar value into persistent state (Phase 2 only).
    StateWrite {
        /// Destination state slot.
        state_slot: StateSlot,
        /// Expression to evaluate and store.
        value_expr: ValueExprId,
    },
    /// Writes a field value into persistent state (Phase 2 only).
    FieldStateWrite {
        /// First destination state lane.
        state_slot: StateSlot,
        /// Expression to evaluate and store.
        value_expr: ValueExprId,
    },
    /// Ensures a continuity mapping exists for an instance before its first
    /// field consumer runs this frame.
    ContinuityMapBuild {
        /// The instance to build a mapping for.
        instance_id: String,
    },
    /// Applies continuity smoothing between a field producer and a
    /// stateful consumer.
    ContinuityApply {
        /// The smoothing policy's name (interpreted by the continuity engine).
        policy: String,
        /// Source buffer slot.
        base_slot: ValueSlot,
        /// Destination buffer slot.
        output_slot: ValueSlot,
    },
    /// Assembles one render instance group into the frame's draw list.
    Render {
        /// The instance being drawn.
        instance_id: String,
        /// Position field slot.
        position_slot: ValueSlot,
        /// Color field slot.
        color_slot: ValueSlot,
        /// Which topology and, if dynamic, control points.
        shape: ShapeSelector,
        /// Optional per-lane scale field slot.
        scale: Option<ValueSlot>,
    },
}

/// `timeModel` as recorded on the schedule: how `t_ms` advances and repeats.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeModel {
    /// Unbounded, monotonically increasing.
    Infinite,
    /// Two independent cyclic phases, periods in milliseconds.
    Cyclic {
        /// First phase's period.
        period_a_ms: f64,
        /// Second phase's period.
        period_b_ms: f64,
    },
    /// A bounded run with clamped progress, optionally still cyclic.
    Finite {
        /// Total duration in milliseconds.
        duration_ms: f64,
        /// First phase's period, if any.
        period_a_ms: Option<f64>,
        /// Second phase's period, if any.
        period_b_ms: Option<f64>,
    },
}

/// How one `StableStateId` maps onto persistent storage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMapping {
    /// A single scalar lane.
    Scalar {
        /// The lane's index.
        slot_index: u32,
    },
    /// A contiguous run of lanes.
    Field {
        /// First lane's index.
        slot_start: u32,
        /// Number of lanes.
        lane_count: u32,
    },
}

/// The compiled, deterministic two-phase frame program.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct ScheduleIR {
    /// Phase 1 steps followed by Phase 2 steps, in execution order.
    pub steps: Vec<StepSlot>,
    /// Every field instance referenced by this schedule.
    pub instances: Vec<String>,
    /// Stable state id to storage mapping.
    pub state_mappings: std::collections::BTreeMap<StableStateId, StateMapping>,
    /// Number of `f64` state lanes allocated.
    pub state_slot_count: u32,
    /// Number of event scalar slots allocated.
    pub event_slot_count: u32,
    /// Number of distinct event expressions tracked.
    pub event_count: u32,
    /// How time advances for this program.
    pub time_model: Option<TimeModel>,
    /// Element count of each instance domain, keyed by instance id. An
    /// instance absent here has zero lanes.
    pub instance_domains: std::collections::BTreeMap<String, u32>,
}

/// A step tagged with which phase it belongs to, preserving the contract
/// that Phase 1 always fully precedes Phase 2.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reads, compute, render assembly.
    One,
    /// State writes.
    Two,
}

/// One scheduled step plus its phase tag.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct StepSlot {
    /// Which phase this step executes in.
    pub phase: Phase,
    /// The step itself.
    pub step: Step,
}

/// Accumulates Phase 1 requests during the compiler walk, then assembles
/// them with the binding pass's queued Phase 2 writes into a [`ScheduleIR`].
///
/// Requests are appended in the order the compiler frontend discovers them
/// (patch topological order, then lexical port order within a block); that
/// insertion order is preserved verbatim as step order, which already
/// reflects the right tie-break once block/port ordering is fixed upstream.
#[derive(Debug, Default)]
pub struct ScheduleBuilder {
    phase_one: Vec<Step>,
    instances: Vec<String>,
}

impl ScheduleBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one Phase 1 step.
    pub fn push(&mut self, step: Step) {
        if let Step::Materialize { instance_id, .. } | Step::Render { instance_id, .. } = &step {
            if !self.instances.contains(instance_id) {
                self.instances.push(instance_id.clone());
            }
        }
        self.phase_one.push(step);
    }

    /// Finalizes the schedule, appending `writes` as Phase 2 and recording
    /// the binding pass's resolved state map and slot counts.
    #[must_use]
    pub fn build(
        self,
        writes: &[QueuedStateWrite],
        state_map: &std::collections::BTreeMap<StableStateId, StateBinding>,
        state_slot_count: u32,
        event_slot_count: u32,
        event_count: u32,
        time_model: TimeModel,
        instance_domains: std::collections::BTreeMap<String, u32>,
    ) -> ScheduleIR {
        let mut steps: Vec<StepSlot> = self
            .phase_one
            .into_iter()
            .map(|step| StepSlot {
                phase: Phase::One,
                step,
            })
            .collect();

        let field_slots: std::collections::BTreeSet<StateSlot> = state_map
            .values()
            .filter(|binding| matches!(binding.kind, crate::binding::StateKind::Field { .. }))
            .map(|binding| binding.state_slot)
            .collect();

        steps.extend(writes.iter().map(|w| StepSlot {
            phase: Phase::Two,
            step: if field_slots.contains(&w.state_slot) {
                Step::FieldStateWrite {
                    state_slot: w.state_slot,
                    value_expr: w.value,
                }
            } else {
                Step::StateWrite {
                    state_slot: w.state_slot,
                    value_expr: w.value,
                }
            },
        }));

        let state_mappings = state_map
            .iter()
            .map(|(key, binding)| {
                let mapping = match binding.kind {
                    crate::binding::StateKind::Scalar => StateMapping::Scalar {
                        slot_index: binding.state_slot.0,
                    },
                    crate::binding::StateKind::Field {
                        slot_start,
                        lane_count,
                    } => StateMapping::Field {
                        slot_start,
                        lane_count,
                    },
                };
                (key.clone(), mapping)
            })
            .collect();

        ScheduleIR {
            steps,
            instances: self.instances,
            state_mappings,
            state_slot_count,
            event_slot_count,
            event_count,
            time_model: Some(time_model),
            instance_domains,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn phase_one_precedes_phase_two_always() {
        let mut builder = ScheduleBuilder::new();
        builder.push(Step::EvalValue {
            target: SlotTarget {
                storage: Storage::F64,
                slot: ValueSlot(0),
            },
            expr: ValueExprId(0),
            strategy: EvalStrategy::ContinuousScalar,
        });
        let writes = vec![QueuedStateWrite {
            state_slot: StateSlot(0),
            value: ValueExprId(0),
        }];
        let schedule = builder.build(
            &writes,
            &std::collections::BTreeMap::new(),
            1,
            0,
            0,
            TimeModel::Infinite,
            std::collections::BTreeMap::new(),
        );
        let first_two_idx = schedule
            .steps
            .iter()
            .position(|s| s.phase == Phase::Two)
            .expect("phase two present");
        assert!(schedule.steps[..first_two_idx]
            .iter()
            .all(|s| s.phase == Phase::One));
        assert!(schedule.steps[first_two_idx..]
            .iter()
            .all(|s| s.phase == Phase::Two));
    }

    #[test]
    fn instances_are_recorded_once_in_first_seen_order() {
        let mut builder = ScheduleBuilder::new();
        builder.push(Step::Materialize {
            field: ValueExprId(0),
            instance_id: "points".to_string(),
            target: ValueSlot(0),
        });
        builder.push(Step::Materialize {
            field: ValueExprId(1),
            instance_id: "points".to_string(),
            target: ValueSlot(1),
        });
        builder.push(Step::Materialize {
            field: ValueExprId(2),
            instance_id: "rays".to_string(),
            target: ValueSlot(2),
        });
        let schedule = builder.build(
            &[],
            &std::collections::BTreeMap::new(),
            0,
            0,
            0,
            TimeModel::Infinite,
            std::collections::BTreeMap::new(),
        );
        assert_eq!(schedule.instances, vec!["points", "rays"]);
    }

    proptest! {
        /// Invariant 7: for any number of Phase 1 steps and Phase 2 writes,
        /// the assembled schedule never interleaves them.
        #[test]
        fn phase_one_always_precedes_phase_two(eval_count in 0usize..12, write_count in 0usize..12) {
            let mut builder = ScheduleBuilder::new();
            for i in 0..eval_count {
                builder.push(Step::EvalValue {
                    target: SlotTarget {
                        storage: Storage::F64,
                        slot: ValueSlot(i as u32),
                    },
                    expr: ValueExprId(i as u32),
                    strategy: EvalStrategy::ContinuousScalar,
                });
            }
            let writes: Vec<QueuedStateWrite> = (0..write_count)
                .map(|i| QueuedStateWrite {
                    state_slot: StateSlot(i as u32),
                    value: ValueExprId(i as u32),
                })
                .collect();
            let schedule = builder.build(
                &writes,
                &std::collections::BTreeMap::new(),
                write_count as u32,
                0,
                0,
                TimeModel::Infinite,
                std::collections::BTreeMap::new(),
            );
            let first_two_idx = schedule
                .steps
                .iter()
                .position(|s| s.phase == Phase::Two)
                .unwrap_or(schedule.steps.len());
            prop_assert!(schedule.steps[..first_two_idx].iter().all(|s| s.phase == Phase::One));
            prop_assert!(schedule.steps[first_two_idx..].iter().all(|s| s.phase == Phase::Two));
            prop_assert_eq!(schedule.steps.len(), eval_count + write_count);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn schedule_ir_round_trips_through_json_fixture() {
        let mut builder = ScheduleBuilder::new();
        builder.push(Step::EvalValue {
            target: SlotTarget {
                storage: Storage::F64,
                slot: ValueSlot(0),
            },
            expr: ValueExprId(0),
            strategy: EvalStrategy::ContinuousScalar,
        });
        let mut instance_domains = std::collections::BTreeMap::new();
        instance_domains.insert("points".to_string(), 4);
        let schedule = builder.build(
            &[],
            &std::collections::BTreeMap::new(),
            0,
            0,
            0,
            TimeModel::Infinite,
            instance_domains,
        );

        // Authoring-tool fixture round-trip only; never the canonical hash path.
        let json = serde_json::to_string(&schedule).expect("serialize schedule");
        let restored: ScheduleIR = serde_json::from_str(&json).expect("deserialize schedule");
        assert_eq!(restored.steps.len(), schedule.steps.len());
        assert_eq!(restored.instance_domains, schedule.instance_domains);
    }
}
