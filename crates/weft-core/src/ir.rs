// SPDX-License-Identifier: Apache-2.0
//! The unified `ValueExpr` arena: one flat, content-addressed table spanning
//! signal-, field-, and event-extent nodes alike.
//!
//! Every node carries its resolved [`CanonicalType`]; nothing in this module
//! looks at inference-time types. Construction goes exclusively through
//! [`IrArena`], which is both the concrete backing store and the
//! implementation of [`weft_block_api::IrBuilder`] that blocks see as
//! `&mut dyn IrBuilder` during lowering.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;
use weft_block_api::{BuildError, IrBuilder};
use weft_types::{
    CanonicalType, ConstValue, EventSlot, PureFn, StableStateId, StateSlot, ValueExprId, ValueSlot,
};

/// Which scalar field an `intrinsic{placement}` node writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementField {
    /// Normalized `uv`-style coordinate.
    Uv,
    /// Index-derived rank.
    Rank,
    /// Stable per-lane seed.
    Seed,
}

/// The spatial distribution an `intrinsic{placement}` node samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementBasis {
    /// An approximately-square grid.
    Grid,
    /// A Halton low-discrepancy sequence (bases 2 and 3).
    Halton2D,
    /// A Fermat/golden-angle spiral.
    Spiral,
    /// A deterministic pseudo-random hash of the lane index.
    Random,
}

/// A compiler-intrinsic value with no operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// A named intrinsic, e.g. `"index"`, `"normalizedIndex"`, `"randomId"`.
    Name(String),
    /// A placement-basis sample.
    Placement {
        /// Which output field this node writes.
        field: PlacementField,
        /// Which distribution to sample.
        basis: PlacementBasis,
    },
}

/// The closed set of per-lane kernels a `kernel` node may apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KernelOp {
    /// Unary per-lane application.
    Map,
    /// N-ary per-lane application over operands sharing one field extent.
    Zip,
    /// Like `zip`, but one operand is a signal broadcast against fields.
    ZipSig,
    /// Replicates a signal's value across every lane of a field.
    Broadcast,
    /// Collapses a field down to a signal.
    Reduce,
    /// Central-difference tangent or prefix-sum arc length over a path field.
    PathDerivative {
        /// Which derivative to compute.
        op: PathDerivativeOp,
        /// The path topology the derivative is computed with respect to.
        topology_id: TopologyId,
    },
}

/// Which path-derivative quantity a [`KernelOp::PathDerivative`] node computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathDerivativeOp {
    /// Central-difference tangent direction, wrapping at a closed path.
    Tangent,
    /// Prefix-sum Euclidean arc length from the path's start.
    ArcLength,
}

/// Which time-model quantity a `time` node reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWhich {
    /// Absolute milliseconds.
    TMs,
    /// Frame delta in milliseconds.
    Dt,
    /// First cyclic phase, `[0, 1)`.
    PhaseA,
    /// Second cyclic phase, `[0, 1)`.
    PhaseB,
    /// This-frame pulse flag.
    Pulse,
    /// Accumulated energy quantity.
    Energy,
    /// Reserved palette slot.
    Palette,
}

/// Which logical operator a `combine` event node applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineMode {
    /// Short-circuit logical OR.
    Any,
    /// Short-circuit logical AND.
    All,
}

/// The discriminator and operands of an `event` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fires iff `fired`, every frame (a constant event source).
    Const {
        /// Whether this event source reports fired.
        fired: bool,
    },
    /// Never fires.
    Never,
    /// Fires every frame; frame policy decides observable effect.
    Pulse {
        /// The signal this pulse is conceptually driven by (tracked for
        /// provenance; evaluation ignores its value).
        source: ValueExprId,
    },
    /// Combines multiple event inputs with [`CombineMode`].
    Combine {
        /// `Any` (OR) or `All` (AND).
        mode: CombineMode,
        /// The event-extent inputs combined.
        inputs: Vec<ValueExprId>,
    },
    /// Rising-edge detector over a NaN-safe `>= 0.5` predicate.
    Wrap {
        /// The signal-extent input whose predicate transitions are watched.
        input: ValueExprId,
    },
}

/// Opaque identifier for a render topology (a primitive or path template)
/// registered by the host application. Never interpreted by the compiler.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopologyId(pub u32);

/// The discriminated kind of one `ValueExpr` node.
///
/// `PartialEq`/`Eq`/`Hash` are implemented by hand (not derived) because
/// [`Const`](ValueExprKind::Const) embeds [`ConstValue`], whose `f64` fields
/// have no total `Eq`/`Hash`; every other variant delegates to a derived
/// comparison on its fields. Two nodes compare equal, for the purposes of
/// content-addressed deduplication, iff they are bitwise-identical constants
/// or structurally identical everywhere else — `NaN`-valued constants are
/// therefore only deduplicated against bit-identical `NaN`s, never silently
/// merged with a different payload's `NaN`.
#[derive(Debug, Clone)]
pub enum ValueExprKind {
    /// A compile-time constant.
    Const(ConstValue),
    /// A parameterless compiler intrinsic.
    Intrinsic(Intrinsic),
    /// A pure-function kernel applied over operands.
    Kernel {
        /// Which dispatch shape the materializer/evaluator uses.
        op: KernelOp,
        /// Operand expression ids, in argument order.
        operands: Vec<ValueExprId>,
        /// The function applied per lane (ignored for `PathDerivative`).
        pure_fn: PureFn,
    },
    /// Interleaves per-component fields/signals into one multi-component value.
    Construct {
        /// Component expressions, in declaration order; `len()` equals the
        /// target payload's stride.
        components: Vec<ValueExprId>,
    },
    /// Reads one component out of a multi-component value.
    Extract {
        /// The multi-component input.
        input: ValueExprId,
        /// The component index, `< input`'s payload stride.
        component_index: usize,
    },
    /// Standard HSL to RGB conversion; alpha passes through unchanged.
    HslToRgb {
        /// The HSL(A) input.
        input: ValueExprId,
    },
    /// Reads a previously written value slot.
    SlotRead {
        /// The slot to read.
        slot: ValueSlot,
    },
    /// Reads the final, bound location of persistent state.
    State {
        /// The state array index this node reads.
        state_slot: StateSlot,
    },
    /// A placeholder read of not-yet-bound persistent state.
    ///
    /// Created by [`IrArena::state_read`] during lowering, before the
    /// binding pass has assigned a concrete [`StateSlot`]. The binding pass
    /// patches this node in place via [`IrArena::patch_state_read`] once
    /// binding completes.
    StatePlaceholder {
        /// The builder-local handle this placeholder was declared against.
        slot: ValueSlot,
    },
    /// Reads an external input channel by name.
    External {
        /// The channel name.
        channel: String,
    },
    /// Reads a time-model quantity.
    Time {
        /// Which quantity.
        which: TimeWhich,
    },
    /// An event source or combinator.
    Event {
        /// The event's discriminator and operands.
        kind: EventKind,
    },
    /// Reads a previously evaluated event's fired flag for this frame.
    EventRead {
        /// The event scalar slot to read.
        event_slot: EventSlot,
    },
    /// References a render topology, optionally with dynamic control points.
    ShapeRef {
        /// The topology this shape draws.
        topology_id: TopologyId,
        /// A field of control points, for dynamic path topologies.
        control_point_field: Option<ValueExprId>,
    },
}

fn const_value_discriminant(v: &ConstValue) -> u8 {
    match v {
        ConstValue::Float(_) => 0,
        ConstValue::Int(_) => 1,
        ConstValue::Bool(_) => 2,
        ConstValue::Vec2(_) => 3,
        ConstValue::Vec3(_) => 4,
        ConstValue::Color(_) => 5,
        ConstValue::CameraProjection(_) => 6,
    }
}

fn const_value_bits_eq(a: &ConstValue, b: &ConstValue) -> bool {
    match (a, b) {
        (ConstValue::Float(x), ConstValue::Float(y)) => x.to_bits() == y.to_bits(),
        (ConstValue::Int(x), ConstValue::Int(y)) => x == y,
        (ConstValue::Bool(x), ConstValue::Bool(y)) => x == y,
        (ConstValue::Vec2(x), ConstValue::Vec2(y)) => {
            x.iter().zip(y).all(|(p, q)| p.to_bits() == q.to_bits())
        }
        (ConstValue::Vec3(x), ConstValue::Vec3(y)) => {
            x.iter().zip(y).all(|(p, q)| p.to_bits() == q.to_bits())
        }
        (ConstValue::Color(x), ConstValue::Color(y)) => {
            x.iter().zip(y).all(|(p, q)| p.to_bits() == q.to_bits())
        }
        (ConstValue::CameraProjection(x), ConstValue::CameraProjection(y)) => x == y,
        _ => false,
    }
}

fn const_value_bits_hash<H: Hasher>(v: &ConstValue, state: &mut H) {
    const_value_discriminant(v).hash(state);
    match v {
        ConstValue::Float(x) => x.to_bits().hash(state),
        ConstValue::Int(x) => x.hash(state),
        ConstValue::Bool(x) => x.hash(state),
        ConstValue::Vec2(xs) => xs.iter().for_each(|x| x.to_bits().hash(state)),
        ConstValue::Vec3(xs) => xs.iter().for_each(|x| x.to_bits().hash(state)),
        ConstValue::Color(xs) => xs.iter().for_each(|x| x.to_bits().hash(state)),
        ConstValue::CameraProjection(x) => x.hash(state),
    }
}

impl PartialEq for ValueExprKind {
    fn eq(&self, other: &Self) -> bool {
        use ValueExprKind::{
            Const, Construct, Event, EventRead, External, Extract, HslToRgb, Intrinsic, Kernel,
            ShapeRef, SlotRead, State, StatePlaceholder, Time,
        };
        match (self, other) {
            (Const(a), Const(b)) => const_value_bits_eq(a, b),
            (Intrinsic(a), Intrinsic(b)) => a == b,
            (
                Kernel {
                    op: oa,
                    operands: pa,
                    pure_fn: fa,
                },
                Kernel {
                    op: ob,
                    operands: pb,
                    pure_fn: fb,
                },
            ) => oa == ob && pa == pb && fa == fb,
            (Construct { components: a }, Construct { components: b }) => a == b,
            (
                Extract {
                    input: ia,
                    component_index: ca,
                },
                Extract {
                    input: ib,
                    component_index: cb,
                },
            ) => ia == ib && ca == cb,
            (HslToRgb { input: a }, HslToRgb { input: b }) => a == b,
            (SlotRead { slot: a }, SlotRead { slot: b }) => a == b,
            (State { state_slot: a }, State { state_slot: b }) => a == b,
            (StatePlaceholder { slot: a }, StatePlaceholder { slot: b }) => a == b,
            (External { channel: a }, External { channel: b }) => a == b,
            (Time { which: a }, Time { which: b }) => a == b,
            (Event { kind: a }, Event { kind: b }) => a == b,
            (EventRead { event_slot: a }, EventRead { event_slot: b }) => a == b,
            (
                ShapeRef {
                    topology_id: ta,
                    control_point_field: ca,
                },
                ShapeRef {
                    topology_id: tb,
                    control_point_field: cb,
                },
            ) => ta == tb && ca == cb,
            _ => false,
        }
    }
}

impl Eq for ValueExprKind {}

impl Hash for ValueExprKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueExprKind::Const(v) => const_value_bits_hash(v, state),
            ValueExprKind::Intrinsic(v) => v.hash(state),
            ValueExprKind::Kernel {
                op,
                operands,
                pure_fn,
            } => {
                op.hash(state);
                operands.hash(state);
                pure_fn.hash(state);
            }
            ValueExprKind::Construct { components } => components.hash(state),
            ValueExprKind::Extract {
                input,
                component_index,
            } => {
                input.hash(state);
                component_index.hash(state);
            }
            ValueExprKind::HslToRgb { input } => input.hash(state),
            ValueExprKind::SlotRead { slot } => slot.hash(state),
            ValueExprKind::State { state_slot } => state_slot.hash(state),
            ValueExprKind::StatePlaceholder { slot } => slot.hash(state),
            ValueExprKind::External { channel } => channel.hash(state),
            ValueExprKind::Time { which } => which.hash(state),
            ValueExprKind::Event { kind } => kind.hash(state),
            ValueExprKind::EventRead { event_slot } => event_slot.hash(state),
            ValueExprKind::ShapeRef {
                topology_id,
                control_point_field,
            } => {
                topology_id.hash(state);
                control_point_field.hash(state);
            }
        }
    }
}

/// One node in the arena: its kind plus the resolved type it was built with.
#[derive(Debug, Clone)]
pub struct ValueExprNode {
    /// The node's discriminator and operands.
    pub kind: ValueExprKind,
    /// The node's resolved, canonical type.
    pub ty: CanonicalType,
}

/// The unified, content-addressed `ValueExpr` arena and IR builder.
///
/// Identical `(kind, type)` pairs always share an id: [`Self::intern`] (and
/// every public constructor built on it) checks a dedup map before pushing a
/// new node.
#[derive(Debug, Default)]
pub struct IrArena {
    nodes: Vec<ValueExprNode>,
    dedup: FxHashMap<(ValueExprKind, CanonicalType), ValueExprId>,
    state_slots: BTreeMap<StableStateId, ValueSlot>,
    next_slot: u32,
}

impl IrArena {
    /// An empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of nodes currently in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reads back a node by id.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this arena (arena ids are never
    /// handed out except by arena constructors, so this indicates a
    /// cross-arena id mixup).
    #[must_use]
    pub fn node(&self, id: ValueExprId) -> &ValueExprNode {
        &self.nodes[id.0 as usize]
    }

    /// Every declared state key and its builder-local slot, in lexical key
    /// order (the order the binding pass must process them in).
    #[must_use]
    pub fn state_slots(&self) -> &BTreeMap<StableStateId, ValueSlot> {
        &self.state_slots
    }

    fn intern(&mut self, kind: ValueExprKind, ty: CanonicalType) -> ValueExprId {
        if let Some(&id) = self.dedup.get(&(kind.clone(), ty.clone())) {
            return id;
        }
        let id = ValueExprId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(ValueExprNode {
            kind: kind.clone(),
            ty: ty.clone(),
        });
        self.dedup.insert((kind, ty), id);
        id
    }

    /// Interns a named or placement-sampled intrinsic.
    pub fn intrinsic(&mut self, intrinsic: Intrinsic, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::Intrinsic(intrinsic), ty)
    }

    /// Interns a kernel node (`zipSig`, `broadcast`, `reduce`, or
    /// `pathDerivative`; `map`/`zip` go through [`IrBuilder::map`] /
    /// [`IrBuilder::zip`]).
    pub fn kernel(
        &mut self,
        op: KernelOp,
        operands: Vec<ValueExprId>,
        pure_fn: PureFn,
        ty: CanonicalType,
    ) -> ValueExprId {
        self.intern(
            ValueExprKind::Kernel {
                op,
                operands,
                pure_fn,
            },
            ty,
        )
    }

    /// Interns an `hslToRgb` conversion node.
    pub fn hsl_to_rgb(&mut self, input: ValueExprId, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::HslToRgb { input }, ty)
    }

    /// Interns a slot-read node.
    pub fn slot_read(&mut self, slot: ValueSlot, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::SlotRead { slot }, ty)
    }

    /// Interns an external-channel read node.
    pub fn external(&mut self, channel: impl Into<String>, ty: CanonicalType) -> ValueExprId {
        self.intern(
            ValueExprKind::External {
                channel: channel.into(),
            },
            ty,
        )
    }

    /// Interns a time-model read node.
    pub fn time(&mut self, which: TimeWhich, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::Time { which }, ty)
    }

    /// Interns an event source/combinator node. Always event-extent.
    pub fn event(&mut self, kind: EventKind) -> ValueExprId {
        self.intern(ValueExprKind::Event { kind }, CanonicalType::event())
    }

    /// Interns an event-read node. Always event-extent.
    pub fn event_read(&mut self, event_slot: EventSlot) -> ValueExprId {
        self.intern(ValueExprKind::EventRead { event_slot }, CanonicalType::event())
    }

    /// Interns a shape reference node.
    pub fn shape_ref(
        &mut self,
        topology_id: TopologyId,
        control_point_field: Option<ValueExprId>,
        ty: CanonicalType,
    ) -> ValueExprId {
        self.intern(
            ValueExprKind::ShapeRef {
                topology_id,
                control_point_field,
            },
            ty,
        )
    }

    /// Patches a [`ValueExprKind::StatePlaceholder`] node in place to read
    /// the binding pass's final `state_slot`.
    ///
    /// Called only by the binding pass (`crate::binding`), once per
    /// placeholder, after state allocation completes. The node's id is
    /// unchanged, so any expression that already referenced it as an operand
    /// keeps working without re-lowering.
    pub(crate) fn patch_state_read(&mut self, id: ValueExprId, state_slot: StateSlot) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.kind = ValueExprKind::State { state_slot };
        }
    }
}

impl IrBuilder for IrArena {
    fn constant(&mut self, value: ConstValue, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::Const(value), ty)
    }

    fn map(&mut self, input: ValueExprId, f: PureFn, ty: CanonicalType) -> ValueExprId {
        self.intern(
            ValueExprKind::Kernel {
                op: KernelOp::Map,
                operands: vec![input],
                pure_fn: f,
            },
            ty,
        )
    }

    fn zip(&mut self, inputs: Vec<ValueExprId>, f: PureFn, ty: CanonicalType) -> ValueExprId {
        self.intern(
            ValueExprKind::Kernel {
                op: KernelOp::Zip,
                operands: inputs,
                pure_fn: f,
            },
            ty,
        )
    }

    fn construct(
        &mut self,
        components: Vec<ValueExprId>,
        ty: CanonicalType,
    ) -> Result<ValueExprId, BuildError> {
        let expected = ty.payload.stride();
        if components.len() != expected {
            return Err(BuildError::StrideMismatch {
                supplied: components.len(),
                expected,
            });
        }
        Ok(self.intern(ValueExprKind::Construct { components }, ty))
    }

    fn extract(
        &mut self,
        input: ValueExprId,
        component_index: usize,
        ty: CanonicalType,
    ) -> Result<ValueExprId, BuildError> {
        let stride = self.node(input).ty.payload.stride();
        if component_index >= stride {
            return Err(BuildError::ExtractIndexOutOfRange {
                index: component_index,
                stride,
            });
        }
        Ok(self.intern(
            ValueExprKind::Extract {
                input,
                component_index,
            },
            ty,
        ))
    }

    fn alloc_slot(&mut self) -> ValueSlot {
        let slot = ValueSlot(self.next_slot);
        self.next_slot += 1;
        slot
    }

    fn find_state_slot(&self, id: &StableStateId) -> Option<ValueSlot> {
        self.state_slots.get(id).copied()
    }

    fn declare_state(&mut self, id: StableStateId, _initial_value: ConstValue) -> ValueSlot {
        if let Some(&slot) = self.state_slots.get(&id) {
            return slot;
        }
        let slot = IrBuilder::alloc_slot(self);
        self.state_slots.insert(id, slot);
        slot
    }

    fn state_read(&mut self, slot: ValueSlot, ty: CanonicalType) -> ValueExprId {
        self.intern(ValueExprKind::StatePlaceholder { slot }, ty)
    }
}
