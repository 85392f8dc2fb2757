// SPDX-License-Identifier: Apache-2.0
//! The contract the block library (an external collaborator, not part of
//! this crate) implements and the patch compiler consumes.
//!
//! A block is an opaque [`BlockDef`]: core never inspects how a block
//! chooses to lower itself, only what it hands back — IR node ids, an
//! effects bundle, and a diagnostic on failure. The [`IrBuilder`] trait is
//! the other half of that boundary: it is how a block's `lower` reaches into
//! the compiler's expression arena without this crate depending on it.
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
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::BTreeMap;
use std::fmt;

use weft_types::{CanonicalType, ConstValue, PureFn, StableStateId, ValueExprId, ValueSlot};

/// Whether a block is a primitive (directly lowered) or a composite
/// (expands into other blocks before lowering — out of scope here, tracked
/// only as a tag for tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Lowers directly to IR.
    Primitive,
    /// Expands into a sub-graph of other blocks.
    Composite,
}

/// The block's runtime capability class. Open-ended: blocks that need a
/// capability not named here use [`Capability::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// No state, no side effects; output is a function of inputs alone.
    Pure,
    /// Owns persistent state across frames.
    Stateful,
    /// Reads the time model (`t_ms`, `dt`, phases, pulse, energy, palette).
    Time,
    /// Reads an external input channel.
    External,
    /// A capability not covered by the closed variants above.
    Other(String),
}

/// Whether the binding pass must allocate output slots for a block, or the
/// block is required to request them itself.
///
/// Pure blocks may leave output slots unallocated (`None` in
/// [`LoweredOutput::slot`]) and let the binding pass assign one per
/// [`SlotRequest`]. Impure blocks (state or side effects) must populate
/// every output slot themselves; a missing slot is the `MissingSlotForImpureBlock`
/// diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweringPurity {
    /// The binding pass may allocate output slots on this block's behalf.
    Pure,
    /// This block's `lower` must populate every output slot itself.
    Impure,
}

/// How a block's cardinality behaves with respect to its inputs' instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardinalityMode {
    /// Output cardinality matches the (unified) input cardinality.
    Preserve,
    /// Output is always a field, regardless of input cardinality.
    Broadcast,
    /// Output collapses a field input down to a signal.
    Reduce,
    /// A mode not covered by the closed variants above.
    Other(String),
}

/// Whether a block's per-lane computation may read across lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneCoupling {
    /// Each lane computes independently of every other lane.
    LaneLocal,
    /// Lanes may read neighboring lanes (e.g. path derivative kernels).
    Neighborhood,
    /// A coupling mode not covered by the closed variants above.
    Other(String),
}

/// Whether a block may broadcast a signal against a field operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// `zipSig` broadcasting of a signal into a field kernel is permitted.
    AllowZipSig,
    /// Every operand must already share the field's cardinality.
    RequireMatchingCardinality,
    /// A policy not covered by the closed variants above.
    Other(String),
}

/// A block's declared cardinality behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalitySpec {
    /// How output cardinality relates to input cardinality.
    pub cardinality_mode: CardinalityMode,
    /// Whether per-lane computation may read neighboring lanes.
    pub lane_coupling: LaneCoupling,
    /// Whether signal/field broadcasting is permitted.
    pub broadcast_policy: BroadcastPolicy,
}

/// A default value supplied for an input port with nothing connected.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultSource {
    /// Use the given constant.
    Const(ConstValue),
    /// Use the zero-cardinality donor of the port's resolved type.
    Zero,
}

/// Declaration of one input port.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPortSpec {
    /// Human-readable label for editor UIs.
    pub label: String,
    /// The port's inference-time type.
    pub ty: weft_types::InferenceCanonicalType,
    /// Value used when nothing is connected.
    pub default_source: Option<DefaultSource>,
    /// Free-form hint for editor widget selection (e.g. `"angle-dial"`).
    pub ui_hint: Option<String>,
}

/// Declaration of one output port.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPortSpec {
    /// Human-readable label for editor UIs.
    pub label: String,
    /// The port's inference-time type.
    pub ty: weft_types::InferenceCanonicalType,
}

/// A resolved input handed to `lower`: the already-lowered expression and
/// its finalized type.
#[derive(Debug, Clone)]
pub struct LoweredInput {
    /// The upstream expression id this port reads.
    pub id: ValueExprId,
    /// The connection's finalized type.
    pub ty: CanonicalType,
    /// The connection's component stride (`ty.payload.stride()`, cached).
    pub stride: usize,
}

/// One output produced by `lower`.
#[derive(Debug, Clone, Copy)]
pub struct LoweredOutput {
    /// The expression id this output reads.
    pub id: ValueExprId,
    /// The storage slot this output is bound to, if already known.
    ///
    /// Pure blocks may leave this `None`; the binding pass fills it in from
    /// a matching [`SlotRequest`]. Impure blocks must populate it directly.
    pub slot: Option<ValueSlot>,
    /// The output's component stride (from its resolved payload).
    pub stride: usize,
}

/// A request that the binding pass declare a piece of persistent state.
#[derive(Debug, Clone)]
pub struct StateDecl {
    /// The deterministic key this state is addressed by across recompiles.
    pub key: StableStateId,
    /// The value used when no prior compile declared this key.
    pub initial_value: ConstValue,
}

/// A request that the binding pass allocate a value slot for an output the
/// block itself did not assign.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    /// The output port this request is for.
    pub port_id: String,
    /// The slot's resolved type (determines storage kind and stride).
    pub ty: CanonicalType,
}

/// A deferred write the binding pass should schedule into Phase 2.
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// The state key being written.
    pub state_key: StableStateId,
    /// The expression whose Phase-1 value is written into that state.
    pub value: ValueExprId,
}

/// Side effects a block's `lower` call accumulates alongside its outputs.
#[derive(Debug, Clone, Default)]
pub struct Effects {
    /// New persistent state this block owns.
    pub state_decls: Vec<StateDecl>,
    /// Output slots this block needs the binding pass to allocate.
    pub slot_requests: Vec<SlotRequest>,
    /// Phase-2 state writes this block needs scheduled.
    pub step_requests: Vec<StepRequest>,
}

/// The result of calling [`BlockDef::lower`].
#[derive(Debug, Clone, Default)]
pub struct LowerResult {
    /// Outputs produced, keyed by output port id.
    pub outputs_by_id: BTreeMap<String, LoweredOutput>,
    /// Accumulated effects (state declarations, slot requests, step requests).
    pub effects: Effects,
}

/// A fatal error raised by an [`IrBuilder`] constructor.
///
/// These correspond to invariants the IR must never violate; a well-behaved
/// block never triggers one, but a malformed or buggy block can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `construct`'s component count did not match the target payload's stride.
    StrideMismatch {
        /// The number of components supplied.
        supplied: usize,
        /// The stride required by the target payload.
        expected: usize,
    },
    /// `extract`'s component index was `>= ` the input's stride.
    ExtractIndexOutOfRange {
        /// The requested component index.
        index: usize,
        /// The input's stride.
        stride: usize,
    },
    /// The target payload/unit pairing is not legal (I2).
    PayloadUnitIllegal,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::StrideMismatch { supplied, expected } => write!(
                f,
                "construct: {supplied} components supplied, payload stride is {expected}"
            ),
            BuildError::ExtractIndexOutOfRange { index, stride } => write!(
                f,
                "extract: component index {index} is out of range for stride {stride}"
            ),
            BuildError::PayloadUnitIllegal => write!(f, "payload/unit pairing is not legal"),
        }
    }
}

impl std::error::Error for BuildError {}

/// The IR-builder surface a block's `lower` call is given.
///
/// Implemented by the compiler's concrete expression arena (`weft-core`);
/// blocks only ever see it as `&mut dyn IrBuilder`, which is what lets this
/// crate stay free of any dependency on the arena's representation.
pub trait IrBuilder {
    /// Interns (or finds, if content-identical) a constant node.
    fn constant(&mut self, value: ConstValue, ty: CanonicalType) -> ValueExprId;

    /// Applies `f` to `input`, producing a node of type `ty`.
    fn map(&mut self, input: ValueExprId, f: PureFn, ty: CanonicalType) -> ValueExprId;

    /// Applies `f` across `inputs` pairwise (same extent), producing a node
    /// of type `ty`.
    fn zip(&mut self, inputs: Vec<ValueExprId>, f: PureFn, ty: CanonicalType) -> ValueExprId;

    /// Builds the signal payload `ty` out of `components`, one node per
    /// component in declaration order.
    ///
    /// # Errors
    /// Returns [`BuildError::StrideMismatch`] if `components.len()` does not
    /// equal `ty.payload.stride()`.
    fn construct(
        &mut self,
        components: Vec<ValueExprId>,
        ty: CanonicalType,
    ) -> Result<ValueExprId, BuildError>;

    /// Reads component `component_index` out of `input`.
    ///
    /// # Errors
    /// Returns [`BuildError::ExtractIndexOutOfRange`] if the index is out of
    /// bounds for the input's stride.
    fn extract(
        &mut self,
        input: ValueExprId,
        component_index: usize,
        ty: CanonicalType,
    ) -> Result<ValueExprId, BuildError>;

    /// Allocates a fresh, unbound output slot.
    fn alloc_slot(&mut self) -> ValueSlot;

    /// Looks up a previously bound state slot by its stable id, without
    /// declaring one.
    fn find_state_slot(&self, id: &StableStateId) -> Option<ValueSlot>;

    /// Declares (or re-binds, if `id` was already known from a prior
    /// compile) persistent state, returning its slot.
    fn declare_state(&mut self, id: StableStateId, initial_value: ConstValue) -> ValueSlot;

    /// Builds a node that reads back the value last written to `slot` by a
    /// [`StepRequest`], so a block may feed its own prior state into its
    /// current-frame computation (e.g. an accumulator).
    ///
    /// `slot` is a placeholder at lowering time: it is not yet bound to a
    /// real state-array index, since the binding pass has not run. The
    /// binding pass patches this node in place once it assigns `slot` a
    /// concrete storage location; the node's id remains stable across that
    /// patch, so anything already referencing it continues to work.
    fn state_read(&mut self, slot: ValueSlot, ty: CanonicalType) -> ValueExprId;
}

/// The external contract a concrete block implementation satisfies.
///
/// Core treats every `BlockDef` as opaque: it never inspects how a block
/// chooses to lower itself, only the `LowerResult` it hands back.
pub trait BlockDef {
    /// The block's registered type name (stable across versions).
    fn type_name(&self) -> &str;

    /// Human-readable label for editor UIs.
    fn label(&self) -> &str;

    /// The category this block is grouped under in a block palette.
    fn category(&self) -> &str;

    /// Primitive or composite.
    fn form(&self) -> Form;

    /// The block's runtime capability class.
    fn capability(&self) -> Capability;

    /// Whether the binding pass may allocate this block's output slots.
    fn lowering_purity(&self) -> LoweringPurity;

    /// The block's cardinality behavior.
    fn cardinality(&self) -> CardinalitySpec;

    /// Declared input ports, keyed by port id.
    fn inputs(&self) -> &BTreeMap<String, InputPortSpec>;

    /// Declared output ports, keyed by port id.
    fn outputs(&self) -> &BTreeMap<String, OutputPortSpec>;

    /// Lowers this block against its already-lowered inputs, emitting IR
    /// nodes through `builder` and returning its outputs plus any effects.
    ///
    /// # Errors
    /// Returns a human-readable message; the compiler frontend wraps it into
    /// a per-block diagnostic rather than aborting the whole compile.
    fn lower(
        &self,
        builder: &mut dyn IrBuilder,
        inputs: &BTreeMap<String, LoweredInput>,
    ) -> Result<LowerResult, String>;
}
