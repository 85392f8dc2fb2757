// SPDX-License-Identifier: Apache-2.0
//! Materializes field-extent `ValueExpr` nodes into typed, pooled buffers.

use rustc_hash::FxHashMap;
use weft_types::{ConstValue, StateSlot, ValueExprId, ValueSlot};

use crate::ir::{Intrinsic, IrArena, KernelOp, PlacementBasis, PlacementField, ValueExprKind};

/// The stride/element-kind of a pooled field buffer.
///
/// Buffer pool keys are `(format, count)`; `Rgba8` is a historical name for
/// the four-channel float color format `RenderFrameIR` consumes, not an
/// on-disk byte encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// One `f32` lane.
    F32,
    /// Two `f32` lanes.
    Vec2F32,
    /// Three `f32` lanes.
    Vec3F32,
    /// Four `f32` lanes (RGBA).
    Rgba8,
}

impl Format {
    /// Lanes per element.
    #[must_use]
    pub fn stride(self) -> usize {
        match self {
            Format::F32 => 1,
            Format::Vec2F32 => 2,
            Format::Vec3F32 => 3,
            Format::Rgba8 => 4,
        }
    }

    fn from_stride(stride: usize) -> Self {
        match stride {
            2 => Format::Vec2F32,
            3 => Format::Vec3F32,
            4 => Format::Rgba8,
            _ => Format::F32,
        }
    }
}

/// A flat, interleaved buffer of `count * format.stride()` `f32`s.
#[derive(Debug, Clone, Default)]
pub struct TypedBuffer {
    /// The buffer's element format.
    pub format: Format,
    /// Number of lanes (elements), not raw floats.
    pub count: usize,
    /// Flat, interleaved storage: `data[i * format.stride() + c]`.
    pub data: Vec<f32>,
}

impl TypedBuffer {
    fn zeroed(format: Format, count: usize) -> Self {
        Self {
            format,
            count,
            data: vec![0.0; count * format.stride()],
        }
    }
}

/// A pool of reusable [`TypedBuffer`]s keyed by `(format, count)`.
///
/// `alloc` pops a pooled buffer of the right shape or allocates fresh;
/// `release` returns a buffer to the pool without shrinking its capacity.
/// A distinct-key cap prevents unbounded growth when domain sizes vary a lot
/// across frames.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: FxHashMap<(Format, usize), Vec<TypedBuffer>>,
    max_distinct_keys: usize,
}

impl BufferPool {
    /// A pool with the default distinct-key cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: FxHashMap::default(),
            max_distinct_keys: 256,
        }
    }

    /// Allocates a buffer of `count` lanes in `format`, reusing a pooled one
    /// if available.
    #[must_use]
    pub fn alloc(&mut self, format: Format, count: usize) -> TypedBuffer {
        if let Some(bucket) = self.free.get_mut(&(format, count)) {
            if let Some(mut buf) = bucket.pop() {
                buf.data.iter_mut().for_each(|v| *v = 0.0);
                return buf;
            }
        }
        TypedBuffer::zeroed(format, count)
    }

    /// Returns `buf` to the pool, dropping it instead if the pool already
    /// tracks its key-count cap worth of distinct shapes.
    pub fn release(&mut self, buf: TypedBuffer) {
        let key = (buf.format, buf.count);
        if !self.free.contains_key(&key) && self.free.len() >= self.max_distinct_keys {
            return;
        }
        self.free.entry(key).or_default().push(buf);
    }
}

/// Read-only runtime surface the materializer needs beyond the arena itself:
/// per-instance lane counts, signal evaluation (for `zipSig`/`broadcast`),
/// and storage reads (`slotRead`/`state` at field extent).
pub trait FieldContext {
    /// The lane count of `instance_id` this frame.
    fn lane_count(&self, instance_id: &str) -> usize;

    /// Evaluates a signal-extent expression (memoized by the caller).
    fn eval_signal(&mut self, expr: ValueExprId) -> f64;

    /// Reads a previously written, interleaved slot buffer.
    fn read_slot(&self, slot: ValueSlot, stride: usize, count: usize) -> Vec<f32>;

    /// Reads a contiguous run of persistent state as an interleaved buffer.
    fn read_state(&self, state_slot: StateSlot, stride: usize, count: usize) -> Vec<f32>;
}

/// Error raised when a node has no field-extent meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MaterializeError {
    /// `shapeRef` is never materialized as a field.
    #[error("shapeRef is never materialized as a field")]
    ShapeRefNotMaterializable,
    /// `event*`, `time`, and `external` are scalar-only.
    #[error("this node kind has no field-extent meaning")]
    NotFieldValued,
}

fn stable_hash(instance_id: &str, lane: usize, seed: u64) -> f32 {
    let mut h = instance_id.as_bytes().to_vec();
    h.extend_from_slice(&(lane as u64).to_le_bytes());
    h.extend_from_slice(&seed.to_le_bytes());
    let hash = blake3::hash(&h);
    let bytes = hash.as_bytes();
    let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (f64::from(v) / f64::from(u32::MAX)) as f32
}

/// Computes one component of a placement intrinsic. `uv` is genuinely
/// two-component: `component == 0` is u, `component == 1` is v. Non-`uv`
/// fields are scalar and ignore `component`.
fn placement_component(
    field: PlacementField,
    basis: PlacementBasis,
    lane: usize,
    count: usize,
    instance_id: &str,
    component: usize,
) -> f32 {
    match field {
        PlacementField::Rank => lane as f32,
        PlacementField::Seed => stable_hash(instance_id, lane, 0),
        PlacementField::Uv => match basis {
            PlacementBasis::Grid => {
                let side = (count as f64).sqrt().ceil().max(1.0) as usize;
                let x = lane % side;
                let y = lane / side.max(1);
                if component == 0 {
                    ((x as f64 + 0.5) / side as f64) as f32
                } else {
                    ((y as f64 + 0.5) / side as f64) as f32
                }
            }
            // Bases 2 and 3 give the Halton sequence's two independent
            // low-discrepancy axes.
            PlacementBasis::Halton2D => {
                let base = if component == 0 { 2 } else { 3 };
                halton(lane + 1, base) as f32
            }
            PlacementBasis::Spiral => {
                if component == 0 {
                    let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
                    ((lane as f64 * golden_angle).rem_euclid(std::f64::consts::TAU)
                        / std::f64::consts::TAU) as f32
                } else {
                    (lane as f64 / count.max(1) as f64).sqrt() as f32
                }
            }
            PlacementBasis::Random => {
                stable_hash(instance_id, lane, u64::from(component as u32) + 1)
            }
        },
    }
}

fn halton(mut index: usize, base: usize) -> f64 {
    let mut f = 1.0;
    let mut r = 0.0;
    while index > 0 {
        f /= base as f64;
        r += f * (index % base) as f64;
        index /= base;
    }
    r
}

pub(crate) fn apply_opcode(op: weft_types::Opcode, args: &[f64]) -> f64 {
    use weft_types::Opcode;
    match op {
        Opcode::Add => args[0] + args[1],
        Opcode::Sub => args[0] - args[1],
        Opcode::Mul => args[0] * args[1],
        Opcode::Div => args[0] / args[1],
        Opcode::Neg => -args[0],
        Opcode::Mod => args[0].rem_euclid(args[1]),
        Opcode::Min => args[0].min(args[1]),
        Opcode::Max => args[0].max(args[1]),
        Opcode::Clamp => args[0].clamp(args[1].min(args[2]), args[1].max(args[2])),
        Opcode::Mix => args[0] + (args[1] - args[0]) * args[2],
        Opcode::Abs => args[0].abs(),
        Opcode::Floor => args[0].floor(),
        Opcode::Ceil => args[0].ceil(),
        Opcode::Round => args[0].round(),
        Opcode::Sqrt => args[0].sqrt(),
        Opcode::Pow => args[0].powf(args[1]),
        Opcode::Sin => args[0].sin(),
        Opcode::Cos => args[0].cos(),
        Opcode::Atan2 => args[0].atan2(args[1]),
        Opcode::Step => f64::from(args[0] >= args[1]),
        Opcode::Select => {
            if args[0] != 0.0 {
                args[1]
            } else {
                args[2]
            }
        }
        // Bit-exact equality is the documented semantics of this opcode.
        #[allow(clippy::float_cmp)]
        Opcode::Eq => f64::from(args[0] == args[1]),
        Opcode::Lt => f64::from(args[0] < args[1]),
    }
}

pub(crate) fn apply_pure_fn(f: &weft_types::PureFn, args: &[f64]) -> f64 {
    use weft_types::PureFn;
    match f {
        PureFn::Opcode(op) => apply_opcode(*op, args),
        PureFn::Kernel(_) => args.first().copied().unwrap_or(0.0),
        PureFn::Expr(ops) => {
            let mut acc = args.first().copied().unwrap_or(0.0);
            for (i, op) in ops.iter().enumerate() {
                let rest: Vec<f64> = std::iter::once(acc).chain(args[i + 1..].iter().copied()).collect();
                acc = apply_opcode(*op, &rest);
            }
            acc
        }
    }
}

pub(crate) fn hsl_to_rgb_lane(h: f64, s: f64, l: f64, a: f64) -> [f64; 4] {
    if s == 0.0 {
        return [l, l, l, a];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue_to_rgb = |p: f64, q: f64, t: f64| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    [
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
        a,
    ]
}

/// Materializes `expr` over `count` lanes of `instance_id` into a pooled
/// buffer.
///
/// # Errors
/// Returns [`MaterializeError`] for node kinds with no field-extent meaning.
pub fn materialize(
    arena: &IrArena,
    expr: ValueExprId,
    instance_id: &str,
    count: usize,
    ctx: &mut dyn FieldContext,
    pool: &mut BufferPool,
) -> Result<TypedBuffer, MaterializeError> {
    let node = arena.node(expr);
    let stride = node.ty.payload.stride();
    let format = Format::from_stride(stride);

    match &node.kind {
        ValueExprKind::Const(value) => {
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                for c in 0..stride {
                    out.data[lane * stride + c] = value.component(c).unwrap_or(0.0) as f32;
                }
            }
            Ok(out)
        }
        ValueExprKind::Intrinsic(Intrinsic::Name(name)) => {
            let mut out = pool.alloc(Format::F32, count);
            for lane in 0..count {
                out.data[lane] = match name.as_str() {
                    "index" => lane as f32,
                    "normalizedIndex" => {
                        if count <= 1 {
                            0.0
                        } else {
                            lane as f32 / (count - 1) as f32
                        }
                    }
                    "randomId" => stable_hash(instance_id, lane, 0),
                    _ => 0.0,
                };
            }
            Ok(out)
        }
        ValueExprKind::Intrinsic(Intrinsic::Placement { field, basis }) => {
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                for c in 0..stride {
                    out.data[lane * stride + c] = placement_component(*field, *basis, lane, count, instance_id, c);
                }
            }
            Ok(out)
        }
        ValueExprKind::Kernel {
            op,
            operands,
            pure_fn,
        } => materialize_kernel(arena, op, operands, pure_fn, instance_id, count, ctx, pool, format, stride),
        ValueExprKind::Construct { components } => {
            let mut out = pool.alloc(format, count);
            for (c, &component) in components.iter().enumerate() {
                let comp_buf = materialize(arena, component, instance_id, count, ctx, pool)?;
                for lane in 0..count {
                    out.data[lane * stride + c] = comp_buf.data[lane];
                }
                pool.release(comp_buf);
            }
            Ok(out)
        }
        ValueExprKind::Extract {
            input,
            component_index,
        } => {
            let input_node = arena.node(*input);
            let input_stride = input_node.ty.payload.stride();
            let input_buf = materialize(arena, *input, instance_id, count, ctx, pool)?;
            let mut out = pool.alloc(Format::F32, count);
            for lane in 0..count {
                out.data[lane] = input_buf.data[lane * input_stride + component_index];
            }
            pool.release(input_buf);
            Ok(out)
        }
        ValueExprKind::HslToRgb { input } => {
            let input_buf = materialize(arena, *input, instance_id, count, ctx, pool)?;
            let mut out = pool.alloc(Format::Rgba8, count);
            for lane in 0..count {
                let base = lane * 4;
                let rgba = hsl_to_rgb_lane(
                    f64::from(input_buf.data[base]),
                    f64::from(input_buf.data[base + 1]),
                    f64::from(input_buf.data[base + 2]),
                    f64::from(input_buf.data[base + 3]),
                );
                for (c, v) in rgba.iter().enumerate() {
                    out.data[base + c] = *v as f32;
                }
            }
            pool.release(input_buf);
            Ok(out)
        }
        ValueExprKind::SlotRead { slot } => Ok(TypedBuffer {
            format,
            count,
            data: ctx.read_slot(*slot, stride, count),
        }),
        ValueExprKind::State { state_slot } => Ok(TypedBuffer {
            format,
            count,
            data: ctx.read_state(*state_slot, stride, count),
        }),
        ValueExprKind::ShapeRef { .. } => Err(MaterializeError::ShapeRefNotMaterializable),
        ValueExprKind::StatePlaceholder { .. }
        | ValueExprKind::External { .. }
        | ValueExprKind::Time { .. }
        | ValueExprKind::Event { .. }
        | ValueExprKind::EventRead { .. } => Err(MaterializeError::NotFieldValued),
    }
}

#[allow(clippy::too_many_arguments)]
fn materialize_kernel(
    arena: &IrArena,
    op: &KernelOp,
    operands: &[ValueExprId],
    pure_fn: &weft_types::PureFn,
    instance_id: &str,
    count: usize,
    ctx: &mut dyn FieldContext,
    pool: &mut BufferPool,
    format: Format,
    stride: usize,
) -> Result<TypedBuffer, MaterializeError> {
    match op {
        KernelOp::Map => {
            let input = materialize(arena, operands[0], instance_id, count, ctx, pool)?;
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                out.data[lane] = apply_pure_fn(pure_fn, &[f64::from(input.data[lane])]) as f32;
            }
            pool.release(input);
            Ok(out)
        }
        KernelOp::Zip => {
            let bufs: Result<Vec<_>, _> = operands
                .iter()
                .map(|&o| materialize(arena, o, instance_id, count, ctx, pool))
                .collect();
            let bufs = bufs?;
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                let args: Vec<f64> = bufs.iter().map(|b| f64::from(b.data[lane])).collect();
                out.data[lane] = apply_pure_fn(pure_fn, &args) as f32;
            }
            for buf in bufs {
                pool.release(buf);
            }
            Ok(out)
        }
        KernelOp::ZipSig => {
            let field_buf = materialize(arena, operands[0], instance_id, count, ctx, pool)?;
            let sig = ctx.eval_signal(operands[1]);
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                out.data[lane] = apply_pure_fn(pure_fn, &[f64::from(field_buf.data[lane]), sig]) as f32;
            }
            pool.release(field_buf);
            Ok(out)
        }
        KernelOp::Broadcast => {
            let sig = ctx.eval_signal(operands[0]);
            let mut out = pool.alloc(format, count);
            for lane in 0..count {
                out.data[lane] = sig as f32;
            }
            Ok(out)
        }
        KernelOp::Reduce => {
            let input = materialize(arena, operands[0], instance_id, count, ctx, pool)?;
            let mut acc = input.data.first().copied().unwrap_or(0.0) as f64;
            for v in input.data.iter().skip(1) {
                acc = apply_pure_fn(pure_fn, &[acc, f64::from(*v)]);
            }
            pool.release(input);
            let mut out = pool.alloc(Format::F32, 1);
            out.data[0] = acc as f32;
            Ok(out)
        }
        KernelOp::PathDerivative { op, .. } => {
            materialize_path_derivative(arena, operands[0], instance_id, count, ctx, pool, *op, stride)
        }
    }
}

fn materialize_path_derivative(
    arena: &IrArena,
    points_expr: ValueExprId,
    instance_id: &str,
    count: usize,
    ctx: &mut dyn FieldContext,
    pool: &mut BufferPool,
    op: crate::ir::PathDerivativeOp,
    out_stride: usize,
) -> Result<TypedBuffer, MaterializeError> {
    let points = materialize(arena, points_expr, instance_id, count, ctx, pool)?;
    let point_stride = points.format.stride().max(2);
    let at = |i: usize| {
        let base = (i % count) * point_stride;
        (f64::from(points.data[base]), f64::from(points.data[base + 1]))
    };

    let out = match op {
        crate::ir::PathDerivativeOp::Tangent => {
            let mut out = pool.alloc(Format::from_stride(out_stride), count);
            for lane in 0..count {
                let prev = if lane == 0 { count - 1 } else { lane - 1 };
                let next = (lane + 1) % count;
                let (px, py) = at(prev);
                let (nx, ny) = at(next);
                let (dx, dy) = (nx - px, ny - py);
                let len = (dx * dx + dy * dy).sqrt().max(1e-12);
                out.data[lane * 2] = (dx / len) as f32;
                out.data[lane * 2 + 1] = (dy / len) as f32;
            }
            out
        }
        crate::ir::PathDerivativeOp::ArcLength => {
            let mut out = pool.alloc(Format::F32, count);
            let mut acc = 0.0_f64;
            out.data[0] = 0.0;
            for lane in 1..count {
                let (px, py) = at(lane - 1);
                let (cx, cy) = at(lane);
                acc += ((cx - px).powi(2) + (cy - py).powi(2)).sqrt();
                out.data[lane] = acc as f32;
            }
            out
        }
    };
    pool.release(points);
    Ok(out)
}
