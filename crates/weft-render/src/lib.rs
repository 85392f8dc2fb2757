// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical `RenderFrameIR` value produced by the Weft frame executor.
//! Pure data (draw ops, instance buffers, path geometry) with deterministic
//! serialization/hashing so a frame can be cached and compared by value.

use blake3::Hash;
use ciborium::ser::into_writer;
use serde::{Deserialize, Serialize};

/// Blake3 content hash of a canonical [`RenderFrameIR`] (32 bytes).
pub type Hash32 = [u8; 32];

/// Opaque identifier naming a topology registered by the host application
/// (a mesh, a glyph atlas entry, a path template, ...). Weft never
/// interprets the value; it only threads it through to the renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopologyId(pub u32);

/// Per-instance attribute buffers for a batch of draw instances.
///
/// `position` and `color` are required; the optional buffers, when present,
/// must have the same length as `position` — a mismatch is a caller bug, not
/// a representable state, so construction is left to the producer rather
/// than validated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InstanceBuffers {
    /// 2D position per instance.
    pub position: Vec<[f32; 2]>,
    /// RGBA color per instance.
    pub color: Vec<[f32; 4]>,
    /// Uniform scale per instance, if the topology accepts one.
    pub size: Option<Vec<f32>>,
    /// Non-uniform 2D scale per instance, if the topology accepts one.
    pub scale2: Option<Vec<[f32; 2]>>,
    /// Rotation in radians per instance, if the topology accepts one.
    pub rotation: Option<Vec<f32>>,
}

impl InstanceBuffers {
    /// Number of instances, taken from the required `position` buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// Whether this batch carries zero instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

/// Draws a batch of instances of a single fixed-topology primitive (e.g. a
/// quad or a glyph), positioned and colored per instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawPrimitiveInstancesOp {
    /// The primitive's topology.
    pub topology_id: TopologyId,
    /// Per-instance attributes.
    pub instances: InstanceBuffers,
}

/// A single drawing command in a path's verb stream. Coordinates are
/// indices into the owning [`PathGeometry::points`] buffer, consumed in
/// verb order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathVerb {
    /// Begin a new subpath at the next point.
    MoveTo,
    /// Straight line to the next point.
    LineTo,
    /// Quadratic Bezier to the next point, using one control point.
    QuadTo,
    /// Cubic Bezier to the next point, using two control points.
    CubicTo,
    /// Close the current subpath back to its `MoveTo` origin.
    Close,
}

/// Fixed point-list geometry shared by every instance of a path draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathGeometry {
    /// Identifies this geometry's shape for caching/reuse by the renderer.
    pub topology_id: TopologyId,
    /// Verb stream describing how `points` assemble into subpaths.
    pub verbs: Vec<PathVerb>,
    /// Flat point buffer consumed by `verbs` in order.
    pub points: Vec<[f32; 2]>,
    /// Number of points actually consumed (may be less than `points.len()`
    /// when the buffer was pulled from a pool and over-allocated).
    pub points_count: u32,
    /// Renderer-defined geometry flags (e.g. closed/convex hints).
    pub flags: u32,
}

/// Polygon fill rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FillRule {
    /// Non-zero winding rule.
    NonZero,
    /// Even-odd winding rule.
    EvenOdd,
}

/// Fill styling shared by every instance of a path draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathStyle {
    /// RGBA fill color.
    pub fill_color: [f32; 4],
    /// Winding rule used to resolve self-intersections.
    pub fill_rule: FillRule,
}

/// Draws a batch of instances of one path geometry, each instance placed and
/// tinted independently but sharing the same verb/point stream and style.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawPathInstancesOp {
    /// Shared path geometry.
    pub geometry: PathGeometry,
    /// Per-instance placement/tint.
    pub instances: InstanceBuffers,
    /// Shared fill styling.
    pub style: PathStyle,
}

/// One drawing command within a frame, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DrawOp {
    /// Instanced fixed-topology primitives.
    Primitive(DrawPrimitiveInstancesOp),
    /// Instanced path geometry.
    Path(DrawPathInstancesOp),
}

/// The pure, renderer-agnostic output of one executed frame: an ordered list
/// of draw operations, each grouped by the topology/points-slot pairing that
/// produced it.
///
/// `RenderFrameIR` carries no references into the executor's arena or slot
/// storage — every value has been copied out — so it can be cached, diffed,
/// or shipped across a process boundary by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RenderFrameIR {
    /// Schema version, bumped when the shape of [`DrawOp`] changes.
    pub version: u32,
    /// Draw commands in emission order.
    pub ops: Vec<DrawOp>,
}

impl RenderFrameIR {
    /// Current schema version produced by this crate.
    pub const CURRENT_VERSION: u32 = 1;

    /// Builds an empty frame at [`Self::CURRENT_VERSION`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            ops: Vec::new(),
        }
    }

    /// Canonical CBOR serialization, used as the basis for [`Self::compute_hash`].
    ///
    /// `ops` is serialized in emission order rather than re-sorted: unlike a
    /// structural graph, draw order is itself meaningful (it is the paint
    /// order), so canonicalization must not reorder it.
    ///
    /// # Errors
    /// Returns the underlying CBOR encoding error, which only occurs on an
    /// I/O failure writing to the in-memory buffer.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut bytes = Vec::new();
        into_writer(self, &mut bytes)?;
        Ok(bytes)
    }

    /// Computes the blake3 hash of the canonical serialization, suitable as
    /// a frame cache key.
    ///
    /// # Errors
    /// Returns the underlying CBOR encoding error, which only occurs on an
    /// I/O failure writing to the in-memory buffer.
    pub fn compute_hash(&self) -> Result<Hash32, ciborium::ser::Error<std::io::Error>> {
        let h: Hash = blake3::hash(&self.to_canonical_bytes()?);
        Ok(h.into())
    }
}
