// SPDX-License-Identifier: Apache-2.0
//! Converts Phase-1 `render` steps, plus the buffers they reference, into a
//! pure [`weft_render::RenderFrameIR`] without mutating runtime state.

use std::collections::BTreeMap;

use weft_render::{
    DrawOp, DrawPathInstancesOp, DrawPrimitiveInstancesOp, FillRule, InstanceBuffers, PathGeometry,
    PathVerb, PathStyle, RenderFrameIR, TopologyId as RenderTopologyId,
};
use weft_types::ValueSlot;

use crate::ir::TopologyId;
use crate::schedule::{ShapeSelector, Step};

/// One render request's materialized per-lane data, already converted into
/// the flat `f32` shapes `weft-render` consumes.
#[derive(Debug, Clone)]
pub struct RenderInstanceData {
    /// 2D positions, one per instance.
    pub position: Vec<[f32; 2]>,
    /// RGBA colors, one per instance.
    pub color: Vec<[f32; 4]>,
    /// Optional uniform scale per instance.
    pub size: Option<Vec<f32>>,
}

impl RenderInstanceData {
    /// Concatenates `other`'s per-instance buffers onto the end of `self`'s.
    pub fn extend_from(&mut self, other: &RenderInstanceData) {
        self.position.extend(other.position.iter().copied());
        self.color.extend(other.color.iter().copied());
        match (&mut self.size, &other.size) {
            (Some(s), Some(o)) => s.extend(o.iter().copied()),
            (None, Some(o)) => self.size = Some(o.clone()),
            _ => {}
        }
    }
}

/// A dynamic path's shared geometry and styling, already materialized.
#[derive(Debug, Clone)]
pub struct PathGeometryData {
    /// Verb stream describing how `points` assemble into subpaths.
    pub verbs: Vec<PathVerb>,
    /// Flat control-point buffer, one entry per lane of the control-point
    /// field.
    pub points: Vec<[f32; 2]>,
    /// Renderer-defined geometry flags.
    pub flags: u32,
    /// Shared fill color for every instance of this path.
    pub fill_color: [f32; 4],
    /// Winding rule.
    pub fill_rule: FillRule,
}

/// One render group's pulled-in data, keyed by `(topologyId, pointsFieldSlot)`.
/// `pointsFieldSlot` is the control-point slot for a dynamic path, or the
/// position slot for a fixed primitive — in both cases, the field whose
/// buffer identity distinguishes one draw batch from another.
#[derive(Debug, Clone)]
pub enum RenderGroupData {
    /// A fixed-topology instance batch.
    Primitive(RenderInstanceData),
    /// A dynamic-path instance batch sharing one geometry.
    DynamicPath {
        /// The shared path geometry and style.
        geometry: PathGeometryData,
        /// Per-instance placement/tint.
        instances: RenderInstanceData,
    },
}

fn group_slot(step: &Step) -> Option<(TopologyId, ValueSlot)> {
    match step {
        Step::Render {
            shape: ShapeSelector::DynamicPath { topology_id, control_points },
            ..
        } => Some((*topology_id, *control_points)),
        Step::Render {
            shape: ShapeSelector::Primitive(topology_id),
            position_slot,
            ..
        } => Some((*topology_id, *position_slot)),
        _ => None,
    }
}

/// Assembles every `render` step in `steps` into one [`RenderFrameIR`].
///
/// Steps are grouped by `(topologyId, pointsFieldSlot)` rather than by
/// `(topologyId, instanceId)`: every step sharing one key draws from the
/// same points/position field, so only one draw call is emitted per key,
/// using whatever the caller already pulled into `data` for it (callers
/// that batch several steps under one key are expected to have merged
/// their per-instance data before calling this, via
/// [`RenderInstanceData::extend_from`]'s copy-concatenate semantics — the
/// underlying buffers are not guaranteed contiguous, so there is no
/// subview shortcut). A dynamic path (`ShapeSelector::DynamicPath`) emits
/// `DrawOp::Path`; a fixed primitive emits `DrawOp::Primitive`. Groups with
/// no pulled-in data are skipped — the caller had nothing materialized for
/// that slot this frame.
pub fn assemble_frame(steps: &[Step], data: &BTreeMap<(TopologyId, ValueSlot), RenderGroupData>) -> RenderFrameIR {
    let mut order: Vec<(TopologyId, ValueSlot)> = Vec::new();
    let mut seen: std::collections::BTreeSet<(TopologyId, ValueSlot)> = std::collections::BTreeSet::new();

    for step in steps {
        let Some(key) = group_slot(step) else {
            continue;
        };
        if seen.insert(key) {
            order.push(key);
        }
    }

    let mut ops = Vec::new();
    for key in order {
        let Some(group) = data.get(&key) else {
            continue;
        };
        match group {
            RenderGroupData::Primitive(instance_data) => {
                ops.push(DrawOp::Primitive(DrawPrimitiveInstancesOp {
                    topology_id: RenderTopologyId(key.0 .0),
                    instances: InstanceBuffers {
                        position: instance_data.position.clone(),
                        color: instance_data.color.clone(),
                        size: instance_data.size.clone(),
                        scale2: None,
                        rotation: None,
                    },
                }));
            }
            RenderGroupData::DynamicPath { geometry, instances } => {
                ops.push(DrawOp::Path(DrawPathInstancesOp {
                    geometry: PathGeometry {
                        topology_id: RenderTopologyId(key.0 .0),
                        verbs: geometry.verbs.clone(),
                        points: geometry.points.clone(),
                        points_count: geometry.points.len() as u32,
                        flags: geometry.flags,
                    },
                    instances: InstanceBuffers {
                        position: instances.position.clone(),
                        color: instances.color.clone(),
                        size: instances.size.clone(),
                        scale2: None,
                        rotation: None,
                    },
                    style: PathStyle {
                        fill_color: geometry.fill_color,
                        fill_rule: geometry.fill_rule,
                    },
                }));
            }
        }
    }

    RenderFrameIR {
        version: RenderFrameIR::CURRENT_VERSION,
        ops,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn render_steps_are_grouped_by_topology_and_points_slot() {
        let topology = TopologyId(1);
        let steps = vec![
            Step::Render {
                instance_id: "points".to_string(),
                position_slot: ValueSlot(0),
                color_slot: ValueSlot(1),
                shape: ShapeSelector::Primitive(topology),
                scale: None,
            },
            Step::Render {
                instance_id: "points".to_string(),
                position_slot: ValueSlot(0),
                color_slot: ValueSlot(1),
                shape: ShapeSelector::Primitive(topology),
                scale: None,
            },
        ];
        let mut data = BTreeMap::new();
        data.insert(
            (topology, ValueSlot(0)),
            RenderGroupData::Primitive(RenderInstanceData {
                position: vec![[0.0, 0.0]],
                color: vec![[1.0, 1.0, 1.0, 1.0]],
                size: None,
            }),
        );
        let frame = assemble_frame(&steps, &data);
        assert_eq!(frame.ops.len(), 1);
    }

    #[test]
    fn dynamic_path_emits_a_path_draw_op() {
        let topology = TopologyId(2);
        let steps = vec![Step::Render {
            instance_id: "blob".to_string(),
            position_slot: ValueSlot(0),
            color_slot: ValueSlot(1),
            shape: ShapeSelector::DynamicPath {
                topology_id: topology,
                control_points: ValueSlot(7),
            },
            scale: None,
        }];
        let mut data = BTreeMap::new();
        data.insert(
            (topology, ValueSlot(7)),
            RenderGroupData::DynamicPath {
                geometry: PathGeometryData {
                    verbs: vec![PathVerb::MoveTo, PathVerb::LineTo, PathVerb::Close],
                    points: vec![[0.0, 0.0], [1.0, 0.0]],
                    flags: 0,
                    fill_color: [1.0, 0.0, 0.0, 1.0],
                    fill_rule: FillRule::NonZero,
                },
                instances: RenderInstanceData {
                    position: vec![[0.0, 0.0]],
                    color: vec![[1.0, 0.0, 0.0, 1.0]],
                    size: None,
                },
            },
        );
        let frame = assemble_frame(&steps, &data);
        assert_eq!(frame.ops.len(), 1);
        assert!(matches!(frame.ops[0], DrawOp::Path(_)));
    }

    #[test]
    fn groups_with_no_data_are_skipped() {
        let topology = TopologyId(3);
        let steps = vec![Step::Render {
            instance_id: "orphan".to_string(),
            position_slot: ValueSlot(0),
            color_slot: ValueSlot(1),
            shape: ShapeSelector::Primitive(topology),
            scale: None,
        }];
        let frame = assemble_frame(&steps, &BTreeMap::new());
        assert!(frame.ops.is_empty());
    }

    #[test]
    fn extend_from_concatenates_instance_buffers() {
        let mut base = RenderInstanceData {
            position: vec![[0.0, 0.0]],
            color: vec![[1.0, 1.0, 1.0, 1.0]],
            size: Some(vec![1.0]),
        };
        base.extend_from(&RenderInstanceData {
            position: vec![[1.0, 1.0]],
            color: vec![[0.0, 0.0, 0.0, 1.0]],
            size: Some(vec![2.0]),
        });
        assert_eq!(base.position, vec![[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(base.size, Some(vec![1.0, 2.0]));
    }

    #[test]
    fn empty_steps_produce_an_empty_frame() {
        let frame = assemble_frame(&[], &BTreeMap::new());
        assert!(frame.ops.is_empty());
        assert_eq!(frame.version, RenderFrameIR::CURRENT_VERSION);
    }
}
