// SPDX-License-Identifier: Apache-2.0
//! Integration-level coverage of a handful of end-to-end block graphs,
//! driven through the public `compile`/`run_frame` surface rather than any
//! internal compiler or runtime API.
//!
//! The mock blocks here exist only to drive these scenarios; they are not a
//! block library and never leave `#[cfg(test)]`.

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::collections::BTreeMap;

    use weft_block_api::{
        BlockDef, BroadcastPolicy, CardinalityMode, CardinalitySpec, Capability, DefaultSource,
        Form, InputPortSpec, IrBuilder, LaneCoupling, LoweredInput, LoweredOutput, LoweringPurity,
        LowerResult, OutputPortSpec,
    };
    use weft_types::unit::ColorEncoding;
    use weft_types::{CanonicalType, ConstValue, Opcode, Payload, PureFn, Unit};

    use crate::compiler::{compile, BlockRegistry, CompileOutcome};
    use crate::patch::{InputSource, Patch, PatchBlockInstance};
    use crate::runtime::{run_frame, ProgramState, SessionState};
    use crate::schedule::TimeModel;

    fn float_signal() -> CanonicalType {
        CanonicalType::signal(Payload::Float, Unit::None, None).expect("float/none is legal")
    }

    fn hsl_signal() -> CanonicalType {
        CanonicalType::signal(Payload::Color, Unit::Color(ColorEncoding::Hsl), None)
            .expect("color/hsl is legal")
    }

    fn vec2_signal() -> CanonicalType {
        CanonicalType::signal(Payload::Vec2, Unit::None, None).expect("vec2/none is legal")
    }

    fn vec3_signal() -> CanonicalType {
        CanonicalType::signal(Payload::Vec3, Unit::None, None).expect("vec3/none is legal")
    }

    fn pure_cardinality() -> CardinalitySpec {
        CardinalitySpec {
            cardinality_mode: CardinalityMode::Preserve,
            lane_coupling: LaneCoupling::LaneLocal,
            broadcast_policy: BroadcastPolicy::RequireMatchingCardinality,
        }
    }

    /// A source-knob block with no inputs: `color = wrap(h) mod 1, s, clamp(l, 0, 1), a`.
    struct ColorPickerBlock {
        h: f64,
        s: f64,
        l: f64,
        a: f64,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl ColorPickerBlock {
        fn new(h: f64, s: f64, l: f64, a: f64) -> Self {
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "color".to_string(),
                OutputPortSpec {
                    label: "Color".to_string(),
                    ty: weft_types::infer::canonical_type(hsl_signal()),
                },
            );
            Self { h, s, l, a, outputs }
        }
    }

    impl BlockDef for ColorPickerBlock {
        fn type_name(&self) -> &str {
            "ColorPicker"
        }
        fn label(&self) -> &str {
            "Color Picker"
        }
        fn category(&self) -> &str {
            "color"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            static EMPTY: BTreeMap<String, InputPortSpec> = BTreeMap::new();
            &EMPTY
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            _inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let ft = float_signal();
            let h = builder.constant(ConstValue::Float(self.h), ft.clone());
            let one = builder.constant(ConstValue::Float(1.0), ft.clone());
            let h_wrapped = builder.zip(vec![h, one], PureFn::Opcode(Opcode::Mod), ft.clone());
            let s = builder.constant(ConstValue::Float(self.s), ft.clone());
            let l = builder.constant(ConstValue::Float(self.l), ft.clone());
            let zero = builder.constant(ConstValue::Float(0.0), ft.clone());
            let l_clamped = builder.zip(
                vec![l, zero, one],
                PureFn::Opcode(Opcode::Clamp),
                ft.clone(),
            );
            let a = builder.constant(ConstValue::Float(self.a), ft);
            let color = builder
                .construct(vec![h_wrapped, s, l_clamped, a], hsl_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "color".to_string(),
                LoweredOutput {
                    id: color,
                    slot: None,
                    stride: 4,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    /// Constructs a raw HSL color from its components, with no wrap/clamp.
    struct MakeColorHslBlock {
        h: f64,
        s: f64,
        l: f64,
        a: f64,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl MakeColorHslBlock {
        fn new(h: f64, s: f64, l: f64, a: f64) -> Self {
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "color".to_string(),
                OutputPortSpec {
                    label: "Color".to_string(),
                    ty: weft_types::infer::canonical_type(hsl_signal()),
                },
            );
            Self { h, s, l, a, outputs }
        }
    }

    impl BlockDef for MakeColorHslBlock {
        fn type_name(&self) -> &str {
            "MakeColorHsl"
        }
        fn label(&self) -> &str {
            "Make Color (HSL)"
        }
        fn category(&self) -> &str {
            "color"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            static EMPTY: BTreeMap<String, InputPortSpec> = BTreeMap::new();
            &EMPTY
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            _inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let ft = float_signal();
            let h = builder.constant(ConstValue::Float(self.h), ft.clone());
            let s = builder.constant(ConstValue::Float(self.s), ft.clone());
            let l = builder.constant(ConstValue::Float(self.l), ft.clone());
            let a = builder.constant(ConstValue::Float(self.a), ft);
            let color = builder
                .construct(vec![h, s, l, a], hsl_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "color".to_string(),
                LoweredOutput {
                    id: color,
                    slot: None,
                    stride: 4,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    /// Rotates an incoming HSL color's hue by `shift`, wrapped into `[0, 1)`.
    struct HueShiftBlock {
        shift: f64,
        inputs: BTreeMap<String, InputPortSpec>,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl HueShiftBlock {
        fn new(shift: f64) -> Self {
            let mut inputs = BTreeMap::new();
            inputs.insert(
                "color".to_string(),
                InputPortSpec {
                    label: "Color".to_string(),
                    ty: weft_types::infer::canonical_type(hsl_signal()),
                    default_source: Some(DefaultSource::Const(ConstValue::Color([
                        0.0, 0.0, 0.0, 1.0,
                    ]))),
                    ui_hint: None,
                },
            );
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "color".to_string(),
                OutputPortSpec {
                    label: "Color".to_string(),
                    ty: weft_types::infer::canonical_type(hsl_signal()),
                },
            );
            Self { shift, inputs, outputs }
        }
    }

    impl BlockDef for HueShiftBlock {
        fn type_name(&self) -> &str {
            "HueShift"
        }
        fn label(&self) -> &str {
            "Hue Shift"
        }
        fn category(&self) -> &str {
            "color"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            &self.inputs
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let color_in = inputs
                .get("color")
                .ok_or_else(|| "missing color input".to_string())?
                .id;
            let ft = float_signal();
            let h = builder
                .extract(color_in, 0, ft.clone())
                .map_err(|e| e.to_string())?;
            let s = builder
                .extract(color_in, 1, ft.clone())
                .map_err(|e| e.to_string())?;
            let l = builder
                .extract(color_in, 2, ft.clone())
                .map_err(|e| e.to_string())?;
            let a = builder
                .extract(color_in, 3, ft.clone())
                .map_err(|e| e.to_string())?;
            let shift = builder.constant(ConstValue::Float(self.shift), ft.clone());
            let one = builder.constant(ConstValue::Float(1.0), ft.clone());
            let h_shifted = builder.zip(vec![h, shift], PureFn::Opcode(Opcode::Add), ft.clone());
            let h_wrapped = builder.zip(vec![h_shifted, one], PureFn::Opcode(Opcode::Mod), ft);
            let color = builder
                .construct(vec![h_wrapped, s, l, a], hsl_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "color".to_string(),
                LoweredOutput {
                    id: color,
                    slot: None,
                    stride: 4,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    /// A fixed `(x, y)` constant, with no inputs.
    struct ConstVec2Block {
        x: f64,
        y: f64,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl ConstVec2Block {
        fn new(x: f64, y: f64) -> Self {
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "xy".to_string(),
                OutputPortSpec {
                    label: "XY".to_string(),
                    ty: weft_types::infer::canonical_type(vec2_signal()),
                },
            );
            Self { x, y, outputs }
        }
    }

    impl BlockDef for ConstVec2Block {
        fn type_name(&self) -> &str {
            "ConstVec2"
        }
        fn label(&self) -> &str {
            "Const (vec2)"
        }
        fn category(&self) -> &str {
            "math"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            static EMPTY: BTreeMap<String, InputPortSpec> = BTreeMap::new();
            &EMPTY
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            _inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let ft = float_signal();
            let x = builder.constant(ConstValue::Float(self.x), ft.clone());
            let y = builder.constant(ConstValue::Float(self.y), ft);
            let xy = builder
                .construct(vec![x, y], vec2_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "xy".to_string(),
                LoweredOutput {
                    id: xy,
                    slot: None,
                    stride: 2,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    /// `center + radius * (cos(angle), sin(angle))`, all parameters fixed.
    struct PolarToCartesianBlock {
        angle: f64,
        radius: f64,
        center_x: f64,
        center_y: f64,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl PolarToCartesianBlock {
        fn new(angle: f64, radius: f64, center_x: f64, center_y: f64) -> Self {
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "xy".to_string(),
                OutputPortSpec {
                    label: "XY".to_string(),
                    ty: weft_types::infer::canonical_type(vec2_signal()),
                },
            );
            Self {
                angle,
                radius,
                center_x,
                center_y,
                outputs,
            }
        }
    }

    impl BlockDef for PolarToCartesianBlock {
        fn type_name(&self) -> &str {
            "PolarToCartesian"
        }
        fn label(&self) -> &str {
            "Polar to Cartesian"
        }
        fn category(&self) -> &str {
            "math"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            static EMPTY: BTreeMap<String, InputPortSpec> = BTreeMap::new();
            &EMPTY
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            _inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let ft = float_signal();
            let angle = builder.constant(ConstValue::Float(self.angle), ft.clone());
            let radius = builder.constant(ConstValue::Float(self.radius), ft.clone());
            let cx = builder.constant(ConstValue::Float(self.center_x), ft.clone());
            let cy = builder.constant(ConstValue::Float(self.center_y), ft.clone());
            let cos_a = builder.map(angle, PureFn::Opcode(Opcode::Cos), ft.clone());
            let sin_a = builder.map(angle, PureFn::Opcode(Opcode::Sin), ft.clone());
            let dx = builder.zip(vec![radius, cos_a], PureFn::Opcode(Opcode::Mul), ft.clone());
            let dy = builder.zip(vec![radius, sin_a], PureFn::Opcode(Opcode::Mul), ft.clone());
            let x = builder.zip(vec![cx, dx], PureFn::Opcode(Opcode::Add), ft.clone());
            let y = builder.zip(vec![cy, dy], PureFn::Opcode(Opcode::Add), ft);
            let xy = builder
                .construct(vec![x, y], vec2_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "xy".to_string(),
                LoweredOutput {
                    id: xy,
                    slot: None,
                    stride: 2,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    /// Appends a fixed `z` to an incoming `(x, y)`, producing `(x, y, z)`.
    struct SetZBlock {
        z: f64,
        inputs: BTreeMap<String, InputPortSpec>,
        outputs: BTreeMap<String, OutputPortSpec>,
    }

    impl SetZBlock {
        fn new(z: f64) -> Self {
            let mut inputs = BTreeMap::new();
            inputs.insert(
                "xy".to_string(),
                InputPortSpec {
                    label: "XY".to_string(),
                    ty: weft_types::infer::canonical_type(vec2_signal()),
                    default_source: Some(DefaultSource::Const(ConstValue::Vec2([0.0, 0.0]))),
                    ui_hint: None,
                },
            );
            let mut outputs = BTreeMap::new();
            outputs.insert(
                "xyz".to_string(),
                OutputPortSpec {
                    label: "XYZ".to_string(),
                    ty: weft_types::infer::canonical_type(vec3_signal()),
                },
            );
            Self { z, inputs, outputs }
        }
    }

    impl BlockDef for SetZBlock {
        fn type_name(&self) -> &str {
            "SetZ"
        }
        fn label(&self) -> &str {
            "Set Z"
        }
        fn category(&self) -> &str {
            "math"
        }
        fn form(&self) -> Form {
            Form::Primitive
        }
        fn capability(&self) -> Capability {
            Capability::Pure
        }
        fn lowering_purity(&self) -> LoweringPurity {
            LoweringPurity::Pure
        }
        fn cardinality(&self) -> CardinalitySpec {
            pure_cardinality()
        }
        fn inputs(&self) -> &BTreeMap<String, InputPortSpec> {
            &self.inputs
        }
        fn outputs(&self) -> &BTreeMap<String, OutputPortSpec> {
            &self.outputs
        }
        fn lower(
            &self,
            builder: &mut dyn IrBuilder,
            inputs: &BTreeMap<String, LoweredInput>,
        ) -> Result<LowerResult, String> {
            let xy_in = inputs
                .get("xy")
                .ok_or_else(|| "missing xy input".to_string())?
                .id;
            let ft = float_signal();
            let x = builder.extract(xy_in, 0, ft.clone()).map_err(|e| e.to_string())?;
            let y = builder.extract(xy_in, 1, ft.clone()).map_err(|e| e.to_string())?;
            let z = builder.constant(ConstValue::Float(self.z), ft);
            let xyz = builder
                .construct(vec![x, y, z], vec3_signal())
                .map_err(|e| e.to_string())?;

            let mut outputs_by_id = BTreeMap::new();
            outputs_by_id.insert(
                "xyz".to_string(),
                LoweredOutput {
                    id: xyz,
                    slot: None,
                    stride: 3,
                },
            );
            Ok(LowerResult {
                outputs_by_id,
                effects: weft_block_api::Effects::default(),
            })
        }
    }

    fn compile_and_run_one_frame(
        patch: &Patch,
        registry: &BlockRegistry,
    ) -> (crate::compiler::CompiledProgram, ProgramState, weft_render::RenderFrameIR) {
        let outcome = compile(patch, registry, &BTreeMap::new(), TimeModel::Infinite);
        let program = match outcome {
            CompileOutcome::Ok(p) => p,
            CompileOutcome::Error(diags) => panic!("compile failed: {diags:?}"),
        };
        let mut session = SessionState::default();
        let mut state = ProgramState::new(&program.schedule);
        let frame = run_frame(&program.arena, &program.schedule, &mut session, &mut state, 0.0);
        (program, state, frame)
    }

    fn read_f64(program: &crate::compiler::CompiledProgram, state: &ProgramState, block_id: &str, port_id: &str, stride: usize) -> Vec<f64> {
        let slot = program.outputs[&format!("{block_id}:{port_id}")];
        let base = slot.0 as usize;
        (0..stride).map(|i| state.values_f64[base + i]).collect()
    }

    /// Component-wise comparison within floating-point rounding slop; the
    /// scenarios below chain several IEEE-754 operations and are not
    /// expected to reproduce a decimal literal bit-for-bit.
    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "expected {expected:?}, got {actual:?}");
        }
    }

    fn single_block_patch(block_id: &str, type_name: &str) -> Patch {
        let mut patch = Patch::new();
        patch.blocks.insert(
            block_id.to_string(),
            PatchBlockInstance {
                type_name: type_name.to_string(),
                inputs: BTreeMap::new(),
            },
        );
        patch
    }

    #[test]
    fn s1_color_picker_wraps_hue_and_clamps_lightness() {
        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("ColorPicker".to_string(), Box::new(ColorPickerBlock::new(0.25, 1.0, 0.5, 1.0)));
        let patch = single_block_patch("picker", "ColorPicker");
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "picker", "color", 4), &[0.25, 1.0, 0.5, 1.0]);

        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("ColorPicker".to_string(), Box::new(ColorPickerBlock::new(1.25, 1.0, 0.5, 1.0)));
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "picker", "color", 4), &[0.25, 1.0, 0.5, 1.0]);

        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("ColorPicker".to_string(), Box::new(ColorPickerBlock::new(0.25, 1.0, 1.5, 1.0)));
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "picker", "color", 4)[2..3], &[1.0]);
    }

    fn hue_shift_patch() -> Patch {
        let mut patch = Patch::new();
        patch.blocks.insert(
            "make".to_string(),
            PatchBlockInstance {
                type_name: "MakeColorHsl".to_string(),
                inputs: BTreeMap::new(),
            },
        );
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "color".to_string(),
            InputSource::Connected {
                block_id: "make".to_string(),
                port_id: "color".to_string(),
            },
        );
        patch.blocks.insert(
            "shift".to_string(),
            PatchBlockInstance {
                type_name: "HueShift".to_string(),
                inputs,
            },
        );
        patch
    }

    #[test]
    fn s2_hue_shift_wraps_the_shifted_hue() {
        let patch = hue_shift_patch();
        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("MakeColorHsl".to_string(), Box::new(MakeColorHslBlock::new(0.1, 1.0, 0.5, 1.0)));
        registry.insert("HueShift".to_string(), Box::new(HueShiftBlock::new(0.8)));
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "shift", "color", 4), &[0.9, 1.0, 0.5, 1.0]);

        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("MakeColorHsl".to_string(), Box::new(MakeColorHslBlock::new(0.1, 1.0, 0.5, 1.0)));
        registry.insert("HueShift".to_string(), Box::new(HueShiftBlock::new(0.95)));
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "shift", "color", 4), &[0.05, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn s7_const_vec2_writes_both_components() {
        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert("ConstVec2".to_string(), Box::new(ConstVec2Block::new(3.0, 4.0)));
        let patch = single_block_patch("c", "ConstVec2");
        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        assert_close(&read_f64(&program, &state, "c", "xy", 2), &[3.0, 4.0]);
    }

    #[test]
    fn s7_set_z_on_polar_to_cartesian() {
        let mut patch = Patch::new();
        patch.blocks.insert(
            "polar".to_string(),
            PatchBlockInstance {
                type_name: "PolarToCartesian".to_string(),
                inputs: BTreeMap::new(),
            },
        );
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "xy".to_string(),
            InputSource::Connected {
                block_id: "polar".to_string(),
                port_id: "xy".to_string(),
            },
        );
        patch.blocks.insert(
            "setz".to_string(),
            PatchBlockInstance {
                type_name: "SetZ".to_string(),
                inputs,
            },
        );

        let mut registry: BlockRegistry = BTreeMap::new();
        registry.insert(
            "PolarToCartesian".to_string(),
            Box::new(PolarToCartesianBlock::new(0.0, 1.0, 0.5, 0.5)),
        );
        registry.insert("SetZ".to_string(), Box::new(SetZBlock::new(99.0)));

        let (program, state, _frame) = compile_and_run_one_frame(&patch, &registry);
        let xyz = read_f64(&program, &state, "setz", "xyz", 3);
        assert!((xyz[0] - 1.5).abs() < 1e-9);
        assert!((xyz[1] - 0.5).abs() < 1e-9);
        assert!((xyz[2] - 99.0).abs() < 1e-9);
    }
}
