//! The render-state cache.
//!
//! `StateCache` mirrors what the driver currently believes about every state
//! axis the device touches. Each setter compares against the mirror and only
//! issues a native call on a real change, updating the mirror in the same
//! step. Every native call that changes one of these axes must go through
//! here, or later comparisons would skip calls the driver needs.

use crate::caps::{Capabilities, Extensions};
use crate::constants::{
    BlendEquation, BlendFactor, CompareFunc, CullMode, FrontFace, NativeEnums, StencilOp,
};
use crate::gl::{webgl, Gl};
use crate::texture::TargetSlot;

/// Stencil state of one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFaceState {
    pub func: CompareFunc,
    pub reference: i32,
    pub read_mask: u32,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub write_mask: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            func: CompareFunc::Always,
            reference: 0,
            read_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
            write_mask: 0xFF,
        }
    }
}

fn toggle<G: Gl>(gl: &G, capability: u32, on: bool) {
    if on {
        gl.enable(capability);
    } else {
        gl.disable(capability);
    }
}

/// The device's mirror of driver state.
#[derive(Debug)]
pub struct StateCache<G: Gl> {
    enums: NativeEnums,
    webgl2: bool,
    derivative_hint: bool,

    blending: bool,
    blend_src: BlendFactor,
    blend_dst: BlendFactor,
    blend_src_alpha: BlendFactor,
    blend_dst_alpha: BlendFactor,
    separate_alpha_blend: bool,
    blend_equation: BlendEquation,
    blend_alpha_equation: BlendEquation,
    separate_alpha_equation: bool,
    blend_color: [f32; 4],
    color_mask: [bool; 4],

    depth_test: bool,
    depth_write: bool,
    depth_func: CompareFunc,
    depth_bias: bool,
    depth_bias_values: (f32, f32),

    stencil: bool,
    stencil_front: StencilFaceState,
    stencil_back: StencilFaceState,

    cull_mode: CullMode,
    cull_face: u32,
    front_face: FrontFace,
    alpha_to_coverage: bool,
    raster: bool,

    viewport: Option<[i32; 4]>,
    scissor: Option<[i32; 4]>,

    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: i32,

    unpack_flip_y: bool,
    unpack_premultiply_alpha: bool,

    active_unit: u32,
    texture_units: Vec<[Option<G::Texture>; 3]>,
    program: Option<G::Program>,
    framebuffer: Option<G::Framebuffer>,
    vertex_array: Option<G::VertexArray>,
}

impl<G: Gl> StateCache<G> {
    /// A mirror holding power-on defaults. No native calls are issued; use
    /// [`reset`](Self::reset) to establish them on a context.
    pub fn new(caps: &Capabilities, enums: NativeEnums) -> Self {
        let cull_face = enums.cull(CullMode::Back).unwrap_or(glow::BACK);
        Self {
            webgl2: caps.is_webgl2(),
            derivative_hint: caps.is_webgl2() || caps.has(Extensions::STANDARD_DERIVATIVES),
            blending: false,
            blend_src: BlendFactor::One,
            blend_dst: BlendFactor::Zero,
            blend_src_alpha: BlendFactor::One,
            blend_dst_alpha: BlendFactor::Zero,
            separate_alpha_blend: false,
            blend_equation: BlendEquation::Add,
            blend_alpha_equation: BlendEquation::Add,
            separate_alpha_equation: false,
            blend_color: [0.0; 4],
            color_mask: [true; 4],
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunc::LessEqual,
            depth_bias: false,
            depth_bias_values: (0.0, 0.0),
            stencil: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            cull_mode: CullMode::Back,
            cull_face,
            front_face: FrontFace::Ccw,
            alpha_to_coverage: false,
            raster: true,
            viewport: None,
            scissor: None,
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            unpack_flip_y: false,
            unpack_premultiply_alpha: false,
            active_unit: 0,
            texture_units: vec![[None; 3]; caps.max_combined_textures.max(1) as usize],
            program: None,
            framebuffer: None,
            vertex_array: None,
            enums,
        }
    }

    /// Forgets everything and issues the calls that establish power-on
    /// defaults on `gl`. Used at creation and after a restore, where `caps`
    /// and `enums` may differ from before.
    pub fn reset(&mut self, gl: &G, caps: &Capabilities, enums: NativeEnums) {
        *self = Self::new(caps, enums);
        let e = &self.enums;

        gl.disable(glow::BLEND);
        gl.blend_func(e.blend_factor(BlendFactor::One), e.blend_factor(BlendFactor::Zero));
        gl.blend_equation(e.blend_equation(BlendEquation::Add));
        gl.blend_color(0.0, 0.0, 0.0, 0.0);
        gl.color_mask(true, true, true, true);

        gl.enable(glow::CULL_FACE);
        gl.cull_face(self.cull_face);
        gl.front_face(e.front_face(FrontFace::Ccw));

        gl.enable(glow::DEPTH_TEST);
        gl.depth_func(e.compare(CompareFunc::LessEqual));
        gl.depth_mask(true);

        gl.disable(glow::STENCIL_TEST);
        gl.stencil_func(e.compare(CompareFunc::Always), 0, 0xFF);
        let keep = e.stencil_op(StencilOp::Keep);
        gl.stencil_op(keep, keep, keep);
        gl.stencil_mask(0xFF);

        if self.webgl2 {
            gl.disable(glow::SAMPLE_ALPHA_TO_COVERAGE);
            gl.disable(glow::RASTERIZER_DISCARD);
        }

        gl.disable(glow::POLYGON_OFFSET_FILL);
        gl.polygon_offset(0.0, 0.0);

        gl.clear_depth(1.0);
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear_stencil(0);

        if self.derivative_hint {
            gl.hint(webgl::FRAGMENT_SHADER_DERIVATIVE_HINT_OES, glow::NICEST);
        }
        gl.enable(glow::SCISSOR_TEST);
        gl.hint(glow::GENERATE_MIPMAP_HINT, glow::NICEST);

        gl.pixel_store_bool(webgl::UNPACK_FLIP_Y_WEBGL, false);
        gl.pixel_store_bool(webgl::UNPACK_PREMULTIPLY_ALPHA_WEBGL, false);
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);

        gl.active_texture(glow::TEXTURE0);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    }

    /// The enum tables this cache translates with.
    pub fn enums(&self) -> &NativeEnums {
        &self.enums
    }

    // blending

    pub fn set_blending(&mut self, gl: &G, on: bool) {
        if self.blending != on {
            toggle(gl, glow::BLEND, on);
            self.blending = on;
        }
    }

    /// Sets one factor pair for color and alpha.
    pub fn set_blend_function(&mut self, gl: &G, src: BlendFactor, dst: BlendFactor) {
        if self.blend_src != src
            || self.blend_dst != dst
            || self.blend_src_alpha != src
            || self.blend_dst_alpha != dst
            || self.separate_alpha_blend
        {
            gl.blend_func(self.enums.blend_factor(src), self.enums.blend_factor(dst));
            self.blend_src = src;
            self.blend_dst = dst;
            self.blend_src_alpha = src;
            self.blend_dst_alpha = dst;
            self.separate_alpha_blend = false;
        }
    }

    pub fn set_blend_function_separate(
        &mut self,
        gl: &G,
        src: BlendFactor,
        dst: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        if self.blend_src != src
            || self.blend_dst != dst
            || self.blend_src_alpha != src_alpha
            || self.blend_dst_alpha != dst_alpha
            || !self.separate_alpha_blend
        {
            let e = &self.enums;
            gl.blend_func_separate(
                e.blend_factor(src),
                e.blend_factor(dst),
                e.blend_factor(src_alpha),
                e.blend_factor(dst_alpha),
            );
            self.blend_src = src;
            self.blend_dst = dst;
            self.blend_src_alpha = src_alpha;
            self.blend_dst_alpha = dst_alpha;
            self.separate_alpha_blend = true;
        }
    }

    pub fn set_blend_equation(&mut self, gl: &G, equation: BlendEquation) {
        if self.blend_equation != equation
            || self.blend_alpha_equation != equation
            || self.separate_alpha_equation
        {
            gl.blend_equation(self.enums.blend_equation(equation));
            self.blend_equation = equation;
            self.blend_alpha_equation = equation;
            self.separate_alpha_equation = false;
        }
    }

    pub fn set_blend_equation_separate(&mut self, gl: &G, color: BlendEquation, alpha: BlendEquation) {
        if self.blend_equation != color
            || self.blend_alpha_equation != alpha
            || !self.separate_alpha_equation
        {
            gl.blend_equation_separate(
                self.enums.blend_equation(color),
                self.enums.blend_equation(alpha),
            );
            self.blend_equation = color;
            self.blend_alpha_equation = alpha;
            self.separate_alpha_equation = true;
        }
    }

    pub fn set_blend_color(&mut self, gl: &G, color: [f32; 4]) {
        if self.blend_color != color {
            gl.blend_color(color[0], color[1], color[2], color[3]);
            self.blend_color = color;
        }
    }

    pub fn set_color_write(&mut self, gl: &G, mask: [bool; 4]) {
        if self.color_mask != mask {
            gl.color_mask(mask[0], mask[1], mask[2], mask[3]);
            self.color_mask = mask;
        }
    }

    // depth

    pub fn set_depth_test(&mut self, gl: &G, on: bool) {
        if self.depth_test != on {
            toggle(gl, glow::DEPTH_TEST, on);
            self.depth_test = on;
        }
    }

    pub fn set_depth_write(&mut self, gl: &G, on: bool) {
        if self.depth_write != on {
            gl.depth_mask(on);
            self.depth_write = on;
        }
    }

    pub fn set_depth_func(&mut self, gl: &G, func: CompareFunc) {
        if self.depth_func != func {
            gl.depth_func(self.enums.compare(func));
            self.depth_func = func;
        }
    }

    pub fn set_depth_bias(&mut self, gl: &G, on: bool) {
        if self.depth_bias != on {
            toggle(gl, glow::POLYGON_OFFSET_FILL, on);
            self.depth_bias = on;
        }
    }

    pub fn set_depth_bias_values(&mut self, gl: &G, constant: f32, slope: f32) {
        if self.depth_bias_values != (constant, slope) {
            gl.polygon_offset(slope, constant);
            self.depth_bias_values = (constant, slope);
        }
    }

    // stencil

    pub fn set_stencil_test(&mut self, gl: &G, on: bool) {
        if self.stencil != on {
            toggle(gl, glow::STENCIL_TEST, on);
            self.stencil = on;
        }
    }

    /// Sets the stencil function for both faces.
    pub fn set_stencil_func(&mut self, gl: &G, func: CompareFunc, reference: i32, mask: u32) {
        let same = |s: &StencilFaceState| s.func == func && s.reference == reference && s.read_mask == mask;
        if !same(&self.stencil_front) || !same(&self.stencil_back) {
            gl.stencil_func(self.enums.compare(func), reference, mask);
            for face in [&mut self.stencil_front, &mut self.stencil_back] {
                face.func = func;
                face.reference = reference;
                face.read_mask = mask;
            }
        }
    }

    pub fn set_stencil_func_front(&mut self, gl: &G, func: CompareFunc, reference: i32, mask: u32) {
        let s = &mut self.stencil_front;
        if s.func != func || s.reference != reference || s.read_mask != mask {
            gl.stencil_func_separate(glow::FRONT, self.enums.compare(func), reference, mask);
            s.func = func;
            s.reference = reference;
            s.read_mask = mask;
        }
    }

    pub fn set_stencil_func_back(&mut self, gl: &G, func: CompareFunc, reference: i32, mask: u32) {
        let s = &mut self.stencil_back;
        if s.func != func || s.reference != reference || s.read_mask != mask {
            gl.stencil_func_separate(glow::BACK, self.enums.compare(func), reference, mask);
            s.func = func;
            s.reference = reference;
            s.read_mask = mask;
        }
    }

    /// Sets stencil operations and write mask for both faces. Issues at most
    /// one call for the operations and one for the mask.
    pub fn set_stencil_operation(
        &mut self,
        gl: &G,
        fail: StencilOp,
        depth_fail: StencilOp,
        pass: StencilOp,
        write_mask: u32,
    ) {
        let same_ops =
            |s: &StencilFaceState| s.fail == fail && s.depth_fail == depth_fail && s.pass == pass;
        if !same_ops(&self.stencil_front) || !same_ops(&self.stencil_back) {
            let e = &self.enums;
            gl.stencil_op(e.stencil_op(fail), e.stencil_op(depth_fail), e.stencil_op(pass));
            for face in [&mut self.stencil_front, &mut self.stencil_back] {
                face.fail = fail;
                face.depth_fail = depth_fail;
                face.pass = pass;
            }
        }
        if self.stencil_front.write_mask != write_mask || self.stencil_back.write_mask != write_mask {
            gl.stencil_mask(write_mask);
            self.stencil_front.write_mask = write_mask;
            self.stencil_back.write_mask = write_mask;
        }
    }

    /// Sets the write mask of both faces, keeping their operations.
    pub fn set_stencil_write_mask(&mut self, gl: &G, write_mask: u32) {
        if self.stencil_front.write_mask != write_mask || self.stencil_back.write_mask != write_mask {
            gl.stencil_mask(write_mask);
            self.stencil_front.write_mask = write_mask;
            self.stencil_back.write_mask = write_mask;
        }
    }

    pub fn set_stencil_operation_front(
        &mut self,
        gl: &G,
        fail: StencilOp,
        depth_fail: StencilOp,
        pass: StencilOp,
        write_mask: u32,
    ) {
        let enums = &self.enums;
        Self::stencil_operation_face(gl, enums, glow::FRONT, &mut self.stencil_front, [fail, depth_fail, pass], write_mask);
    }

    pub fn set_stencil_operation_back(
        &mut self,
        gl: &G,
        fail: StencilOp,
        depth_fail: StencilOp,
        pass: StencilOp,
        write_mask: u32,
    ) {
        let enums = &self.enums;
        Self::stencil_operation_face(gl, enums, glow::BACK, &mut self.stencil_back, [fail, depth_fail, pass], write_mask);
    }

    fn stencil_operation_face(
        gl: &G,
        enums: &NativeEnums,
        face: u32,
        state: &mut StencilFaceState,
        [fail, depth_fail, pass]: [StencilOp; 3],
        write_mask: u32,
    ) {
        if state.fail != fail || state.depth_fail != depth_fail || state.pass != pass {
            gl.stencil_op_separate(
                face,
                enums.stencil_op(fail),
                enums.stencil_op(depth_fail),
                enums.stencil_op(pass),
            );
            state.fail = fail;
            state.depth_fail = depth_fail;
            state.pass = pass;
        }
        if state.write_mask != write_mask {
            gl.stencil_mask_separate(face, write_mask);
            state.write_mask = write_mask;
        }
    }

    // rasterizer

    pub fn set_cull_mode(&mut self, gl: &G, mode: CullMode) {
        if self.cull_mode == mode {
            return;
        }
        match self.enums.cull(mode) {
            None => gl.disable(glow::CULL_FACE),
            Some(face) => {
                if self.cull_mode == CullMode::None {
                    gl.enable(glow::CULL_FACE);
                }
                if self.cull_face != face {
                    gl.cull_face(face);
                    self.cull_face = face;
                }
            }
        }
        self.cull_mode = mode;
    }

    pub fn set_front_face(&mut self, gl: &G, face: FrontFace) {
        if self.front_face != face {
            gl.front_face(self.enums.front_face(face));
            self.front_face = face;
        }
    }

    /// WebGL 2.0 only; ignored on WebGL 1.0.
    pub fn set_alpha_to_coverage(&mut self, gl: &G, on: bool) {
        if self.webgl2 && self.alpha_to_coverage != on {
            toggle(gl, glow::SAMPLE_ALPHA_TO_COVERAGE, on);
            self.alpha_to_coverage = on;
        }
    }

    /// Turning rasterization off enables rasterizer discard. WebGL 2.0 only.
    pub fn set_rasterization(&mut self, gl: &G, on: bool) {
        if self.webgl2 && self.raster != on {
            toggle(gl, glow::RASTERIZER_DISCARD, !on);
            self.raster = on;
        }
    }

    pub fn set_viewport(&mut self, gl: &G, x: i32, y: i32, width: i32, height: i32) {
        let rect = [x, y, width, height];
        if self.viewport != Some(rect) {
            gl.viewport(x, y, width, height);
            self.viewport = Some(rect);
        }
    }

    pub fn set_scissor(&mut self, gl: &G, x: i32, y: i32, width: i32, height: i32) {
        let rect = [x, y, width, height];
        if self.scissor != Some(rect) {
            gl.scissor(x, y, width, height);
            self.scissor = Some(rect);
        }
    }

    // clear values

    pub fn set_clear_color(&mut self, gl: &G, color: [f32; 4]) {
        if self.clear_color != color {
            gl.clear_color(color[0], color[1], color[2], color[3]);
            self.clear_color = color;
        }
    }

    pub fn set_clear_depth(&mut self, gl: &G, depth: f32) {
        if self.clear_depth != depth {
            gl.clear_depth(depth);
            self.clear_depth = depth;
        }
    }

    pub fn set_clear_stencil(&mut self, gl: &G, stencil: i32) {
        if self.clear_stencil != stencil {
            gl.clear_stencil(stencil);
            self.clear_stencil = stencil;
        }
    }

    // pixel store

    pub fn set_unpack_flip_y(&mut self, gl: &G, flip: bool) {
        if self.unpack_flip_y != flip {
            gl.pixel_store_bool(webgl::UNPACK_FLIP_Y_WEBGL, flip);
            self.unpack_flip_y = flip;
        }
    }

    pub fn set_unpack_premultiply_alpha(&mut self, gl: &G, premultiply: bool) {
        if self.unpack_premultiply_alpha != premultiply {
            gl.pixel_store_bool(webgl::UNPACK_PREMULTIPLY_ALPHA_WEBGL, premultiply);
            self.unpack_premultiply_alpha = premultiply;
        }
    }

    // bindings

    pub fn texture_unit_count(&self) -> u32 {
        self.texture_units.len() as u32
    }

    pub fn active_texture(&mut self, gl: &G, unit: u32) {
        if self.active_unit != unit {
            gl.active_texture(glow::TEXTURE0 + unit);
            self.active_unit = unit;
        }
    }

    /// Binds onto the active unit.
    pub fn bind_texture(&mut self, gl: &G, slot: TargetSlot, texture: G::Texture) {
        let available = self.texture_units.len();
        let Some(slots) = self.texture_units.get_mut(self.active_unit as usize) else {
            log::error!("texture unit {} exceeds the {available} available", self.active_unit);
            return;
        };
        if slots[slot as usize] != Some(texture) {
            gl.bind_texture(slot.gl_target(), Some(texture));
            slots[slot as usize] = Some(texture);
        }
    }

    /// Binds onto `unit`, activating it only when the slot needs to change.
    pub fn bind_texture_on_unit(&mut self, gl: &G, slot: TargetSlot, texture: G::Texture, unit: u32) {
        let Some(slots) = self.texture_units.get(unit as usize) else {
            log::error!("texture unit {unit} exceeds the {} available", self.texture_units.len());
            return;
        };
        if slots[slot as usize] != Some(texture) {
            self.active_texture(gl, unit);
            gl.bind_texture(slot.gl_target(), Some(texture));
            self.texture_units[unit as usize][slot as usize] = Some(texture);
        }
    }

    pub fn bound_texture(&self, unit: u32, slot: TargetSlot) -> Option<G::Texture> {
        self.texture_units.get(unit as usize)?[slot as usize]
    }

    /// Clears `texture` from every unit slot. No native calls: the handle is
    /// being deleted, which unbinds it in the driver too.
    pub fn forget_texture(&mut self, texture: G::Texture) {
        for slots in &mut self.texture_units {
            for slot in slots.iter_mut() {
                if *slot == Some(texture) {
                    *slot = None;
                }
            }
        }
    }

    /// Returns true when the program actually changed.
    pub fn use_program(&mut self, gl: &G, program: Option<G::Program>) -> bool {
        if self.program == program {
            return false;
        }
        gl.use_program(program);
        self.program = program;
        true
    }

    pub fn forget_program(&mut self, program: G::Program) {
        if self.program == Some(program) {
            self.program = None;
        }
    }

    pub fn set_framebuffer(&mut self, gl: &G, framebuffer: Option<G::Framebuffer>) {
        if self.framebuffer != framebuffer {
            gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
            self.framebuffer = framebuffer;
        }
    }

    /// Binds `framebuffer` to both read and draw targets unconditionally,
    /// after code that bound them separately (blits).
    pub fn rebind_framebuffer(&mut self, gl: &G, framebuffer: Option<G::Framebuffer>) {
        gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
        self.framebuffer = framebuffer;
    }

    pub fn framebuffer(&self) -> Option<G::Framebuffer> {
        self.framebuffer
    }

    pub fn forget_framebuffer(&mut self, framebuffer: G::Framebuffer) {
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    pub fn set_vertex_array(&mut self, gl: &G, vertex_array: Option<G::VertexArray>) {
        if self.vertex_array != vertex_array {
            gl.bind_vertex_array(vertex_array);
            self.vertex_array = vertex_array;
        }
    }

    pub fn vertex_array(&self) -> Option<G::VertexArray> {
        self.vertex_array
    }

    pub fn forget_vertex_array(&mut self, vertex_array: G::VertexArray) {
        if self.vertex_array == Some(vertex_array) {
            self.vertex_array = None;
        }
    }

    // queries

    pub fn blending(&self) -> bool {
        self.blending
    }

    pub fn separate_alpha_blend(&self) -> bool {
        self.separate_alpha_blend
    }

    pub fn color_write(&self) -> [bool; 4] {
        self.color_mask
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn stencil_write_mask(&self) -> (u32, u32) {
        (self.stencil_front.write_mask, self.stencil_back.write_mask)
    }

    pub fn stencil_front(&self) -> StencilFaceState {
        self.stencil_front
    }

    pub fn stencil_back(&self) -> StencilFaceState {
        self.stencil_back
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn viewport(&self) -> Option<[i32; 4]> {
        self.viewport
    }

    pub fn scissor(&self) -> Option<[i32; 4]> {
        self.scissor
    }

    pub fn active_unit(&self) -> u32 {
        self.active_unit
    }

    pub fn program(&self) -> Option<G::Program> {
        self.program
    }
}
