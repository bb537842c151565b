//! An in-memory [`Gl`] that records every native call.
//!
//! `RecordingGl` stands in for a driver wherever no real context exists: unit
//! and integration tests assert on the recorded [`GlCall`] sequence, and the
//! CLI replays frames against it to report call counts. It allocates handles,
//! tracks shader sources so that compile/link/reflection behave plausibly
//! (a source containing `#error` fails to compile; `uniform` declarations are
//! reported as active uniforms), and answers limit queries from
//! [`RecordingLimits`]. Queries are not recorded; everything else is.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use super::{webgl, ActiveUniform, ApiGeneration, Gl};

/// Handle handed out by [`RecordingGl`] for every object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

/// Uniform location handed out by [`RecordingGl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordedLocation {
    pub program: Handle,
    pub name: String,
}

/// Limits reported through `get_parameter_*`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingLimits {
    pub max_texture_size: i32,
    pub max_cube_map_size: i32,
    pub max_3d_texture_size: i32,
    pub max_renderbuffer_size: i32,
    pub max_samples: i32,
    pub max_texture_units: i32,
    pub max_combined_texture_units: i32,
    pub max_vertex_texture_units: i32,
    pub max_draw_buffers: i32,
    pub max_color_attachments: i32,
    pub max_vertex_uniform_vectors: i32,
    pub max_fragment_uniform_vectors: i32,
    pub max_anisotropy: f32,
}

impl Default for RecordingLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            max_cube_map_size: 4096,
            max_3d_texture_size: 2048,
            max_renderbuffer_size: 4096,
            max_samples: 4,
            max_texture_units: 16,
            max_combined_texture_units: 32,
            max_vertex_texture_units: 16,
            max_draw_buffers: 8,
            max_color_attachments: 8,
            max_vertex_uniform_vectors: 256,
            max_fragment_uniform_vectors: 224,
            max_anisotropy: 16.0,
        }
    }
}

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Enable(u32),
    Disable(u32),
    BlendFunc { src: u32, dst: u32 },
    BlendFuncSeparate { src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32 },
    BlendEquation(u32),
    BlendEquationSeparate { rgb: u32, alpha: u32 },
    BlendColor([f32; 4]),
    ColorMask([bool; 4]),
    DepthMask(bool),
    DepthFunc(u32),
    StencilFunc { func: u32, reference: i32, mask: u32 },
    StencilFuncSeparate { face: u32, func: u32, reference: i32, mask: u32 },
    StencilOp { fail: u32, depth_fail: u32, pass: u32 },
    StencilOpSeparate { face: u32, fail: u32, depth_fail: u32, pass: u32 },
    StencilMask(u32),
    StencilMaskSeparate { face: u32, mask: u32 },
    CullFace(u32),
    FrontFace(u32),
    PolygonOffset { factor: f32, units: f32 },
    Viewport([i32; 4]),
    Scissor([i32; 4]),
    ClearColor([f32; 4]),
    ClearDepth(f32),
    ClearStencil(i32),
    Clear(u32),
    PixelStoreI32 { parameter: u32, value: i32 },
    PixelStoreBool { parameter: u32, value: bool },
    Hint { target: u32, mode: u32 },
    CreateTexture(Handle),
    DeleteTexture(Handle),
    ActiveTexture(u32),
    BindTexture { target: u32, texture: Option<Handle> },
    TexParameterI32 { target: u32, parameter: u32, value: i32 },
    TexParameterF32 { target: u32, parameter: u32, value: f32 },
    TexImage2D {
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        bytes: Option<usize>,
    },
    TexSubImage2D { target: u32, level: i32, width: i32, height: i32, bytes: usize },
    CompressedTexImage2D {
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        bytes: usize,
    },
    TexImage3D {
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        depth: i32,
        bytes: Option<usize>,
    },
    CompressedTexImage3D {
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
        bytes: usize,
    },
    GenerateMipmap(u32),
    CopyTexSubImage2D { target: u32, level: i32, width: i32, height: i32 },
    CreateBuffer(Handle),
    DeleteBuffer(Handle),
    BindBuffer { target: u32, buffer: Option<Handle> },
    BufferData { target: u32, bytes: usize, usage: u32 },
    CreateVertexArray(Handle),
    DeleteVertexArray(Handle),
    BindVertexArray(Option<Handle>),
    VertexAttribPointer {
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
        integer: bool,
    },
    EnableVertexAttribArray(u32),
    VertexAttribDivisor { index: u32, divisor: u32 },
    CreateFramebuffer(Handle),
    DeleteFramebuffer(Handle),
    BindFramebuffer { target: u32, framebuffer: Option<Handle> },
    FramebufferTexture2D {
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<Handle>,
        level: i32,
    },
    CreateRenderbuffer(Handle),
    DeleteRenderbuffer(Handle),
    BindRenderbuffer(Option<Handle>),
    RenderbufferStorage { internal_format: u32, width: i32, height: i32, samples: i32 },
    FramebufferRenderbuffer { target: u32, attachment: u32, renderbuffer: Option<Handle> },
    DrawBuffers(Vec<u32>),
    BlitFramebuffer { src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32 },
    InvalidateFramebuffer { target: u32, attachments: Vec<u32> },
    CopyTexImage,
    ReadPixels { x: i32, y: i32, width: i32, height: i32 },
    CreateShader(Handle),
    ShaderSource(Handle),
    CompileShader(Handle),
    DeleteShader(Handle),
    CreateProgram(Handle),
    AttachShader { program: Handle, shader: Handle },
    DetachShader { program: Handle, shader: Handle },
    BindAttribLocation { program: Handle, index: u32, name: String },
    LinkProgram(Handle),
    DeleteProgram(Handle),
    UseProgram(Option<Handle>),
    UniformF32 { name: String, components: u32, values: Vec<f32> },
    UniformI32 { name: String, components: u32, values: Vec<i32> },
    UniformMatrix { name: String, dim: u32, values: Vec<f32> },
    DrawArrays { mode: u32, first: i32, count: i32, instances: Option<i32> },
    DrawElements { mode: u32, count: i32, element_type: u32, offset: i32, instances: Option<i32> },
}

impl GlCall {
    /// True for calls that upload texel data (full or partial, compressed or not).
    pub fn is_texture_upload(&self) -> bool {
        matches!(
            self,
            GlCall::TexImage2D { .. }
                | GlCall::TexSubImage2D { .. }
                | GlCall::CompressedTexImage2D { .. }
                | GlCall::TexImage3D { .. }
                | GlCall::CompressedTexImage3D { .. }
        )
    }

    /// True for draw submissions.
    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. })
    }
}

#[derive(Debug)]
struct ShaderRecord {
    source: String,
    compiled: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    shaders: Vec<Handle>,
    linked: bool,
    uniforms: Vec<ActiveUniform>,
}

/// A recording, driver-less [`Gl`] implementation.
#[derive(Debug)]
pub struct RecordingGl {
    generation: ApiGeneration,
    extensions: HashSet<String>,
    limits: RecordingLimits,
    next_handle: Cell<u32>,
    framebuffer_status: Cell<u32>,
    calls: RefCell<Vec<GlCall>>,
    shaders: RefCell<HashMap<Handle, ShaderRecord>>,
    programs: RefCell<HashMap<Handle, ProgramRecord>>,
}

/// Extensions a typical WebGL 2.0 browser context exposes.
const WEBGL2_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "EXT_texture_filter_anisotropic",
    "OES_texture_float_linear",
    "WEBGL_compressed_texture_s3tc",
];

/// Extensions a typical WebGL 1.0 browser context exposes.
const WEBGL1_EXTENSIONS: &[&str] = &[
    "OES_vertex_array_object",
    "ANGLE_instanced_arrays",
    "OES_element_index_uint",
    "OES_texture_float",
    "OES_texture_half_float",
    "WEBGL_depth_texture",
    "EXT_texture_filter_anisotropic",
    "EXT_blend_minmax",
];

impl RecordingGl {
    /// A WebGL 2.0 class binding with a typical desktop-browser extension set.
    pub fn webgl2() -> Self {
        Self::new(ApiGeneration::WebGl2, WEBGL2_EXTENSIONS)
    }

    /// A WebGL 1.0 class binding with a typical desktop-browser extension set.
    pub fn webgl1() -> Self {
        Self::new(ApiGeneration::WebGl1, WEBGL1_EXTENSIONS)
    }

    /// A binding of the given generation exposing exactly `extensions`.
    pub fn new(generation: ApiGeneration, extensions: &[&str]) -> Self {
        let limits = match generation {
            ApiGeneration::WebGl2 => RecordingLimits::default(),
            ApiGeneration::WebGl1 => RecordingLimits {
                max_3d_texture_size: 0,
                max_samples: 0,
                max_draw_buffers: 1,
                max_color_attachments: 1,
                ..RecordingLimits::default()
            },
        };
        Self {
            generation,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            limits,
            next_handle: Cell::new(1),
            framebuffer_status: Cell::new(glow::FRAMEBUFFER_COMPLETE),
            calls: RefCell::new(Vec::new()),
            shaders: RefCell::new(HashMap::new()),
            programs: RefCell::new(HashMap::new()),
        }
    }

    /// Adds extensions to the advertised set.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions.extend(extensions.iter().map(|e| e.to_string()));
        self
    }

    /// Removes every advertised extension.
    pub fn without_extensions(mut self) -> Self {
        self.extensions.clear();
        self
    }

    /// Replaces the reported limits.
    pub fn with_limits(mut self, limits: RecordingLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Makes `check_framebuffer_status` report `status` from now on.
    pub fn set_framebuffer_status(&self, status: u32) {
        self.framebuffer_status.set(status);
    }

    /// The reported limits.
    pub fn limits(&self) -> &RecordingLimits {
        &self.limits
    }

    /// A copy of every call recorded so far, in issue order.
    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    /// Total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Forgets every recorded call.
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> Handle {
        let handle = Handle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        handle
    }
}

/// Maps a GLSL type name to the GL type enum reflection reports for it.
fn glsl_type_enum(name: &str) -> Option<u32> {
    let utype = match name {
        "float" => glow::FLOAT,
        "vec2" => glow::FLOAT_VEC2,
        "vec3" => glow::FLOAT_VEC3,
        "vec4" => glow::FLOAT_VEC4,
        "int" => glow::INT,
        "ivec2" => glow::INT_VEC2,
        "ivec3" => glow::INT_VEC3,
        "ivec4" => glow::INT_VEC4,
        "uint" => glow::UNSIGNED_INT,
        "bool" => glow::BOOL,
        "mat2" => glow::FLOAT_MAT2,
        "mat3" => glow::FLOAT_MAT3,
        "mat4" => glow::FLOAT_MAT4,
        "sampler2D" => glow::SAMPLER_2D,
        "samplerCube" => glow::SAMPLER_CUBE,
        "sampler3D" => glow::SAMPLER_3D,
        "sampler2DShadow" => glow::SAMPLER_2D_SHADOW,
        "sampler2DArray" => glow::SAMPLER_2D_ARRAY,
        "isampler2D" => glow::INT_SAMPLER_2D,
        "usampler2D" => glow::UNSIGNED_INT_SAMPLER_2D,
        _ => return None,
    };
    Some(utype)
}

/// Extracts `uniform` declarations from GLSL source the way a driver's
/// reflection would report them (arrays as `name[0]` with their length).
fn scan_uniforms(source: &str, out: &mut Vec<ActiveUniform>) {
    for line in source.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("uniform ") else {
            continue;
        };
        let declaration = rest.trim_end_matches(';').trim();
        let mut tokens = declaration
            .split_whitespace()
            .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"));
        let (Some(type_name), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let Some(utype) = glsl_type_enum(type_name) else {
            continue;
        };
        let (base, size) = match name.split_once('[') {
            Some((base, len)) => (base, len.trim_end_matches(']').parse().unwrap_or(1)),
            None => (name, 1),
        };
        let reported = if size > 1 || name.contains('[') {
            format!("{base}[0]")
        } else {
            base.to_string()
        };
        if out.iter().any(|u| u.name == reported) {
            continue;
        }
        out.push(ActiveUniform {
            name: reported,
            size,
            utype,
        });
    }
}

impl Gl for RecordingGl {
    type Texture = Handle;
    type Buffer = Handle;
    type Framebuffer = Handle;
    type Renderbuffer = Handle;
    type VertexArray = Handle;
    type Program = Handle;
    type Shader = Handle;
    type UniformLocation = RecordedLocation;

    fn generation(&self) -> ApiGeneration {
        self.generation
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn get_parameter_i32(&self, parameter: u32) -> i32 {
        let l = &self.limits;
        match parameter {
            glow::MAX_TEXTURE_SIZE => l.max_texture_size,
            glow::MAX_CUBE_MAP_TEXTURE_SIZE => l.max_cube_map_size,
            glow::MAX_3D_TEXTURE_SIZE => l.max_3d_texture_size,
            glow::MAX_RENDERBUFFER_SIZE => l.max_renderbuffer_size,
            glow::MAX_SAMPLES => l.max_samples,
            glow::MAX_TEXTURE_IMAGE_UNITS => l.max_texture_units,
            glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS => l.max_combined_texture_units,
            glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS => l.max_vertex_texture_units,
            glow::MAX_DRAW_BUFFERS => l.max_draw_buffers,
            glow::MAX_COLOR_ATTACHMENTS => l.max_color_attachments,
            glow::MAX_VERTEX_UNIFORM_VECTORS => l.max_vertex_uniform_vectors,
            glow::MAX_FRAGMENT_UNIFORM_VECTORS => l.max_fragment_uniform_vectors,
            _ => 0,
        }
    }

    fn get_parameter_f32(&self, parameter: u32) -> f32 {
        match parameter {
            webgl::MAX_TEXTURE_MAX_ANISOTROPY_EXT => self.limits.max_anisotropy,
            other => self.get_parameter_i32(other) as f32,
        }
    }

    fn enable(&self, capability: u32) {
        self.record(GlCall::Enable(capability));
    }

    fn disable(&self, capability: u32) {
        self.record(GlCall::Disable(capability));
    }

    fn blend_func(&self, src: u32, dst: u32) {
        self.record(GlCall::BlendFunc { src, dst });
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(GlCall::BlendFuncSeparate {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn blend_equation(&self, mode: u32) {
        self.record(GlCall::BlendEquation(mode));
    }

    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        self.record(GlCall::BlendEquationSeparate {
            rgb: mode_rgb,
            alpha: mode_alpha,
        });
    }

    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::BlendColor([r, g, b, a]));
    }

    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        self.record(GlCall::ColorMask([r, g, b, a]));
    }

    fn depth_mask(&self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn depth_func(&self, func: u32) {
        self.record(GlCall::DepthFunc(func));
    }

    fn stencil_func(&self, func: u32, reference: i32, mask: u32) {
        self.record(GlCall::StencilFunc {
            func,
            reference,
            mask,
        });
    }

    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32) {
        self.record(GlCall::StencilFuncSeparate {
            face,
            func,
            reference,
            mask,
        });
    }

    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32) {
        self.record(GlCall::StencilOp {
            fail,
            depth_fail,
            pass,
        });
    }

    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        self.record(GlCall::StencilOpSeparate {
            face,
            fail,
            depth_fail,
            pass,
        });
    }

    fn stencil_mask(&self, mask: u32) {
        self.record(GlCall::StencilMask(mask));
    }

    fn stencil_mask_separate(&self, face: u32, mask: u32) {
        self.record(GlCall::StencilMaskSeparate { face, mask });
    }

    fn cull_face(&self, mode: u32) {
        self.record(GlCall::CullFace(mode));
    }

    fn front_face(&self, mode: u32) {
        self.record(GlCall::FrontFace(mode));
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record(GlCall::PolygonOffset { factor, units });
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport([x, y, width, height]));
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Scissor([x, y, width, height]));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear_depth(&self, depth: f32) {
        self.record(GlCall::ClearDepth(depth));
    }

    fn clear_stencil(&self, stencil: i32) {
        self.record(GlCall::ClearStencil(stencil));
    }

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn pixel_store_i32(&self, parameter: u32, value: i32) {
        self.record(GlCall::PixelStoreI32 { parameter, value });
    }

    fn pixel_store_bool(&self, parameter: u32, value: bool) {
        self.record(GlCall::PixelStoreBool { parameter, value });
    }

    fn hint(&self, target: u32, mode: u32) {
        self.record(GlCall::Hint { target, mode });
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        let handle = self.allocate();
        self.record(GlCall::CreateTexture(handle));
        Ok(handle)
    }

    fn delete_texture(&self, texture: Self::Texture) {
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        self.record(GlCall::TexParameterI32 {
            target,
            parameter,
            value,
        });
    }

    fn tex_parameter_f32(&self, target: u32, parameter: u32, value: f32) {
        self.record(GlCall::TexParameterF32 {
            target,
            parameter,
            value,
        });
    }

    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2D {
            target,
            level,
            internal_format,
            width,
            height,
            format,
            ty,
            bytes: pixels.map(<[u8]>::len),
        });
    }

    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        _x_offset: i32,
        _y_offset: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        pixels: &[u8],
    ) {
        self.record(GlCall::TexSubImage2D {
            target,
            level,
            width,
            height,
            bytes: pixels.len(),
        });
    }

    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        self.record(GlCall::CompressedTexImage2D {
            target,
            level,
            internal_format,
            width,
            height,
            bytes: data.len(),
        });
    }

    fn tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        depth: i32,
        _format: u32,
        _ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage3D {
            target,
            level,
            internal_format,
            width,
            height,
            depth,
            bytes: pixels.map(<[u8]>::len),
        });
    }

    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
        data: &[u8],
    ) {
        self.record(GlCall::CompressedTexImage3D {
            target,
            level,
            internal_format,
            width,
            height,
            depth,
            bytes: data.len(),
        });
    }

    fn generate_mipmap(&self, target: u32) {
        self.record(GlCall::GenerateMipmap(target));
    }

    fn copy_tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        _x_offset: i32,
        _y_offset: i32,
        _x: i32,
        _y: i32,
        width: i32,
        height: i32,
    ) {
        self.record(GlCall::CopyTexSubImage2D {
            target,
            level,
            width,
            height,
        });
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        let handle = self.allocate();
        self.record(GlCall::CreateBuffer(handle));
        Ok(handle)
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        self.record(GlCall::BufferData {
            target,
            bytes: data.len(),
            usage,
        });
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        let handle = self.allocate();
        self.record(GlCall::CreateVertexArray(handle));
        Ok(handle)
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        self.record(GlCall::DeleteVertexArray(vertex_array));
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        self.record(GlCall::BindVertexArray(vertex_array));
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            data_type,
            normalized,
            stride,
            offset,
            integer: false,
        });
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, data_type: u32, stride: i32, offset: i32) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            data_type,
            normalized: false,
            stride,
            offset,
            integer: true,
        });
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        self.record(GlCall::VertexAttribDivisor { index, divisor });
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        let handle = self.allocate();
        self.record(GlCall::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<Self::Framebuffer>) {
        self.record(GlCall::BindFramebuffer {
            target,
            framebuffer,
        });
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<Self::Texture>,
        level: i32,
    ) {
        self.record(GlCall::FramebufferTexture2D {
            target,
            attachment,
            texture_target,
            texture,
            level,
        });
    }

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String> {
        let handle = self.allocate();
        self.record(GlCall::CreateRenderbuffer(handle));
        Ok(handle)
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        self.record(GlCall::DeleteRenderbuffer(renderbuffer));
    }

    fn bind_renderbuffer(&self, _target: u32, renderbuffer: Option<Self::Renderbuffer>) {
        self.record(GlCall::BindRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage(&self, _target: u32, internal_format: u32, width: i32, height: i32) {
        self.record(GlCall::RenderbufferStorage {
            internal_format,
            width,
            height,
            samples: 0,
        });
    }

    fn renderbuffer_storage_multisample(
        &self,
        _target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        self.record(GlCall::RenderbufferStorage {
            internal_format,
            width,
            height,
            samples,
        });
    }

    fn framebuffer_renderbuffer(
        &self,
        target: u32,
        attachment: u32,
        _renderbuffer_target: u32,
        renderbuffer: Option<Self::Renderbuffer>,
    ) {
        self.record(GlCall::FramebufferRenderbuffer {
            target,
            attachment,
            renderbuffer,
        });
    }

    fn check_framebuffer_status(&self, _target: u32) -> u32 {
        self.framebuffer_status.get()
    }

    fn draw_buffers(&self, buffers: &[u32]) {
        self.record(GlCall::DrawBuffers(buffers.to_vec()));
    }

    fn blit_framebuffer(
        &self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: u32,
    ) {
        self.record(GlCall::BlitFramebuffer {
            src: [src_x0, src_y0, src_x1, src_y1],
            dst: [dst_x0, dst_y0, dst_x1, dst_y1],
            mask,
            filter,
        });
    }

    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]) {
        self.record(GlCall::InvalidateFramebuffer {
            target,
            attachments: attachments.to_vec(),
        });
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        pixels: &mut [u8],
    ) {
        pixels.fill(0);
        self.record(GlCall::ReadPixels {
            x,
            y,
            width,
            height,
        });
    }

    fn create_shader(&self, _shader_type: u32) -> Result<Self::Shader, String> {
        let handle = self.allocate();
        self.shaders.borrow_mut().insert(
            handle,
            ShaderRecord {
                source: String::new(),
                compiled: false,
            },
        );
        self.record(GlCall::CreateShader(handle));
        Ok(handle)
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        if let Some(record) = self.shaders.borrow_mut().get_mut(&shader) {
            record.source = source.to_string();
        }
        self.record(GlCall::ShaderSource(shader));
    }

    fn compile_shader(&self, shader: Self::Shader) {
        if let Some(record) = self.shaders.borrow_mut().get_mut(&shader) {
            record.compiled = !record.source.contains("#error");
        }
        self.record(GlCall::CompileShader(shader));
    }

    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        self.shaders
            .borrow()
            .get(&shader)
            .is_some_and(|record| record.compiled)
    }

    fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        match self.shaders.borrow().get(&shader) {
            Some(record) if !record.compiled => {
                "ERROR: 0:1: '#error' : preprocessor error".to_string()
            }
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        self.shaders.borrow_mut().remove(&shader);
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        let handle = self.allocate();
        self.programs
            .borrow_mut()
            .insert(handle, ProgramRecord::default());
        self.record(GlCall::CreateProgram(handle));
        Ok(handle)
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(record) = self.programs.borrow_mut().get_mut(&program) {
            record.shaders.push(shader);
        }
        self.record(GlCall::AttachShader { program, shader });
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(record) = self.programs.borrow_mut().get_mut(&program) {
            record.shaders.retain(|s| *s != shader);
        }
        self.record(GlCall::DetachShader { program, shader });
    }

    fn bind_attrib_location(&self, program: Self::Program, index: u32, name: &str) {
        self.record(GlCall::BindAttribLocation {
            program,
            index,
            name: name.to_string(),
        });
    }

    fn link_program(&self, program: Self::Program) {
        let shaders = self.shaders.borrow();
        if let Some(record) = self.programs.borrow_mut().get_mut(&program) {
            let mut uniforms = Vec::new();
            let mut linked = !record.shaders.is_empty();
            for handle in &record.shaders {
                match shaders.get(handle) {
                    Some(shader) if shader.compiled => scan_uniforms(&shader.source, &mut uniforms),
                    _ => linked = false,
                }
            }
            record.linked = linked;
            record.uniforms = uniforms;
        }
        drop(shaders);
        self.record(GlCall::LinkProgram(program));
    }

    fn get_program_link_status(&self, program: Self::Program) -> bool {
        self.programs
            .borrow()
            .get(&program)
            .is_some_and(|record| record.linked)
    }

    fn get_program_info_log(&self, program: Self::Program) -> String {
        match self.programs.borrow().get(&program) {
            Some(record) if !record.linked => "link failed: unresolved shader stage".to_string(),
            _ => String::new(),
        }
    }

    fn delete_program(&self, program: Self::Program) {
        self.programs.borrow_mut().remove(&program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<Self::Program>) {
        self.record(GlCall::UseProgram(program));
    }

    fn get_active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform> {
        self.programs
            .borrow()
            .get(&program)
            .map(|record| record.uniforms.clone())
            .unwrap_or_default()
    }

    fn get_uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        let programs = self.programs.borrow();
        let record = programs.get(&program)?;
        record
            .uniforms
            .iter()
            .any(|u| u.name == name)
            .then(|| RecordedLocation {
                program,
                name: name.trim_end_matches("[0]").to_string(),
            })
    }

    fn uniform_f32(&self, location: &Self::UniformLocation, components: u32, data: &[f32]) {
        self.record(GlCall::UniformF32 {
            name: location.name.clone(),
            components,
            values: data.to_vec(),
        });
    }

    fn uniform_i32(&self, location: &Self::UniformLocation, components: u32, data: &[i32]) {
        self.record(GlCall::UniformI32 {
            name: location.name.clone(),
            components,
            values: data.to_vec(),
        });
    }

    fn uniform_matrix_f32(&self, location: &Self::UniformLocation, dim: u32, data: &[f32]) {
        self.record(GlCall::UniformMatrix {
            name: location.name.clone(),
            dim,
            values: data.to_vec(),
        });
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(GlCall::DrawArrays {
            mode,
            first,
            count,
            instances: None,
        });
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        self.record(GlCall::DrawArrays {
            mode,
            first,
            count,
            instances: Some(instances),
        });
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            element_type,
            offset,
            instances: None,
        });
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    ) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            element_type,
            offset,
            instances: Some(instances),
        });
    }
}
