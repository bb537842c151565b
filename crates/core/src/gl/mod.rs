//! The native binding seam.
//!
//! Every driver call the device issues goes through the [`Gl`] trait. It is a
//! narrow, safe mirror of `glow::HasContext`: one method per native entry
//! point the device actually uses, with the same argument order and the same
//! GL enum values. Two bindings ship with the crate:
//!
//! - [`glow_backend`] implements [`Gl`] for `glow::Context`, so the device
//!   drives a real desktop GL or WebGL context.
//! - [`recording`] provides [`RecordingGl`], an in-memory binding that hands
//!   out handles, emulates shader reflection and records every call. Tests
//!   and the CLI use it to count native calls.

use std::fmt::Debug;
use std::hash::Hash;

mod glow_backend;
pub mod recording;

pub use recording::{GlCall, Handle, RecordingGl, RecordingLimits};

/// WebGL-only enum values that desktop GL headers (and therefore `glow`) do
/// not name.
pub mod webgl {
    pub const ALPHA: u32 = 0x1906;
    pub const COMPRESSED_RGB_S3TC_DXT1_EXT: u32 = 0x83F0;
    pub const COMPRESSED_RGBA_S3TC_DXT3_EXT: u32 = 0x83F2;
    pub const COMPRESSED_RGBA_S3TC_DXT5_EXT: u32 = 0x83F3;
    pub const COMPRESSED_RGB8_ETC2: u32 = 0x9274;
    pub const COMPRESSED_RGBA8_ETC2_EAC: u32 = 0x9278;
    pub const COMPRESSED_RGBA_ASTC_4X4_KHR: u32 = 0x93B0;
    pub const UNPACK_FLIP_Y_WEBGL: u32 = 0x9240;
    pub const UNPACK_PREMULTIPLY_ALPHA_WEBGL: u32 = 0x9241;
    pub const HALF_FLOAT_OES: u32 = 0x8D61;
    pub const UNSIGNED_INT_24_8_WEBGL: u32 = 0x84FA;
    pub const SRGB_EXT: u32 = 0x8C40;
    pub const SRGB_ALPHA_EXT: u32 = 0x8C42;
    pub const LUMINANCE: u32 = 0x1909;
    pub const LUMINANCE_ALPHA: u32 = 0x190A;
    pub const COMPRESSED_RGB_ETC1_WEBGL: u32 = 0x8D64;
    pub const COMPRESSED_RGB_PVRTC_4BPPV1_IMG: u32 = 0x8C00;
    pub const COMPRESSED_RGB_PVRTC_2BPPV1_IMG: u32 = 0x8C01;
    pub const COMPRESSED_RGBA_PVRTC_4BPPV1_IMG: u32 = 0x8C02;
    pub const COMPRESSED_RGBA_PVRTC_2BPPV1_IMG: u32 = 0x8C03;
    pub const COMPRESSED_RGB_ATC_WEBGL: u32 = 0x8C92;
    pub const COMPRESSED_RGBA_ATC_INTERPOLATED_ALPHA_WEBGL: u32 = 0x87EE;
    pub const MAX_TEXTURE_MAX_ANISOTROPY_EXT: u32 = 0x84FF;
    pub const TEXTURE_MAX_ANISOTROPY_EXT: u32 = 0x84FE;
    pub const FRAGMENT_SHADER_DERIVATIVE_HINT_OES: u32 = 0x8B8B;
}

/// The API generation of a context.
///
/// Generation 1 is WebGL 1.0 / OpenGL ES 2.0 class, generation 2 is
/// WebGL 2.0 / OpenGL ES 3.0 class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiGeneration {
    WebGl1,
    WebGl2,
}

impl ApiGeneration {
    /// Returns true for WebGL 2.0 class contexts.
    pub fn is_webgl2(self) -> bool {
        self == ApiGeneration::WebGl2
    }

    /// Short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ApiGeneration::WebGl1 => "webgl1",
            ApiGeneration::WebGl2 => "webgl2",
        }
    }
}

/// One active uniform reported by program reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Uniform name as reported by the driver (arrays end in `[0]`).
    pub name: String,
    /// Array length, 1 for non-arrays.
    pub size: i32,
    /// GL type enum (`FLOAT_VEC4`, `SAMPLER_2D`, ...).
    pub utype: u32,
}

/// A native graphics binding.
///
/// Methods take `&self` like `glow::HasContext` does; a binding that needs to
/// mutate (e.g. to record calls) uses interior mutability.
pub trait Gl {
    type Texture: Copy + Eq + Hash + Debug;
    type Buffer: Copy + Eq + Hash + Debug;
    type Framebuffer: Copy + Eq + Debug;
    type Renderbuffer: Copy + Eq + Debug;
    type VertexArray: Copy + Eq + Debug;
    type Program: Copy + Eq + Debug;
    type Shader: Copy + Eq + Debug;
    type UniformLocation: Clone + Debug;

    // --- capability queries ---

    fn generation(&self) -> ApiGeneration;
    fn has_extension(&self, name: &str) -> bool;
    fn get_parameter_i32(&self, parameter: u32) -> i32;
    fn get_parameter_f32(&self, parameter: u32) -> f32;

    // --- fixed-function state ---

    fn enable(&self, capability: u32);
    fn disable(&self, capability: u32);
    fn blend_func(&self, src: u32, dst: u32);
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation(&self, mode: u32);
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32);
    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool);
    fn depth_mask(&self, write: bool);
    fn depth_func(&self, func: u32);
    fn stencil_func(&self, func: u32, reference: i32, mask: u32);
    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_mask(&self, mask: u32);
    fn stencil_mask_separate(&self, face: u32, mask: u32);
    fn cull_face(&self, mode: u32);
    fn front_face(&self, mode: u32);
    fn polygon_offset(&self, factor: f32, units: f32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear_stencil(&self, stencil: i32);
    fn clear(&self, mask: u32);
    fn pixel_store_i32(&self, parameter: u32, value: i32);
    fn pixel_store_bool(&self, parameter: u32, value: bool);
    fn hint(&self, target: u32, mode: u32);

    // --- textures ---

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    fn tex_parameter_f32(&self, target: u32, parameter: u32, value: f32);
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    );
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        depth: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        depth: i32,
        data: &[u8],
    );
    fn generate_mipmap(&self, target: u32);
    #[allow(clippy::too_many_arguments)]
    fn copy_tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    );

    // --- buffers and vertex arrays ---

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, data_type: u32, stride: i32, offset: i32);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_divisor(&self, index: u32, divisor: u32);

    // --- framebuffers ---

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn bind_framebuffer(&self, target: u32, framebuffer: Option<Self::Framebuffer>);
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<Self::Texture>,
        level: i32,
    );
    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);
    fn bind_renderbuffer(&self, target: u32, renderbuffer: Option<Self::Renderbuffer>);
    fn renderbuffer_storage(&self, target: u32, internal_format: u32, width: i32, height: i32);
    fn renderbuffer_storage_multisample(
        &self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
    fn framebuffer_renderbuffer(
        &self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<Self::Renderbuffer>,
    );
    fn check_framebuffer_status(&self, target: u32) -> u32;
    fn draw_buffers(&self, buffers: &[u32]);
    #[allow(clippy::too_many_arguments)]
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
    );
    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]);
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &mut [u8],
    );

    // --- shaders and programs ---

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);
    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn bind_attrib_location(&self, program: Self::Program, index: u32, name: &str);
    fn link_program(&self, program: Self::Program);
    fn get_program_link_status(&self, program: Self::Program) -> bool;
    fn get_program_info_log(&self, program: Self::Program) -> String;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);
    fn get_active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform>;
    fn get_uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    /// Uploads `data` as `components`-wide float vectors (1..=4).
    fn uniform_f32(&self, location: &Self::UniformLocation, components: u32, data: &[f32]);
    /// Uploads `data` as `components`-wide integer vectors (1..=4).
    fn uniform_i32(&self, location: &Self::UniformLocation, components: u32, data: &[i32]);
    /// Uploads `data` as column-major `dim`x`dim` matrices (2..=4).
    fn uniform_matrix_f32(&self, location: &Self::UniformLocation, dim: u32, data: &[f32]);

    // --- draws ---

    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32);
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_names_are_stable() {
        assert_eq!(ApiGeneration::WebGl1.name(), "webgl1");
        assert_eq!(ApiGeneration::WebGl2.name(), "webgl2");
    }

    #[test]
    fn only_webgl2_reports_webgl2() {
        assert!(ApiGeneration::WebGl2.is_webgl2());
        assert!(!ApiGeneration::WebGl1.is_webgl2());
    }

    #[test]
    fn generations_are_ordered() {
        assert!(ApiGeneration::WebGl1 < ApiGeneration::WebGl2);
    }

    #[test]
    fn webgl_only_enums_have_registry_values() {
        assert_eq!(webgl::UNPACK_FLIP_Y_WEBGL, 0x9240);
        assert_eq!(webgl::HALF_FLOAT_OES, 0x8D61);
        assert_eq!(webgl::COMPRESSED_RGB_ETC1_WEBGL, 0x8D64);
    }
}
