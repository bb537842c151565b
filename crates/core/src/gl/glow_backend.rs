//! [`Gl`] for `glow::Context`.
//!
//! Each method forwards to the `glow::HasContext` call of the same name.
//! glow marks every raw GL call `unsafe`; the device only passes handles it
//! created on this same context and enum values taken from the GL registry.

#![allow(unsafe_code)]

use glow::HasContext;

use super::{ActiveUniform, ApiGeneration, Gl};

impl Gl for glow::Context {
    type Texture = glow::Texture;
    type Buffer = glow::Buffer;
    type Framebuffer = glow::Framebuffer;
    type Renderbuffer = glow::Renderbuffer;
    type VertexArray = glow::VertexArray;
    type Program = glow::Program;
    type Shader = glow::Shader;
    type UniformLocation = glow::UniformLocation;

    fn generation(&self) -> ApiGeneration {
        if self.version().major >= 3 {
            ApiGeneration::WebGl2
        } else {
            ApiGeneration::WebGl1
        }
    }

    fn has_extension(&self, name: &str) -> bool {
        let extensions = self.supported_extensions();
        extensions.contains(name) || extensions.contains(&format!("GL_{name}"))
    }

    fn get_parameter_i32(&self, parameter: u32) -> i32 {
        // SAFETY: parameter is a registry enum; unknown ones raise a GL error, not UB.
        unsafe { HasContext::get_parameter_i32(self, parameter) }
    }

    fn get_parameter_f32(&self, parameter: u32) -> f32 {
        // SAFETY: see get_parameter_i32.
        unsafe { HasContext::get_parameter_f32(self, parameter) }
    }

    fn enable(&self, capability: u32) {
        // SAFETY: plain state toggle.
        unsafe { HasContext::enable(self, capability) }
    }

    fn disable(&self, capability: u32) {
        // SAFETY: plain state toggle.
        unsafe { HasContext::disable(self, capability) }
    }

    fn blend_func(&self, src: u32, dst: u32) {
        // SAFETY: factors come from the device's native enum map.
        unsafe { HasContext::blend_func(self, src, dst) }
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        // SAFETY: factors come from the device's native enum map.
        unsafe { HasContext::blend_func_separate(self, src_rgb, dst_rgb, src_alpha, dst_alpha) }
    }

    fn blend_equation(&self, mode: u32) {
        // SAFETY: mode comes from the device's native enum map.
        unsafe { HasContext::blend_equation(self, mode) }
    }

    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        // SAFETY: modes come from the device's native enum map.
        unsafe { HasContext::blend_equation_separate(self, mode_rgb, mode_alpha) }
    }

    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::blend_color(self, r, g, b, a) }
    }

    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        // SAFETY: plain state setter.
        unsafe { HasContext::color_mask(self, r, g, b, a) }
    }

    fn depth_mask(&self, write: bool) {
        // SAFETY: plain state setter.
        unsafe { HasContext::depth_mask(self, write) }
    }

    fn depth_func(&self, func: u32) {
        // SAFETY: func comes from the device's native enum map.
        unsafe { HasContext::depth_func(self, func) }
    }

    fn stencil_func(&self, func: u32, reference: i32, mask: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_func(self, func, reference, mask) }
    }

    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_func_separate(self, face, func, reference, mask) }
    }

    fn stencil_op(&self, fail: u32, depth_fail: u32, pass: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_op(self, fail, depth_fail, pass) }
    }

    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_op_separate(self, face, fail, depth_fail, pass) }
    }

    fn stencil_mask(&self, mask: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_mask(self, mask) }
    }

    fn stencil_mask_separate(&self, face: u32, mask: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::stencil_mask_separate(self, face, mask) }
    }

    fn cull_face(&self, mode: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::cull_face(self, mode) }
    }

    fn front_face(&self, mode: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::front_face(self, mode) }
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::polygon_offset(self, factor, units) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::viewport(self, x, y, width, height) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::scissor(self, x, y, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::clear_color(self, r, g, b, a) }
    }

    fn clear_depth(&self, depth: f32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::clear_depth_f32(self, depth) }
    }

    fn clear_stencil(&self, stencil: i32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::clear_stencil(self, stencil) }
    }

    fn clear(&self, mask: u32) {
        // SAFETY: mask is a combination of *_BUFFER_BIT values.
        unsafe { HasContext::clear(self, mask) }
    }

    fn pixel_store_i32(&self, parameter: u32, value: i32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::pixel_store_i32(self, parameter, value) }
    }

    fn pixel_store_bool(&self, parameter: u32, value: bool) {
        // SAFETY: plain state setter.
        unsafe { HasContext::pixel_store_bool(self, parameter, value) }
    }

    fn hint(&self, target: u32, mode: u32) {
        // SAFETY: plain state setter.
        unsafe { HasContext::hint(self, target, mode) }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_texture(self) }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        // SAFETY: texture was created on this context and is deleted once.
        unsafe { HasContext::delete_texture(self, texture) }
    }

    fn active_texture(&self, unit: u32) {
        // SAFETY: unit is TEXTURE0 + n with n below the combined unit limit.
        unsafe { HasContext::active_texture(self, unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        // SAFETY: texture is live on this context or None.
        unsafe { HasContext::bind_texture(self, target, texture) }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        // SAFETY: applies to the texture bound on the active unit.
        unsafe { HasContext::tex_parameter_i32(self, target, parameter, value) }
    }

    fn tex_parameter_f32(&self, target: u32, parameter: u32, value: f32) {
        // SAFETY: applies to the texture bound on the active unit.
        unsafe { HasContext::tex_parameter_f32(self, target, parameter, value) }
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
        // SAFETY: pixels, when present, were sized by the upload pipeline for
        // width x height of format/ty; glow validates the slice length.
        unsafe {
            HasContext::tex_image_2d(
                self,
                target,
                level,
                internal_format,
                width,
                height,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

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
    ) {
        // SAFETY: the level was allocated by a prior tex_image_2d of this size.
        unsafe {
            HasContext::tex_sub_image_2d(
                self,
                target,
                level,
                x_offset,
                y_offset,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(Some(pixels)),
            )
        }
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
        // SAFETY: image_size is the exact length of the provided slice.
        unsafe {
            HasContext::compressed_tex_image_2d(
                self,
                target,
                level,
                internal_format as i32,
                width,
                height,
                0,
                data.len() as i32,
                data,
            )
        }
    }

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
    ) {
        // SAFETY: see tex_image_2d.
        unsafe {
            HasContext::tex_image_3d(
                self,
                target,
                level,
                internal_format,
                width,
                height,
                depth,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
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
        // SAFETY: image_size is the exact length of the provided slice.
        unsafe {
            HasContext::compressed_tex_image_3d(
                self,
                target,
                level,
                internal_format as i32,
                width,
                height,
                depth,
                0,
                data.len() as i32,
                data,
            )
        }
    }

    fn generate_mipmap(&self, target: u32) {
        // SAFETY: operates on the texture bound on the active unit.
        unsafe { HasContext::generate_mipmap(self, target) }
    }

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
    ) {
        // SAFETY: reads from the bound read framebuffer into the bound texture.
        unsafe {
            HasContext::copy_tex_sub_image_2d(
                self, target, level, x_offset, y_offset, x, y, width, height,
            )
        }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_buffer(self) }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        // SAFETY: buffer was created on this context and is deleted once.
        unsafe { HasContext::delete_buffer(self, buffer) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        // SAFETY: buffer is live on this context or None.
        unsafe { HasContext::bind_buffer(self, target, buffer) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        // SAFETY: copies the slice into the bound buffer.
        unsafe { HasContext::buffer_data_u8_slice(self, target, data, usage) }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_vertex_array(self) }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        // SAFETY: vertex_array was created on this context and is deleted once.
        unsafe { HasContext::delete_vertex_array(self, vertex_array) }
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        // SAFETY: vertex_array is live on this context or None.
        unsafe { HasContext::bind_vertex_array(self, vertex_array) }
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
        // SAFETY: offset/stride address the bound ARRAY_BUFFER.
        unsafe {
            HasContext::vertex_attrib_pointer_f32(
                self, index, size, data_type, normalized, stride, offset,
            )
        }
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, size: i32, data_type: u32, stride: i32, offset: i32) {
        // SAFETY: offset/stride address the bound ARRAY_BUFFER.
        unsafe { HasContext::vertex_attrib_pointer_i32(self, index, size, data_type, stride, offset) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        // SAFETY: index is below the attribute limit.
        unsafe { HasContext::enable_vertex_attrib_array(self, index) }
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        // SAFETY: index is below the attribute limit.
        unsafe { HasContext::vertex_attrib_divisor(self, index, divisor) }
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_framebuffer(self) }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        // SAFETY: framebuffer was created on this context and is deleted once.
        unsafe { HasContext::delete_framebuffer(self, framebuffer) }
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<Self::Framebuffer>) {
        // SAFETY: framebuffer is live on this context or None (default framebuffer).
        unsafe { HasContext::bind_framebuffer(self, target, framebuffer) }
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<Self::Texture>,
        level: i32,
    ) {
        // SAFETY: texture is live on this context or None.
        unsafe {
            HasContext::framebuffer_texture_2d(self, target, attachment, texture_target, texture, level)
        }
    }

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_renderbuffer(self) }
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        // SAFETY: renderbuffer was created on this context and is deleted once.
        unsafe { HasContext::delete_renderbuffer(self, renderbuffer) }
    }

    fn bind_renderbuffer(&self, target: u32, renderbuffer: Option<Self::Renderbuffer>) {
        // SAFETY: renderbuffer is live on this context or None.
        unsafe { HasContext::bind_renderbuffer(self, target, renderbuffer) }
    }

    fn renderbuffer_storage(&self, target: u32, internal_format: u32, width: i32, height: i32) {
        // SAFETY: allocates storage for the bound renderbuffer.
        unsafe { HasContext::renderbuffer_storage(self, target, internal_format, width, height) }
    }

    fn renderbuffer_storage_multisample(
        &self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        // SAFETY: samples was clamped to MAX_SAMPLES by the caller.
        unsafe {
            HasContext::renderbuffer_storage_multisample(
                self,
                target,
                samples,
                internal_format,
                width,
                height,
            )
        }
    }

    fn framebuffer_renderbuffer(
        &self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<Self::Renderbuffer>,
    ) {
        // SAFETY: renderbuffer is live on this context or None.
        unsafe {
            HasContext::framebuffer_renderbuffer(
                self,
                target,
                attachment,
                renderbuffer_target,
                renderbuffer,
            )
        }
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        // SAFETY: pure query.
        unsafe { HasContext::check_framebuffer_status(self, target) }
    }

    fn draw_buffers(&self, buffers: &[u32]) {
        // SAFETY: buffers are COLOR_ATTACHMENTn values below MAX_DRAW_BUFFERS.
        unsafe { HasContext::draw_buffers(self, buffers) }
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
        // SAFETY: read and draw framebuffers were bound by the caller.
        unsafe {
            HasContext::blit_framebuffer(
                self, src_x0, src_y0, src_x1, src_y1, dst_x0, dst_y0, dst_x1, dst_y1, mask,
                filter,
            )
        }
    }

    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]) {
        // SAFETY: attachments are valid attachment points of the bound framebuffer.
        unsafe { HasContext::invalidate_framebuffer(self, target, attachments) }
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &mut [u8],
    ) {
        // SAFETY: glow checks that the slice covers width x height of format/ty.
        unsafe {
            HasContext::read_pixels(
                self,
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelPackData::Slice(Some(pixels)),
            )
        }
    }

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        // SAFETY: shader_type is VERTEX_SHADER or FRAGMENT_SHADER.
        unsafe { HasContext::create_shader(self, shader_type) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        // SAFETY: shader is live on this context.
        unsafe { HasContext::shader_source(self, shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        // SAFETY: shader is live on this context.
        unsafe { HasContext::compile_shader(self, shader) }
    }

    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        // SAFETY: pure query.
        unsafe { HasContext::get_shader_compile_status(self, shader) }
    }

    fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        // SAFETY: pure query.
        unsafe { HasContext::get_shader_info_log(self, shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        // SAFETY: shader was created on this context and is deleted once.
        unsafe { HasContext::delete_shader(self, shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        // SAFETY: allocates a new name on this context.
        unsafe { HasContext::create_program(self) }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        // SAFETY: both handles are live on this context.
        unsafe { HasContext::attach_shader(self, program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        // SAFETY: both handles are live on this context.
        unsafe { HasContext::detach_shader(self, program, shader) }
    }

    fn bind_attrib_location(&self, program: Self::Program, index: u32, name: &str) {
        // SAFETY: program is live and not yet linked.
        unsafe { HasContext::bind_attrib_location(self, program, index, name) }
    }

    fn link_program(&self, program: Self::Program) {
        // SAFETY: program is live on this context.
        unsafe { HasContext::link_program(self, program) }
    }

    fn get_program_link_status(&self, program: Self::Program) -> bool {
        // SAFETY: pure query.
        unsafe { HasContext::get_program_link_status(self, program) }
    }

    fn get_program_info_log(&self, program: Self::Program) -> String {
        // SAFETY: pure query.
        unsafe { HasContext::get_program_info_log(self, program) }
    }

    fn delete_program(&self, program: Self::Program) {
        // SAFETY: program was created on this context and is deleted once.
        unsafe { HasContext::delete_program(self, program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        // SAFETY: program is live and linked, or None.
        unsafe { HasContext::use_program(self, program) }
    }

    fn get_active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform> {
        // SAFETY: pure queries on a linked program.
        unsafe {
            let count = HasContext::get_active_uniforms(self, program);
            (0..count)
                .filter_map(|index| HasContext::get_active_uniform(self, program, index))
                .map(|uniform| ActiveUniform {
                    name: uniform.name,
                    size: uniform.size,
                    utype: uniform.utype,
                })
                .collect()
        }
    }

    fn get_uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        // SAFETY: pure query on a linked program.
        unsafe { HasContext::get_uniform_location(self, program, name) }
    }

    fn uniform_f32(&self, location: &Self::UniformLocation, components: u32, data: &[f32]) {
        let location = Some(location);
        // SAFETY: location belongs to the program currently in use.
        unsafe {
            match components {
                1 => HasContext::uniform_1_f32_slice(self, location, data),
                2 => HasContext::uniform_2_f32_slice(self, location, data),
                3 => HasContext::uniform_3_f32_slice(self, location, data),
                _ => HasContext::uniform_4_f32_slice(self, location, data),
            }
        }
    }

    fn uniform_i32(&self, location: &Self::UniformLocation, components: u32, data: &[i32]) {
        let location = Some(location);
        // SAFETY: location belongs to the program currently in use.
        unsafe {
            match components {
                1 => HasContext::uniform_1_i32_slice(self, location, data),
                2 => HasContext::uniform_2_i32_slice(self, location, data),
                3 => HasContext::uniform_3_i32_slice(self, location, data),
                _ => HasContext::uniform_4_i32_slice(self, location, data),
            }
        }
    }

    fn uniform_matrix_f32(&self, location: &Self::UniformLocation, dim: u32, data: &[f32]) {
        let location = Some(location);
        // SAFETY: location belongs to the program currently in use.
        unsafe {
            match dim {
                2 => HasContext::uniform_matrix_2_f32_slice(self, location, false, data),
                3 => HasContext::uniform_matrix_3_f32_slice(self, location, false, data),
                _ => HasContext::uniform_matrix_4_f32_slice(self, location, false, data),
            }
        }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        // SAFETY: attribute state comes from a VAO built over live buffers.
        unsafe { HasContext::draw_arrays(self, mode, first, count) }
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        // SAFETY: see draw_arrays.
        unsafe { HasContext::draw_arrays_instanced(self, mode, first, count, instances) }
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        // SAFETY: an index buffer is bound; offset is in bytes within it.
        unsafe { HasContext::draw_elements(self, mode, count, element_type, offset) }
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    ) {
        // SAFETY: see draw_elements.
        unsafe {
            HasContext::draw_elements_instanced(self, mode, count, element_type, offset, instances)
        }
    }
}
