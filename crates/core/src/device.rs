//! The graphics device.
//!
//! A [`Device`] owns the native binding, every resource created through it
//! and the caches that keep native traffic down. Collaborators hold typed
//! ids and go through the device for every GPU-visible effect.

use crate::arena::{
    marker, next_owner, Arena, IndexBufferId, RenderTargetId, ShaderId, TextureId, VertexBufferId,
};
use crate::buffer::{IndexBuffer, VertexBuffer, VertexFormat};
use crate::caps::Capabilities;
use crate::config::DeviceOptions;
use crate::constants::{
    BlendEquation, BlendFactor, BufferUsage, CompareFunc, CullMode, FrontFace, IndexFormat,
    NativeEnums, PrimitiveType, StencilOp,
};
use crate::error::DeviceError;
use crate::format::FormatTable;
use crate::gl::Gl;
use crate::lifecycle::{ContextResource, ContextState, DeviceEvent, EventListeners, ListenerId, RestoreContext};
use crate::pass::{ClearOptions, PassState, RenderPass};
use crate::render_target::{ColorAttachment, DepthAttachment, RenderTarget, RenderTargetDescriptor};
use crate::scope::{ScopeSpace, UniformValue};
use crate::shader::{commit_uniform, Shader, ShaderCache, ShaderDefinition};
use crate::state::StateCache;
use crate::stats::{FrameStats, VramStats};
use crate::texture::{Texture, TextureDescriptor};
use crate::upload::{apply_parameters, upload_texture};
use crate::vao::{build_vertex_array, VertexArrayCache, VertexArrayKey};

/// One draw submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub kind: PrimitiveType,
    /// First vertex, or first index when `indexed`.
    pub base: u32,
    pub count: u32,
    pub indexed: bool,
}

impl Primitive {
    pub fn triangles(count: u32) -> Self {
        Self {
            kind: PrimitiveType::Triangles,
            base: 0,
            count,
            indexed: false,
        }
    }

    pub fn indexed_triangles(count: u32) -> Self {
        Self {
            indexed: true,
            ..Self::triangles(count)
        }
    }
}

/// Forwards state setters to the cache while the context is live.
macro_rules! state_setters {
    ($($(#[$meta:meta])* $name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self, $($arg: $ty),*) {
                if self.context.is_live() {
                    self.state.$name(&self.gl, $($arg),*);
                }
            }
        )*
    };
}

/// A WebGL-class graphics device.
pub struct Device<G: Gl> {
    gl: G,
    options: DeviceOptions,
    context: ContextState,
    caps: Capabilities,
    formats: FormatTable,
    enums: NativeEnums,
    state: StateCache<G>,
    scope: ScopeSpace,
    shader_cache: ShaderCache<G>,
    vaos: VertexArrayCache<G>,

    textures: Arena<marker::Texture, Texture<G>>,
    vertex_buffers: Arena<marker::VertexBuffer, VertexBuffer<G>>,
    index_buffers: Arena<marker::IndexBuffer, IndexBuffer<G>>,
    shaders: Arena<marker::Shader, Shader<G>>,
    render_targets: Arena<marker::RenderTarget, RenderTarget<G>>,
    back_buffer: RenderTargetId,

    shader: Option<ShaderId>,
    bound_vertex_buffers: Vec<VertexBufferId>,
    index_buffer: Option<IndexBufferId>,
    /// The vertex array must be looked up again before the next draw.
    attributes_invalidated: bool,
    render_target: RenderTargetId,
    pass_state: PassState,

    listeners: EventListeners,
    vram: VramStats,
    frame: FrameStats,
}

impl<G: Gl> std::fmt::Debug for Device<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("generation", &self.caps.generation)
            .field("context", &self.context)
            .field("textures", &self.textures.len())
            .field("vertex_buffers", &self.vertex_buffers.len())
            .field("index_buffers", &self.index_buffers.len())
            .field("shaders", &self.shaders.len())
            .field("render_targets", &self.render_targets.len())
            .finish()
    }
}

impl<G: Gl> Device<G> {
    /// Creates a device on `gl` whose back buffer is `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedFeature` if the context lacks
    /// vertex array objects.
    pub fn new(gl: G, options: DeviceOptions, width: u32, height: u32) -> Result<Self, DeviceError> {
        let caps = Capabilities::detect(&gl, &options)?;
        let formats = FormatTable::build(&caps);
        let enums = NativeEnums::new(&caps);
        let mut state = StateCache::new(&caps, enums.clone());
        state.reset(&gl, &caps, enums.clone());

        let owner = next_owner();
        let mut render_targets = Arena::new(owner);
        let samples = if options.antialias { 4 } else { 1 };
        let back_buffer = render_targets.insert(RenderTarget::back_buffer(
            width.max(1),
            height.max(1),
            options.depth,
            options.stencil,
            samples,
        ));

        log::debug!(
            "created {} device with {} formats",
            caps.generation.name(),
            formats.len()
        );

        Ok(Self {
            gl,
            options,
            context: ContextState::Live,
            caps,
            formats,
            enums,
            state,
            scope: ScopeSpace::new(),
            shader_cache: ShaderCache::default(),
            vaos: VertexArrayCache::default(),
            textures: Arena::new(owner),
            vertex_buffers: Arena::new(owner),
            index_buffers: Arena::new(owner),
            shaders: Arena::new(owner),
            render_targets,
            back_buffer,
            shader: None,
            bound_vertex_buffers: Vec::new(),
            index_buffer: None,
            attributes_invalidated: true,
            render_target: back_buffer,
            pass_state: PassState::Idle,
            listeners: EventListeners::default(),
            vram: VramStats::default(),
            frame: FrameStats::default(),
        })
    }

    fn ensure_live(&self) -> Result<(), DeviceError> {
        match self.context {
            ContextState::Live => Ok(()),
            ContextState::Lost => Err(DeviceError::ContextLost),
            ContextState::Destroyed => Err(DeviceError::Destroyed),
        }
    }

    fn ensure_not_destroyed(&self) -> Result<(), DeviceError> {
        if self.context == ContextState::Destroyed {
            return Err(DeviceError::Destroyed);
        }
        Ok(())
    }

    // --- accessors ---

    pub fn gl(&self) -> &G {
        &self.gl
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn context_state(&self) -> ContextState {
        self.context
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    pub fn state(&self) -> &StateCache<G> {
        &self.state
    }

    pub fn scope(&self) -> &ScopeSpace {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeSpace {
        &mut self.scope
    }

    pub fn vram(&self) -> VramStats {
        self.vram
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frame
    }

    pub fn reset_frame_stats(&mut self) {
        self.frame.reset();
    }

    pub fn vertex_array_cache(&self) -> &VertexArrayCache<G> {
        &self.vaos
    }

    pub fn shader_cache(&self) -> &ShaderCache<G> {
        &self.shader_cache
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture<G>> {
        self.textures.get(id)
    }

    /// Mutable access for sampling parameters and level data. Changes are
    /// applied on the next bind.
    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut Texture<G>> {
        self.textures.get_mut(id)
    }

    pub fn vertex_buffer(&self, id: VertexBufferId) -> Option<&VertexBuffer<G>> {
        self.vertex_buffers.get(id)
    }

    pub fn index_buffer(&self, id: IndexBufferId) -> Option<&IndexBuffer<G>> {
        self.index_buffers.get(id)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader<G>> {
        self.shaders.get(id)
    }

    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget<G>> {
        self.render_targets.get(id)
    }

    /// The target standing for the default framebuffer.
    pub fn back_buffer(&self) -> RenderTargetId {
        self.back_buffer
    }

    /// Follows a canvas resize.
    pub fn set_back_buffer_size(&mut self, width: u32, height: u32) {
        if let Some(target) = self.render_targets.get_mut(self.back_buffer) {
            target.set_size(width, height);
        }
    }

    // --- lifecycle notifications ---

    pub fn on_event(&mut self, listener: impl FnMut(DeviceEvent) + 'static) -> ListenerId {
        self.listeners.on(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    // --- render state ---

    state_setters! {
        set_blending(on: bool);
        set_blend_function(src: BlendFactor, dst: BlendFactor);
        set_blend_function_separate(src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor);
        set_blend_equation(equation: BlendEquation);
        set_blend_equation_separate(color: BlendEquation, alpha: BlendEquation);
        set_blend_color(color: [f32; 4]);
        set_color_write(mask: [bool; 4]);
        set_depth_test(on: bool);
        set_depth_write(on: bool);
        set_depth_func(func: CompareFunc);
        set_depth_bias(on: bool);
        set_depth_bias_values(constant: f32, slope: f32);
        set_stencil_test(on: bool);
        set_stencil_func(func: CompareFunc, reference: i32, mask: u32);
        set_stencil_func_front(func: CompareFunc, reference: i32, mask: u32);
        set_stencil_func_back(func: CompareFunc, reference: i32, mask: u32);
        set_stencil_operation(fail: StencilOp, depth_fail: StencilOp, pass: StencilOp, write_mask: u32);
        set_stencil_operation_front(fail: StencilOp, depth_fail: StencilOp, pass: StencilOp, write_mask: u32);
        set_stencil_operation_back(fail: StencilOp, depth_fail: StencilOp, pass: StencilOp, write_mask: u32);
        set_cull_mode(mode: CullMode);
        set_front_face(face: FrontFace);
        /// WebGL 2.0 only; ignored on WebGL 1.0.
        set_alpha_to_coverage(on: bool);
        /// WebGL 2.0 only; ignored on WebGL 1.0.
        set_rasterization(on: bool);
        set_viewport(x: i32, y: i32, width: i32, height: i32);
        set_scissor(x: i32, y: i32, width: i32, height: i32);
    }

    // --- textures ---

    /// Creates a texture. No native object exists until the first bind.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedFormat` for formats this context
    /// cannot sample, `DeviceError::UnsupportedFeature` for volume textures
    /// on WebGL 1.0 and `DeviceError::InvalidDescriptor` for a texture that
    /// is both cubemap and volume.
    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> Result<TextureId, DeviceError> {
        self.ensure_not_destroyed()?;
        if descriptor.cubemap && descriptor.volume {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture '{}' cannot be both cubemap and volume",
                descriptor.name
            )));
        }
        if descriptor.volume && !self.caps.supports_volume_textures() {
            return Err(DeviceError::UnsupportedFeature(format!(
                "volume texture '{}' needs a WebGL 2.0 context",
                descriptor.name
            )));
        }
        self.formats.resolve(descriptor.format)?;
        Ok(self.textures.insert(Texture::new(descriptor)))
    }

    /// Returns false if `id` is stale.
    pub fn destroy_texture(&mut self, id: TextureId) -> bool {
        let Some(mut texture) = self.textures.remove(id) else {
            return false;
        };
        if let Some(native) = texture.native() {
            self.state.forget_texture(native);
        }
        if self.context.is_live() {
            texture.release(&self.gl);
        }
        self.vram.retrack_texture(texture.gpu_size, 0);
        true
    }

    /// Binds `id` on `unit` for sampling, creating the native texture,
    /// applying dirty parameters and uploading dirty levels as needed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ContextLost` while the context is lost,
    /// `DeviceError::UnknownResource` for a stale id,
    /// `DeviceError::TextureUnitOutOfRange` for a unit past the driver limit,
    /// and upload errors.
    pub fn set_texture(&mut self, id: TextureId, unit: u32) -> Result<(), DeviceError> {
        self.ensure_live()?;
        let available = self.state.texture_unit_count();
        if unit >= available {
            return Err(DeviceError::TextureUnitOutOfRange { unit, available });
        }
        let Self {
            gl,
            caps,
            formats,
            enums,
            state,
            textures,
            vram,
            frame,
            ..
        } = self;
        let texture = textures
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("texture"))?;

        let native = match texture.native {
            Some(native) => native,
            None => {
                let native = gl
                    .create_texture()
                    .map_err(DeviceError::creation("texture"))?;
                texture.native = Some(native);
                native
            }
        };

        if !texture.is_dirty() {
            state.bind_texture_on_unit(gl, texture.slot(), native, unit);
            return Ok(());
        }

        state.active_texture(gl, unit);
        state.bind_texture(gl, texture.slot(), native);
        if !texture.parameter_flags.is_empty() {
            apply_parameters(gl, caps, enums, texture);
        }
        if upload_texture(gl, state, caps, formats, texture, vram)? {
            frame.texture_uploads += 1;
        }
        Ok(())
    }

    // --- buffers ---

    /// Creates a vertex buffer; `data` is uploaded right away.
    ///
    /// # Errors
    ///
    /// Returns upload errors when `data` is given on a live context.
    pub fn create_vertex_buffer(
        &mut self,
        format: VertexFormat,
        num_vertices: u32,
        usage: BufferUsage,
        data: Option<Vec<u8>>,
    ) -> Result<VertexBufferId, DeviceError> {
        self.ensure_not_destroyed()?;
        let upload = data.is_some() && self.context.is_live();
        let mut buffer = VertexBuffer::new(format, num_vertices, usage, data);
        if upload {
            buffer.upload(&self.gl, &self.enums, &mut self.vram)?;
        }
        Ok(self.vertex_buffers.insert(buffer))
    }

    /// Writable contents. Nothing reaches the GPU before
    /// [`unlock_vertex_buffer`](Self::unlock_vertex_buffer).
    pub fn lock_vertex_buffer(&mut self, id: VertexBufferId) -> Option<&mut [u8]> {
        Some(self.vertex_buffers.get_mut(id)?.lock())
    }

    /// Uploads the buffer's contents.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ContextLost` while lost (contents re-upload on
    /// restore) and `DeviceError::UnknownResource` for a stale id.
    pub fn unlock_vertex_buffer(&mut self, id: VertexBufferId) -> Result<(), DeviceError> {
        self.ensure_live()?;
        self.vertex_buffers
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("vertex buffer"))?
            .upload(&self.gl, &self.enums, &mut self.vram)
    }

    /// Replaces and uploads the contents. `Ok(false)` when `data` does not
    /// match the buffer's size.
    ///
    /// # Errors
    ///
    /// As [`unlock_vertex_buffer`](Self::unlock_vertex_buffer).
    pub fn set_vertex_buffer_data(&mut self, id: VertexBufferId, data: &[u8]) -> Result<bool, DeviceError> {
        let buffer = self
            .vertex_buffers
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
        if !buffer.set_data(data) {
            return Ok(false);
        }
        self.unlock_vertex_buffer(id)?;
        Ok(true)
    }

    pub fn destroy_vertex_buffer(&mut self, id: VertexBufferId) -> bool {
        let Some(mut buffer) = self.vertex_buffers.remove(id) else {
            return false;
        };
        if self.context.is_live() {
            if let Some(vao) = buffer.release(&self.gl, &mut self.vram) {
                self.state.forget_vertex_array(vao);
            }
            self.vaos.evict_buffer(&self.gl, &mut self.state, id.to_bits());
        } else {
            self.vram.retrack_vertex_buffer(buffer.gpu_size, 0);
        }
        if self.bound_vertex_buffers.contains(&id) {
            self.bound_vertex_buffers.retain(|bound| *bound != id);
            self.attributes_invalidated = true;
        }
        true
    }

    /// Creates an index buffer; `data` is uploaded right away.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedFeature` for 32-bit indices on a
    /// context without them, and upload errors.
    pub fn create_index_buffer(
        &mut self,
        format: IndexFormat,
        num_indices: u32,
        usage: BufferUsage,
        data: Option<Vec<u8>>,
    ) -> Result<IndexBufferId, DeviceError> {
        self.ensure_not_destroyed()?;
        if format == IndexFormat::U32 && !self.caps.index_u32 {
            return Err(DeviceError::UnsupportedFeature(
                "32-bit indices (OES_element_index_uint)".into(),
            ));
        }
        let upload = data.is_some() && self.context.is_live();
        let mut buffer = IndexBuffer::new(format, num_indices, usage, data);
        if upload {
            self.unbind_vertex_array();
            buffer.upload(&self.gl, &self.enums, &mut self.vram)?;
        }
        Ok(self.index_buffers.insert(buffer))
    }

    pub fn lock_index_buffer(&mut self, id: IndexBufferId) -> Option<&mut [u8]> {
        Some(self.index_buffers.get_mut(id)?.lock())
    }

    /// Uploads the buffer's contents.
    ///
    /// # Errors
    ///
    /// As [`unlock_vertex_buffer`](Self::unlock_vertex_buffer).
    pub fn unlock_index_buffer(&mut self, id: IndexBufferId) -> Result<(), DeviceError> {
        self.ensure_live()?;
        if !self.index_buffers.contains(id) {
            return Err(DeviceError::UnknownResource("index buffer"));
        }
        self.unbind_vertex_array();
        self.index_buffers
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("index buffer"))?
            .upload(&self.gl, &self.enums, &mut self.vram)
    }

    /// Replaces and uploads the contents. `Ok(false)` on a size mismatch.
    ///
    /// # Errors
    ///
    /// As [`unlock_vertex_buffer`](Self::unlock_vertex_buffer).
    pub fn set_index_buffer_data(&mut self, id: IndexBufferId, data: &[u8]) -> Result<bool, DeviceError> {
        let buffer = self
            .index_buffers
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("index buffer"))?;
        if !buffer.set_data(data) {
            return Ok(false);
        }
        self.unlock_index_buffer(id)?;
        Ok(true)
    }

    pub fn destroy_index_buffer(&mut self, id: IndexBufferId) -> bool {
        let Some(mut buffer) = self.index_buffers.remove(id) else {
            return false;
        };
        if self.context.is_live() {
            buffer.release(&self.gl, &mut self.vram);
        } else {
            self.vram.retrack_index_buffer(buffer.gpu_size, 0);
        }
        if self.index_buffer == Some(id) {
            self.index_buffer = None;
        }
        true
    }

    /// Unbinds the vertex array so element-buffer binds do not land in it.
    fn unbind_vertex_array(&mut self) {
        self.state.set_vertex_array(&self.gl, None);
        self.attributes_invalidated = true;
    }

    /// Adds a buffer to the set the next draw reads.
    pub fn set_vertex_buffer(&mut self, id: VertexBufferId) {
        self.bound_vertex_buffers.push(id);
        self.attributes_invalidated = true;
    }

    pub fn clear_vertex_buffers(&mut self) {
        if !self.bound_vertex_buffers.is_empty() {
            self.bound_vertex_buffers.clear();
            self.attributes_invalidated = true;
        }
    }

    pub fn set_index_buffer(&mut self, id: Option<IndexBufferId>) {
        self.index_buffer = id;
    }

    // --- shaders ---

    /// Compiles and links a shader.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Shader` with the numbered source and driver log
    /// when compilation or linking fails.
    pub fn create_shader(&mut self, definition: ShaderDefinition) -> Result<ShaderId, DeviceError> {
        self.ensure_not_destroyed()?;
        let mut shader = Shader::new(definition);
        if self.context.is_live() {
            shader.link(&self.gl, &mut self.shader_cache, &mut self.scope)?;
        }
        Ok(self.shaders.insert(shader))
    }

    pub fn destroy_shader(&mut self, id: ShaderId) -> bool {
        let Some(mut shader) = self.shaders.remove(id) else {
            return false;
        };
        if self.context.is_live() {
            if let Some(program) = shader.release(&self.gl) {
                self.state.forget_program(program);
            }
        }
        if self.shader == Some(id) {
            self.shader = None;
        }
        true
    }

    /// Makes `id` the shader for subsequent draws. Returns false, keeping
    /// the previous shader, when `id` is stale or failed to link.
    pub fn set_shader(&mut self, id: ShaderId) -> bool {
        if !self.context.is_live() {
            return false;
        }
        let Some(shader) = self.shaders.get(id) else {
            return false;
        };
        if shader.failed() || shader.program().is_none() {
            return false;
        }
        if self.shader != Some(id) || self.state.program() != shader.program() {
            if self.state.use_program(&self.gl, shader.program()) {
                self.frame.shader_switches += 1;
            }
            self.shader = Some(id);
            self.attributes_invalidated = true;
        }
        true
    }

    // --- render targets ---

    /// Creates a render target over existing textures. Framebuffers are
    /// built on first use.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnknownResource` for stale attachment ids and
    /// `DeviceError::InvalidDescriptor` for a target without attachments
    /// or with more color attachments than the context supports.
    pub fn create_render_target(
        &mut self,
        descriptor: RenderTargetDescriptor,
    ) -> Result<RenderTargetId, DeviceError> {
        self.ensure_not_destroyed()?;
        if descriptor.color_buffers.len() > self.caps.max_draw_buffers as usize {
            return Err(DeviceError::InvalidDescriptor(format!(
                "render target '{}' has {} color buffers, the context supports {}",
                descriptor.name,
                descriptor.color_buffers.len(),
                self.caps.max_draw_buffers
            )));
        }
        let mut size = None;
        for id in descriptor.color_buffers.iter().chain(descriptor.depth_buffer.iter()) {
            let texture = self
                .textures
                .get(*id)
                .ok_or(DeviceError::UnknownResource("texture"))?;
            size.get_or_insert((texture.width(), texture.height()));
        }
        let (width, height) = size.ok_or_else(|| {
            DeviceError::InvalidDescriptor(format!(
                "render target '{}' has neither color nor depth buffers",
                descriptor.name
            ))
        })?;
        Ok(self
            .render_targets
            .insert(RenderTarget::new(descriptor, &self.caps, width, height)))
    }

    /// The back buffer cannot be destroyed.
    pub fn destroy_render_target(&mut self, id: RenderTargetId) -> bool {
        debug_assert_ne!(id, self.back_buffer, "the back buffer cannot be destroyed");
        if id == self.back_buffer {
            return false;
        }
        let Some(mut target) = self.render_targets.remove(id) else {
            return false;
        };
        if self.context.is_live() {
            target.release(&self.gl, &mut self.state);
        }
        if self.render_target == id {
            self.render_target = self.back_buffer;
        }
        true
    }

    /// Resizes a target's attachments; contents are lost and framebuffers
    /// rebuild on next use.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnknownResource` for a stale id.
    pub fn resize_render_target(
        &mut self,
        id: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        let target = self
            .render_targets
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("render target"))?;
        if target.is_back_buffer() {
            target.set_size(width, height);
            return Ok(());
        }
        if target.width() == width.max(1) && target.height() == height.max(1) {
            return Ok(());
        }
        if self.context.is_live() {
            target.release(&self.gl, &mut self.state);
        } else {
            target.forget_native();
        }
        target.set_size(width, height);
        let attachments: Vec<TextureId> = target
            .color_buffers()
            .iter()
            .copied()
            .chain(target.depth_buffer())
            .collect();
        for texture_id in attachments {
            if let Some(texture) = self.textures.get_mut(texture_id) {
                if let Some(native) = texture.native() {
                    self.state.forget_texture(native);
                }
                if self.context.is_live() {
                    texture.release(&self.gl);
                }
                self.vram.retrack_texture(texture.gpu_size, 0);
                texture.gpu_size = 0;
                let depth = texture.depth();
                texture.resize(width, height, depth);
            }
        }
        Ok(())
    }

    /// Builds the target's framebuffers if needed, creating and uploading
    /// its attachment textures first.
    fn init_render_target(&mut self, id: RenderTargetId) -> Result<(), DeviceError> {
        let target = self
            .render_targets
            .get(id)
            .ok_or(DeviceError::UnknownResource("render target"))?;
        if target.is_initialized() {
            return Ok(());
        }
        let color_ids = target.color_buffers().to_vec();
        let depth_id = target.depth_buffer();
        let face = target.face() as u32;

        let mut colors = Vec::with_capacity(color_ids.len());
        for texture_id in color_ids {
            self.set_texture(texture_id, 0)?;
            let texture = self
                .textures
                .get(texture_id)
                .ok_or(DeviceError::UnknownResource("texture"))?;
            let native = texture
                .native()
                .ok_or(DeviceError::UnknownResource("texture"))?;
            let target = if texture.is_cubemap() {
                glow::TEXTURE_CUBE_MAP_POSITIVE_X + face
            } else {
                glow::TEXTURE_2D
            };
            colors.push(ColorAttachment {
                texture: native,
                target,
                internal_format: self.formats.resolve(texture.format())?.internal_format,
            });
        }

        let mut depth = None;
        if let Some(texture_id) = depth_id {
            self.set_texture(texture_id, 0)?;
            let texture = self
                .textures
                .get(texture_id)
                .ok_or(DeviceError::UnknownResource("texture"))?;
            depth = texture.native().map(|native| DepthAttachment {
                texture: native,
                stencil: texture.format().has_stencil(),
            });
        }

        let Self {
            gl,
            state,
            caps,
            render_targets,
            ..
        } = self;
        render_targets
            .get_mut(id)
            .ok_or(DeviceError::UnknownResource("render target"))?
            .build(gl, state, caps, &colors, depth)
    }

    // --- passes ---

    /// Clears the bound target. Buffers left `None` are untouched.
    pub fn clear(&mut self, options: ClearOptions) {
        if !self.context.is_live() || options.is_empty() {
            return;
        }
        if let Some(color) = options.color {
            self.state.set_clear_color(&self.gl, color);
            self.state.set_color_write(&self.gl, [true; 4]);
        }
        if let Some(depth) = options.depth {
            self.state.set_clear_depth(&self.gl, depth);
            self.state.set_depth_write(&self.gl, true);
        }
        if let Some(stencil) = options.stencil {
            self.state.set_clear_stencil(&self.gl, stencil);
            self.state.set_stencil_write_mask(&self.gl, 0xFF);
        }
        self.gl.clear(options.mask());
    }

    /// Opens `pass`: binds its target, covers it with the viewport and
    /// scissor and issues the start clear.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ContextLost` while lost and errors from building
    /// the target's framebuffers.
    pub fn start_pass(&mut self, pass: &RenderPass) -> Result<(), DeviceError> {
        debug_assert_eq!(
            self.pass_state,
            PassState::Idle,
            "start_pass('{}') while another pass is open",
            pass.name
        );
        self.ensure_live()?;
        let id = pass.target.unwrap_or(self.back_buffer);
        self.init_render_target(id)?;
        let target = self
            .render_targets
            .get(id)
            .ok_or(DeviceError::UnknownResource("render target"))?;
        let (framebuffer, width, height) = (target.framebuffer, target.width() as i32, target.height() as i32);

        self.render_target = id;
        self.state.set_framebuffer(&self.gl, framebuffer);
        // Without a clear the caller owns viewport and scissor.
        if let Some(clear) = pass.start_clear() {
            self.state.set_viewport(&self.gl, 0, 0, width, height);
            self.state.set_scissor(&self.gl, 0, 0, width, height);
            self.clear(clear);
        }
        self.pass_state = PassState::Began;
        self.frame.render_passes += 1;
        Ok(())
    }

    /// Closes `pass`: discards unneeded attachments, resolves and
    /// regenerates mipmaps as requested.
    pub fn end_pass(&mut self, pass: &RenderPass) {
        debug_assert_eq!(
            self.pass_state,
            PassState::Began,
            "end_pass('{}') without a matching start_pass",
            pass.name
        );
        self.pass_state = PassState::Idle;
        if !self.context.is_live() {
            return;
        }
        self.unbind_vertex_array();

        let webgl2 = self.caps.is_webgl2();
        let Self {
            gl,
            state,
            render_targets,
            textures,
            render_target,
            ..
        } = self;
        let Some(target) = render_targets.get(*render_target) else {
            return;
        };

        if webgl2 {
            let color_count = if target.is_back_buffer() { 1 } else { target.color_buffers().len() };
            let discarded = pass.discarded_attachments(color_count, target.is_back_buffer());
            if !discarded.is_empty() && pass.full_size_clear_rect {
                gl.invalidate_framebuffer(glow::DRAW_FRAMEBUFFER, &discarded);
            }
        }

        if pass.color_ops.resolve && webgl2 && target.samples() > 1 && target.auto_resolve() {
            target.resolve(gl, state, true, false);
        }

        if pass.color_ops.mipmaps {
            let unit = state.texture_unit_count().saturating_sub(1);
            for texture_id in target.color_buffers() {
                let Some(texture) = textures.get(*texture_id) else {
                    continue;
                };
                let Some(native) = texture.native() else {
                    continue;
                };
                if texture.mipmaps() && (texture.is_pot() || webgl2) {
                    state.active_texture(gl, unit);
                    state.bind_texture(gl, texture.slot(), native);
                    gl.generate_mipmap(texture.target());
                }
            }
        }
    }

    /// Blits a multisampled target into its textures.
    pub fn resolve(&mut self, id: RenderTargetId, color: bool, depth: bool) {
        if !self.context.is_live() {
            return;
        }
        if let Some(target) = self.render_targets.get(id) {
            target.resolve(&self.gl, &mut self.state, color, depth);
        }
    }

    /// Copies color and/or depth between targets; `None` is the back
    /// buffer. Returns false, touching neither target, for combinations that
    /// cannot be copied.
    pub fn copy_render_target(
        &mut self,
        source: Option<RenderTargetId>,
        dest: Option<RenderTargetId>,
        color: bool,
        depth: bool,
    ) -> bool {
        if !self.context.is_live() {
            return false;
        }
        let webgl2 = self.caps.is_webgl2();
        let source = source.unwrap_or(self.back_buffer);
        let dest = dest.unwrap_or(self.back_buffer);
        if depth && !webgl2 {
            log::error!("depth is not copyable on WebGL 1.0");
            return false;
        }
        if !webgl2 && dest == self.back_buffer {
            log::error!("copying into the back buffer needs WebGL 2.0");
            return false;
        }
        let (width, height) = match self.check_copy(source, dest, color, depth) {
            Ok(size) => size,
            Err(reason) => {
                log::error!("can't copy render target: {reason}");
                return false;
            }
        };

        for id in [source, dest] {
            if let Err(err) = self.init_render_target(id) {
                log::error!("can't copy render target: {err}");
                return false;
            }
        }
        // Copies go between the texture-backed framebuffers, never the MSAA ones.
        let texture_framebuffer = |id: RenderTargetId| {
            self.render_targets
                .get(id)
                .and_then(|rt| rt.resolve_framebuffer.or(rt.framebuffer))
        };
        let (read, draw) = (texture_framebuffer(source), texture_framebuffer(dest));
        let current = self.render_targets.get(self.render_target).and_then(|rt| rt.framebuffer);

        if webgl2 {
            let mut mask = 0;
            if color {
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if depth {
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, read);
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, draw);
            self.gl
                .blit_framebuffer(0, 0, width, height, 0, 0, width, height, mask, glow::NEAREST);
            self.state.rebind_framebuffer(&self.gl, current);
            return true;
        }

        let destination = self
            .render_targets
            .get(dest)
            .and_then(|rt| rt.color_buffer())
            .and_then(|id| self.textures.get(id))
            .and_then(|t| t.native().map(|native| (native, t.slot(), t.target())));
        let Some((texture, slot, target)) = destination else {
            log::error!("can't copy render target: destination color texture is missing");
            return false;
        };
        let unit = self.state.texture_unit_count().saturating_sub(1);
        self.state.set_framebuffer(&self.gl, read);
        self.state.bind_texture_on_unit(&self.gl, slot, texture, unit);
        self.gl.copy_tex_sub_image_2d(target, 0, 0, 0, 0, 0, width, height);
        self.state.set_framebuffer(&self.gl, current);
        true
    }

    /// Copy size, or why the two targets cannot be copied.
    fn check_copy(
        &self,
        source: RenderTargetId,
        dest: RenderTargetId,
        color: bool,
        depth: bool,
    ) -> Result<(i32, i32), &'static str> {
        let src = self
            .render_targets
            .get(source)
            .ok_or("source render target no longer exists")?;
        let dst = self
            .render_targets
            .get(dest)
            .ok_or("destination render target no longer exists")?;
        let format_of = |id: Option<TextureId>| id.and_then(|t| self.textures.get(t)).map(|t| t.format());

        if color {
            if !src.is_back_buffer() && src.color_buffer().is_none() {
                return Err("source has no color buffer");
            }
            if !dst.is_back_buffer() && dst.color_buffer().is_none() {
                return Err("destination has no color buffer");
            }
            if !src.is_back_buffer()
                && !dst.is_back_buffer()
                && format_of(src.color_buffer()) != format_of(dst.color_buffer())
            {
                return Err("color formats differ");
            }
        }
        if depth {
            if !(src.has_depth() || src.depth_buffer().is_some()) || !(dst.has_depth() || dst.depth_buffer().is_some()) {
                return Err("one of the targets has no depth buffer");
            }
            if let (Some(a), Some(b)) = (src.depth_buffer(), dst.depth_buffer()) {
                if format_of(Some(a)) != format_of(Some(b)) {
                    return Err("depth formats differ");
                }
            }
        }
        Ok((src.width() as i32, src.height() as i32))
    }

    /// Reads RGBA8 pixels from the bound target into `out`. Returns false
    /// when `out` is too small or the context is not live.
    pub fn read_pixels(&mut self, x: i32, y: i32, width: u32, height: u32, out: &mut [u8]) -> bool {
        if !self.context.is_live() {
            return false;
        }
        let needed = width as usize * height as usize * 4;
        if out.len() < needed {
            log::error!("read_pixels needs {needed} bytes, got {}", out.len());
            return false;
        }
        self.gl.read_pixels(
            x,
            y,
            width as i32,
            height as i32,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            &mut out[..needed],
        );
        true
    }

    // --- draws ---

    /// Submits a draw with the current shader, buffers and scope values.
    /// `num_instances > 0` draws instanced. Unless `keep_buffers`, the bound
    /// vertex buffers are cleared afterwards.
    ///
    /// Draws without a usable shader, or whose shader samples a texture the
    /// scope does not provide, are skipped.
    ///
    /// # Errors
    ///
    /// Returns upload and resource-creation errors met while preparing the
    /// draw.
    pub fn draw(&mut self, primitive: &Primitive, num_instances: u32, keep_buffers: bool) -> Result<(), DeviceError> {
        if !self.context.is_live() {
            return Ok(());
        }
        let result = self.submit(primitive, num_instances);
        if !keep_buffers {
            self.clear_vertex_buffers();
        }
        result
    }

    fn submit(&mut self, primitive: &Primitive, num_instances: u32) -> Result<(), DeviceError> {
        let Some(shader_id) = self.shader else {
            log::warn!("draw skipped: no shader set");
            self.frame.skipped_draws += 1;
            return Ok(());
        };
        let Some(shader) = self.shaders.get(shader_id) else {
            self.shader = None;
            self.frame.skipped_draws += 1;
            return Ok(());
        };
        let shader_name = shader.name().to_string();
        let samplers: Vec<_> = shader.samplers.iter().map(|s| (s.name.clone(), s.scope)).collect();

        // Samplers take sequential units.
        let available = self.state.texture_unit_count();
        let mut unit = 0u32;
        for (index, (name, scope_id)) in samplers.into_iter().enumerate() {
            let value = self.scope.value(scope_id).cloned();
            let needed = match &value {
                Some(UniformValue::TextureArray(textures)) => textures.len() as u32,
                _ => 1,
            };
            if unit + needed > available {
                log::error!(
                    "shader '{shader_name}' needs more than {available} texture units at sampler '{name}', draw skipped"
                );
                self.frame.skipped_draws += 1;
                return Ok(());
            }
            match value {
                Some(UniformValue::Texture(texture)) => {
                    self.set_texture(texture, unit)?;
                    let Self { gl, shaders, .. } = self;
                    if let Some(sampler) = shaders.get_mut(shader_id).and_then(|s| s.samplers.get_mut(index)) {
                        if sampler.slot != Some(unit as i32) {
                            gl.uniform_i32(&sampler.location, 1, &[unit as i32]);
                            sampler.slot = Some(unit as i32);
                        }
                    }
                    unit += 1;
                }
                Some(UniformValue::TextureArray(textures)) => {
                    let mut units = Vec::with_capacity(textures.len());
                    for texture in textures {
                        self.set_texture(texture, unit)?;
                        units.push(unit as i32);
                        unit += 1;
                    }
                    let Self { gl, shaders, .. } = self;
                    if let Some(sampler) = shaders.get_mut(shader_id).and_then(|s| s.samplers.get_mut(index)) {
                        gl.uniform_i32(&sampler.location, 1, &units);
                        sampler.slot = None;
                    }
                }
                _ => {
                    log::error!("shader '{shader_name}' is missing a texture for sampler '{name}', draw skipped");
                    self.frame.skipped_draws += 1;
                    return Ok(());
                }
            }
        }

        // Uniforms commit only when the scope value changed since last time.
        {
            let Self {
                gl, shaders, scope, ..
            } = self;
            if let Some(shader) = shaders.get_mut(shader_id) {
                for uniform in &mut shader.uniforms {
                    let version = scope.version(uniform.scope);
                    if version == uniform.version {
                        continue;
                    }
                    if let Some(value) = scope.value(uniform.scope) {
                        commit_uniform(gl, &uniform.location, uniform.utype, value);
                        uniform.version = version;
                    }
                }
            }
        }

        if primitive.indexed && self.index_buffer.is_none() {
            log::error!("indexed draw with shader '{shader_name}' skipped: no index buffer set");
            self.frame.skipped_draws += 1;
            return Ok(());
        }

        // Index data has to be resident before a vertex array is bound.
        let index = match self.index_buffer.filter(|_| primitive.indexed) {
            Some(id) => {
                let needs_upload = self
                    .index_buffers
                    .get(id)
                    .ok_or(DeviceError::UnknownResource("index buffer"))?
                    .native()
                    .is_none();
                if needs_upload {
                    self.unlock_index_buffer(id)?;
                }
                let buffer = self
                    .index_buffers
                    .get(id)
                    .ok_or(DeviceError::UnknownResource("index buffer"))?;
                Some((buffer.native(), buffer.format(), buffer.bytes_per_index()))
            }
            None => None,
        };

        if self.attributes_invalidated {
            let vao = self.resolve_vertex_array()?;
            self.state.set_vertex_array(&self.gl, vao);
            self.attributes_invalidated = false;
        }

        let mode = self.enums.primitive(primitive.kind);
        let instanced = num_instances > 0;
        match index {
            Some((native, format, bytes_per_index)) => {
                self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, native);
                let element_type = self.enums.index_format(format);
                let offset = (primitive.base * bytes_per_index) as i32;
                if instanced {
                    self.gl.draw_elements_instanced(
                        mode,
                        primitive.count as i32,
                        element_type,
                        offset,
                        num_instances as i32,
                    );
                } else {
                    self.gl.draw_elements(mode, primitive.count as i32, element_type, offset);
                }
            }
            None => {
                if instanced {
                    self.gl.draw_arrays_instanced(
                        mode,
                        primitive.base as i32,
                        primitive.count as i32,
                        num_instances as i32,
                    );
                } else {
                    self.gl.draw_arrays(mode, primitive.base as i32, primitive.count as i32);
                }
            }
        }

        self.frame.draw_calls += 1;
        if instanced {
            self.frame.instanced_draw_calls += 1;
        }
        self.frame.primitives +=
            u64::from(primitive.kind.primitive_count(primitive.count)) * u64::from(num_instances.max(1));
        Ok(())
    }

    /// The vertex array for the bound buffers: a single buffer keeps its own,
    /// combinations come from the cache.
    fn resolve_vertex_array(&mut self) -> Result<Option<G::VertexArray>, DeviceError> {
        let ids = self.bound_vertex_buffers.clone();
        for id in &ids {
            let buffer = self
                .vertex_buffers
                .get_mut(*id)
                .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
            if buffer.native.is_none() {
                buffer.upload(&self.gl, &self.enums, &mut self.vram)?;
            }
        }
        let integer_attributes = self.caps.is_webgl2();
        let Self {
            gl,
            state,
            enums,
            vaos,
            vertex_buffers,
            frame,
            ..
        } = self;

        match ids.as_slice() {
            [] => Ok(None),
            [id] => {
                let buffer = vertex_buffers
                    .get_mut(*id)
                    .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
                if let Some(vao) = buffer.vao {
                    return Ok(Some(vao));
                }
                let native = buffer
                    .native
                    .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
                let vao = build_vertex_array(gl, state, enums, integer_attributes, &[(buffer.format(), native)])?;
                buffer.vao = Some(vao);
                frame.vaos_created += 1;
                Ok(Some(vao))
            }
            _ => {
                let mut key: VertexArrayKey = Vec::with_capacity(ids.len());
                let mut layouts = Vec::with_capacity(ids.len());
                for id in &ids {
                    let buffer = vertex_buffers
                        .get(*id)
                        .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
                    let native = buffer
                        .native
                        .ok_or(DeviceError::UnknownResource("vertex buffer"))?;
                    key.push((id.to_bits(), buffer.format().rendering_hash()));
                    layouts.push((buffer.format(), native));
                }
                let (vao, built) = vaos.get_or_create(gl, state, enums, integer_attributes, key, &layouts)?;
                if built {
                    frame.vaos_created += 1;
                }
                Ok(Some(vao))
            }
        }
    }

    // --- lifecycle ---

    /// Enters the lost state: every wrapper and cache drops its native
    /// handles without native calls, then listeners hear `Lost`.
    pub fn lose_context(&mut self) {
        if self.context != ContextState::Live {
            return;
        }
        log::debug!("context lost");
        self.context = ContextState::Lost;
        if self.pass_state == PassState::Began {
            self.pass_state = PassState::Idle;
        }
        for texture in self.textures.values_mut() {
            texture.on_lost();
        }
        for buffer in self.vertex_buffers.values_mut() {
            buffer.on_lost();
        }
        for buffer in self.index_buffers.values_mut() {
            buffer.on_lost();
        }
        for shader in self.shaders.values_mut() {
            shader.on_lost();
        }
        for target in self.render_targets.values_mut() {
            target.on_lost();
        }
        self.vaos.on_lost();
        self.shader_cache.on_lost();
        self.listeners.emit(DeviceEvent::Lost);
    }

    /// Leaves the lost state on the fresh binding `gl`: capabilities,
    /// formats and enums are detected again, caches start empty, shaders
    /// relink and buffers re-upload. Textures re-upload on their next bind.
    /// Failures of individual resources are logged.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Destroyed` after `destroy`, and capability
    /// detection errors for a context that cannot host the device.
    pub fn restore_context(&mut self, gl: G) -> Result<(), DeviceError> {
        match self.context {
            ContextState::Destroyed => return Err(DeviceError::Destroyed),
            ContextState::Live => {
                log::warn!("restore_context on a live context ignored");
                return Ok(());
            }
            ContextState::Lost => {}
        }
        let caps = Capabilities::detect(&gl, &self.options)?;
        self.gl = gl;
        self.formats = FormatTable::build(&caps);
        self.enums = NativeEnums::new(&caps);
        self.caps = caps;
        self.state.reset(&self.gl, &self.caps, self.enums.clone());
        self.shader_cache = ShaderCache::default();
        self.vaos = VertexArrayCache::default();
        self.shader = None;
        self.bound_vertex_buffers.clear();
        self.index_buffer = None;
        self.attributes_invalidated = true;
        self.render_target = self.back_buffer;
        self.context = ContextState::Live;

        let Self {
            gl,
            caps,
            enums,
            vram,
            shader_cache,
            scope,
            textures,
            vertex_buffers,
            index_buffers,
            shaders,
            render_targets,
            ..
        } = self;
        let mut ctx = RestoreContext {
            gl,
            caps,
            enums,
            vram,
            shaders: shader_cache,
            scope,
        };
        let mut failures = 0;
        let mut report = |kind: &str, result: Result<(), DeviceError>| {
            if let Err(err) = result {
                log::error!("failed to restore {kind}: {err}");
                failures += 1;
            }
        };
        for shader in shaders.values_mut() {
            report("shader", shader.on_restored(&mut ctx));
        }
        for buffer in vertex_buffers.values_mut() {
            report("vertex buffer", buffer.on_restored(&mut ctx));
        }
        for buffer in index_buffers.values_mut() {
            report("index buffer", buffer.on_restored(&mut ctx));
        }
        for target in render_targets.values_mut() {
            report("render target", target.on_restored(&mut ctx));
        }
        for texture in textures.values_mut() {
            report("texture", texture.on_restored(&mut ctx));
        }
        log::debug!("context restored ({failures} resource failures)");
        self.listeners.emit(DeviceEvent::Restored);
        Ok(())
    }

    /// Deletes every native object and suppresses all further calls.
    pub fn destroy(&mut self) {
        if self.context == ContextState::Destroyed {
            return;
        }
        let live = self.context.is_live();
        let Self {
            gl,
            state,
            vram,
            textures,
            vertex_buffers,
            index_buffers,
            shaders,
            render_targets,
            shader_cache,
            vaos,
            ..
        } = self;
        for mut texture in textures.drain() {
            if live {
                texture.release(gl);
            }
            vram.retrack_texture(texture.gpu_size, 0);
        }
        for mut buffer in vertex_buffers.drain() {
            if live {
                buffer.release(gl, vram);
            } else {
                vram.retrack_vertex_buffer(buffer.gpu_size, 0);
            }
        }
        for mut buffer in index_buffers.drain() {
            if live {
                buffer.release(gl, vram);
            } else {
                vram.retrack_index_buffer(buffer.gpu_size, 0);
            }
        }
        for mut shader in shaders.drain() {
            if live {
                shader.release(gl);
            }
        }
        for mut target in render_targets.drain() {
            if live {
                target.release(gl, state);
            }
        }
        if live {
            vaos.clear(gl, state);
            shader_cache.clear(gl);
        }
        self.shader = None;
        self.bound_vertex_buffers.clear();
        self.index_buffer = None;
        self.context = ContextState::Destroyed;
        log::debug!("device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{VertexElementDesc, VertexSemantic};
    use crate::constants::VertexType;
    use crate::format::PixelFormat;
    use crate::gl::{GlCall, RecordingGl, RecordingLimits};
    use crate::texture::PixelSource;

    const VS: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nvoid main() {}\n";
    const FS: &str = "uniform sampler2D texture_diffuse;\nuniform vec4 tint;\nvoid main() {}\n";

    fn device(gl: RecordingGl) -> Device<RecordingGl> {
        Device::new(gl, DeviceOptions::default(), 64, 64).unwrap()
    }

    fn positions() -> VertexFormat {
        VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32)])
    }

    fn shader(dev: &mut Device<RecordingGl>) -> ShaderId {
        let def = ShaderDefinition::new("basic", VS, FS).with_attribute("vertex_position", VertexSemantic::Position);
        dev.create_shader(def).unwrap()
    }

    fn textured(dev: &mut Device<RecordingGl>) -> TextureId {
        let mut desc = TextureDescriptor::new_2d("albedo", 4, 4, PixelFormat::Rgba8);
        desc.levels = vec![vec![PixelSource::Raw(vec![255; 64])]];
        dev.create_texture(desc).unwrap()
    }

    fn ready_to_draw(dev: &mut Device<RecordingGl>) -> (ShaderId, VertexBufferId) {
        let sh = shader(dev);
        let tex = textured(dev);
        dev.scope_mut().set("texture_diffuse", tex);
        dev.scope_mut().set("tint", glam::Vec4::ONE);
        dev.scope_mut().set("matrix_model", glam::Mat4::IDENTITY);
        let vb = dev
            .create_vertex_buffer(positions(), 3, BufferUsage::Static, Some(vec![0; 36]))
            .unwrap();
        assert!(dev.set_shader(sh));
        (sh, vb)
    }

    #[test]
    fn creation_establishes_defaults() {
        let dev = device(RecordingGl::webgl2());
        assert!(dev.gl().count(|c| matches!(c, GlCall::Enable(glow::DEPTH_TEST))) == 1);
        assert_eq!(dev.context_state(), ContextState::Live);
        assert!(dev.render_target(dev.back_buffer()).unwrap().is_back_buffer());
    }

    #[test]
    fn webgl1_without_vertex_arrays_is_refused() {
        let gl = RecordingGl::webgl1().without_extensions();
        let err = Device::new(gl, DeviceOptions::default(), 1, 1).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedFeature(_)), "got {err:?}");
    }

    #[test]
    fn draw_binds_samplers_commits_uniforms_and_draws() {
        let mut dev = device(RecordingGl::webgl2());
        let (_, vb) = ready_to_draw(&mut dev);
        dev.set_vertex_buffer(vb);
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();

        let gl = dev.gl();
        assert_eq!(gl.count(|c| matches!(c, GlCall::DrawArrays { count: 3, instances: None, .. })), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::UniformI32 { name, .. } if name == "texture_diffuse")), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::UniformF32 { name, .. } if name == "tint")), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::UniformMatrix { name, .. } if name == "matrix_model")), 1);
        assert_eq!(dev.frame_stats().draw_calls, 1);
        assert_eq!(dev.frame_stats().primitives, 1);
        assert_eq!(dev.frame_stats().texture_uploads, 1);
    }

    #[test]
    fn unchanged_uniforms_are_not_recommitted() {
        let mut dev = device(RecordingGl::webgl2());
        let (_, vb) = ready_to_draw(&mut dev);
        for _ in 0..3 {
            dev.set_vertex_buffer(vb);
            dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        }
        assert_eq!(dev.gl().count(|c| matches!(c, GlCall::UniformF32 { .. })), 1);
        dev.scope_mut().set("tint", glam::Vec4::ZERO);
        dev.set_vertex_buffer(vb);
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        assert_eq!(dev.gl().count(|c| matches!(c, GlCall::UniformF32 { .. })), 2);
        assert_eq!(dev.gl().count(|c| matches!(c, GlCall::CreateVertexArray(_))), 1);
    }

    #[test]
    fn missing_sampler_skips_draw() {
        let mut dev = device(RecordingGl::webgl2());
        let sh = shader(&mut dev);
        assert!(dev.set_shader(sh));
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        assert_eq!(dev.gl().count(GlCall::is_draw), 0);
        assert_eq!(dev.frame_stats().skipped_draws, 1);
    }

    #[test]
    fn draw_without_shader_is_skipped() {
        let mut dev = device(RecordingGl::webgl2());
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        assert_eq!(dev.gl().count(GlCall::is_draw), 0);
    }

    #[test]
    fn indexed_instanced_draw_uses_byte_offset() {
        let mut dev = device(RecordingGl::webgl2());
        let (_, vb) = ready_to_draw(&mut dev);
        let ib = dev
            .create_index_buffer(IndexFormat::U16, 6, BufferUsage::Static, Some(vec![0; 12]))
            .unwrap();
        dev.set_vertex_buffer(vb);
        dev.set_index_buffer(Some(ib));
        let primitive = Primitive {
            base: 3,
            ..Primitive::indexed_triangles(3)
        };
        dev.draw(&primitive, 5, false).unwrap();
        assert_eq!(
            dev.gl().count(|c| matches!(
                c,
                GlCall::DrawElements { count: 3, element_type: glow::UNSIGNED_SHORT, offset: 6, instances: Some(5), .. }
            )),
            1
        );
        assert_eq!(dev.frame_stats().instanced_draw_calls, 1);
        assert_eq!(dev.frame_stats().primitives, 5);
    }

    #[test]
    fn switching_to_same_shader_is_free() {
        let mut dev = device(RecordingGl::webgl2());
        let sh = shader(&mut dev);
        assert!(dev.set_shader(sh));
        assert!(dev.set_shader(sh));
        assert_eq!(dev.gl().count(|c| matches!(c, GlCall::UseProgram(Some(_)))), 1);
        assert_eq!(dev.frame_stats().shader_switches, 1);
    }

    #[test]
    fn failed_shader_is_an_error() {
        let mut dev = device(RecordingGl::webgl2());
        let def = ShaderDefinition::new("broken", "#error nope\nvoid main() {}", FS);
        let err = dev.create_shader(def).unwrap_err();
        assert!(matches!(err, DeviceError::Shader(_)), "got {err:?}");
    }

    #[test]
    fn destroying_bound_texture_forgets_unit_slots() {
        let mut dev = device(RecordingGl::webgl2());
        let tex = textured(&mut dev);
        dev.set_texture(tex, 2).unwrap();
        assert!(dev.destroy_texture(tex));
        assert!(dev.state().bound_texture(2, crate::texture::TargetSlot::Texture2D).is_none());
        assert_eq!(dev.vram().textures, 0);
        assert!(!dev.destroy_texture(tex), "stale id must not destroy twice");
    }

    #[test]
    fn volume_texture_on_webgl1_fails_cleanly() {
        let mut dev = device(RecordingGl::webgl1());
        let before = dev.gl().call_count();
        let desc = TextureDescriptor {
            volume: true,
            depth: 4,
            ..TextureDescriptor::new_2d("lut", 16, 16, PixelFormat::Rgba8)
        };
        assert!(matches!(dev.create_texture(desc), Err(DeviceError::UnsupportedFeature(_))));
        assert_eq!(dev.gl().call_count(), before);
    }

    #[test]
    fn clear_forces_write_masks() {
        let mut dev = device(RecordingGl::webgl2());
        dev.set_color_write([false; 4]);
        dev.set_depth_write(false);
        dev.gl().clear_calls();
        dev.clear(ClearOptions::all([0.0, 0.0, 0.0, 1.0]));
        let calls = dev.gl().calls();
        assert!(calls.contains(&GlCall::ColorMask([true; 4])), "got {calls:?}");
        assert!(calls.contains(&GlCall::DepthMask(true)), "got {calls:?}");
        assert_eq!(
            calls.last(),
            Some(&GlCall::Clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT))
        );
    }

    #[test]
    fn out_of_range_unit_is_an_error_whether_dirty_or_clean() {
        let mut dev = device(RecordingGl::webgl2());
        let units = dev.state().texture_unit_count();
        let dirty = textured(&mut dev);
        let err = dev.set_texture(dirty, units).unwrap_err();
        assert!(matches!(err, DeviceError::TextureUnitOutOfRange { unit, available } if unit == units && available == units));

        dev.set_texture(dirty, 0).unwrap();
        assert!(!dev.texture(dirty).unwrap().is_dirty());
        let calls = dev.gl().call_count();
        assert!(dev.set_texture(dirty, units).is_err());
        assert_eq!(dev.gl().call_count(), calls, "refused binds touch nothing");
    }

    #[test]
    fn draw_needing_more_units_than_available_is_skipped() {
        let limits = RecordingLimits {
            max_combined_texture_units: 1,
            ..RecordingLimits::default()
        };
        let mut dev = device(RecordingGl::webgl2().with_limits(limits));
        assert_eq!(dev.state().texture_unit_count(), 1);
        let fs = "uniform sampler2D first;\nuniform sampler2D second;\nvoid main() {}\n";
        let def = ShaderDefinition::new("two", VS, fs).with_attribute("vertex_position", VertexSemantic::Position);
        let sh = dev.create_shader(def).unwrap();
        let (a, b) = (textured(&mut dev), textured(&mut dev));
        dev.scope_mut().set("first", a);
        dev.scope_mut().set("second", b);
        dev.scope_mut().set("matrix_model", glam::Mat4::IDENTITY);
        let vb = dev
            .create_vertex_buffer(positions(), 3, BufferUsage::Static, Some(vec![0; 36]))
            .unwrap();
        assert!(dev.set_shader(sh));
        dev.set_vertex_buffer(vb);

        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        assert_eq!(dev.frame_stats().skipped_draws, 1);
        assert_eq!(dev.gl().count(GlCall::is_draw), 0);
    }

    #[test]
    fn copy_between_multisampled_targets_uses_texture_framebuffers() {
        let mut dev = device(RecordingGl::webgl2());
        let target = |dev: &mut Device<RecordingGl>, name: &str| {
            let color = dev
                .create_texture(TextureDescriptor {
                    mipmaps: false,
                    ..TextureDescriptor::new_2d(name, 16, 16, PixelFormat::Rgba8)
                })
                .unwrap();
            dev.create_render_target(RenderTargetDescriptor {
                samples: 4,
                ..RenderTargetDescriptor::with_color(name, color)
            })
            .unwrap()
        };
        let src = target(&mut dev, "src");
        let dst = target(&mut dev, "dst");
        dev.gl().clear_calls();

        assert!(dev.copy_render_target(Some(src), Some(dst), true, false));
        let fbo = |id| {
            let rt = dev.render_target(id).unwrap();
            assert!(rt.is_multisampled());
            (rt.resolve_framebuffer, rt.framebuffer)
        };
        let ((src_resolve, _), (dst_resolve, dst_msaa)) = (fbo(src), fbo(dst));
        let calls = dev.gl().calls();
        assert!(calls.contains(&GlCall::BindFramebuffer {
            target: glow::READ_FRAMEBUFFER,
            framebuffer: src_resolve,
        }));
        assert!(calls.contains(&GlCall::BindFramebuffer {
            target: glow::DRAW_FRAMEBUFFER,
            framebuffer: dst_resolve,
        }));
        assert!(!calls.contains(&GlCall::BindFramebuffer {
            target: glow::DRAW_FRAMEBUFFER,
            framebuffer: dst_msaa,
        }));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn nested_pass_is_a_debug_assertion() {
        let mut dev = device(RecordingGl::webgl2());
        let pass = RenderPass::new("outer", None);
        dev.start_pass(&pass).unwrap();
        let _ = dev.start_pass(&RenderPass::new("inner", None));
    }

    #[test]
    fn only_clearing_passes_reset_viewport_and_scissor() {
        let mut dev = device(RecordingGl::webgl2());
        dev.set_viewport(4, 4, 8, 8);
        let plain = RenderPass::new("plain", None);
        dev.start_pass(&plain).unwrap();
        dev.end_pass(&plain);
        assert_eq!(dev.gl().count(|c| matches!(c, GlCall::Viewport(_))), 1);

        let clearing = RenderPass::new("clearing", None).with_clear([0.0; 4]);
        dev.start_pass(&clearing).unwrap();
        dev.end_pass(&clearing);
        assert!(dev.gl().calls().contains(&GlCall::Viewport([0, 0, 64, 64])));
        assert!(dev.gl().calls().contains(&GlCall::Scissor([0, 0, 64, 64])));
    }

    #[test]
    fn lost_context_suppresses_calls() {
        let mut dev = device(RecordingGl::webgl2());
        dev.lose_context();
        dev.gl().clear_calls();
        dev.set_depth_test(false);
        dev.clear(ClearOptions::all([1.0; 4]));
        assert!(matches!(dev.start_pass(&RenderPass::default()), Err(DeviceError::ContextLost)));
        assert_eq!(dev.gl().call_count(), 0);
    }

    #[test]
    fn destroy_deletes_everything() {
        let mut dev = device(RecordingGl::webgl2());
        let (_, vb) = ready_to_draw(&mut dev);
        dev.set_vertex_buffer(vb);
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
        dev.destroy();
        let gl = dev.gl();
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteTexture(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteBuffer(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteProgram(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
        assert_eq!(dev.vram().total(), 0);
        assert_eq!(dev.context_state(), ContextState::Destroyed);
        assert!(matches!(dev.create_texture(TextureDescriptor::default()), Err(DeviceError::Destroyed)));
    }
}
