//! Render targets: color and depth attachments behind a framebuffer.
//!
//! Framebuffers are built lazily, the first time a target is rendered to.
//! On WebGL 2.0 a target with more than one sample renders into a separate
//! multisampled framebuffer of renderbuffers; the framebuffer holding the
//! textures then becomes the resolve destination.

use crate::arena::TextureId;
use crate::caps::Capabilities;
use crate::error::DeviceError;
use crate::gl::Gl;
use crate::state::StateCache;

/// Description used to create a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    pub name: String,
    /// Textures attached as `COLOR_ATTACHMENT0..n`.
    pub color_buffers: Vec<TextureId>,
    /// Depth (or depth-stencil) texture. Without one, `depth` requests an
    /// internal renderbuffer.
    pub depth_buffer: Option<TextureId>,
    pub depth: bool,
    pub stencil: bool,
    /// Clamped to the device's sample limit.
    pub samples: u32,
    /// End-of-pass resolve happens automatically.
    pub auto_resolve: bool,
    /// Cubemap face rendered to when the color buffer is a cubemap.
    pub face: usize,
}

impl Default for RenderTargetDescriptor {
    fn default() -> Self {
        Self {
            name: String::from("render-target"),
            color_buffers: Vec::new(),
            depth_buffer: None,
            depth: true,
            stencil: false,
            samples: 1,
            auto_resolve: true,
            face: 0,
        }
    }
}

impl RenderTargetDescriptor {
    pub fn with_color(name: &str, color: TextureId) -> Self {
        Self {
            name: name.to_string(),
            color_buffers: vec![color],
            ..Self::default()
        }
    }
}

/// A color texture ready to attach.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColorAttachment<G: Gl> {
    pub(crate) texture: G::Texture,
    /// `TEXTURE_2D` or the cubemap face target.
    pub(crate) target: u32,
    pub(crate) internal_format: u32,
}

/// A depth texture ready to attach.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DepthAttachment<G: Gl> {
    pub(crate) texture: G::Texture,
    pub(crate) stencil: bool,
}

fn status_name(status: u32) -> &'static str {
    match status {
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT",
        0x8CD9 => "FRAMEBUFFER_INCOMPLETE_DIMENSIONS",
        glow::FRAMEBUFFER_UNSUPPORTED => "FRAMEBUFFER_UNSUPPORTED",
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => "FRAMEBUFFER_INCOMPLETE_MULTISAMPLE",
        _ => "unknown status",
    }
}

/// A render target owned by a device.
#[derive(Debug)]
pub struct RenderTarget<G: Gl> {
    name: String,
    color_buffers: Vec<TextureId>,
    depth_buffer: Option<TextureId>,
    depth: bool,
    stencil: bool,
    requested_samples: u32,
    samples: u32,
    auto_resolve: bool,
    face: usize,
    width: u32,
    height: u32,
    back_buffer: bool,

    /// Framebuffer draws go to. The multisampled one when MSAA is active.
    pub(crate) framebuffer: Option<G::Framebuffer>,
    /// Framebuffer holding the textures, when rendering is multisampled.
    pub(crate) resolve_framebuffer: Option<G::Framebuffer>,
    pub(crate) depth_renderbuffer: Option<G::Renderbuffer>,
    pub(crate) msaa_color_renderbuffers: Vec<G::Renderbuffer>,
    pub(crate) msaa_depth_renderbuffer: Option<G::Renderbuffer>,
    pub(crate) initialized: bool,
}

impl<G: Gl> RenderTarget<G> {
    pub(crate) fn new(
        descriptor: RenderTargetDescriptor,
        caps: &Capabilities,
        width: u32,
        height: u32,
    ) -> Self {
        let mut target = Self {
            name: descriptor.name,
            color_buffers: descriptor.color_buffers,
            depth_buffer: descriptor.depth_buffer,
            depth: descriptor.depth || descriptor.depth_buffer.is_some(),
            stencil: descriptor.stencil,
            requested_samples: descriptor.samples.max(1),
            samples: 1,
            auto_resolve: descriptor.auto_resolve,
            face: descriptor.face.min(5),
            width,
            height,
            back_buffer: false,
            framebuffer: None,
            resolve_framebuffer: None,
            depth_renderbuffer: None,
            msaa_color_renderbuffers: Vec::new(),
            msaa_depth_renderbuffer: None,
            initialized: false,
        };
        target.clamp_samples(caps);
        target
    }

    /// The default framebuffer. It is always initialized and has no handles.
    pub(crate) fn back_buffer(width: u32, height: u32, depth: bool, stencil: bool, samples: u32) -> Self {
        Self {
            name: String::from("back-buffer"),
            color_buffers: Vec::new(),
            depth_buffer: None,
            depth,
            stencil,
            requested_samples: samples.max(1),
            samples: samples.max(1),
            auto_resolve: false,
            face: 0,
            width,
            height,
            back_buffer: true,
            framebuffer: None,
            resolve_framebuffer: None,
            depth_renderbuffer: None,
            msaa_color_renderbuffers: Vec::new(),
            msaa_depth_renderbuffer: None,
            initialized: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color_buffers(&self) -> &[TextureId] {
        &self.color_buffers
    }

    pub fn color_buffer(&self) -> Option<TextureId> {
        self.color_buffers.first().copied()
    }

    pub fn depth_buffer(&self) -> Option<TextureId> {
        self.depth_buffer
    }

    pub fn has_depth(&self) -> bool {
        self.depth
    }

    pub fn has_stencil(&self) -> bool {
        self.stencil
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn auto_resolve(&self) -> bool {
        self.auto_resolve
    }

    pub fn face(&self) -> usize {
        self.face
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_back_buffer(&self) -> bool {
        self.back_buffer
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Rendering goes through a separate multisampled framebuffer.
    pub fn is_multisampled(&self) -> bool {
        self.resolve_framebuffer.is_some()
    }

    /// Fits the requested sample count to the context's limit.
    pub(crate) fn clamp_samples(&mut self, caps: &Capabilities) {
        if self.back_buffer {
            return;
        }
        self.samples = self.requested_samples.min(caps.max_samples.max(1));
        if self.samples != self.requested_samples {
            log::warn!(
                "render target '{}': {} samples requested, clamped to {}",
                self.name,
                self.requested_samples,
                self.samples
            );
        }
    }

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn check_status(&self, gl: &G, label: &str) {
        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        if status != glow::FRAMEBUFFER_COMPLETE {
            log::error!(
                "render target '{}'{label} framebuffer is incomplete: {} (0x{status:04X})",
                self.name,
                status_name(status)
            );
        }
    }

    /// Builds the framebuffers around already-created attachment textures.
    /// Leaves the draw framebuffer bound.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ResourceCreation` if the driver refuses a
    /// framebuffer or renderbuffer.
    pub(crate) fn build(
        &mut self,
        gl: &G,
        state: &mut StateCache<G>,
        caps: &Capabilities,
        colors: &[ColorAttachment<G>],
        depth_texture: Option<DepthAttachment<G>>,
    ) -> Result<(), DeviceError> {
        let (w, h) = (self.width as i32, self.height as i32);
        let webgl2 = caps.is_webgl2();
        let msaa = webgl2 && self.samples > 1;

        let framebuffer = gl
            .create_framebuffer()
            .map_err(DeviceError::creation("framebuffer"))?;
        self.framebuffer = Some(framebuffer);
        state.set_framebuffer(gl, Some(framebuffer));

        let mut draw_buffers = Vec::with_capacity(colors.len());
        for (i, color) in colors.iter().enumerate() {
            let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, color.target, Some(color.texture), 0);
            draw_buffers.push(attachment);
        }
        if colors.len() > 1 || (webgl2 && colors.is_empty()) {
            gl.draw_buffers(&draw_buffers);
        }

        if let Some(depth) = depth_texture {
            let attachment = if depth.stencil {
                glow::DEPTH_STENCIL_ATTACHMENT
            } else {
                glow::DEPTH_ATTACHMENT
            };
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, glow::TEXTURE_2D, Some(depth.texture), 0);
        } else if self.depth && !msaa {
            let renderbuffer = match self.depth_renderbuffer {
                Some(rb) => rb,
                None => gl
                    .create_renderbuffer()
                    .map_err(DeviceError::creation("depth renderbuffer"))?,
            };
            self.depth_renderbuffer = Some(renderbuffer);
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            let (format, attachment) = if self.stencil {
                (glow::DEPTH_STENCIL, glow::DEPTH_STENCIL_ATTACHMENT)
            } else if webgl2 {
                (glow::DEPTH_COMPONENT32F, glow::DEPTH_ATTACHMENT)
            } else {
                (glow::DEPTH_COMPONENT16, glow::DEPTH_ATTACHMENT)
            };
            gl.renderbuffer_storage(glow::RENDERBUFFER, format, w, h);
            gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, attachment, glow::RENDERBUFFER, Some(renderbuffer));
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
        self.check_status(gl, "");

        if msaa {
            self.resolve_framebuffer = Some(framebuffer);
            let msaa_framebuffer = gl
                .create_framebuffer()
                .map_err(DeviceError::creation("multisampled framebuffer"))?;
            self.framebuffer = Some(msaa_framebuffer);
            state.set_framebuffer(gl, Some(msaa_framebuffer));

            for (i, color) in colors.iter().enumerate() {
                let renderbuffer = gl
                    .create_renderbuffer()
                    .map_err(DeviceError::creation("multisampled color renderbuffer"))?;
                self.msaa_color_renderbuffers.push(renderbuffer);
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
                gl.renderbuffer_storage_multisample(
                    glow::RENDERBUFFER,
                    self.samples as i32,
                    color.internal_format,
                    w,
                    h,
                );
                gl.framebuffer_renderbuffer(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0 + i as u32,
                    glow::RENDERBUFFER,
                    Some(renderbuffer),
                );
            }
            if colors.len() > 1 {
                gl.draw_buffers(&draw_buffers);
            }

            if self.depth {
                let renderbuffer = match self.msaa_depth_renderbuffer {
                    Some(rb) => rb,
                    None => gl
                        .create_renderbuffer()
                        .map_err(DeviceError::creation("multisampled depth renderbuffer"))?,
                };
                self.msaa_depth_renderbuffer = Some(renderbuffer);
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
                let (format, attachment) = if self.stencil {
                    (glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL_ATTACHMENT)
                } else {
                    (glow::DEPTH_COMPONENT32F, glow::DEPTH_ATTACHMENT)
                };
                gl.renderbuffer_storage_multisample(glow::RENDERBUFFER, self.samples as i32, format, w, h);
                gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, attachment, glow::RENDERBUFFER, Some(renderbuffer));
            }
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            self.check_status(gl, " MSAA");
        }

        self.initialized = true;
        Ok(())
    }

    /// Blits the multisampled framebuffer into the resolve framebuffer.
    /// A no-op for targets that do not render multisampled.
    pub(crate) fn resolve(&self, gl: &G, state: &mut StateCache<G>, color: bool, depth: bool) {
        let (Some(source), Some(dest)) = (self.framebuffer, self.resolve_framebuffer) else {
            return;
        };
        let mut mask = 0;
        if color {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if depth {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if mask == 0 {
            return;
        }
        let (w, h) = (self.width as i32, self.height as i32);
        gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(source));
        gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(dest));
        gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, mask, glow::NEAREST);
        state.rebind_framebuffer(gl, Some(source));
    }

    pub(crate) fn forget_native(&mut self) {
        if self.back_buffer {
            return;
        }
        self.framebuffer = None;
        self.resolve_framebuffer = None;
        self.depth_renderbuffer = None;
        self.msaa_color_renderbuffers.clear();
        self.msaa_depth_renderbuffer = None;
        self.initialized = false;
    }

    /// Deletes every native handle; the target rebuilds on next use.
    pub(crate) fn release(&mut self, gl: &G, state: &mut StateCache<G>) {
        if self.back_buffer {
            return;
        }
        for framebuffer in [self.framebuffer.take(), self.resolve_framebuffer.take()]
            .into_iter()
            .flatten()
        {
            state.forget_framebuffer(framebuffer);
            gl.delete_framebuffer(framebuffer);
        }
        for renderbuffer in self
            .msaa_color_renderbuffers
            .drain(..)
            .chain(self.depth_renderbuffer.take())
            .chain(self.msaa_depth_renderbuffer.take())
        {
            gl.delete_renderbuffer(renderbuffer);
        }
        self.initialized = false;
    }
}
