//! A scripted frame replayed against the recording binding.
//!
//! The scene renders instanced quads into a multisampled offscreen target,
//! then samples the resolved color onto the back buffer.

use serde::Serialize;
use webgl_device_core::{
    BufferUsage, ClearOptions, Device, DeviceError, FrameStats, GlCall, IndexBufferId, IndexFormat,
    PixelFormat, PixelSource, Primitive, RecordingGl, RenderPass, RenderTargetDescriptor,
    RenderTargetId, ShaderDefinition, ShaderId, TextureDescriptor, TextureId, VertexBufferId,
    VertexElementDesc, VertexFormat, VertexSemantic, VertexType, VramStats,
};

const LIT_VS: &str = "\
attribute vec3 vertex_position;
attribute vec2 vertex_texCoord0;
uniform mat4 matrix_viewProjection;
uniform mat4 matrix_model;
varying vec2 vUv0;
void main() {}
";

const LIT_FS: &str = "\
uniform sampler2D texture_diffuse;
uniform vec4 material_tint;
varying vec2 vUv0;
void main() {}
";

const BLIT_VS: &str = "\
attribute vec3 vertex_position;
attribute vec2 vertex_texCoord0;
varying vec2 vUv0;
void main() {}
";

const BLIT_FS: &str = "\
uniform sampler2D source;
varying vec2 vUv0;
void main() {}
";

/// Resources the frame draws with.
pub struct Scene {
    lit: ShaderId,
    blit: ShaderId,
    diffuse: TextureId,
    scene_color: TextureId,
    target: RenderTargetId,
    positions: VertexBufferId,
    uvs: VertexBufferId,
    quad: IndexBufferId,
    quads: u32,
}

/// Native call counts for one frame.
#[derive(Debug, Default, Serialize)]
pub struct CallSummary {
    pub total: usize,
    pub draws: usize,
    pub texture_uploads: usize,
    pub texture_binds: usize,
    pub program_binds: usize,
    pub vertex_array_binds: usize,
    pub framebuffer_binds: usize,
    pub uniforms: usize,
    pub state_changes: usize,
}

impl CallSummary {
    pub fn from_calls(calls: &[GlCall]) -> Self {
        let mut summary = CallSummary {
            total: calls.len(),
            ..CallSummary::default()
        };
        for call in calls {
            match call {
                c if c.is_draw() => summary.draws += 1,
                c if c.is_texture_upload() => summary.texture_uploads += 1,
                GlCall::BindTexture { .. } => summary.texture_binds += 1,
                GlCall::UseProgram(_) => summary.program_binds += 1,
                GlCall::BindVertexArray(_) => summary.vertex_array_binds += 1,
                GlCall::BindFramebuffer { .. } => summary.framebuffer_binds += 1,
                GlCall::UniformF32 { .. } | GlCall::UniformI32 { .. } | GlCall::UniformMatrix { .. } => {
                    summary.uniforms += 1
                }
                GlCall::Enable(_)
                | GlCall::Disable(_)
                | GlCall::BlendFunc { .. }
                | GlCall::BlendFuncSeparate { .. }
                | GlCall::BlendEquation(_)
                | GlCall::BlendEquationSeparate { .. }
                | GlCall::ColorMask(_)
                | GlCall::DepthMask(_)
                | GlCall::DepthFunc(_)
                | GlCall::CullFace(_)
                | GlCall::Viewport(_)
                | GlCall::Scissor(_)
                | GlCall::ClearColor(_) => summary.state_changes += 1,
                _ => {}
            }
        }
        summary
    }
}

/// What one replayed frame did.
#[derive(Debug, Serialize)]
pub struct FrameReport {
    pub frame: u32,
    pub restored: bool,
    pub stats: FrameStats,
    pub calls: CallSummary,
    pub vram: VramStats,
}

fn checker(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / 8 + y / 8) % 2 == 0 {
                [230, 230, 230, 255]
            } else {
                [40, 40, 40, 255]
            }
        })
        .collect()
}

fn floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

impl Scene {
    /// Creates the scene's resources on `device`.
    ///
    /// # Errors
    ///
    /// Returns device errors from resource creation.
    pub fn create(device: &mut Device<RecordingGl>, width: u32, height: u32, quads: u32) -> Result<Self, DeviceError> {
        let attributes = |def: ShaderDefinition| {
            def.with_attribute("vertex_position", VertexSemantic::Position)
                .with_attribute("vertex_texCoord0", VertexSemantic::TexCoord(0))
        };
        let lit = device.create_shader(attributes(ShaderDefinition::new("lit", LIT_VS, LIT_FS)))?;
        let blit = device.create_shader(attributes(ShaderDefinition::new("blit", BLIT_VS, BLIT_FS)))?;

        let mut diffuse = TextureDescriptor::new_2d("checker", 64, 64, PixelFormat::Rgba8);
        diffuse.levels = vec![vec![PixelSource::Raw(checker(64))]];
        let diffuse = device.create_texture(diffuse)?;

        let scene_color = device.create_texture(TextureDescriptor {
            mipmaps: false,
            ..TextureDescriptor::new_2d("scene-color", width, height, PixelFormat::Rgba8)
        })?;
        let target = device.create_render_target(RenderTargetDescriptor {
            samples: 4,
            ..RenderTargetDescriptor::with_color("scene", scene_color)
        })?;

        let positions = device.create_vertex_buffer(
            VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32)]),
            4,
            BufferUsage::Static,
            Some(floats(&[
                -1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 1.0, 1.0, 0.0, -1.0, 1.0, 0.0,
            ])),
        )?;
        let uvs = device.create_vertex_buffer(
            VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::TexCoord(0), 2, VertexType::F32)]),
            4,
            BufferUsage::Static,
            Some(floats(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0])),
        )?;
        let indices: Vec<u8> = [0u16, 1, 2, 0, 2, 3].iter().flat_map(|i| i.to_le_bytes()).collect();
        let quad = device.create_index_buffer(IndexFormat::U16, 6, BufferUsage::Static, Some(indices))?;

        Ok(Self {
            lit,
            blit,
            diffuse,
            scene_color,
            target,
            positions,
            uvs,
            quad,
            quads,
        })
    }

    /// Renders one frame.
    ///
    /// # Errors
    ///
    /// Returns device errors met while rendering.
    pub fn render(&self, device: &mut Device<RecordingGl>) -> Result<(), DeviceError> {
        let offscreen = RenderPass::new("scene", Some(self.target)).with_clear([0.1, 0.1, 0.12, 1.0]);
        device.start_pass(&offscreen)?;
        device.set_depth_test(true);
        device.set_blending(false);
        device.set_shader(self.lit);
        device.scope_mut().set("matrix_viewProjection", glam::Mat4::IDENTITY);
        device.scope_mut().set("texture_diffuse", self.diffuse);
        device.scope_mut().set("material_tint", glam::Vec4::ONE);
        for i in 0..self.quads {
            let offset = glam::Vec3::new(i as f32 * 0.1, 0.0, 0.0);
            device.scope_mut().set("matrix_model", glam::Mat4::from_translation(offset));
            device.set_vertex_buffer(self.positions);
            device.set_vertex_buffer(self.uvs);
            device.set_index_buffer(Some(self.quad));
            device.draw(&Primitive::indexed_triangles(6), 0, false)?;
        }
        device.end_pass(&offscreen);

        let present = RenderPass::new("present", None);
        device.start_pass(&present)?;
        device.clear(ClearOptions {
            color: Some([0.0, 0.0, 0.0, 1.0]),
            ..ClearOptions::default()
        });
        device.set_depth_test(false);
        device.set_shader(self.blit);
        device.scope_mut().set("source", self.scene_color);
        device.set_vertex_buffer(self.positions);
        device.set_vertex_buffer(self.uvs);
        device.set_index_buffer(Some(self.quad));
        device.draw(&Primitive::indexed_triangles(6), 0, false)?;
        device.end_pass(&present);
        Ok(())
    }
}
