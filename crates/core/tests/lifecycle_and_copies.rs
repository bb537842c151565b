use std::cell::RefCell;
use std::rc::Rc;

use webgl_device_core::{
    BufferUsage, ContextState, Device, DeviceError, DeviceEvent, DeviceOptions, GlCall, IndexFormat,
    PixelFormat, Primitive, RecordingGl, RenderPass, RenderTargetDescriptor, RenderTargetId,
    ShaderDefinition, TextureDescriptor, VertexElementDesc, VertexFormat, VertexSemantic, VertexType,
};

const VS: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nvoid main() {}\n";
const FS: &str = "uniform vec4 tint;\nvoid main() {}\n";

fn device(gl: RecordingGl) -> Device<RecordingGl> {
    Device::new(gl, DeviceOptions::default(), 64, 64).expect("device creation")
}

fn color_target(dev: &mut Device<RecordingGl>, name: &str, format: PixelFormat) -> RenderTargetId {
    let color = dev
        .create_texture(TextureDescriptor {
            mipmaps: false,
            ..TextureDescriptor::new_2d(name, 16, 16, format)
        })
        .unwrap();
    dev.create_render_target(RenderTargetDescriptor::with_color(name, color))
        .unwrap()
}

#[test]
fn listeners_hear_loss_then_restore() {
    let mut dev = device(RecordingGl::webgl2());
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let id = dev.on_event(move |event| sink.borrow_mut().push(event));

    dev.lose_context();
    assert_eq!(dev.context_state(), ContextState::Lost);
    dev.restore_context(RecordingGl::webgl2()).unwrap();
    assert_eq!(dev.context_state(), ContextState::Live);
    assert_eq!(*events.borrow(), vec![DeviceEvent::Lost, DeviceEvent::Restored]);

    assert!(dev.off(id));
    dev.lose_context();
    assert_eq!(events.borrow().len(), 2, "removed listener must stay silent");
}

#[test]
fn restore_relinks_shaders_and_reuploads_buffers() {
    let mut dev = device(RecordingGl::webgl2());
    let shader = dev
        .create_shader(ShaderDefinition::new("tinted", VS, FS).with_attribute("vertex_position", VertexSemantic::Position))
        .unwrap();
    let format = VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32)]);
    let vb = dev
        .create_vertex_buffer(format, 3, BufferUsage::Static, Some(vec![0; 36]))
        .unwrap();
    let ib = dev
        .create_index_buffer(IndexFormat::U16, 3, BufferUsage::Static, Some(vec![0; 6]))
        .unwrap();
    let vram_before = dev.vram();

    dev.lose_context();
    assert!(dev.vertex_buffer(vb).unwrap().native().is_none());
    dev.restore_context(RecordingGl::webgl2()).unwrap();

    let gl = dev.gl();
    assert_eq!(gl.count(|c| matches!(c, GlCall::LinkProgram(_))), 1);
    assert_eq!(gl.count(|c| matches!(c, GlCall::BufferData { .. })), 2);
    assert_eq!(dev.vram(), vram_before, "re-upload must not double count");

    assert!(dev.set_shader(shader), "relinked shader is usable");
    dev.scope_mut().set("tint", glam::Vec4::ONE);
    dev.scope_mut().set("matrix_model", glam::Mat4::IDENTITY);
    dev.set_vertex_buffer(vb);
    dev.set_index_buffer(Some(ib));
    dev.draw(&Primitive::indexed_triangles(3), 0, false).unwrap();
    assert_eq!(dev.gl().count(GlCall::is_draw), 1);
}

#[test]
fn restored_webgl1_context_clamps_target_samples() {
    let mut dev = device(RecordingGl::webgl2());
    let color = dev
        .create_texture(TextureDescriptor::new_2d("c", 8, 8, PixelFormat::Rgba8))
        .unwrap();
    let target = dev
        .create_render_target(RenderTargetDescriptor {
            samples: 4,
            ..RenderTargetDescriptor::with_color("msaa", color)
        })
        .unwrap();
    assert_eq!(dev.render_target(target).unwrap().samples(), 4);

    dev.lose_context();
    dev.restore_context(RecordingGl::webgl1()).unwrap();
    assert!(!dev.capabilities().is_webgl2());
    assert_eq!(dev.render_target(target).unwrap().samples(), 1);
}

#[test]
fn lost_context_suppresses_uploads_and_draws() {
    let mut dev = device(RecordingGl::webgl2());
    let tex = dev
        .create_texture(TextureDescriptor::new_2d("t", 4, 4, PixelFormat::Rgba8))
        .unwrap();
    dev.lose_context();
    dev.gl().clear_calls();

    assert!(matches!(dev.set_texture(tex, 0), Err(DeviceError::ContextLost)));
    dev.draw(&Primitive::triangles(3), 0, false).unwrap();
    assert!(!dev.copy_render_target(None, None, true, false));
    assert_eq!(dev.gl().call_count(), 0);
}

#[test]
fn destroyed_device_cannot_be_restored() {
    let mut dev = device(RecordingGl::webgl2());
    dev.lose_context();
    dev.destroy();
    assert!(matches!(
        dev.restore_context(RecordingGl::webgl2()),
        Err(DeviceError::Destroyed)
    ));
}

#[test]
fn webgl2_copy_blits_and_restores_binding() {
    let mut dev = device(RecordingGl::webgl2());
    let src = color_target(&mut dev, "src", PixelFormat::Rgba8);
    let dst = color_target(&mut dev, "dst", PixelFormat::Rgba8);
    let pass = RenderPass::new("draw", Some(src));
    dev.start_pass(&pass).unwrap();
    let bound = dev.state().framebuffer();

    assert!(dev.copy_render_target(Some(src), Some(dst), true, false));
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::BlitFramebuffer { .. })), 1);
    assert_eq!(dev.state().framebuffer(), bound);
    dev.end_pass(&pass);
}

#[test]
fn mismatched_color_formats_are_refused() {
    let mut dev = device(RecordingGl::webgl2());
    let src = color_target(&mut dev, "src", PixelFormat::Rgba8);
    let dst = color_target(&mut dev, "dst", PixelFormat::Rgba16F);
    dev.gl().clear_calls();
    assert!(!dev.copy_render_target(Some(src), Some(dst), true, false));
    assert_eq!(dev.gl().call_count(), 0, "refused copies touch nothing");
}

#[test]
fn webgl1_copies_color_through_copy_tex_sub_image() {
    let mut dev = device(RecordingGl::webgl1());
    let src = color_target(&mut dev, "src", PixelFormat::Rgba8);
    let dst = color_target(&mut dev, "dst", PixelFormat::Rgba8);

    dev.gl().clear_calls();
    assert!(!dev.copy_render_target(Some(src), Some(dst), true, true), "depth needs WebGL 2.0");
    assert!(!dev.copy_render_target(Some(src), None, true, false), "back buffer needs WebGL 2.0");
    assert_eq!(dev.gl().call_count(), 0, "refused copies leave both targets untouched");
    assert!(!dev.render_target(src).unwrap().is_initialized());
    assert!(!dev.render_target(dst).unwrap().is_initialized());

    assert!(dev.copy_render_target(Some(src), Some(dst), true, false));
    assert_eq!(
        dev.gl().count(|c| matches!(c, GlCall::CopyTexSubImage2D { width: 16, height: 16, .. })),
        1
    );
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::BlitFramebuffer { .. })), 0);
}

#[test]
fn read_pixels_checks_buffer_size() {
    let mut dev = device(RecordingGl::webgl2());
    let mut small = vec![0u8; 15];
    assert!(!dev.read_pixels(0, 0, 2, 2, &mut small));
    let mut exact = vec![0u8; 16];
    assert!(dev.read_pixels(0, 0, 2, 2, &mut exact));
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::ReadPixels { width: 2, height: 2, .. })), 1);
}

#[test]
fn back_buffer_cannot_be_destroyed() {
    let mut dev = device(RecordingGl::webgl2());
    let back = dev.back_buffer();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dev.destroy_render_target(back)));
    match result {
        Ok(destroyed) => assert!(!destroyed),
        Err(_) => assert!(cfg!(debug_assertions), "only debug builds assert"),
    }
}

#[test]
fn destroyed_slots_are_reused_with_fresh_ids() {
    let mut dev = device(RecordingGl::webgl2());
    let first = dev
        .create_texture(TextureDescriptor::new_2d("first", 4, 4, PixelFormat::Rgba8))
        .unwrap();
    assert!(dev.destroy_texture(first));
    let second = dev
        .create_texture(TextureDescriptor::new_2d("second", 4, 4, PixelFormat::Rgba8))
        .unwrap();

    assert_ne!(first, second);
    assert!(dev.texture(first).is_none(), "stale id must not resolve to the new texture");
    assert_eq!(dev.texture(second).unwrap().name(), "second");
    assert!(matches!(dev.set_texture(first, 0), Err(DeviceError::UnknownResource(_))));
    dev.set_texture(second, 0).unwrap();
}
