//! Device-level behavior checked against the recording binding.

use proptest::prelude::*;
use webgl_device_core::{
    BlendFactor, BufferUsage, CompareFunc, CullMode, Device, DeviceError, DeviceOptions, GlCall,
    PixelFormat, PixelSource, Primitive, RecordingGl, RenderPass, RenderTargetDescriptor,
    ShaderDefinition, TextureDescriptor, TextureId, VertexBufferId, VertexElementDesc,
    VertexFormat, VertexSemantic, VertexType,
};

fn device(gl: RecordingGl) -> Device<RecordingGl> {
    Device::new(gl, DeviceOptions::default(), 64, 64).expect("device creation")
}

fn raw_texture(dev: &mut Device<RecordingGl>, name: &str, size: u32) -> TextureId {
    let mut desc = TextureDescriptor::new_2d(name, size, size, PixelFormat::Rgba8);
    desc.levels = vec![vec![PixelSource::Raw(vec![128; (size * size * 4) as usize])]];
    dev.create_texture(desc).expect("texture")
}

fn buffer(dev: &mut Device<RecordingGl>, semantic: VertexSemantic, components: u32) -> VertexBufferId {
    let format = VertexFormat::new(&[VertexElementDesc::new(semantic, components, VertexType::F32)]);
    let bytes = (components * 4 * 3) as usize;
    dev.create_vertex_buffer(format, 3, BufferUsage::Static, Some(vec![0; bytes]))
        .expect("vertex buffer")
}

const PLAIN_VS: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nvoid main() {}\n";
const PLAIN_FS: &str = "void main() {}\n";

fn tex_image_count(gl: &RecordingGl) -> usize {
    gl.count(|c| matches!(c, GlCall::TexImage2D { .. }))
}

#[derive(Debug, Clone, Copy)]
enum Setter {
    DepthTest(bool),
    DepthWrite(bool),
    Blending(bool),
    Cull(CullMode),
    DepthFunc(CompareFunc),
    ColorWrite([bool; 4]),
    Viewport(i32, i32),
    BlendFunction(BlendFactor, BlendFactor),
}

fn apply(dev: &mut Device<RecordingGl>, setter: Setter) {
    match setter {
        Setter::DepthTest(on) => dev.set_depth_test(on),
        Setter::DepthWrite(on) => dev.set_depth_write(on),
        Setter::Blending(on) => dev.set_blending(on),
        Setter::Cull(mode) => dev.set_cull_mode(mode),
        Setter::DepthFunc(func) => dev.set_depth_func(func),
        Setter::ColorWrite(mask) => dev.set_color_write(mask),
        Setter::Viewport(w, h) => dev.set_viewport(0, 0, w, h),
        Setter::BlendFunction(src, dst) => dev.set_blend_function(src, dst),
    }
}

fn setter() -> impl Strategy<Value = Setter> {
    let factor = prop_oneof![
        Just(BlendFactor::One),
        Just(BlendFactor::Zero),
        Just(BlendFactor::SrcAlpha),
        Just(BlendFactor::OneMinusSrcAlpha),
    ];
    prop_oneof![
        any::<bool>().prop_map(Setter::DepthTest),
        any::<bool>().prop_map(Setter::DepthWrite),
        any::<bool>().prop_map(Setter::Blending),
        prop_oneof![Just(CullMode::None), Just(CullMode::Back), Just(CullMode::Front)].prop_map(Setter::Cull),
        prop_oneof![Just(CompareFunc::Less), Just(CompareFunc::LessEqual), Just(CompareFunc::Always)]
            .prop_map(Setter::DepthFunc),
        any::<[bool; 4]>().prop_map(Setter::ColorWrite),
        (1..512i32, 1..512i32).prop_map(|(w, h)| Setter::Viewport(w, h)),
        (factor.clone(), factor).prop_map(|(s, d)| Setter::BlendFunction(s, d)),
    ]
}

proptest! {
    #[test]
    fn repeated_setter_issues_no_native_calls(sequence in prop::collection::vec(setter(), 1..12)) {
        let mut dev = device(RecordingGl::webgl2());
        for step in sequence {
            apply(&mut dev, step);
            let before = dev.gl().call_count();
            apply(&mut dev, step);
            prop_assert_eq!(dev.gl().call_count(), before, "second {:?} must be cached", step);
        }
    }
}

#[test]
fn blend_function_twice_is_one_call_and_keeps_alpha_mode() {
    let mut dev = device(RecordingGl::webgl2());
    dev.set_blend_function(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    dev.gl().clear_calls();
    dev.set_blend_function(BlendFactor::One, BlendFactor::Zero);
    let separate = dev.state().separate_alpha_blend();
    let after_first = dev.gl().call_count();
    dev.set_blend_function(BlendFactor::One, BlendFactor::Zero);
    assert_eq!(after_first, 1, "first call changes the function");
    assert_eq!(dev.gl().call_count(), after_first, "second call is cached");
    assert_eq!(dev.state().separate_alpha_blend(), separate);
}

#[test]
fn partial_mip_chain_is_generated_before_explicit_levels() {
    let mut dev = device(RecordingGl::webgl2());
    let mut desc = TextureDescriptor::new_2d("partial", 16, 16, PixelFormat::Rgba8);
    desc.levels = vec![
        vec![PixelSource::Raw(vec![0; 16 * 16 * 4])],
        vec![PixelSource::Raw(vec![0; 8 * 8 * 4])],
    ];
    let tex = dev.create_texture(desc).unwrap();
    dev.gl().clear_calls();
    dev.set_texture(tex, 0).unwrap();

    let calls = dev.gl().calls();
    let generate = calls
        .iter()
        .position(|c| matches!(c, GlCall::GenerateMipmap(_)))
        .expect("chain generated");
    let level_one = calls
        .iter()
        .position(|c| matches!(c, GlCall::TexImage2D { level: 1, .. }))
        .expect("explicit level 1 uploaded");
    assert!(generate < level_one, "generation must precede explicit levels: {calls:?}");
}

#[test]
fn generated_levels_survive_a_gap_in_explicit_levels() {
    let mut dev = device(RecordingGl::webgl2());
    let mut desc = TextureDescriptor::new_2d("gapped", 8, 8, PixelFormat::Rgba8);
    desc.levels = vec![vec![PixelSource::Raw(vec![0; 8 * 8 * 4])]];
    let tex = dev.create_texture(desc).unwrap();
    dev.texture_mut(tex)
        .unwrap()
        .set_level(2, 0, PixelSource::Raw(vec![0; 2 * 2 * 4]));
    dev.gl().clear_calls();
    dev.set_texture(tex, 0).unwrap();

    let uploaded: Vec<i32> = dev
        .gl()
        .calls()
        .iter()
        .filter_map(|c| match c {
            GlCall::TexImage2D { level, .. } => Some(*level),
            _ => None,
        })
        .collect();
    assert_eq!(uploaded, vec![0, 2]);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::GenerateMipmap(_))), 1);
}

#[test]
fn loss_and_restore_reuploads_once_on_next_bind() {
    let mut dev = device(RecordingGl::webgl2());
    let tex = raw_texture(&mut dev, "albedo", 8);
    dev.set_texture(tex, 0).unwrap();
    assert_eq!(tex_image_count(dev.gl()), 1);

    dev.lose_context();
    dev.restore_context(RecordingGl::webgl2()).unwrap();
    assert_eq!(tex_image_count(dev.gl()), 0, "restore must not upload textures eagerly");

    dev.set_texture(tex, 0).unwrap();
    assert_eq!(tex_image_count(dev.gl()), 1, "first bind after restore uploads");
    dev.set_texture(tex, 0).unwrap();
    dev.set_texture(tex, 3).unwrap();
    assert_eq!(tex_image_count(dev.gl()), 1, "later binds do not upload again");
}

#[test]
fn same_texture_same_unit_binds_once() {
    let mut dev = device(RecordingGl::webgl2());
    let tex = raw_texture(&mut dev, "albedo", 4);
    dev.gl().clear_calls();
    dev.set_texture(tex, 1).unwrap();
    dev.set_texture(tex, 1).unwrap();
    assert_eq!(
        dev.gl().count(|c| matches!(c, GlCall::BindTexture { texture: Some(_), .. })),
        1
    );
}

#[test]
fn vram_changes_by_delta_when_texture_is_reallocated() {
    let mut dev = device(RecordingGl::webgl2());
    let color = dev
        .create_texture(TextureDescriptor {
            mipmaps: false,
            ..TextureDescriptor::new_2d("color", 4, 4, PixelFormat::Rgba8)
        })
        .unwrap();
    let target = dev
        .create_render_target(RenderTargetDescriptor {
            depth: false,
            ..RenderTargetDescriptor::with_color("rt", color)
        })
        .unwrap();
    let pass = RenderPass::new("draw", Some(target));

    dev.start_pass(&pass).unwrap();
    dev.end_pass(&pass);
    let small = dev.texture(color).unwrap().gpu_size();
    assert_eq!(dev.vram().textures, small);

    dev.resize_render_target(target, 8, 8).unwrap();
    dev.start_pass(&pass).unwrap();
    dev.end_pass(&pass);
    let large = dev.texture(color).unwrap().gpu_size();
    assert_eq!(large, small * 4);
    assert_eq!(dev.vram().textures, large, "old estimate must be replaced, not added to");
}

#[test]
fn volume_texture_on_webgl1_preserves_state() {
    let mut dev = device(RecordingGl::webgl1());
    let existing = raw_texture(&mut dev, "existing", 4);
    dev.set_texture(existing, 2).unwrap();
    let unit = dev.state().active_unit();
    let calls = dev.gl().call_count();

    let result = dev.create_texture(TextureDescriptor {
        volume: true,
        depth: 8,
        ..TextureDescriptor::new_2d("lut", 8, 8, PixelFormat::Rgba8)
    });
    assert!(matches!(result, Err(DeviceError::UnsupportedFeature(_))), "got {result:?}");
    assert_eq!(dev.gl().call_count(), calls);
    assert_eq!(dev.state().active_unit(), unit);
    dev.set_texture(existing, 2).unwrap();
    assert_eq!(dev.gl().call_count(), calls, "existing binding still cached");
}

#[test]
fn msaa_pass_resolves_once_without_mipmaps() {
    let mut dev = device(RecordingGl::webgl2());
    let color = dev
        .create_texture(TextureDescriptor::new_2d("hdr", 32, 32, PixelFormat::Rgba8))
        .unwrap();
    let target = dev
        .create_render_target(RenderTargetDescriptor {
            samples: 4,
            ..RenderTargetDescriptor::with_color("msaa", color)
        })
        .unwrap();
    let mut pass = RenderPass::new("msaa", Some(target));
    pass.color_ops.resolve = true;

    dev.start_pass(&pass).unwrap();
    dev.gl().clear_calls();
    dev.end_pass(&pass);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::BlitFramebuffer { .. })), 1);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);

    pass.color_ops.mipmaps = true;
    dev.start_pass(&pass).unwrap();
    dev.gl().clear_calls();
    dev.end_pass(&pass);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::BlitFramebuffer { .. })), 1);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::GenerateMipmap(_))), 1);
}

#[test]
fn combinations_sharing_a_buffer_get_distinct_vertex_arrays() {
    let mut dev = device(RecordingGl::webgl2());
    let shader = dev
        .create_shader(
            ShaderDefinition::new("plain", PLAIN_VS, PLAIN_FS)
                .with_attribute("vertex_position", VertexSemantic::Position),
        )
        .unwrap();
    dev.scope_mut().set("matrix_model", glam::Mat4::IDENTITY);
    let shared = buffer(&mut dev, VertexSemantic::Position, 3);
    let normals = buffer(&mut dev, VertexSemantic::Normal, 3);
    let colors = buffer(&mut dev, VertexSemantic::Color, 4);
    assert!(dev.set_shader(shader));

    for other in [normals, colors, normals] {
        dev.set_vertex_buffer(shared);
        dev.set_vertex_buffer(other);
        dev.draw(&Primitive::triangles(3), 0, false).unwrap();
    }
    assert_eq!(dev.vertex_array_cache().len(), 2);
    assert_eq!(dev.gl().count(|c| matches!(c, GlCall::CreateVertexArray(_))), 2);
    assert_eq!(dev.frame_stats().draw_calls, 3);
}
