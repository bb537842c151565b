//! The texture upload pipeline and sampling-parameter application.
//!
//! Both functions expect the texture to be bound on the active unit already;
//! the device takes care of that in `set_texture`.

use image::imageops::{self, FilterType};

use crate::caps::{Capabilities, Extensions};
use crate::constants::{AddressMode, NativeEnums, TextureCompare};
use crate::error::DeviceError;
use crate::format::FormatTable;
use crate::gl::{webgl, Gl};
use crate::state::StateCache;
use crate::stats::VramStats;
use crate::texture::{ParameterFlags, PixelSource, Texture};

/// Applies every dirty sampling parameter and clears the flags.
pub(crate) fn apply_parameters<G: Gl>(
    gl: &G,
    caps: &Capabilities,
    enums: &NativeEnums,
    texture: &mut Texture<G>,
) {
    let flags = texture.parameter_flags;
    let target = texture.target();
    let webgl2 = caps.is_webgl2();
    let pot = texture.is_pot();

    if flags.contains(ParameterFlags::MIN_FILTER) {
        let requested = texture.min_filter();
        let no_mip_chain = (!pot && !webgl2)
            || !texture.mipmaps()
            || (texture.format().is_compressed() && texture.level_count() == 1);
        let filter = if no_mip_chain && requested.uses_mipmaps() {
            log::debug!(
                "texture '{}': min filter {requested:?} downgraded to {:?} (no usable mip chain)",
                texture.name(),
                requested.without_mipmaps()
            );
            requested.without_mipmaps()
        } else {
            requested
        };
        gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, enums.filter(filter) as i32);
    }
    if flags.contains(ParameterFlags::MAG_FILTER) {
        gl.tex_parameter_i32(
            target,
            glow::TEXTURE_MAG_FILTER,
            enums.filter(texture.mag_filter()) as i32,
        );
    }
    // WebGL 1.0 only samples NPOT textures with clamped addressing.
    let address = |mode: AddressMode| {
        if webgl2 || pot {
            enums.address(mode)
        } else {
            enums.address(AddressMode::ClampToEdge)
        }
    };
    if flags.contains(ParameterFlags::ADDRESS_U) {
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, address(texture.address_u()) as i32);
    }
    if flags.contains(ParameterFlags::ADDRESS_V) {
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, address(texture.address_v()) as i32);
    }
    if flags.contains(ParameterFlags::ADDRESS_W) && webgl2 {
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, enums.address(texture.address_w()) as i32);
    }
    if flags.contains(ParameterFlags::COMPARE) && webgl2 {
        match texture.compare() {
            TextureCompare::None => {
                gl.tex_parameter_i32(target, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32);
            }
            TextureCompare::Func(func) => {
                gl.tex_parameter_i32(
                    target,
                    glow::TEXTURE_COMPARE_MODE,
                    glow::COMPARE_REF_TO_TEXTURE as i32,
                );
                gl.tex_parameter_i32(target, glow::TEXTURE_COMPARE_FUNC, enums.compare(func) as i32);
            }
        }
    }
    if flags.contains(ParameterFlags::ANISOTROPY) && caps.has(Extensions::ANISOTROPIC) {
        let anisotropy = texture.anisotropy().round().clamp(1.0, caps.max_anisotropy);
        gl.tex_parameter_f32(target, webgl::TEXTURE_MAX_ANISOTROPY_EXT, anisotropy);
    }

    texture.parameter_flags = ParameterFlags::empty();
}

/// Shrinks `image` to fit within `max` on both axes, keeping its aspect.
fn downsample(name: &str, image: &image::RgbaImage, max: u32) -> Option<image::RgbaImage> {
    let (w, h) = image.dimensions();
    if w <= max && h <= max {
        return None;
    }
    let scale = max as f64 / w.max(h) as f64;
    let dw = ((w as f64 * scale).floor() as u32).max(1);
    let dh = ((h as f64 * scale).floor() as u32).max(1);
    log::warn!(
        "texture '{name}': image {w}x{h} exceeds the maximum texture size {max}, resizing to {dw}x{dh}"
    );
    Some(imageops::resize(image, dw, dh, FilterType::Triangle))
}

/// Pushes dirty level data to the bound native texture.
///
/// Returns `Ok(true)` when anything was uploaded. Level sizes that do not
/// match the texture are clamped, never rejected.
///
/// # Errors
///
/// Returns `DeviceError::UnsupportedFormat` if the texture's format has no
/// mapping on this context (possible after a restore to a weaker context).
pub(crate) fn upload_texture<G: Gl>(
    gl: &G,
    state: &mut StateCache<G>,
    caps: &Capabilities,
    formats: &FormatTable,
    texture: &mut Texture<G>,
    vram: &mut VramStats,
) -> Result<bool, DeviceError> {
    if !texture.needs_upload && !texture.needs_mipmaps_upload {
        return Ok(false);
    }
    let mip_capable = caps.is_webgl2() || texture.is_pot();
    if !texture.needs_upload && (texture.mipmaps_uploaded || !mip_capable) {
        return Ok(false);
    }

    let native = formats.resolve(texture.format())?;
    let format = texture.format();
    let generates_mips = !format.is_compressed() && !format.is_integer() && !format.is_depth();
    let target = texture.target();
    let required_levels = texture.required_mip_levels();
    let name = texture.name().to_string();
    let chain_has_gaps = (1..required_levels).any(|level| {
        texture
            .levels
            .get(level)
            .map_or(true, |faces| faces.iter().any(Option::is_none))
    });

    let mut level = 0;
    while level == 0 || level < texture.levels.len() {
        if level == 0 && !texture.needs_upload {
            level += 1;
            continue;
        }
        if level > 0 && (!texture.needs_mipmaps_upload || !texture.mipmaps() || !mip_capable) {
            break;
        }

        if level == 1 && generates_mips && chain_has_gaps {
            // Complete the chain from level 0 before explicit levels land.
            gl.generate_mipmap(target);
            texture.mipmaps_uploaded = true;
        }

        let (w, h, d) = texture.level_extent(level);
        let (w, h, d) = (w as i32, h as i32, d as i32);

        if texture.is_volume() {
            let data = match texture.levels[level].first().and_then(Option::as_ref) {
                Some(PixelSource::Raw(bytes)) => Some(bytes.as_slice()),
                Some(PixelSource::Image(_)) => {
                    log::error!("texture '{name}': volume textures only accept raw level data");
                    None
                }
                None => None,
            };
            state.set_unpack_flip_y(gl, false);
            state.set_unpack_premultiply_alpha(gl, texture.premultiply_alpha());
            if level > 0 && data.is_none() {
                // Unauthored levels keep the generated contents.
            } else if format.is_compressed() {
                if let Some(data) = data {
                    gl.compressed_tex_image_3d(target, level as i32, native.internal_format, w, h, d, data);
                }
            } else {
                gl.tex_image_3d(
                    target,
                    level as i32,
                    native.internal_format as i32,
                    w,
                    h,
                    d,
                    native.format,
                    native.data_type,
                    data,
                );
            }
        } else {
            let faces = texture.face_count();
            let max_size = if texture.is_cubemap() {
                caps.max_cube_map_size
            } else {
                caps.max_texture_size
            };
            for face in 0..faces {
                let face_target = if texture.is_cubemap() {
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32
                } else {
                    target
                };
                if texture.created && !texture.levels_updated[level][face] {
                    continue;
                }
                let flip_y = texture.flip_y() && !texture.is_cubemap();
                let mut uploaded_base = None;
                match texture.levels[level][face].as_ref() {
                    Some(PixelSource::Image(image)) => {
                        let resized = downsample(&name, image, max_size);
                        let image = resized.as_ref().unwrap_or(image);
                        let (iw, ih) = image.dimensions();
                        state.set_unpack_flip_y(gl, flip_y);
                        state.set_unpack_premultiply_alpha(gl, texture.premultiply_alpha());
                        let same_size = texture.level_extent(level) == (iw, ih, 1);
                        if texture.created && same_size {
                            gl.tex_sub_image_2d(
                                face_target,
                                level as i32,
                                0,
                                0,
                                iw as i32,
                                ih as i32,
                                native.format,
                                native.data_type,
                                image.as_raw(),
                            );
                        } else {
                            gl.tex_image_2d(
                                face_target,
                                level as i32,
                                native.internal_format as i32,
                                iw as i32,
                                ih as i32,
                                native.format,
                                native.data_type,
                                Some(image.as_raw()),
                            );
                        }
                        if level == 0 {
                            uploaded_base = Some((iw, ih));
                        }
                    }
                    Some(PixelSource::Raw(bytes)) if format.is_compressed() => {
                        gl.compressed_tex_image_2d(
                            face_target,
                            level as i32,
                            native.internal_format,
                            w,
                            h,
                            bytes,
                        );
                    }
                    None if level > 0 || format.is_compressed() => {}
                    source => {
                        let bytes = match source {
                            Some(PixelSource::Raw(bytes)) => Some(bytes.as_slice()),
                            _ => None,
                        };
                        state.set_unpack_flip_y(gl, false);
                        state.set_unpack_premultiply_alpha(gl, texture.premultiply_alpha());
                        match bytes {
                            Some(bytes) if texture.created => gl.tex_sub_image_2d(
                                face_target,
                                level as i32,
                                0,
                                0,
                                w,
                                h,
                                native.format,
                                native.data_type,
                                bytes,
                            ),
                            _ => gl.tex_image_2d(
                                face_target,
                                level as i32,
                                native.internal_format as i32,
                                w,
                                h,
                                native.format,
                                native.data_type,
                                bytes,
                            ),
                        }
                    }
                }
                if let Some((width, height)) = uploaded_base {
                    texture.width = width;
                    texture.height = height;
                }
            }
        }

        texture.mipmaps_uploaded = level > 0;
        level += 1;
    }

    if texture.needs_upload {
        for faces in &mut texture.levels_updated {
            faces.fill(false);
        }
    }

    if generates_mips
        && texture.mipmaps()
        && mip_capable
        && texture.needs_mipmaps_upload
        && texture.levels.len() == 1
    {
        gl.generate_mipmap(target);
        texture.mipmaps_uploaded = true;
    }

    let previous = texture.gpu_size;
    texture.gpu_size = texture.estimate_gpu_size();
    vram.retrack_texture(previous, texture.gpu_size);
    texture.created = true;
    texture.needs_upload = false;
    texture.needs_mipmaps_upload = false;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceOptions;
    use crate::constants::FilterMode;
    use crate::format::PixelFormat;
    use crate::gl::{GlCall, RecordingGl};
    use crate::texture::TextureDescriptor;

    struct Fixture {
        gl: RecordingGl,
        caps: Capabilities,
        formats: FormatTable,
        enums: NativeEnums,
        state: StateCache<RecordingGl>,
        vram: VramStats,
    }

    impl Fixture {
        fn new(gl: RecordingGl) -> Self {
            let caps = Capabilities::detect(&gl, &DeviceOptions::default()).unwrap();
            let formats = FormatTable::build(&caps);
            let enums = NativeEnums::new(&caps);
            let state = StateCache::new(&caps, enums.clone());
            Self {
                gl,
                caps,
                formats,
                enums,
                state,
                vram: VramStats::default(),
            }
        }

        fn upload(&mut self, texture: &mut Texture<RecordingGl>) -> bool {
            upload_texture(
                &self.gl,
                &mut self.state,
                &self.caps,
                &self.formats,
                texture,
                &mut self.vram,
            )
            .unwrap()
        }

        fn position(&self, pred: impl Fn(&GlCall) -> bool) -> Vec<usize> {
            self.gl
                .calls()
                .iter()
                .enumerate()
                .filter(|(_, c)| pred(c))
                .map(|(i, _)| i)
                .collect()
        }
    }

    fn raw_texture(width: u32, height: u32) -> Texture<RecordingGl> {
        let mut desc = TextureDescriptor::new_2d("t", width, height, PixelFormat::Rgba8);
        desc.levels = vec![vec![PixelSource::Raw(vec![0; (width * height * 4) as usize])]];
        Texture::new(desc)
    }

    #[test]
    fn single_level_generates_chain_after_upload() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        assert!(fx.upload(&mut t));
        let uploads = fx.position(GlCall::is_texture_upload);
        let mips = fx.position(|c| matches!(c, GlCall::GenerateMipmap(_)));
        assert_eq!(uploads.len(), 1);
        assert_eq!(mips.len(), 1);
        assert!(mips[0] > uploads[0], "mip generation must follow the base upload");
        assert!(t.mipmaps_uploaded);
    }

    #[test]
    fn clean_texture_uploads_nothing() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        fx.upload(&mut t);
        fx.gl.clear_calls();
        assert!(!fx.upload(&mut t));
        assert_eq!(fx.gl.call_count(), 0);
    }

    #[test]
    fn partial_chain_is_completed_before_explicit_levels() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(8, 8);
        t.set_level(1, 0, PixelSource::Raw(vec![0; 4 * 4 * 4]));
        fx.upload(&mut t);

        let calls = fx.gl.calls();
        let level_of = |c: &GlCall| match c {
            GlCall::TexImage2D { level, .. } => Some(*level),
            _ => None,
        };
        let base = calls.iter().position(|c| level_of(c) == Some(0)).unwrap();
        let mip = calls
            .iter()
            .position(|c| matches!(c, GlCall::GenerateMipmap(_)))
            .unwrap();
        let explicit = calls.iter().position(|c| level_of(c) == Some(1)).unwrap();
        assert!(base < mip && mip < explicit, "expected base, generate, level 1 in order: {calls:?}");
        assert_eq!(
            fx.gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))),
            1,
            "two authored levels must not trigger the trailing generation"
        );
    }

    #[test]
    fn unauthored_levels_keep_generated_contents() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(8, 8);
        t.set_level(2, 0, PixelSource::Raw(vec![0; 2 * 2 * 4]));
        fx.upload(&mut t);

        let levels: Vec<i32> = fx
            .gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::TexImage2D { level, .. } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![0, 2], "level 1 must not be re-specified after generation");
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 1);
    }

    #[test]
    fn full_explicit_chain_with_a_gap_still_generates() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        t.set_level(2, 0, PixelSource::Raw(vec![0; 4]));
        assert_eq!(t.level_count(), t.required_mip_levels());
        fx.upload(&mut t);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 1);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::TexImage2D { level: 1, .. })), 0);
    }

    #[test]
    fn raw_levels_are_sized_by_level() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut desc = TextureDescriptor::new_2d("t", 8, 2, PixelFormat::Rgba8);
        desc.levels = vec![
            vec![PixelSource::Raw(vec![0; 64])],
            vec![PixelSource::Raw(vec![0; 16])],
            vec![PixelSource::Raw(vec![0; 8])],
            vec![PixelSource::Raw(vec![0; 4])],
        ];
        let mut t = Texture::new(desc);
        fx.upload(&mut t);
        let sizes: Vec<(i32, i32, i32)> = fx
            .gl
            .calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::TexImage2D { level, width, height, .. } => Some((*level, *width, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![(0, 8, 2), (1, 4, 1), (2, 2, 1), (3, 1, 1)]);
    }

    #[test]
    fn reupload_of_created_texture_uses_sub_image() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        fx.upload(&mut t);
        t.set_level(0, 0, PixelSource::Raw(vec![1; 64]));
        fx.gl.clear_calls();
        fx.upload(&mut t);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::TexSubImage2D { .. })), 1);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::TexImage2D { .. })), 0);
    }

    #[test]
    fn oversized_image_is_downsampled() {
        let gl = RecordingGl::webgl2();
        let mut fx = Fixture::new(gl);
        fx.caps.max_texture_size = 16;
        let mut desc = TextureDescriptor::new_2d("big", 64, 32, PixelFormat::Rgba8);
        desc.levels = vec![vec![PixelSource::Image(image::RgbaImage::new(64, 32))]];
        let mut t = Texture::new(desc);
        fx.upload(&mut t);
        assert_eq!((t.width(), t.height()), (16, 8));
        assert_eq!(
            fx.gl.count(|c| matches!(c, GlCall::TexImage2D { width: 16, height: 8, .. })),
            1
        );
    }

    #[test]
    fn cubemap_uploads_six_faces() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut desc = TextureDescriptor::new_2d("cube", 4, 4, PixelFormat::Rgba8);
        desc.cubemap = true;
        desc.mipmaps = false;
        let mut t = Texture::new(desc);
        fx.upload(&mut t);
        assert_eq!(fx.gl.count(GlCall::is_texture_upload), 6);
    }

    #[test]
    fn volume_texture_uses_3d_upload() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut desc = TextureDescriptor::new_2d("vol", 4, 4, PixelFormat::Rgba8);
        desc.volume = true;
        desc.depth = 4;
        desc.mipmaps = false;
        desc.levels = vec![vec![PixelSource::Raw(vec![0; 256])]];
        let mut t = Texture::new(desc);
        fx.upload(&mut t);
        assert_eq!(
            fx.gl.count(|c| matches!(c, GlCall::TexImage3D { depth: 4, bytes: Some(256), .. })),
            1
        );
    }

    #[test]
    fn compressed_single_level_never_generates_mips() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut desc = TextureDescriptor::new_2d("dxt", 8, 8, PixelFormat::Dxt1);
        desc.levels = vec![vec![PixelSource::Raw(vec![0; 32])]];
        let mut t = Texture::new(desc);
        fx.upload(&mut t);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::CompressedTexImage2D { bytes: 32, .. })), 1);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);
    }

    #[test]
    fn vram_tracks_delta_on_reupload() {
        let mut fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        fx.upload(&mut t);
        let first = fx.vram.textures;
        assert_eq!(first, t.estimate_gpu_size());
        t.resize(8, 8, 1);
        fx.upload(&mut t);
        assert_eq!(fx.vram.textures, t.estimate_gpu_size(), "old estimate must be replaced");
    }

    #[test]
    fn npot_on_webgl1_skips_mipmaps() {
        let mut fx = Fixture::new(RecordingGl::webgl1());
        let mut t = raw_texture(6, 6);
        fx.upload(&mut t);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 0);
    }

    #[test]
    fn unsupported_format_is_an_error_not_a_panic() {
        let mut fx = Fixture::new(RecordingGl::webgl1());
        let mut t = Texture::new(TextureDescriptor::new_2d("f", 4, 4, PixelFormat::R16F));
        let err = upload_texture(&fx.gl, &mut fx.state, &fx.caps, &fx.formats, &mut t, &mut fx.vram)
            .unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedFormat { .. }));
        assert_eq!(fx.gl.call_count(), 0, "no native call on rejection");
    }

    #[test]
    fn npot_webgl1_downgrades_filter_and_clamps_address() {
        let fx = Fixture::new(RecordingGl::webgl1());
        let mut t = raw_texture(6, 6);
        apply_parameters(&fx.gl, &fx.caps, &fx.enums, &mut t);
        assert_eq!(
            fx.gl.count(|c| matches!(
                c,
                GlCall::TexParameterI32 { parameter: glow::TEXTURE_MIN_FILTER, value, .. }
                    if *value == glow::LINEAR as i32
            )),
            1
        );
        assert_eq!(
            fx.gl.count(|c| matches!(
                c,
                GlCall::TexParameterI32 { parameter: glow::TEXTURE_WRAP_S, value, .. }
                    if *value == glow::CLAMP_TO_EDGE as i32
            )),
            1
        );
        assert_eq!(
            fx.gl.count(|c| matches!(c, GlCall::TexParameterI32 { parameter: glow::TEXTURE_WRAP_R, .. })),
            0,
            "wrap R is WebGL 2.0 only"
        );
        assert!(t.parameter_flags().is_empty());
    }

    #[test]
    fn pot_webgl2_keeps_requested_parameters() {
        let fx = Fixture::new(RecordingGl::webgl2());
        let mut t = raw_texture(4, 4);
        t.set_min_filter(FilterMode::LinearMipmapLinear);
        t.set_anisotropy(64.0);
        apply_parameters(&fx.gl, &fx.caps, &fx.enums, &mut t);
        assert_eq!(
            fx.gl.count(|c| matches!(
                c,
                GlCall::TexParameterI32 { parameter: glow::TEXTURE_MIN_FILTER, value, .. }
                    if *value == glow::LINEAR_MIPMAP_LINEAR as i32
            )),
            1
        );
        assert_eq!(
            fx.gl.count(|c| matches!(
                c,
                GlCall::TexParameterF32 { parameter: webgl::TEXTURE_MAX_ANISOTROPY_EXT, value, .. }
                    if *value == 16.0
            )),
            1,
            "anisotropy clamps to the device maximum"
        );
    }
}
