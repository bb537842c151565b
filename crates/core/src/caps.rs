//! Capability and extension detection.
//!
//! Queried once when the device is created and again on every context
//! restore, since a restored context may expose a different extension set.

use bitflags::bitflags;
use serde::Serialize;

use crate::config::DeviceOptions;
use crate::error::DeviceError;
use crate::format::PixelFormat;
use crate::gl::{webgl, ApiGeneration, Gl};

bitflags! {
    /// Optional extensions the device cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Extensions: u32 {
        const COLOR_BUFFER_FLOAT = 1 << 0;
        const COLOR_BUFFER_HALF_FLOAT = 1 << 1;
        const WEBGL_COLOR_BUFFER_FLOAT = 1 << 2;
        const TEXTURE_FLOAT = 1 << 3;
        const TEXTURE_HALF_FLOAT = 1 << 4;
        const TEXTURE_FLOAT_LINEAR = 1 << 5;
        const TEXTURE_HALF_FLOAT_LINEAR = 1 << 6;
        const ANISOTROPIC = 1 << 7;
        const S3TC = 1 << 8;
        const ETC1 = 1 << 9;
        const ETC = 1 << 10;
        const PVRTC = 1 << 11;
        const ASTC = 1 << 12;
        const ATC = 1 << 13;
        const VERTEX_ARRAY_OBJECT = 1 << 14;
        const INSTANCED_ARRAYS = 1 << 15;
        const ELEMENT_INDEX_UINT = 1 << 16;
        const DEPTH_TEXTURE = 1 << 17;
        const BLEND_MINMAX = 1 << 18;
        const DRAW_BUFFERS = 1 << 19;
        const SRGB = 1 << 20;
        const STANDARD_DERIVATIVES = 1 << 21;
        const DEBUG_RENDERER_INFO = 1 << 22;
    }
}

/// Extension names probed for each flag, in preference order.
const EXTENSION_NAMES: &[(Extensions, &[&str])] = &[
    (Extensions::COLOR_BUFFER_FLOAT, &["EXT_color_buffer_float"]),
    (Extensions::COLOR_BUFFER_HALF_FLOAT, &["EXT_color_buffer_half_float"]),
    (Extensions::WEBGL_COLOR_BUFFER_FLOAT, &["WEBGL_color_buffer_float"]),
    (Extensions::TEXTURE_FLOAT, &["OES_texture_float"]),
    (Extensions::TEXTURE_HALF_FLOAT, &["OES_texture_half_float"]),
    (Extensions::TEXTURE_FLOAT_LINEAR, &["OES_texture_float_linear"]),
    (Extensions::TEXTURE_HALF_FLOAT_LINEAR, &["OES_texture_half_float_linear"]),
    (
        Extensions::ANISOTROPIC,
        &[
            "EXT_texture_filter_anisotropic",
            "WEBKIT_EXT_texture_filter_anisotropic",
            "MOZ_EXT_texture_filter_anisotropic",
        ],
    ),
    (
        Extensions::S3TC,
        &["WEBGL_compressed_texture_s3tc", "WEBKIT_WEBGL_compressed_texture_s3tc", "EXT_texture_compression_s3tc"],
    ),
    (Extensions::ETC1, &["WEBGL_compressed_texture_etc1"]),
    (Extensions::ETC, &["WEBGL_compressed_texture_etc"]),
    (
        Extensions::PVRTC,
        &["WEBGL_compressed_texture_pvrtc", "WEBKIT_WEBGL_compressed_texture_pvrtc"],
    ),
    (Extensions::ASTC, &["WEBGL_compressed_texture_astc"]),
    (Extensions::ATC, &["WEBGL_compressed_texture_atc"]),
    (Extensions::VERTEX_ARRAY_OBJECT, &["OES_vertex_array_object"]),
    (Extensions::INSTANCED_ARRAYS, &["ANGLE_instanced_arrays"]),
    (Extensions::ELEMENT_INDEX_UINT, &["OES_element_index_uint"]),
    (Extensions::DEPTH_TEXTURE, &["WEBGL_depth_texture"]),
    (Extensions::BLEND_MINMAX, &["EXT_blend_minmax"]),
    (Extensions::DRAW_BUFFERS, &["WEBGL_draw_buffers"]),
    (Extensions::SRGB, &["EXT_sRGB"]),
    (Extensions::STANDARD_DERIVATIVES, &["OES_standard_derivatives"]),
    (Extensions::DEBUG_RENDERER_INFO, &["WEBGL_debug_renderer_info"]),
];

/// Features WebGL 2.0 has in core that WebGL 1.0 exposes as extensions.
const WEBGL2_CORE: Extensions = Extensions::TEXTURE_FLOAT
    .union(Extensions::TEXTURE_HALF_FLOAT)
    .union(Extensions::TEXTURE_HALF_FLOAT_LINEAR)
    .union(Extensions::VERTEX_ARRAY_OBJECT)
    .union(Extensions::INSTANCED_ARRAYS)
    .union(Extensions::ELEMENT_INDEX_UINT)
    .union(Extensions::DEPTH_TEXTURE)
    .union(Extensions::BLEND_MINMAX)
    .union(Extensions::DRAW_BUFFERS)
    .union(Extensions::SRGB)
    .union(Extensions::STANDARD_DERIVATIVES);

/// Probes `gl` for every known extension, trying vendor-prefixed aliases.
pub fn detect_extensions<G: Gl>(gl: &G) -> Extensions {
    let mut found = Extensions::empty();
    for (flag, names) in EXTENSION_NAMES {
        if names.iter().any(|name| gl.has_extension(name)) {
            found |= *flag;
        }
    }
    if gl.generation().is_webgl2() {
        found |= WEBGL2_CORE;
    }
    found
}

/// Compressed texture families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompressedFamily {
    S3tc,
    Etc1,
    Etc2,
    Pvrtc,
    Astc,
    Atc,
}

/// What the active context can do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    #[serde(serialize_with = "serialize_generation")]
    pub generation: ApiGeneration,
    #[serde(skip)]
    pub extensions: Extensions,
    pub max_texture_size: u32,
    pub max_cube_map_size: u32,
    pub max_3d_texture_size: u32,
    pub max_renderbuffer_size: u32,
    pub max_samples: u32,
    pub max_anisotropy: f32,
    pub max_combined_textures: u32,
    pub max_vertex_textures: u32,
    pub max_draw_buffers: u32,
    pub float_renderable: bool,
    pub half_float_renderable: bool,
    pub float_filterable: bool,
    pub half_float_filterable: bool,
    pub index_u32: bool,
}

fn serialize_generation<S: serde::Serializer>(
    generation: &ApiGeneration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(generation.name())
}

fn positive(value: i32) -> u32 {
    value.max(0) as u32
}

impl Capabilities {
    /// Queries limits and extensions from `gl`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedFeature` when the context offers no
    /// vertex array objects (WebGL 1.0 without `OES_vertex_array_object`).
    pub fn detect<G: Gl>(gl: &G, options: &DeviceOptions) -> Result<Self, DeviceError> {
        let generation = gl.generation();
        let webgl2 = generation.is_webgl2();
        let extensions = detect_extensions(gl);

        if !extensions.contains(Extensions::VERTEX_ARRAY_OBJECT) {
            return Err(DeviceError::UnsupportedFeature(
                "vertex array objects (OES_vertex_array_object)".into(),
            ));
        }

        let cap = |size: u32| match options.max_texture_size {
            Some(limit) => size.min(limit),
            None => size,
        };

        let max_anisotropy = if extensions.contains(Extensions::ANISOTROPIC) {
            gl.get_parameter_f32(webgl::MAX_TEXTURE_MAX_ANISOTROPY_EXT).max(1.0)
        } else {
            1.0
        };

        let float_renderable = if webgl2 {
            extensions.contains(Extensions::COLOR_BUFFER_FLOAT)
        } else {
            extensions.contains(Extensions::TEXTURE_FLOAT | Extensions::WEBGL_COLOR_BUFFER_FLOAT)
        };
        let half_float_renderable = if webgl2 {
            extensions.intersects(Extensions::COLOR_BUFFER_FLOAT | Extensions::COLOR_BUFFER_HALF_FLOAT)
        } else {
            extensions.contains(Extensions::TEXTURE_HALF_FLOAT | Extensions::COLOR_BUFFER_HALF_FLOAT)
        };

        Ok(Self {
            generation,
            extensions,
            max_texture_size: cap(positive(gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE))),
            max_cube_map_size: cap(positive(gl.get_parameter_i32(glow::MAX_CUBE_MAP_TEXTURE_SIZE))),
            max_3d_texture_size: if webgl2 {
                positive(gl.get_parameter_i32(glow::MAX_3D_TEXTURE_SIZE))
            } else {
                0
            },
            max_renderbuffer_size: positive(gl.get_parameter_i32(glow::MAX_RENDERBUFFER_SIZE)),
            max_samples: if webgl2 {
                positive(gl.get_parameter_i32(glow::MAX_SAMPLES))
            } else {
                1
            },
            max_anisotropy,
            max_combined_textures: positive(gl.get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS)),
            max_vertex_textures: positive(gl.get_parameter_i32(glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS)),
            max_draw_buffers: if webgl2 || extensions.contains(Extensions::DRAW_BUFFERS) {
                positive(gl.get_parameter_i32(glow::MAX_DRAW_BUFFERS)).max(1)
            } else {
                1
            },
            float_renderable,
            half_float_renderable,
            float_filterable: extensions.contains(Extensions::TEXTURE_FLOAT_LINEAR),
            half_float_filterable: extensions.contains(Extensions::TEXTURE_HALF_FLOAT_LINEAR),
            index_u32: extensions.contains(Extensions::ELEMENT_INDEX_UINT),
        })
    }

    pub fn is_webgl2(&self) -> bool {
        self.generation.is_webgl2()
    }

    pub fn has(&self, extension: Extensions) -> bool {
        self.extensions.contains(extension)
    }

    pub fn supports_volume_textures(&self) -> bool {
        self.is_webgl2()
    }

    pub fn supports_compressed(&self, family: CompressedFamily) -> bool {
        let flag = match family {
            CompressedFamily::S3tc => Extensions::S3TC,
            CompressedFamily::Etc1 => Extensions::ETC1,
            CompressedFamily::Etc2 => Extensions::ETC,
            CompressedFamily::Pvrtc => Extensions::PVRTC,
            CompressedFamily::Astc => Extensions::ASTC,
            CompressedFamily::Atc => Extensions::ATC,
        };
        self.has(flag)
    }

    /// Compressed families available on this context.
    pub fn compressed_families(&self) -> Vec<CompressedFamily> {
        [
            CompressedFamily::S3tc,
            CompressedFamily::Etc1,
            CompressedFamily::Etc2,
            CompressedFamily::Pvrtc,
            CompressedFamily::Astc,
            CompressedFamily::Atc,
        ]
        .into_iter()
        .filter(|f| self.supports_compressed(*f))
        .collect()
    }

    /// Picks the best high-dynamic-range color format.
    ///
    /// Half float wins over float when both qualify; RGBA8 is the fallback.
    pub fn preferred_hdr_format(&self, renderable: bool, filterable: bool) -> PixelFormat {
        let half = self.has(Extensions::TEXTURE_HALF_FLOAT)
            && (!renderable || self.half_float_renderable)
            && (!filterable || self.half_float_filterable);
        let full = self.has(Extensions::TEXTURE_FLOAT)
            && (!renderable || self.float_renderable)
            && (!filterable || self.float_filterable);
        if half {
            PixelFormat::Rgba16F
        } else if full {
            PixelFormat::Rgba32F
        } else {
            PixelFormat::Rgba8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::RecordingGl;

    fn detect(gl: &RecordingGl) -> Capabilities {
        Capabilities::detect(gl, &DeviceOptions::default()).unwrap()
    }

    #[test]
    fn webgl2_has_core_features_without_extensions() {
        let gl = RecordingGl::webgl2().without_extensions();
        let caps = detect(&gl);
        assert!(caps.has(Extensions::VERTEX_ARRAY_OBJECT));
        assert!(caps.index_u32);
        assert!(caps.supports_volume_textures());
        assert!(!caps.float_renderable, "float rendering needs EXT_color_buffer_float");
    }

    #[test]
    fn webgl1_without_vao_is_unsupported() {
        let gl = RecordingGl::webgl1().without_extensions();
        let err = Capabilities::detect(&gl, &DeviceOptions::default()).unwrap_err();
        assert!(
            matches!(err, DeviceError::UnsupportedFeature(_)),
            "expected UnsupportedFeature, got {err:?}"
        );
    }

    #[test]
    fn vendor_prefixed_aliases_are_detected() {
        let gl = RecordingGl::webgl1()
            .without_extensions()
            .with_extensions(&["OES_vertex_array_object", "WEBKIT_WEBGL_compressed_texture_pvrtc"]);
        let caps = detect(&gl);
        assert!(caps.supports_compressed(CompressedFamily::Pvrtc));
        assert_eq!(caps.compressed_families(), vec![CompressedFamily::Pvrtc]);
    }

    #[test]
    fn webgl1_float_renderable_needs_both_extensions() {
        let gl = RecordingGl::webgl1();
        assert!(!detect(&gl).float_renderable);
        let gl = RecordingGl::webgl1().with_extensions(&["WEBGL_color_buffer_float"]);
        assert!(detect(&gl).float_renderable);
    }

    #[test]
    fn webgl1_has_single_sample_and_no_volume_textures() {
        let caps = detect(&RecordingGl::webgl1());
        assert_eq!(caps.max_samples, 1);
        assert_eq!(caps.max_3d_texture_size, 0);
        assert_eq!(caps.max_draw_buffers, 1);
    }

    #[test]
    fn texture_size_cap_applies() {
        let gl = RecordingGl::webgl2();
        let options = DeviceOptions {
            max_texture_size: Some(1024),
            ..DeviceOptions::default()
        };
        let caps = Capabilities::detect(&gl, &options).unwrap();
        assert_eq!(caps.max_texture_size, 1024);
        assert_eq!(caps.max_cube_map_size, 1024);
    }

    #[test]
    fn anisotropy_defaults_to_one_without_extension() {
        let gl = RecordingGl::webgl2().without_extensions();
        assert_eq!(detect(&gl).max_anisotropy, 1.0);
        assert_eq!(detect(&RecordingGl::webgl2()).max_anisotropy, 16.0);
    }

    #[test]
    fn hdr_format_prefers_half_float() {
        let caps = detect(&RecordingGl::webgl2());
        assert_eq!(caps.preferred_hdr_format(true, true), PixelFormat::Rgba16F);
    }

    #[test]
    fn hdr_format_falls_back_to_rgba8() {
        let gl = RecordingGl::webgl1()
            .without_extensions()
            .with_extensions(&["OES_vertex_array_object"]);
        assert_eq!(detect(&gl).preferred_hdr_format(false, false), PixelFormat::Rgba8);
    }

    #[test]
    fn hdr_format_uses_float_when_half_float_not_renderable() {
        let gl = RecordingGl::webgl1()
            .without_extensions()
            .with_extensions(&[
                "OES_vertex_array_object",
                "OES_texture_float",
                "WEBGL_color_buffer_float",
            ]);
        assert_eq!(detect(&gl).preferred_hdr_format(true, false), PixelFormat::Rgba32F);
    }
}
