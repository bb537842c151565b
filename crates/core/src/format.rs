//! Pixel format translation.
//!
//! A [`PixelFormat`] is backend neutral. [`FormatTable`] maps each format to
//! the native `(internal format, format, type)` triple for one context. The
//! table is built from a static row list: every row names the triple for each
//! API generation together with the capability it needs, and rows whose
//! requirement the context lacks are left out of the map.

use std::collections::HashMap;

use serde::Serialize;

use crate::caps::{Capabilities, Extensions};
use crate::error::DeviceError;
use crate::gl::{webgl, ApiGeneration};

/// Backend-neutral pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PixelFormat {
    A8,
    L8,
    La8,
    Rgb565,
    Rgba5551,
    Rgba4,
    Rgb8,
    Rgba8,
    Dxt1,
    Dxt3,
    Dxt5,
    Etc1,
    Etc2Rgb,
    Etc2Rgba,
    Pvrtc2BppRgb,
    Pvrtc2BppRgba,
    Pvrtc4BppRgb,
    Pvrtc4BppRgba,
    Astc4x4,
    AtcRgb,
    AtcRgba,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    R32F,
    Rgb32F,
    Rgba32F,
    R11G11B10F,
    Srgb8,
    Srgba8,
    Depth,
    DepthStencil,
    R8I,
    R8U,
    R16I,
    R16U,
    R32I,
    R32U,
    Rg8I,
    Rg8U,
    Rgba8I,
    Rgba8U,
    Rgba32I,
    Rgba32U,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 45] = [
        PixelFormat::A8,
        PixelFormat::L8,
        PixelFormat::La8,
        PixelFormat::Rgb565,
        PixelFormat::Rgba5551,
        PixelFormat::Rgba4,
        PixelFormat::Rgb8,
        PixelFormat::Rgba8,
        PixelFormat::Dxt1,
        PixelFormat::Dxt3,
        PixelFormat::Dxt5,
        PixelFormat::Etc1,
        PixelFormat::Etc2Rgb,
        PixelFormat::Etc2Rgba,
        PixelFormat::Pvrtc2BppRgb,
        PixelFormat::Pvrtc2BppRgba,
        PixelFormat::Pvrtc4BppRgb,
        PixelFormat::Pvrtc4BppRgba,
        PixelFormat::Astc4x4,
        PixelFormat::AtcRgb,
        PixelFormat::AtcRgba,
        PixelFormat::R16F,
        PixelFormat::Rg16F,
        PixelFormat::Rgb16F,
        PixelFormat::Rgba16F,
        PixelFormat::R32F,
        PixelFormat::Rgb32F,
        PixelFormat::Rgba32F,
        PixelFormat::R11G11B10F,
        PixelFormat::Srgb8,
        PixelFormat::Srgba8,
        PixelFormat::Depth,
        PixelFormat::DepthStencil,
        PixelFormat::R8I,
        PixelFormat::R8U,
        PixelFormat::R16I,
        PixelFormat::R16U,
        PixelFormat::R32I,
        PixelFormat::R32U,
        PixelFormat::Rg8I,
        PixelFormat::Rg8U,
        PixelFormat::Rgba8I,
        PixelFormat::Rgba8U,
        PixelFormat::Rgba32I,
        PixelFormat::Rgba32U,
    ];

    /// Bytes per pixel for uncompressed formats, 0 for block-compressed ones.
    pub fn bytes_per_pixel(self) -> u32 {
        use PixelFormat::*;
        match self {
            A8 | L8 | R8I | R8U => 1,
            La8 | Rgb565 | Rgba5551 | Rgba4 | R16F | R16I | R16U | Rg8I | Rg8U => 2,
            Rgb8 | Rgba8 | Rg16F | R32F | R11G11B10F | Srgb8 | Srgba8 | Depth | DepthStencil
            | R32I | R32U | Rgba8I | Rgba8U => 4,
            Rgb16F | Rgba16F => 8,
            Rgb32F | Rgba32F | Rgba32I | Rgba32U => 16,
            Dxt1 | Dxt3 | Dxt5 | Etc1 | Etc2Rgb | Etc2Rgba | Pvrtc2BppRgb | Pvrtc2BppRgba
            | Pvrtc4BppRgb | Pvrtc4BppRgba | Astc4x4 | AtcRgb | AtcRgba => 0,
        }
    }

    /// Bytes per 4x4 block for compressed formats, 0 otherwise.
    pub fn block_size(self) -> u32 {
        use PixelFormat::*;
        match self {
            Dxt1 | Etc1 | Etc2Rgb | AtcRgb => 8,
            Pvrtc2BppRgb | Pvrtc2BppRgba | Pvrtc4BppRgb | Pvrtc4BppRgba => 8,
            Dxt3 | Dxt5 | Etc2Rgba | Astc4x4 | AtcRgba => 16,
            _ => 0,
        }
    }

    pub fn is_compressed(self) -> bool {
        self.block_size() > 0
    }

    pub fn is_integer(self) -> bool {
        use PixelFormat::*;
        matches!(
            self,
            R8I | R8U | R16I | R16U | R32I | R32U | Rg8I | Rg8U | Rgba8I | Rgba8U | Rgba32I | Rgba32U
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth | PixelFormat::DepthStencil)
    }

    pub fn has_stencil(self) -> bool {
        self == PixelFormat::DepthStencil
    }

    pub fn is_half_float(self) -> bool {
        use PixelFormat::*;
        matches!(self, R16F | Rg16F | Rgb16F | Rgba16F)
    }

    pub fn is_float(self) -> bool {
        use PixelFormat::*;
        matches!(self, R32F | Rgb32F | Rgba32F | R11G11B10F)
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, PixelFormat::Srgb8 | PixelFormat::Srgba8)
    }

    fn is_pvrtc_2bpp(self) -> bool {
        matches!(self, PixelFormat::Pvrtc2BppRgb | PixelFormat::Pvrtc2BppRgba)
    }
}

/// Number of mip levels in a complete chain for the given extent.
pub fn mip_level_count(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    32 - largest.leading_zeros()
}

/// Estimated size of one mip level in bytes.
pub fn level_gpu_size(width: u32, height: u32, depth: u32, format: PixelFormat) -> u64 {
    let pixel_size = u64::from(format.bytes_per_pixel());
    if pixel_size > 0 {
        return u64::from(width) * u64::from(height) * u64::from(depth) * pixel_size;
    }
    let mut block_width = u64::from(width.div_ceil(4));
    let block_height = u64::from(height.div_ceil(4));
    let block_depth = u64::from(depth.div_ceil(4));
    if format.is_pvrtc_2bpp() {
        block_width = (block_width / 2).max(1);
    }
    block_width * block_height * block_depth * u64::from(format.block_size())
}

/// Estimated GPU memory for a texture, summing every mip level when
/// `mipmaps` is set and multiplying by six faces for cubemaps.
pub fn gpu_size(
    width: u32,
    height: u32,
    depth: u32,
    format: PixelFormat,
    mipmaps: bool,
    cubemap: bool,
) -> u64 {
    let (mut w, mut h, mut d) = (width.max(1), height.max(1), depth.max(1));
    let mut total = 0;
    loop {
        total += level_gpu_size(w, h, d, format);
        if !mipmaps || (w == 1 && h == 1 && d == 1) {
            break;
        }
        w = (w >> 1).max(1);
        h = (h >> 1).max(1);
        d = (d >> 1).max(1);
    }
    if cubemap {
        total * 6
    } else {
        total
    }
}

/// Native `(internal format, format, type)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NativeFormat {
    pub internal_format: u32,
    pub format: u32,
    pub data_type: u32,
}

const fn native(internal_format: u32, format: u32, data_type: u32) -> NativeFormat {
    NativeFormat {
        internal_format,
        format,
        data_type,
    }
}

/// What a row needs from the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Core,
    Extension(Extensions),
}

use Requirement::{Core, Extension};

type Entry = Option<(NativeFormat, Requirement)>;

struct FormatRow {
    format: PixelFormat,
    webgl1: Entry,
    webgl2: Entry,
}

const fn both(format: PixelFormat, webgl1: NativeFormat, webgl2: NativeFormat) -> FormatRow {
    FormatRow {
        format,
        webgl1: Some((webgl1, Core)),
        webgl2: Some((webgl2, Core)),
    }
}

const fn compressed(format: PixelFormat, internal: u32, extension: Extensions) -> FormatRow {
    let n = native(internal, internal, glow::UNSIGNED_BYTE);
    FormatRow {
        format,
        webgl1: Some((n, Extension(extension))),
        webgl2: Some((n, Extension(extension))),
    }
}

const fn webgl2_only(format: PixelFormat, webgl2: NativeFormat) -> FormatRow {
    FormatRow {
        format,
        webgl1: None,
        webgl2: Some((webgl2, Core)),
    }
}

const fn with_webgl1_extension(
    format: PixelFormat,
    webgl1: NativeFormat,
    extension: Extensions,
    webgl2: NativeFormat,
) -> FormatRow {
    FormatRow {
        format,
        webgl1: Some((webgl1, Extension(extension))),
        webgl2: Some((webgl2, Core)),
    }
}

const ROWS: &[FormatRow] = &[
    both(
        PixelFormat::A8,
        native(webgl::ALPHA, webgl::ALPHA, glow::UNSIGNED_BYTE),
        native(webgl::ALPHA, webgl::ALPHA, glow::UNSIGNED_BYTE),
    ),
    both(
        PixelFormat::L8,
        native(webgl::LUMINANCE, webgl::LUMINANCE, glow::UNSIGNED_BYTE),
        native(webgl::LUMINANCE, webgl::LUMINANCE, glow::UNSIGNED_BYTE),
    ),
    both(
        PixelFormat::La8,
        native(webgl::LUMINANCE_ALPHA, webgl::LUMINANCE_ALPHA, glow::UNSIGNED_BYTE),
        native(webgl::LUMINANCE_ALPHA, webgl::LUMINANCE_ALPHA, glow::UNSIGNED_BYTE),
    ),
    both(
        PixelFormat::Rgb565,
        native(glow::RGB, glow::RGB, glow::UNSIGNED_SHORT_5_6_5),
        native(glow::RGB, glow::RGB, glow::UNSIGNED_SHORT_5_6_5),
    ),
    both(
        PixelFormat::Rgba5551,
        native(glow::RGBA, glow::RGBA, glow::UNSIGNED_SHORT_5_5_5_1),
        native(glow::RGBA, glow::RGBA, glow::UNSIGNED_SHORT_5_5_5_1),
    ),
    both(
        PixelFormat::Rgba4,
        native(glow::RGBA, glow::RGBA, glow::UNSIGNED_SHORT_4_4_4_4),
        native(glow::RGBA, glow::RGBA, glow::UNSIGNED_SHORT_4_4_4_4),
    ),
    both(
        PixelFormat::Rgb8,
        native(glow::RGB, glow::RGB, glow::UNSIGNED_BYTE),
        native(glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
    ),
    both(
        PixelFormat::Rgba8,
        native(glow::RGBA, glow::RGBA, glow::UNSIGNED_BYTE),
        native(glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
    ),
    compressed(PixelFormat::Dxt1, webgl::COMPRESSED_RGB_S3TC_DXT1_EXT, Extensions::S3TC),
    compressed(PixelFormat::Dxt3, webgl::COMPRESSED_RGBA_S3TC_DXT3_EXT, Extensions::S3TC),
    compressed(PixelFormat::Dxt5, webgl::COMPRESSED_RGBA_S3TC_DXT5_EXT, Extensions::S3TC),
    compressed(PixelFormat::Etc1, webgl::COMPRESSED_RGB_ETC1_WEBGL, Extensions::ETC1),
    compressed(PixelFormat::Etc2Rgb, webgl::COMPRESSED_RGB8_ETC2, Extensions::ETC),
    compressed(PixelFormat::Etc2Rgba, webgl::COMPRESSED_RGBA8_ETC2_EAC, Extensions::ETC),
    compressed(PixelFormat::Pvrtc2BppRgb, webgl::COMPRESSED_RGB_PVRTC_2BPPV1_IMG, Extensions::PVRTC),
    compressed(PixelFormat::Pvrtc2BppRgba, webgl::COMPRESSED_RGBA_PVRTC_2BPPV1_IMG, Extensions::PVRTC),
    compressed(PixelFormat::Pvrtc4BppRgb, webgl::COMPRESSED_RGB_PVRTC_4BPPV1_IMG, Extensions::PVRTC),
    compressed(PixelFormat::Pvrtc4BppRgba, webgl::COMPRESSED_RGBA_PVRTC_4BPPV1_IMG, Extensions::PVRTC),
    compressed(PixelFormat::Astc4x4, webgl::COMPRESSED_RGBA_ASTC_4X4_KHR, Extensions::ASTC),
    compressed(PixelFormat::AtcRgb, webgl::COMPRESSED_RGB_ATC_WEBGL, Extensions::ATC),
    compressed(
        PixelFormat::AtcRgba,
        webgl::COMPRESSED_RGBA_ATC_INTERPOLATED_ALPHA_WEBGL,
        Extensions::ATC,
    ),
    webgl2_only(PixelFormat::R16F, native(glow::R16F, glow::RED, glow::HALF_FLOAT)),
    webgl2_only(PixelFormat::Rg16F, native(glow::RG16F, glow::RG, glow::HALF_FLOAT)),
    with_webgl1_extension(
        PixelFormat::Rgb16F,
        native(glow::RGB, glow::RGB, webgl::HALF_FLOAT_OES),
        Extensions::TEXTURE_HALF_FLOAT,
        native(glow::RGB16F, glow::RGB, glow::HALF_FLOAT),
    ),
    with_webgl1_extension(
        PixelFormat::Rgba16F,
        native(glow::RGBA, glow::RGBA, webgl::HALF_FLOAT_OES),
        Extensions::TEXTURE_HALF_FLOAT,
        native(glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
    ),
    with_webgl1_extension(
        PixelFormat::R32F,
        native(webgl::LUMINANCE, webgl::LUMINANCE, glow::FLOAT),
        Extensions::TEXTURE_FLOAT,
        native(glow::R32F, glow::RED, glow::FLOAT),
    ),
    with_webgl1_extension(
        PixelFormat::Rgb32F,
        native(glow::RGB, glow::RGB, glow::FLOAT),
        Extensions::TEXTURE_FLOAT,
        native(glow::RGB32F, glow::RGB, glow::FLOAT),
    ),
    with_webgl1_extension(
        PixelFormat::Rgba32F,
        native(glow::RGBA, glow::RGBA, glow::FLOAT),
        Extensions::TEXTURE_FLOAT,
        native(glow::RGBA32F, glow::RGBA, glow::FLOAT),
    ),
    webgl2_only(
        PixelFormat::R11G11B10F,
        native(glow::R11F_G11F_B10F, glow::RGB, glow::UNSIGNED_INT_10F_11F_11F_REV),
    ),
    with_webgl1_extension(
        PixelFormat::Srgb8,
        native(webgl::SRGB_EXT, webgl::SRGB_EXT, glow::UNSIGNED_BYTE),
        Extensions::SRGB,
        native(glow::SRGB8, glow::RGB, glow::UNSIGNED_BYTE),
    ),
    with_webgl1_extension(
        PixelFormat::Srgba8,
        native(webgl::SRGB_ALPHA_EXT, webgl::SRGB_ALPHA_EXT, glow::UNSIGNED_BYTE),
        Extensions::SRGB,
        native(glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
    ),
    with_webgl1_extension(
        PixelFormat::Depth,
        native(glow::DEPTH_COMPONENT, glow::DEPTH_COMPONENT, glow::UNSIGNED_SHORT),
        Extensions::DEPTH_TEXTURE,
        native(glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
    ),
    with_webgl1_extension(
        PixelFormat::DepthStencil,
        native(glow::DEPTH_STENCIL, glow::DEPTH_STENCIL, webgl::UNSIGNED_INT_24_8_WEBGL),
        Extensions::DEPTH_TEXTURE,
        native(glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8),
    ),
    webgl2_only(PixelFormat::R8I, native(glow::R8I, glow::RED_INTEGER, glow::BYTE)),
    webgl2_only(PixelFormat::R8U, native(glow::R8UI, glow::RED_INTEGER, glow::UNSIGNED_BYTE)),
    webgl2_only(PixelFormat::R16I, native(glow::R16I, glow::RED_INTEGER, glow::SHORT)),
    webgl2_only(PixelFormat::R16U, native(glow::R16UI, glow::RED_INTEGER, glow::UNSIGNED_SHORT)),
    webgl2_only(PixelFormat::R32I, native(glow::R32I, glow::RED_INTEGER, glow::INT)),
    webgl2_only(PixelFormat::R32U, native(glow::R32UI, glow::RED_INTEGER, glow::UNSIGNED_INT)),
    webgl2_only(PixelFormat::Rg8I, native(glow::RG8I, glow::RG_INTEGER, glow::BYTE)),
    webgl2_only(PixelFormat::Rg8U, native(glow::RG8UI, glow::RG_INTEGER, glow::UNSIGNED_BYTE)),
    webgl2_only(PixelFormat::Rgba8I, native(glow::RGBA8I, glow::RGBA_INTEGER, glow::BYTE)),
    webgl2_only(PixelFormat::Rgba8U, native(glow::RGBA8UI, glow::RGBA_INTEGER, glow::UNSIGNED_BYTE)),
    webgl2_only(PixelFormat::Rgba32I, native(glow::RGBA32I, glow::RGBA_INTEGER, glow::INT)),
    webgl2_only(PixelFormat::Rgba32U, native(glow::RGBA32UI, glow::RGBA_INTEGER, glow::UNSIGNED_INT)),
];

/// Per-context format map.
#[derive(Debug, Clone)]
pub struct FormatTable {
    generation: ApiGeneration,
    formats: HashMap<PixelFormat, NativeFormat>,
}

impl FormatTable {
    /// Keeps the rows whose requirement `caps` satisfies.
    pub fn build(caps: &Capabilities) -> Self {
        let formats = ROWS
            .iter()
            .filter_map(|row| {
                let entry = if caps.is_webgl2() { row.webgl2 } else { row.webgl1 };
                let (triple, requirement) = entry?;
                let available = match requirement {
                    Core => true,
                    Extension(flag) => caps.has(flag),
                };
                available.then_some((row.format, triple))
            })
            .collect();
        Self {
            generation: caps.generation,
            formats,
        }
    }

    /// Native triple for `format`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnsupportedFormat` when the context lacks the
    /// generation or extension the format needs.
    pub fn resolve(&self, format: PixelFormat) -> Result<NativeFormat, DeviceError> {
        self.formats
            .get(&format)
            .copied()
            .ok_or(DeviceError::UnsupportedFormat {
                format,
                generation: self.generation.name(),
            })
    }

    pub fn supports(&self, format: PixelFormat) -> bool {
        self.formats.contains_key(&format)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceOptions;
    use crate::gl::RecordingGl;
    use proptest::prelude::*;

    fn table(gl: &RecordingGl) -> FormatTable {
        FormatTable::build(&Capabilities::detect(gl, &DeviceOptions::default()).unwrap())
    }

    #[test]
    fn every_format_has_a_row() {
        for format in PixelFormat::ALL {
            assert!(
                ROWS.iter().any(|row| row.format == format),
                "no table row for {format:?}"
            );
        }
        assert_eq!(ROWS.len(), PixelFormat::ALL.len());
    }

    #[test]
    fn rgba8_uses_sized_format_on_webgl2_only() {
        let t2 = table(&RecordingGl::webgl2());
        let t1 = table(&RecordingGl::webgl1());
        assert_eq!(t2.resolve(PixelFormat::Rgba8).unwrap().internal_format, glow::RGBA8);
        assert_eq!(t1.resolve(PixelFormat::Rgba8).unwrap().internal_format, glow::RGBA);
    }

    #[test]
    fn half_float_uses_oes_type_on_webgl1() {
        let t1 = table(&RecordingGl::webgl1());
        let triple = t1.resolve(PixelFormat::Rgba16F).unwrap();
        assert_eq!(triple.data_type, webgl::HALF_FLOAT_OES);
    }

    #[test]
    fn webgl2_only_formats_are_rejected_on_webgl1() {
        let t1 = table(&RecordingGl::webgl1());
        for format in [PixelFormat::R16F, PixelFormat::R11G11B10F, PixelFormat::Rgba32U] {
            let err = t1.resolve(format).unwrap_err();
            assert!(
                matches!(err, DeviceError::UnsupportedFormat { format: f, .. } if f == format),
                "expected UnsupportedFormat for {format:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn compressed_formats_need_their_extension() {
        let t = table(&RecordingGl::webgl2());
        assert!(t.supports(PixelFormat::Dxt5), "s3tc is in the default webgl2 set");
        assert!(!t.supports(PixelFormat::Etc1));
        let t = table(&RecordingGl::webgl2().with_extensions(&["WEBGL_compressed_texture_etc1"]));
        assert!(t.supports(PixelFormat::Etc1));
    }

    #[test]
    fn metadata_flags_are_consistent() {
        for format in PixelFormat::ALL {
            assert_ne!(
                format.bytes_per_pixel() > 0,
                format.is_compressed(),
                "{format:?} must have exactly one of pixel size or block size"
            );
        }
        assert!(PixelFormat::R32U.is_integer());
        assert!(PixelFormat::DepthStencil.is_depth());
        assert!(PixelFormat::DepthStencil.has_stencil());
        assert!(!PixelFormat::Depth.has_stencil());
        assert!(PixelFormat::Rgba16F.is_half_float());
        assert!(PixelFormat::Srgba8.is_srgb());
    }

    #[test]
    fn gpu_size_matches_known_values() {
        assert_eq!(gpu_size(4, 4, 1, PixelFormat::Rgba8, false, false), 64);
        // 4x4 + 2x2 + 1x1 texels
        assert_eq!(gpu_size(4, 4, 1, PixelFormat::Rgba8, true, false), 84);
        assert_eq!(gpu_size(4, 4, 1, PixelFormat::Rgba8, false, true), 384);
        assert_eq!(gpu_size(8, 8, 1, PixelFormat::Dxt1, false, false), 32);
        assert_eq!(gpu_size(1, 1, 1, PixelFormat::Dxt5, false, false), 16);
        assert_eq!(gpu_size(16, 16, 1, PixelFormat::Pvrtc2BppRgb, false, false), 2 * 4 * 8);
    }

    #[test]
    fn mip_level_count_covers_chain() {
        assert_eq!(mip_level_count(1, 1, 1), 1);
        assert_eq!(mip_level_count(256, 256, 1), 9);
        assert_eq!(mip_level_count(256, 3, 1), 9);
        assert_eq!(mip_level_count(0, 0, 0), 1);
    }

    proptest! {
        #[test]
        fn mipmapped_size_is_at_least_base(w in 1u32..2048, h in 1u32..2048) {
            let base = gpu_size(w, h, 1, PixelFormat::Rgba8, false, false);
            let full = gpu_size(w, h, 1, PixelFormat::Rgba8, true, false);
            prop_assert!(full >= base);
            // a full chain never exceeds 4/3 of the base plus one texel row per level
            prop_assert!(full <= base * 2);
        }

        #[test]
        fn mip_count_halves_to_one(w in 1u32..4096, h in 1u32..4096) {
            let levels = mip_level_count(w, h, 1);
            prop_assert_eq!(w.max(h) >> (levels - 1), 1);
        }
    }
}
